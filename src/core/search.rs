// pixie-squeeze/src/core/search.rs
//! Quality/scale search.
//!
//! Lossy paths bisect quality in `[min_quality, max_quality]` at full size.
//! When even the floor quality overshoots, the frame is shrunk geometrically by
//! `scale_decay` per step. Each step probes the floor quality first and only
//! bisects upward once the floor fits. Lossless paths have no quality axis and
//! re-encode once per scale step. Every encode counts against
//! `max_iterations`, and no frame is ever smaller than `min_dimension` on a
//! side (or the source side, if that is smaller).

use super::config::{MetadataProbe, SearchConfig};
use super::strategy::{
    self, SearchPath, SearchPlan, LABEL_HYBRID_FALLBACK, LABEL_HYBRID_LOSSLESS, LABEL_LOSSLESS,
    LABEL_LOSSY,
};
use super::{CancelFlag, CompressError, CompressionRequest, OutputFormat, Result};
use crate::processors::{Codec, EncodeMode, EncodeParams, ExtractedMetadata, MetadataProcessor, Resizer};
use image::DynamicImage;

/// One trial encode.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Encoder output without metadata.
    pub data: Vec<u8>,
    /// Size the result would have on disk, metadata included.
    pub probed_size: u64,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub params: EncodeParams,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub chosen: Candidate,
    pub met_target: bool,
    pub iterations: u32,
    pub scale_steps: u32,
    pub processing_strategy: &'static str,
    pub notes: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Mutable state of one image's search. Never leaves the task running it.
#[derive(Debug)]
struct SearchState {
    lo: u8,
    hi: u8,
    scale: f64,
    iterations: u32,
    scale_steps: u32,
    best: Option<Candidate>,
    closest: Option<Candidate>,
    metadata_overhead: u64,
    floor_reached: bool,
    quality_fixed: bool,
    notes: Vec<String>,
}

impl SearchState {
    fn new(config: &SearchConfig) -> Self {
        Self {
            lo: config.min_quality,
            hi: config.max_quality,
            scale: 1.0,
            iterations: 0,
            scale_steps: 0,
            best: None,
            closest: None,
            metadata_overhead: 0,
            floor_reached: false,
            quality_fixed: false,
            notes: Vec::new(),
        }
    }
}

/// Dimensions for `scale`, never below `min(min_dimension, source side)`.
///
/// With the aspect lock the scale is raised until both sides clear the floor,
/// so the ratio survives. Without it each side is clamped on its own.
pub fn scaled_dimensions(
    width: u32,
    height: u32,
    scale: f64,
    min_dimension: u32,
    keep_aspect: bool,
) -> (u32, u32) {
    let floor_w = min_dimension.min(width).max(1);
    let floor_h = min_dimension.min(height).max(1);

    let scale = if keep_aspect {
        let min_scale = (f64::from(floor_w) / f64::from(width))
            .max(f64::from(floor_h) / f64::from(height));
        scale.max(min_scale)
    } else {
        scale
    }
    .min(1.0);

    let side = |length: u32, floor: u32| -> u32 {
        ((f64::from(length) * scale).round() as u32).clamp(floor, length)
    };

    (side(width, floor_w), side(height, floor_h))
}

pub struct Search<'a> {
    codec: &'a dyn Codec,
    resizer: &'a Resizer,
    config: &'a SearchConfig,
    request: &'a CompressionRequest,
    png_effort: u8,
    cancel: &'a CancelFlag,
    metadata: Option<(&'a MetadataProcessor, &'a ExtractedMetadata)>,
}

impl<'a> Search<'a> {
    pub fn new(
        codec: &'a dyn Codec,
        resizer: &'a Resizer,
        config: &'a SearchConfig,
        request: &'a CompressionRequest,
        png_effort: u8,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            codec,
            resizer,
            config,
            request,
            png_effort,
            cancel,
            metadata: None,
        }
    }

    /// Metadata that will be reattached to the final output and therefore
    /// counts toward every probed size.
    pub fn with_metadata(
        mut self,
        processor: &'a MetadataProcessor,
        metadata: &'a ExtractedMetadata,
    ) -> Self {
        if metadata.has_payload() {
            self.metadata = Some((processor, metadata));
        }
        self
    }

    pub fn run(&self, image: &DynamicImage) -> Result<SearchOutcome> {
        let plan = strategy::select(self.request.compression_strategy, self.request.output_format);
        let mut state = SearchState::new(self.config);
        self.cancel.check()?;

        log::debug!(
            "Searching {}x{} for {} bytes ({:?} path, {})",
            image.width(),
            image.height(),
            self.request.target_size_bytes,
            plan.path,
            plan.format
        );

        self.check_floor(&mut state, image, &plan)?;

        if plan.format == OutputFormat::Jpeg && plan.path != SearchPath::Lossy {
            state.notes.push(format!(
                "JPEG has no lossless mode; lossless attempt encoded at quality {}",
                self.config.max_quality
            ));
        }

        if let Some(quality) = self.request.quality_override {
            if plan.runs_bisection() {
                return self.run_fixed_quality(state, image, quality);
            }
            state.notes.push(format!(
                "Quality override {} ignored: the {} path has no quality axis",
                quality,
                if plan.quality_axis { "lossless" } else { "PNG" }
            ));
        }

        let label = match plan.path {
            SearchPath::Lossy => {
                if plan.runs_bisection() {
                    self.lossy(&mut state, image, self.config.max_quality)?;
                } else {
                    state
                        .notes
                        .push("PNG has no quality axis; size reduced by downscaling only".to_string());
                    self.lossless(&mut state, image, &plan, true)?;
                }
                LABEL_LOSSY
            }
            SearchPath::Lossless => {
                self.lossless(&mut state, image, &plan, true)?;
                LABEL_LOSSLESS
            }
            SearchPath::Hybrid => self.hybrid(&mut state, image, &plan)?,
        };

        self.finish(state, image, label)
    }

    /// Rejects targets below the smallest possible encode, a 1x1 frame at the
    /// floor quality. Also fixes the constant metadata overhead.
    fn check_floor(&self, state: &mut SearchState, image: &DynamicImage, plan: &SearchPlan) -> Result<()> {
        let mode = if plan.runs_bisection() {
            EncodeMode::Lossy {
                quality: self.config.min_quality,
            }
        } else {
            plan.lossless_mode(self.config.max_quality)
        };

        let pixel = image.crop_imm(0, 0, 1, 1);
        let data = self.codec.encode(&pixel, &self.params(mode))?;

        if let Some((processor, metadata)) = self.metadata {
            state.metadata_overhead = processor.overhead(&data, metadata)?;
            if state.metadata_overhead > 0 {
                state.notes.push(format!(
                    "Preserved metadata adds {} bytes to the output",
                    state.metadata_overhead
                ));
            }
        }

        let minimum = data.len() as u64 + state.metadata_overhead;
        if minimum > self.request.target_size_bytes {
            return Err(CompressError::TargetTooSmall {
                target: self.request.target_size_bytes,
                minimum,
                format: plan.format,
            });
        }

        Ok(())
    }

    fn run_fixed_quality(&self, mut state: SearchState, image: &DynamicImage, quality: u8) -> Result<SearchOutcome> {
        let quality = quality.clamp(self.config.min_quality, self.config.max_quality);
        state.quality_fixed = true;
        self.trial(&mut state, image, EncodeMode::Lossy { quality })?;
        state
            .notes
            .push(format!("Quality fixed at {} by override; search skipped", quality));

        let mut outcome = self.finish(state, image, LABEL_LOSSY)?;
        if !outcome.met_target {
            outcome.recommendations.push(format!(
                "Target unreachable at the overridden quality {}; remove the quality override to let the search lower it",
                quality
            ));
        }
        Ok(outcome)
    }

    fn hybrid(&self, state: &mut SearchState, image: &DynamicImage, plan: &SearchPlan) -> Result<&'static str> {
        let mode = plan.lossless_mode(self.config.max_quality);
        if self.trial(state, image, mode)? {
            state
                .notes
                .push("Lossless encode met the target with no quality loss".to_string());
            return Ok(LABEL_HYBRID_LOSSLESS);
        }

        if plan.runs_bisection() {
            // The JPEG attempt already covered max_quality.
            let hi = match mode {
                EncodeMode::Lossy { quality } => quality.saturating_sub(1),
                EncodeMode::Lossless => self.config.max_quality,
            };
            self.lossy(state, image, hi)?;
        } else {
            state
                .notes
                .push("PNG has no quality axis; fell back to downscaling".to_string());
            self.lossless(state, image, plan, false)?;
        }

        Ok(LABEL_HYBRID_FALLBACK)
    }

    fn lossy(&self, state: &mut SearchState, image: &DynamicImage, hi: u8) -> Result<()> {
        state.lo = self.config.min_quality;
        state.hi = hi;
        self.bisect(state, image)?;

        if state.best.is_some() {
            return Ok(());
        }

        let floor = self.config.min_quality;
        self.scale_fallback(state, image, |state, frame| {
            if !self.trial(state, frame, EncodeMode::Lossy { quality: floor })? {
                return Ok(false);
            }
            state.lo = floor.saturating_add(1);
            state.hi = hi;
            self.bisect(state, frame)?;
            Ok(true)
        })
    }

    fn lossless(
        &self,
        state: &mut SearchState,
        image: &DynamicImage,
        plan: &SearchPlan,
        include_full_size: bool,
    ) -> Result<()> {
        let mode = plan.lossless_mode(self.config.max_quality);

        if include_full_size && self.trial(state, image, mode)? {
            return Ok(());
        }

        self.scale_fallback(state, image, |state, frame| self.trial(state, frame, mode))
    }

    fn bisect(&self, state: &mut SearchState, frame: &DynamicImage) -> Result<()> {
        while state.lo <= state.hi && state.iterations < self.config.max_iterations {
            let mid = ((u16::from(state.lo) + u16::from(state.hi)) / 2) as u8;

            if self.trial(state, frame, EncodeMode::Lossy { quality: mid })? {
                state.lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                state.hi = mid - 1;
            }
        }

        Ok(())
    }

    /// Shrinks the source step by step until `attempt` reports success, the
    /// budget or step cap runs out, or the dimension floor stops progress.
    fn scale_fallback<F>(&self, state: &mut SearchState, image: &DynamicImage, mut attempt: F) -> Result<()>
    where
        F: FnMut(&mut SearchState, &DynamicImage) -> Result<bool>,
    {
        let (source_w, source_h) = (image.width(), image.height());
        let mut current = scaled_dimensions(
            source_w,
            source_h,
            state.scale,
            self.config.min_dimension,
            self.request.maintain_aspect_ratio,
        );

        while state.scale_steps < self.config.max_scale_steps
            && state.iterations < self.config.max_iterations
        {
            let scale = state.scale * self.config.scale_decay;
            let next = scaled_dimensions(
                source_w,
                source_h,
                scale,
                self.config.min_dimension,
                self.request.maintain_aspect_ratio,
            );

            if next == current {
                state.floor_reached = true;
                break;
            }

            self.cancel.check()?;
            let frame = self.resizer.resize(image, next.0, next.1)?;
            state.scale = scale;
            state.scale_steps += 1;
            current = next;

            log::debug!(
                "Scale step {}: {}x{} (scale {:.3})",
                state.scale_steps,
                next.0,
                next.1,
                scale
            );

            if attempt(state, &frame)? {
                break;
            }
        }

        Ok(())
    }

    /// Encodes once and records the candidate. Returns whether it fits.
    fn trial(&self, state: &mut SearchState, frame: &DynamicImage, mode: EncodeMode) -> Result<bool> {
        self.cancel.check()?;

        let params = self.params(mode);
        let data = self.codec.encode(frame, &params)?;
        state.iterations += 1;

        let probed_size = match (self.metadata, self.config.metadata_probe) {
            (Some((processor, metadata)), MetadataProbe::EveryTrial) => {
                processor.reattach(&data, metadata)?.len() as u64
            }
            _ => data.len() as u64 + state.metadata_overhead,
        };
        let fits = probed_size <= self.request.target_size_bytes;

        log::debug!(
            "Trial {}: {}x{} {:?} -> {} bytes (target {}, {})",
            state.iterations,
            frame.width(),
            frame.height(),
            mode,
            probed_size,
            self.request.target_size_bytes,
            if fits { "fits" } else { "over" }
        );

        let candidate = Candidate {
            data,
            probed_size,
            width: frame.width(),
            height: frame.height(),
            scale: state.scale,
            params,
        };

        if fits {
            state.best = Some(candidate);
        } else if state
            .closest
            .as_ref()
            .map_or(true, |closest| probed_size < closest.probed_size)
        {
            state.closest = Some(candidate);
        }

        Ok(fits)
    }

    fn params(&self, mode: EncodeMode) -> EncodeParams {
        EncodeParams::new(self.request.output_format, mode)
            .with_progressive_jpeg(self.request.progressive_jpeg)
            .with_png_optimization(self.request.optimize_png, self.png_effort)
    }

    fn finish(&self, state: SearchState, image: &DynamicImage, label: &'static str) -> Result<SearchOutcome> {
        let SearchState {
            iterations,
            scale_steps,
            best,
            closest,
            floor_reached,
            quality_fixed,
            mut notes,
            ..
        } = state;

        let met_target = best.is_some();
        let chosen = best.or(closest).ok_or_else(|| {
            CompressError::EncodeFailure("Search finished without a trial encode".to_string())
        })?;

        let (source_w, source_h) = (image.width(), image.height());
        let downscaled = chosen.width < source_w || chosen.height < source_h;
        let mut recommendations = Vec::new();

        if let Some(quality) = chosen.params.quality() {
            notes.push(format!("Selected quality {}", quality));
        }

        if downscaled {
            notes.push(format!(
                "Downscaled in {} step(s) to {}x{} ({:.0}% of original width)",
                scale_steps,
                chosen.width,
                chosen.height,
                f64::from(chosen.width) / f64::from(source_w) * 100.0
            ));
        }

        if floor_reached {
            notes.push(format!(
                "Reached the minimum dimension floor of {} px",
                self.config.min_dimension
            ));
        }

        if met_target {
            if let Some(quality) = chosen.params.quality() {
                if quality < 40 {
                    recommendations.push(format!(
                        "Quality dropped to {}; consider a larger target size to reduce visible artifacts",
                        quality
                    ));
                }
            }
            if downscaled {
                recommendations.push(format!(
                    "Image was downscaled to fit; a larger target keeps the original {}x{} dimensions",
                    source_w, source_h
                ));
            }
        } else if !quality_fixed {
            log::warn!(
                "Target of {} bytes unreachable; closest result is {} bytes",
                self.request.target_size_bytes,
                chosen.probed_size
            );
            recommendations.push(format!(
                "Target unreachable within {} iterations (closest {} bytes for a {}-byte target); reduce target size tolerance or allow further downscaling",
                iterations, chosen.probed_size, self.request.target_size_bytes
            ));
            if label == LABEL_LOSSLESS {
                recommendations
                    .push("A lossy or hybrid strategy can reach smaller sizes".to_string());
            }
        }

        Ok(SearchOutcome {
            chosen,
            met_target,
            iterations,
            scale_steps,
            processing_strategy: label,
            notes,
            recommendations,
        })
    }
}
