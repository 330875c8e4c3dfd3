// pixie-squeeze/src/core/processor.rs
use super::result::{
    compression_ratio, size_reduction_percentage, CompressionAnalytics, CompressionResult,
};
use super::search::Search;
use super::{CancelFlag, CompressError, CompressionRequest, EngineConfig, Result};
use crate::processors::{Codec, ExtractedMetadata, Loader, MetadataProcessor, Resizer};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

/// Orchestrator states. Only `Searching` iterates internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decoding,
    MetadataExtraction,
    Searching,
    Encoding,
    MetadataReattach,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Decoding => "decoding",
            Stage::MetadataExtraction => "metadata_extraction",
            Stage::Searching => "searching",
            Stage::Encoding => "encoding",
            Stage::MetadataReattach => "metadata_reattach",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-image failure, tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct JobError {
    pub stage: Stage,
    #[source]
    pub source: CompressError,
}

impl JobError {
    pub fn new(stage: Stage, source: CompressError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Fully materialized input for one image.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub filename: String,
    pub data: Vec<u8>,
}

impl ImageJob {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    pub fn from_path(path: &Path, loader: &Loader) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CompressError::Validation(format!("Invalid file name: {}", path.display()))
            })?
            .to_string();

        Ok(Self::new(filename, loader.read_file(path)?))
    }
}

/// Drives one image from raw bytes to a `CompressionResult`.
pub struct ImageProcessor<'a> {
    request: &'a CompressionRequest,
    config: &'a EngineConfig,
    codec: &'a dyn Codec,
    loader: Loader,
    resizer: Resizer,
    metadata_processor: MetadataProcessor,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(request: &'a CompressionRequest, config: &'a EngineConfig, codec: &'a dyn Codec) -> Self {
        let limit = config.limits.max_input_dimension;

        Self {
            request,
            config,
            codec,
            loader: Loader::new().with_max_dimensions(limit, limit),
            resizer: Resizer::new(request.resampling_algorithm),
            metadata_processor: MetadataProcessor::new(),
        }
    }

    pub fn process(
        &self,
        job: &ImageJob,
        cancel: &CancelFlag,
    ) -> std::result::Result<CompressionResult, JobError> {
        let started = Instant::now();
        let name = job.filename.as_str();

        let asset = self.step(Stage::Decoding, name, || {
            cancel.check()?;
            self.loader.load(&job.data, self.codec)
        })?;

        let metadata = self.step(Stage::MetadataExtraction, name, || self.extract_metadata(asset.bytes))?;

        let oriented;
        let image = match metadata.orientation {
            Some(orientation) if orientation > 1 && !self.request.preserve_metadata => {
                log::debug!("{}: applying EXIF orientation {}", name, orientation);
                oriented = MetadataProcessor::apply_orientation(asset.image.clone(), orientation);
                &oriented
            }
            _ => &asset.image,
        };

        let outcome = self.step(Stage::Searching, name, || {
            let search = Search::new(
                self.codec,
                &self.resizer,
                &self.config.search,
                self.request,
                self.config.png_effort,
                cancel,
            );
            if self.request.preserve_metadata {
                search
                    .with_metadata(&self.metadata_processor, &metadata)
                    .run(image)
            } else {
                search.run(image)
            }
        })?;

        let chosen = outcome.chosen;
        let params = chosen.params;
        let encoded = self.step(Stage::Encoding, name, || {
            // Trial encodes are deterministic, so the chosen trial is the final encode.
            if chosen.data.is_empty() {
                return Err(CompressError::EncodeFailure(
                    "Encoder produced no output".to_string(),
                ));
            }
            Ok(chosen.data)
        })?;

        let data = self.step(Stage::MetadataReattach, name, || {
            self.finalize_metadata(encoded, &metadata)
        })?;

        let achieved_size_bytes = data.len() as u64;
        let target_size_bytes = self.request.target_size_bytes;
        let mut recommendations = outcome.recommendations;

        if outcome.met_target && achieved_size_bytes > target_size_bytes {
            log::warn!(
                "{}: reattached metadata pushed output to {} bytes (target {})",
                name,
                achieved_size_bytes,
                target_size_bytes
            );
            recommendations.push(format!(
                "Target unreachable once metadata was reattached ({} bytes); probe metadata on every trial or drop preserved metadata",
                achieved_size_bytes
            ));
        }

        let analytics = CompressionAnalytics {
            algorithm_used: params.algorithm_name(),
            iterations_required: outcome.iterations,
            quality_achieved: params.quality(),
            processing_strategy: outcome.processing_strategy.to_string(),
            size_reduction_percentage: size_reduction_percentage(asset.size_bytes, achieved_size_bytes),
            optimization_notes: outcome.notes,
        };

        log::info!(
            "{}: {} -> {} bytes, {}x{} {} in {} iteration(s) ({}, {:.0?}) [{}]",
            name,
            asset.size_bytes,
            achieved_size_bytes,
            chosen.width,
            chosen.height,
            self.request.output_format,
            analytics.iterations_required,
            analytics.processing_strategy,
            started.elapsed(),
            Stage::Done
        );

        Ok(CompressionResult {
            data,
            width: chosen.width,
            height: chosen.height,
            source_width: asset.width,
            source_height: asset.height,
            format: self.request.output_format,
            original_size_bytes: asset.size_bytes,
            target_size_bytes,
            achieved_size_bytes,
            compression_ratio: compression_ratio(asset.size_bytes, achieved_size_bytes),
            analytics,
            recommendations,
            metadata: self.request.preserve_metadata.then_some(metadata.summary),
        })
    }

    fn step<T>(
        &self,
        stage: Stage,
        name: &str,
        work: impl FnOnce() -> Result<T>,
    ) -> std::result::Result<T, JobError> {
        log::debug!("{}: {}", name, stage);
        work().map_err(|e| {
            log::debug!("{}: {} -> {}", name, stage, Stage::Failed);
            JobError::new(stage, e)
        })
    }

    fn extract_metadata(&self, bytes: &[u8]) -> Result<ExtractedMetadata> {
        match self.metadata_processor.extract(bytes) {
            Ok(metadata) => Ok(metadata),
            Err(e) if !self.request.preserve_metadata => {
                log::warn!("Ignoring unreadable metadata: {}", e);
                Ok(ExtractedMetadata::default())
            }
            Err(e) => Err(e),
        }
    }

    fn finalize_metadata(&self, encoded: Vec<u8>, metadata: &ExtractedMetadata) -> Result<Vec<u8>> {
        if self.request.preserve_metadata && metadata.has_payload() {
            return self.metadata_processor.reattach(&encoded, metadata);
        }

        // Encoders may embed their own profiles; the output carries none unless preserved.
        if self.metadata_processor.extract(&encoded)?.has_payload() {
            return self.metadata_processor.strip(&encoded);
        }

        Ok(encoded)
    }
}
