// pixie-squeeze/src/core/strategy.rs
use super::{CompressionStrategy, OutputFormat};
use crate::processors::EncodeMode;

/// The search path a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPath {
    /// Quality bisection, then scale fallback.
    Lossy,
    /// Strongest lossless pass, then lossless scale fallback.
    Lossless,
    /// One lossless attempt, then the lossy path.
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPlan {
    pub path: SearchPath,
    pub format: OutputFormat,
    pub requested: CompressionStrategy,
    /// False when the format ignores quality; lossy steps reduce to scaling.
    pub quality_axis: bool,
}

impl SearchPlan {
    /// Mode of the single lossless attempt. JPEG has no lossless mode and
    /// uses its best quality instead.
    pub fn lossless_mode(&self, max_quality: u8) -> EncodeMode {
        match self.format {
            OutputFormat::Jpeg => EncodeMode::Lossy {
                quality: max_quality,
            },
            OutputFormat::Png | OutputFormat::WebP => EncodeMode::Lossless,
        }
    }

    /// Whether the lossy bisection is reachable on this plan.
    pub fn runs_bisection(&self) -> bool {
        self.quality_axis && self.path != SearchPath::Lossless
    }
}

pub fn select(strategy: CompressionStrategy, format: OutputFormat) -> SearchPlan {
    let path = match (strategy, format) {
        (CompressionStrategy::Auto, OutputFormat::Png) => SearchPath::Hybrid,
        (CompressionStrategy::Auto, _) => SearchPath::Lossy,
        (CompressionStrategy::Lossy, _) => SearchPath::Lossy,
        (CompressionStrategy::Lossless, _) => SearchPath::Lossless,
        (CompressionStrategy::Hybrid, _) => SearchPath::Hybrid,
    };

    SearchPlan {
        path,
        format,
        requested: strategy,
        quality_axis: format.has_quality_axis(),
    }
}

pub const LABEL_LOSSY: &str = "lossy";
pub const LABEL_LOSSLESS: &str = "lossless";
pub const LABEL_HYBRID_LOSSLESS: &str = "hybrid-lossless";
pub const LABEL_HYBRID_FALLBACK: &str = "hybrid-lossy-fallback";
