// pixie-squeeze/src/core/mod.rs
pub mod config;
pub mod processor;
pub mod result;
pub mod search;
pub mod strategy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use config::{EngineConfig, Limits, MetadataProbe, SearchConfig};

/// Bytes per megabyte as used by request sizes and reports.
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Which search path a job may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    #[default]
    Auto,
    Lossy,
    Lossless,
    Hybrid,
}

impl CompressionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionStrategy::Auto => "auto",
            CompressionStrategy::Lossy => "lossy",
            CompressionStrategy::Lossless => "lossless",
            CompressionStrategy::Hybrid => "hybrid",
        }
    }
}

impl FromStr for CompressionStrategy {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(CompressionStrategy::Auto),
            "lossy" => Ok(CompressionStrategy::Lossy),
            "lossless" => Ok(CompressionStrategy::Lossless),
            "hybrid" => Ok(CompressionStrategy::Hybrid),
            other => Err(CompressError::Validation(format!(
                "Unknown compression strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingAlgorithm {
    #[default]
    Lanczos,
    Bicubic,
    Bilinear,
    Nearest,
}

impl FromStr for ResamplingAlgorithm {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lanczos" => Ok(ResamplingAlgorithm::Lanczos),
            "bicubic" => Ok(ResamplingAlgorithm::Bicubic),
            "bilinear" => Ok(ResamplingAlgorithm::Bilinear),
            "nearest" => Ok(ResamplingAlgorithm::Nearest),
            other => Err(CompressError::Validation(format!(
                "Unknown resampling algorithm: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    #[serde(rename = "WEBP")]
    WebP,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WEBP",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Whether the format has a quality axis worth searching.
    pub fn has_quality_axis(self) -> bool {
        !matches!(self, OutputFormat::Png)
    }

    /// Largest width or height the encoder accepts.
    pub fn max_dimension(self) -> u32 {
        match self {
            OutputFormat::Jpeg => 65_500,
            OutputFormat::Png => u32::MAX,
            OutputFormat::WebP => 16_383,
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::WebP => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            other => Err(CompressError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Shared configuration for every image of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRequest {
    pub target_size_bytes: u64,
    pub quality_override: Option<u8>,
    pub output_format: OutputFormat,
    pub maintain_aspect_ratio: bool,
    pub compression_strategy: CompressionStrategy,
    pub preserve_metadata: bool,
    pub resampling_algorithm: ResamplingAlgorithm,
    /// JPEG only.
    pub progressive_jpeg: bool,
    /// PNG only.
    pub optimize_png: bool,
}

impl Default for CompressionRequest {
    fn default() -> Self {
        Self {
            target_size_bytes: BYTES_PER_MB,
            quality_override: None,
            output_format: OutputFormat::Jpeg,
            maintain_aspect_ratio: true,
            compression_strategy: CompressionStrategy::Auto,
            preserve_metadata: false,
            resampling_algorithm: ResamplingAlgorithm::Lanczos,
            progressive_jpeg: true,
            optimize_png: true,
        }
    }
}

impl CompressionRequest {
    pub fn new(target_size_bytes: u64) -> Self {
        Self {
            target_size_bytes,
            ..Default::default()
        }
    }

    pub fn from_megabytes(target_size_mb: f64) -> Self {
        Self::new((target_size_mb * BYTES_PER_MB as f64).round().max(0.0) as u64)
    }

    pub fn target_size_mb(&self) -> f64 {
        self.target_size_bytes as f64 / BYTES_PER_MB as f64
    }

    pub fn validate(&self, limits: &Limits) -> Result<()> {
        if self.target_size_bytes == 0 {
            return Err(CompressError::Validation(
                "Target size must be greater than zero".to_string(),
            ));
        }

        if self.target_size_bytes < limits.min_target_bytes
            || self.target_size_bytes > limits.max_target_bytes
        {
            return Err(CompressError::Validation(format!(
                "Target size must be between {:.2} and {:.2} MB (got {:.3} MB)",
                limits.min_target_bytes as f64 / BYTES_PER_MB as f64,
                limits.max_target_bytes as f64 / BYTES_PER_MB as f64,
                self.target_size_mb()
            )));
        }

        if let Some(quality) = self.quality_override {
            if !(10..=95).contains(&quality) {
                return Err(CompressError::Validation(format!(
                    "Quality must be between 10 and 95 (got {})",
                    quality
                )));
            }
        }

        Ok(())
    }
}

/// Cooperative cancellation shared by every job of a batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CompressError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Target of {target} bytes is below the smallest possible {format} encode ({minimum} bytes)")]
    TargetTooSmall {
        target: u64,
        minimum: u64,
        format: OutputFormat,
    },

    #[error("Memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl CompressError {
    /// Stable identifier for the transport layer.
    pub fn kind(&self) -> &'static str {
        match self {
            CompressError::Validation(_) | CompressError::Config(_) => "validation_error",
            CompressError::UnsupportedFormat(_)
            | CompressError::CorruptInput(_)
            | CompressError::MemoryLimitExceeded(_)
            | CompressError::Image(_) => "decode_error",
            CompressError::EncodeFailure(_)
            | CompressError::InvalidDimensions { .. }
            | CompressError::Metadata(_)
            | CompressError::Io(_) => "encode_failure",
            CompressError::TargetTooSmall { .. } => "target_too_small",
            CompressError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;
