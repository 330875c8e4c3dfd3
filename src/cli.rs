// pixie-squeeze/src/cli.rs
use crate::core::{CompressionRequest, CompressionStrategy, OutputFormat, ResamplingAlgorithm, BYTES_PER_MB};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pixie-squeeze")]
#[command(about = "Compress images to fit a target file size")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress images until each one fits the target size
    Compress {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target size per image in megabytes
        #[arg(short, long, default_value_t = 1.0)]
        target_mb: f64,

        /// Fixed quality (10-95); skips the quality search
        #[arg(short, long)]
        quality: Option<u8>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Jpeg)]
        format: Format,

        /// Compression strategy
        #[arg(short, long, value_enum, default_value_t = Strategy::Auto)]
        strategy: Strategy,

        /// Resampling algorithm used when downscaling
        #[arg(short, long, value_enum, default_value_t = Algorithm::Lanczos)]
        algorithm: Algorithm,

        /// Keep EXIF and ICC data in the output
        #[arg(long)]
        preserve_metadata: bool,

        /// Allow width and height to shrink independently
        #[arg(long)]
        no_aspect_lock: bool,

        /// Write baseline instead of progressive JPEG
        #[arg(long)]
        baseline: bool,

        /// Skip the oxipng pass for PNG output
        #[arg(long)]
        no_optimize_png: bool,

        /// Output directory
        #[arg(short, long = "output-dir", default_value = "compressed")]
        output: PathBuf,

        /// Write a JSON report of the run
        #[arg(long)]
        report: Option<PathBuf>,

        /// Engine configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of worker threads (0 = auto)
        #[arg(long, default_value_t = 0)]
        threads: usize,

        /// Process directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Display image information and metadata
    Info {
        /// Input image file
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Jpeg,
    Png,
    Webp,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Auto,
    Lossy,
    Lossless,
    Hybrid,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jpeg => OutputFormat::Jpeg,
            Format::Png => OutputFormat::Png,
            Format::Webp => OutputFormat::WebP,
        }
    }
}

impl From<Strategy> for CompressionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Auto => CompressionStrategy::Auto,
            Strategy::Lossy => CompressionStrategy::Lossy,
            Strategy::Lossless => CompressionStrategy::Lossless,
            Strategy::Hybrid => CompressionStrategy::Hybrid,
        }
    }
}

impl From<Algorithm> for ResamplingAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Nearest => ResamplingAlgorithm::Nearest,
            Algorithm::Bilinear => ResamplingAlgorithm::Bilinear,
            Algorithm::Bicubic => ResamplingAlgorithm::Bicubic,
            Algorithm::Lanczos => ResamplingAlgorithm::Lanczos,
        }
    }
}

/// Request-shaping flags of `compress`.
#[derive(Debug, Clone, Copy)]
pub struct RequestFlags {
    pub target_mb: f64,
    pub quality: Option<u8>,
    pub format: Format,
    pub strategy: Strategy,
    pub algorithm: Algorithm,
    pub preserve_metadata: bool,
    pub no_aspect_lock: bool,
    pub baseline: bool,
    pub no_optimize_png: bool,
}

impl From<RequestFlags> for CompressionRequest {
    fn from(flags: RequestFlags) -> Self {
        CompressionRequest {
            target_size_bytes: (flags.target_mb * BYTES_PER_MB as f64).round().max(0.0) as u64,
            quality_override: flags.quality,
            output_format: flags.format.into(),
            maintain_aspect_ratio: !flags.no_aspect_lock,
            compression_strategy: flags.strategy.into(),
            preserve_metadata: flags.preserve_metadata,
            resampling_algorithm: flags.algorithm.into(),
            progressive_jpeg: !flags.baseline,
            optimize_png: !flags.no_optimize_png,
        }
    }
}
