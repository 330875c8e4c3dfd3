pub mod cli;
pub mod core;
pub mod processors;
pub mod report;
pub mod utils;

#[cfg(test)]
mod test_helpers;

pub use crate::core::processor::{ImageJob, ImageProcessor, JobError, Stage};
pub use crate::core::result::{
    BatchAnalytics, BatchResult, CompressionAnalytics, CompressionResult, ImageOutcome,
    UNREACHABLE_MARKER,
};
pub use crate::core::{
    CancelFlag, CompressError, CompressionRequest, CompressionStrategy, EngineConfig, Limits,
    MetadataProbe, OutputFormat, ResamplingAlgorithm, Result, SearchConfig, BYTES_PER_MB,
};
pub use processors::{
    BatchProcessor, Codec, Compressor, EncodeMode, EncodeParams, ExtractedMetadata, ImageMetadata,
    Loader, MetadataProcessor, Resizer,
};
pub use report::ProcessImageResponse;
pub use utils::{format_file_size, is_supported_format};

pub mod prelude {
    pub use crate::{
        BatchProcessor, CompressionRequest, CompressionStrategy, EngineConfig, ImageJob,
        OutputFormat, ProcessImageResponse,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
