// pixie-squeeze/src/processors/mod.rs
mod batch;
mod compressor;
mod loader;
mod metadata;
mod resizer;

pub use batch::BatchProcessor;
pub use compressor::{Codec, Compressor, DecodedImage, EncodeMode, EncodeParams};
pub use loader::{ImageAsset, Loader};
pub use metadata::{ExtractedMetadata, ImageMetadata, MetadataProcessor};
pub use resizer::Resizer;
