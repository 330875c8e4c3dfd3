// pixie-squeeze/src/processors/loader.rs
use super::compressor::Codec;
use crate::core::{CompressError, Result};
use crate::utils::image_format_to_string;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Decoded input. Read-only for the rest of the job.
#[derive(Debug)]
pub struct ImageAsset<'a> {
    pub bytes: &'a [u8],
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
}

impl ImageAsset<'_> {
    pub fn format_name(&self) -> String {
        image_format_to_string(self.format)
    }
}

#[derive(Debug, Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((100_000, 100_000)),
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn load<'a>(&self, bytes: &'a [u8], codec: &dyn Codec) -> Result<ImageAsset<'a>> {
        let decoded = codec.decode(bytes)?;
        let (width, height) = (decoded.image.width(), decoded.image.height());

        if width == 0 || height == 0 {
            return Err(CompressError::InvalidDimensions { width, height });
        }

        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(CompressError::MemoryLimitExceeded(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }

        log::debug!(
            "Loaded image: {}x{} pixels, {}, {} bytes",
            width,
            height,
            image_format_to_string(decoded.format),
            bytes.len()
        );

        Ok(ImageAsset {
            bytes,
            image: decoded.image,
            width,
            height,
            format: decoded.format,
            size_bytes: bytes.len() as u64,
        })
    }

    /// Reads a whole input file so jobs never touch the filesystem.
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.validate_path(path)?;
        log::debug!("Reading image from: {}", path.display());
        Ok(std::fs::read(path)?)
    }

    fn validate_path(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(CompressError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        let metadata = path.metadata()?;
        if metadata.len() == 0 {
            return Err(CompressError::Validation(format!(
                "File is empty: {}",
                path.display()
            )));
        }

        Ok(())
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{model_input, ModelCodec};

    #[test]
    fn builds_asset_from_bytes() {
        let codec = ModelCodec::new(100, 1.0, 2.0);
        let bytes = model_input(64, 48, 5000);
        let asset = Loader::new().load(&bytes, &codec).unwrap();

        assert_eq!((asset.width, asset.height), (64, 48));
        assert_eq!(asset.size_bytes, 5000);
        assert_eq!(asset.format_name(), "JPEG");
    }

    #[test]
    fn rejects_oversized_source() {
        let codec = ModelCodec::new(100, 1.0, 2.0);
        let bytes = model_input(300, 20, 100);
        let result = Loader::new().with_max_dimensions(256, 256).load(&bytes, &codec);
        assert!(matches!(result, Err(CompressError::MemoryLimitExceeded(_))));
    }

    #[test]
    fn corrupt_bytes_propagate_decode_error() {
        let codec = ModelCodec::new(100, 1.0, 2.0);
        let result = Loader::new().load(b"garbage", &codec);
        assert!(matches!(result, Err(CompressError::CorruptInput(_))));
    }

    #[test]
    fn read_file_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new();

        assert!(loader.read_file(&dir.path().join("missing.png")).is_err());

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            loader.read_file(&empty),
            Err(CompressError::Validation(_))
        ));
    }
}
