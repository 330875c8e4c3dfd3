// pixie-squeeze/src/processors/resizer.rs
use crate::core::{CompressError, ResamplingAlgorithm, Result};
use image::{imageops::FilterType, DynamicImage};

/// Pure resampling filter. Callers decide the target dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Resizer {
    algorithm: ResamplingAlgorithm,
}

impl Resizer {
    pub fn new(algorithm: ResamplingAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> ResamplingAlgorithm {
        self.algorithm
    }

    pub fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidDimensions { width, height });
        }

        if width == image.width() && height == image.height() {
            log::debug!("Image dimensions unchanged, skipping resize");
            return Ok(image.clone());
        }

        log::debug!(
            "Resizing image from {}x{} to {}x{} ({:?})",
            image.width(),
            image.height(),
            width,
            height,
            self.algorithm
        );

        Ok(image.resize_exact(width, height, self.filter_type()))
    }

    fn filter_type(&self) -> FilterType {
        match self.algorithm {
            ResamplingAlgorithm::Nearest => FilterType::Nearest,
            ResamplingAlgorithm::Bilinear => FilterType::Triangle,
            ResamplingAlgorithm::Bicubic => FilterType::CatmullRom,
            ResamplingAlgorithm::Lanczos => FilterType::Lanczos3,
        }
    }
}
