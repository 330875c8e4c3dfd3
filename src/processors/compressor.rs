// pixie-squeeze/src/processors/compressor.rs
//! Format codec: decoding plus JPEG/PNG/WebP encoding at explicit parameters.
//!
//! | Output | Mode | Encoder |
//! |---|---|---|
//! | JPEG | baseline | `image::codecs::jpeg::JpegEncoder` |
//! | JPEG | progressive | `mozjpeg` (progressive scans, optimized Huffman tables) |
//! | PNG | any | `image` PNG encoder (best deflate), then `oxipng` when optimizing |
//! | WebP | lossy / lossless | libwebp through the `webp` crate |

use crate::core::{CompressError, OutputFormat, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};
use oxipng::{optimize_from_memory, Options, StripChunks};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Lossy { quality: u8 },
    Lossless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub mode: EncodeMode,
    pub progressive_jpeg: bool,
    pub optimize_png: bool,
    /// oxipng preset, 0..=6.
    pub png_effort: u8,
}

impl EncodeParams {
    pub fn new(format: OutputFormat, mode: EncodeMode) -> Self {
        Self {
            format,
            mode,
            progressive_jpeg: false,
            optimize_png: false,
            png_effort: 2,
        }
    }

    pub fn with_mode(mut self, mode: EncodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progressive_jpeg(mut self, progressive: bool) -> Self {
        self.progressive_jpeg = progressive;
        self
    }

    pub fn with_png_optimization(mut self, optimize: bool, effort: u8) -> Self {
        self.optimize_png = optimize;
        self.png_effort = effort.min(6);
        self
    }

    /// Quality that actually reaches the encoder, if the format uses one.
    pub fn quality(&self) -> Option<u8> {
        match (self.format, self.mode) {
            (OutputFormat::Png, _) => None,
            (_, EncodeMode::Lossy { quality }) => Some(quality),
            (_, EncodeMode::Lossless) => None,
        }
    }

    pub fn algorithm_name(&self) -> String {
        match (self.format, self.mode) {
            (OutputFormat::Jpeg, _) if self.progressive_jpeg => "mozjpeg-progressive".to_string(),
            (OutputFormat::Jpeg, _) => "jpeg-baseline".to_string(),
            (OutputFormat::Png, _) if self.optimize_png => format!("oxipng-o{}", self.png_effort),
            (OutputFormat::Png, _) => "png-deflate".to_string(),
            (OutputFormat::WebP, EncodeMode::Lossless) => "libwebp-lossless".to_string(),
            (OutputFormat::WebP, EncodeMode::Lossy { .. }) => "libwebp-lossy".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Encoder/decoder seam used by the search.
///
/// `probe_size` must report exactly what `encode` would produce for the same
/// parameters.
pub trait Codec: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage>;

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>>;

    fn probe_size(&self, image: &DynamicImage, params: &EncodeParams) -> Result<u64> {
        Ok(self.encode(image, params)?.len() as u64)
    }
}

/// Production codec backed by the `image`, `mozjpeg`, `oxipng` and `webp` crates.
#[derive(Debug, Clone, Default)]
pub struct Compressor;

impl Compressor {
    pub fn new() -> Self {
        Self
    }

    fn check_dimensions(&self, image: &DynamicImage, format: OutputFormat) -> Result<()> {
        let (width, height) = (image.width(), image.height());

        if width == 0 || height == 0 {
            return Err(CompressError::InvalidDimensions { width, height });
        }

        let limit = format.max_dimension();
        if width > limit || height > limit {
            return Err(CompressError::EncodeFailure(format!(
                "{}x{} exceeds the {} limit of {} pixels per side",
                width, height, format, limit
            )));
        }

        Ok(())
    }

    fn encode_jpeg(&self, image: &DynamicImage, quality: u8, progressive: bool) -> Result<Vec<u8>> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        if progressive {
            return self.encode_jpeg_progressive(rgb.as_raw(), width, height, quality);
        }

        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| CompressError::EncodeFailure(format!("JPEG encode failed: {}", e)))?;

        Ok(buffer)
    }

    fn encode_jpeg_progressive(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>> {
        // libjpeg reports fatal errors by unwinding out of the C callback.
        let encoded = catch_unwind(AssertUnwindSafe(|| -> std::io::Result<Vec<u8>> {
            let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
            comp.set_size(width as usize, height as usize);
            comp.set_quality(f32::from(quality));
            comp.set_progressive_mode();
            comp.set_optimize_coding(true);

            let mut output = Vec::new();
            {
                let mut writer = comp.start_compress(&mut output)?;
                writer.write_scanlines(pixels)?;
                writer.finish()?;
            }
            Ok(output)
        }))
        .map_err(|_| CompressError::EncodeFailure("mozjpeg aborted while encoding".to_string()))?;

        encoded.map_err(|e| CompressError::EncodeFailure(format!("mozjpeg: {}", e)))
    }

    fn encode_png(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>> {
        // PNG has no float samples
        let converted;
        let image = match image.color() {
            image::ColorType::Rgb32F | image::ColorType::Rgba32F => {
                converted = DynamicImage::ImageRgba16(image.to_rgba16());
                &converted
            }
            _ => image,
        };

        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Best,
            PngFilterType::Adaptive,
        );
        image
            .write_with_encoder(encoder)
            .map_err(|e| CompressError::EncodeFailure(format!("PNG encode failed: {}", e)))?;

        if params.optimize_png {
            return self.optimize_png_bytes(&buffer, params.png_effort);
        }

        Ok(buffer)
    }

    fn optimize_png_bytes(&self, data: &[u8], effort: u8) -> Result<Vec<u8>> {
        let mut options = Options::from_preset(effort);
        options.strip = StripChunks::Safe;

        optimize_from_memory(data, &options)
            .map_err(|e| CompressError::EncodeFailure(format!("PNG optimization failed: {}", e)))
    }

    fn encode_webp(&self, image: &DynamicImage, mode: EncodeMode) -> Result<Vec<u8>> {
        let (lossless, quality) = match mode {
            EncodeMode::Lossless => (true, 100.0),
            EncodeMode::Lossy { quality } => (false, f32::from(quality)),
        };
        let (width, height) = (image.width(), image.height());

        let encoded = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                .encode_simple(lossless, quality)
                .map(|memory| memory.to_vec())
        } else {
            let rgb = image.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                .encode_simple(lossless, quality)
                .map(|memory| memory.to_vec())
        };

        encoded.map_err(|e| CompressError::EncodeFailure(format!("libwebp: {:?}", e)))
    }
}

impl Codec for Compressor {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage> {
        if data.is_empty() {
            return Err(CompressError::CorruptInput("Input is empty".to_string()));
        }

        let format = image::guess_format(data).map_err(|_| {
            CompressError::UnsupportedFormat("Unrecognized image signature".to_string())
        })?;

        if !format.reading_enabled() {
            return Err(CompressError::UnsupportedFormat(format!(
                "No decoder available for {:?}",
                format
            )));
        }

        let image = image::load_from_memory_with_format(data, format).map_err(|e| {
            CompressError::CorruptInput(format!("Failed to decode {:?} image: {}", format, e))
        })?;

        Ok(DecodedImage { image, format })
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>> {
        self.check_dimensions(image, params.format)?;

        log::debug!(
            "Encoding {}x{} as {} ({:?}) with {}",
            image.width(),
            image.height(),
            params.format,
            params.mode,
            params.algorithm_name()
        );

        match (params.format, params.mode) {
            (OutputFormat::Jpeg, EncodeMode::Lossy { quality }) => {
                self.encode_jpeg(image, quality, params.progressive_jpeg)
            }
            (OutputFormat::Jpeg, EncodeMode::Lossless) => Err(CompressError::UnsupportedFormat(
                "JPEG has no lossless mode".to_string(),
            )),
            (OutputFormat::Png, _) => self.encode_png(image, params),
            (OutputFormat::WebP, mode) => self.encode_webp(image, mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{flat_image, noisy_image};

    fn jpeg(quality: u8) -> EncodeParams {
        EncodeParams::new(OutputFormat::Jpeg, EncodeMode::Lossy { quality })
    }

    #[test]
    fn lower_jpeg_quality_is_smaller() {
        let image = noisy_image(96, 64, 7);
        let codec = Compressor::new();

        let high = codec.probe_size(&image, &jpeg(90)).unwrap();
        let low = codec.probe_size(&image, &jpeg(20)).unwrap();
        assert!(low < high, "q20 = {low} bytes, q90 = {high} bytes");
    }

    #[test]
    fn probe_matches_encode() {
        let image = noisy_image(48, 32, 3);
        let codec = Compressor::new();
        let params = jpeg(60);

        let encoded = codec.encode(&image, &params).unwrap();
        assert_eq!(codec.probe_size(&image, &params).unwrap(), encoded.len() as u64);
    }

    #[test]
    fn progressive_jpeg_uses_sof2() {
        let image = noisy_image(64, 48, 11);
        let codec = Compressor::new();
        let data = codec
            .encode(&image, &jpeg(75).with_progressive_jpeg(true))
            .unwrap();

        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert!(data.windows(2).any(|w| w == [0xFF, 0xC2]));

        let decoded = codec.decode(&data).unwrap();
        assert_eq!(decoded.format, ImageFormat::Jpeg);
        assert_eq!(decoded.image.width(), 64);
    }

    #[test]
    fn png_round_trips_pixels() {
        let image = noisy_image(40, 30, 5);
        let codec = Compressor::new();
        let params = EncodeParams::new(OutputFormat::Png, EncodeMode::Lossless)
            .with_png_optimization(true, 2);

        let data = codec.encode(&image, &params).unwrap();
        let decoded = codec.decode(&data).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!(decoded.image.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn png_optimization_never_grows_output() {
        let image = flat_image(120, 80, [200, 30, 30]);
        let codec = Compressor::new();
        let plain = EncodeParams::new(OutputFormat::Png, EncodeMode::Lossless);
        let optimized = plain.with_png_optimization(true, 2);

        let plain_size = codec.probe_size(&image, &plain).unwrap();
        let optimized_size = codec.probe_size(&image, &optimized).unwrap();
        assert!(optimized_size <= plain_size);
    }

    #[test]
    fn webp_lossy_and_lossless_decode() {
        let image = noisy_image(50, 40, 9);
        let codec = Compressor::new();

        for mode in [EncodeMode::Lossy { quality: 50 }, EncodeMode::Lossless] {
            let data = codec
                .encode(&image, &EncodeParams::new(OutputFormat::WebP, mode))
                .unwrap();
            assert_eq!(&data[..4], b"RIFF");
            let decoded = codec.decode(&data).unwrap();
            assert_eq!((decoded.image.width(), decoded.image.height()), (50, 40));
        }
    }

    #[test]
    fn jpeg_rejects_lossless_mode() {
        let codec = Compressor::new();
        let params = EncodeParams::new(OutputFormat::Jpeg, EncodeMode::Lossless);
        let result = codec.encode(&flat_image(8, 8, [0, 0, 0]), &params);
        assert!(matches!(result, Err(CompressError::UnsupportedFormat(_))));
    }

    #[test]
    fn webp_dimension_limit_is_encode_failure() {
        let codec = Compressor::new();
        let image = DynamicImage::new_rgb8(16_384, 1);
        let params = EncodeParams::new(OutputFormat::WebP, EncodeMode::Lossy { quality: 50 });
        assert!(matches!(
            codec.encode(&image, &params),
            Err(CompressError::EncodeFailure(_))
        ));
    }

    #[test]
    fn zero_sized_image_is_invalid() {
        let codec = Compressor::new();
        let image = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            codec.encode(&image, &jpeg(50)),
            Err(CompressError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn decode_classifies_bad_input() {
        let codec = Compressor::new();

        assert!(matches!(
            codec.decode(b"definitely not an image"),
            Err(CompressError::UnsupportedFormat(_))
        ));
        assert!(matches!(codec.decode(&[]), Err(CompressError::CorruptInput(_))));

        let png = codec
            .encode(
                &noisy_image(32, 32, 1),
                &EncodeParams::new(OutputFormat::Png, EncodeMode::Lossless),
            )
            .unwrap();
        assert!(matches!(
            codec.decode(&png[..40]),
            Err(CompressError::CorruptInput(_))
        ));
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(jpeg(50).algorithm_name(), "jpeg-baseline");
        assert_eq!(
            jpeg(50).with_progressive_jpeg(true).algorithm_name(),
            "mozjpeg-progressive"
        );
        assert_eq!(
            EncodeParams::new(OutputFormat::Png, EncodeMode::Lossless)
                .with_png_optimization(true, 4)
                .algorithm_name(),
            "oxipng-o4"
        );
        assert_eq!(
            EncodeParams::new(OutputFormat::WebP, EncodeMode::Lossless).algorithm_name(),
            "libwebp-lossless"
        );
        assert_eq!(
            EncodeParams::new(OutputFormat::Png, EncodeMode::Lossy { quality: 40 }).quality(),
            None
        );
    }
}
