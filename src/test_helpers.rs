// pixie-squeeze/src/test_helpers.rs
//! Shared fixtures for unit tests.
//!
//! `ModelCodec` stands in for the real encoders: its output size is a pure
//! function of dimensions and mode, so search tests can reason about exact
//! probe-size tables without running libjpeg or libwebp.

use crate::core::{CompressError, Result};
use crate::processors::{Codec, DecodedImage, EncodeMode, EncodeParams};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::sync::Mutex;

const MODEL_MAGIC: &[u8] = b"MODEL ";
const MODEL_FILL: u8 = 0xAB;

/// Deterministic high-entropy RGB image.
pub fn noisy_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    DynamicImage::ImageRgb8(image)
}

pub fn flat_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Input bytes the model codec decodes to a `width`x`height` image.
pub fn model_input(width: u32, height: u32, len: usize) -> Vec<u8> {
    let mut data = format!("MODEL {}x{}\n", width, height).into_bytes();
    if data.len() < len {
        data.resize(len, b'.');
    }
    data
}

/// Little-endian TIFF block with orientation and resolution tags.
pub fn tiff_exif(orientation: u16, dpi: u32) -> Vec<u8> {
    fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, value: u32) {
        out.extend(tag.to_le_bytes());
        out.extend(kind.to_le_bytes());
        out.extend(1u32.to_le_bytes());
        out.extend(value.to_le_bytes());
    }

    let entries: u16 = 4;
    let rationals = 8 + 2 + u32::from(entries) * 12 + 4;

    let mut out = b"II*\0".to_vec();
    out.extend(8u32.to_le_bytes());
    out.extend(entries.to_le_bytes());
    entry(&mut out, 0x0112, 3, u32::from(orientation));
    entry(&mut out, 0x011A, 5, rationals);
    entry(&mut out, 0x011B, 5, rationals + 8);
    entry(&mut out, 0x0128, 3, 2);
    out.extend(0u32.to_le_bytes());
    for _ in 0..2 {
        out.extend(dpi.to_le_bytes());
        out.extend(1u32.to_le_bytes());
    }
    out
}

/// Size-model codec. Encoded length is
/// `floor_bytes + pixels * bytes_per_pixel(mode)`, where lossy quality scales
/// the per-pixel cost linearly.
pub struct ModelCodec {
    pub floor_bytes: u64,
    /// Per-pixel cost at quality 100.
    pub lossy_bytes_per_pixel: f64,
    pub lossless_bytes_per_pixel: f64,
    calls: Mutex<Vec<(u32, u32, EncodeMode)>>,
}

impl ModelCodec {
    pub fn new(floor_bytes: u64, lossy_bytes_per_pixel: f64, lossless_bytes_per_pixel: f64) -> Self {
        Self {
            floor_bytes,
            lossy_bytes_per_pixel,
            lossless_bytes_per_pixel,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn size_for(&self, width: u32, height: u32, mode: EncodeMode) -> u64 {
        let pixels = f64::from(width) * f64::from(height);
        let per_pixel = match mode {
            EncodeMode::Lossy { quality } => self.lossy_bytes_per_pixel * f64::from(quality) / 100.0,
            EncodeMode::Lossless => self.lossless_bytes_per_pixel,
        };
        self.floor_bytes + (pixels * per_pixel).round() as u64
    }

    /// Every encode seen so far, in call order.
    pub fn calls(&self) -> Vec<(u32, u32, EncodeMode)> {
        self.calls.lock().unwrap().clone()
    }

    /// Encodes made at the given dimensions.
    pub fn calls_at(&self, width: u32, height: u32) -> Vec<EncodeMode> {
        self.calls()
            .into_iter()
            .filter(|(w, h, _)| *w == width && *h == height)
            .map(|(_, _, mode)| mode)
            .collect()
    }
}

impl Codec for ModelCodec {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage> {
        let corrupt = || CompressError::CorruptInput("Not a model image".to_string());

        let rest = data.strip_prefix(MODEL_MAGIC).ok_or_else(corrupt)?;
        let end = rest.iter().position(|&b| b == b'\n').ok_or_else(corrupt)?;
        let header = std::str::from_utf8(&rest[..end]).map_err(|_| corrupt())?;
        let (w, h) = header.split_once('x').ok_or_else(corrupt)?;
        let width: u32 = w.parse().map_err(|_| corrupt())?;
        let height: u32 = h.parse().map_err(|_| corrupt())?;

        Ok(DecodedImage {
            image: DynamicImage::new_rgb8(width, height),
            format: ImageFormat::Jpeg,
        })
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidDimensions { width, height });
        }

        self.calls.lock().unwrap().push((width, height, params.mode));
        let size = self.size_for(width, height, params.mode);
        Ok(vec![MODEL_FILL; size as usize])
    }
}
