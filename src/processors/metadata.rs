// pixie-squeeze/src/processors/metadata.rs
use crate::core::{CompressError, Result};
use exif::{Exif, In, Reader, Tag, Value};
use image::DynamicImage;
use img_parts::{Bytes, DynImage, ImageEXIF, ImageICC};
use serde::Serialize;
use std::collections::BTreeMap;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const MAX_VALUE_LEN: usize = 256;

/// Metadata summary reported alongside a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub exif_data: Option<BTreeMap<String, String>>,
    pub color_profile: Option<String>,
    pub dpi: Option<(f64, f64)>,
    pub format_specific: Option<BTreeMap<String, String>>,
}

/// Everything pulled out of a source container, raw payloads included.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    /// TIFF-structured EXIF block without the JPEG `Exif\0\0` prefix.
    pub exif: Option<Vec<u8>>,
    pub icc_profile: Option<Vec<u8>>,
    pub orientation: Option<u32>,
    pub summary: ImageMetadata,
}

impl ExtractedMetadata {
    /// Whether anything would be written back into an output container.
    pub fn has_payload(&self) -> bool {
        self.exif.is_some() || self.icc_profile.is_some()
    }
}

pub struct MetadataProcessor;

impl MetadataProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, data: &[u8]) -> Result<ExtractedMetadata> {
        let mut extracted = ExtractedMetadata::default();
        let mut dpi = container_dpi(data);

        if let Some(container) = self.parse(data)? {
            extracted.exif = container
                .exif()
                .map(|raw| strip_exif_prefix(&raw).to_vec())
                .filter(|raw| !raw.is_empty());
            extracted.icc_profile = container.icc_profile().map(|icc| icc.to_vec());
        }

        if let Some(raw) = &extracted.exif {
            match Reader::new().read_raw(raw.clone()) {
                Ok(exif) => {
                    log::debug!("Found {} EXIF fields", exif.fields().count());
                    extracted.orientation = exif
                        .get_field(Tag::Orientation, In::PRIMARY)
                        .and_then(|f| f.value.get_uint(0));
                    if let Some(resolution) = exif_resolution(&exif) {
                        dpi = Some(resolution);
                    }
                    extracted.summary.exif_data = Some(self.extract_fields(&exif));
                }
                Err(e) => log::warn!("Failed to parse EXIF block: {}", e),
            }
        }

        extracted.summary.color_profile =
            extracted.icc_profile.as_deref().map(describe_icc_profile);
        extracted.summary.dpi = dpi;

        let format_specific = container_fields(data);
        if !format_specific.is_empty() {
            extracted.summary.format_specific = Some(format_specific);
        }

        Ok(extracted)
    }

    /// Removes EXIF and ICC payloads. Unrecognized containers pass through.
    pub fn strip(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.parse(data)? {
            Some(mut container) => {
                container.set_exif(None);
                container.set_icc_profile(None);
                self.write(container)
            }
            None => {
                log::debug!("No recognized container, nothing to strip");
                Ok(data.to_vec())
            }
        }
    }

    pub fn reattach(&self, data: &[u8], metadata: &ExtractedMetadata) -> Result<Vec<u8>> {
        if !metadata.has_payload() {
            return Ok(data.to_vec());
        }

        let mut container = self.parse(data)?.ok_or_else(|| {
            CompressError::Metadata(
                "Cannot attach metadata to an unrecognized container".to_string(),
            )
        })?;

        if let Some(exif) = &metadata.exif {
            container.set_exif(Some(Bytes::from(exif.clone())));
        }
        if let Some(icc) = &metadata.icc_profile {
            container.set_icc_profile(Some(Bytes::from(icc.clone())));
        }

        self.write(container)
    }

    /// Bytes added to `data` by reattaching `metadata`.
    pub fn overhead(&self, data: &[u8], metadata: &ExtractedMetadata) -> Result<u64> {
        let attached = self.reattach(data, metadata)?;
        Ok((attached.len() as u64).saturating_sub(data.len() as u64))
    }

    /// Bakes an EXIF orientation into the pixels.
    pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
        match orientation {
            2 => image.fliph(),
            3 => image.rotate180(),
            4 => image.flipv(),
            5 => image.rotate90().fliph(),
            6 => image.rotate90(),
            7 => image.rotate270().fliph(),
            8 => image.rotate270(),
            _ => image,
        }
    }

    fn parse(&self, data: &[u8]) -> Result<Option<DynImage>> {
        DynImage::from_bytes(Bytes::copy_from_slice(data))
            .map_err(|e| CompressError::Metadata(format!("Failed to parse container: {}", e)))
    }

    fn write(&self, container: DynImage) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        container
            .encoder()
            .write_to(&mut output)
            .map_err(|e| CompressError::Metadata(format!("Failed to write container: {}", e)))?;
        Ok(output)
    }

    fn extract_fields(&self, exif: &Exif) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();

        for field in exif.fields() {
            if field.ifd_num != In::PRIMARY || field.tag == Tag::MakerNote {
                continue;
            }

            let mut value = field.display_value().with_unit(exif).to_string();
            if value.len() > MAX_VALUE_LEN {
                let cut = (0..=MAX_VALUE_LEN)
                    .rev()
                    .find(|&i| value.is_char_boundary(i))
                    .unwrap_or(0);
                value.truncate(cut);
            }
            fields.insert(field.tag.to_string(), value);
        }

        fields
    }
}

impl Default for MetadataProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_exif_prefix(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(EXIF_PREFIX).unwrap_or(raw)
}

fn exif_rational(exif: &Exif, tag: Tag) -> Option<f64> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    }
}

fn exif_resolution(exif: &Exif) -> Option<(f64, f64)> {
    let x = exif_rational(exif, Tag::XResolution)?;
    let y = exif_rational(exif, Tag::YResolution).unwrap_or(x);
    let unit = exif
        .get_field(Tag::ResolutionUnit, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(2);

    match unit {
        2 => Some((x, y)),
        3 => Some((x * 2.54, y * 2.54)),
        _ => None,
    }
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// JPEG segments up to the first scan, as (marker, contents).
fn jpeg_segments(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut segments = Vec::new();
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            0xFF => pos -= 1,
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 => break,
            _ => {
                let Some(length) = be_u16(data, pos) else { break };
                let length = length as usize;
                if length < 2 {
                    break;
                }
                let Some(contents) = data.get(pos + 2..pos + length) else { break };
                segments.push((marker, contents));
                pos += length;
                if marker == 0xDA {
                    break;
                }
            }
        }
    }

    segments
}

fn png_chunks(data: &[u8]) -> Vec<([u8; 4], &[u8])> {
    let mut chunks = Vec::new();
    let mut pos = PNG_SIGNATURE.len();

    while let Some(length) = be_u32(data, pos) {
        let start = pos + 8;
        let Some(kind) = data.get(pos + 4..start) else { break };
        let Some(contents) = data.get(start..start + length as usize) else { break };
        let kind = [kind[0], kind[1], kind[2], kind[3]];
        chunks.push((kind, contents));
        if &kind == b"IEND" {
            break;
        }
        pos = start + length as usize + 4;
    }

    chunks
}

fn riff_chunk_ids(data: &[u8]) -> Vec<[u8; 4]> {
    let mut ids = Vec::new();
    let mut pos = 12;

    while let Some(size) = le_u32(data, pos + 4) {
        let Some(id) = data.get(pos..pos + 4) else { break };
        ids.push([id[0], id[1], id[2], id[3]]);
        let size = size as usize;
        pos += 8 + size + (size & 1);
    }

    ids
}

fn is_webp(data: &[u8]) -> bool {
    data.len() >= 16 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

fn container_fields(data: &[u8]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if data.starts_with(&[0xFF, 0xD8]) {
        let segments = jpeg_segments(data);
        let progressive = segments.iter().any(|(marker, _)| *marker == 0xC2);
        let jfif = segments
            .iter()
            .any(|(marker, contents)| *marker == 0xE0 && contents.starts_with(b"JFIF\0"));
        fields.insert("container".to_string(), "jpeg".to_string());
        fields.insert("progressive".to_string(), progressive.to_string());
        fields.insert("jfif".to_string(), jfif.to_string());
    } else if data.starts_with(PNG_SIGNATURE) {
        let chunks = png_chunks(data);
        fields.insert("container".to_string(), "png".to_string());
        if let Some((_, ihdr)) = chunks.iter().find(|(kind, _)| kind == b"IHDR") {
            if ihdr.len() >= 13 {
                let color_type = match ihdr[9] {
                    0 => "grayscale",
                    2 => "rgb",
                    3 => "indexed",
                    4 => "grayscale-alpha",
                    6 => "rgba",
                    _ => "unknown",
                };
                fields.insert("bit_depth".to_string(), ihdr[8].to_string());
                fields.insert("color_type".to_string(), color_type.to_string());
                fields.insert("interlaced".to_string(), (ihdr[12] == 1).to_string());
            }
        }
        let animated = chunks.iter().any(|(kind, _)| kind == b"acTL");
        fields.insert("animated".to_string(), animated.to_string());
    } else if is_webp(data) {
        let ids = riff_chunk_ids(data);
        let has = |id: &[u8; 4]| ids.iter().any(|candidate| candidate == id);
        let encoding = if has(b"VP8L") {
            "lossless"
        } else if has(b"VP8 ") {
            "lossy"
        } else {
            "unknown"
        };
        fields.insert("container".to_string(), "webp".to_string());
        fields.insert("encoding".to_string(), encoding.to_string());
        fields.insert("extended".to_string(), has(b"VP8X").to_string());
        fields.insert("alpha_chunk".to_string(), has(b"ALPH").to_string());
        fields.insert("animated".to_string(), has(b"ANIM").to_string());
    }

    fields
}

/// Density declared by the container itself (JFIF or pHYs).
fn container_dpi(data: &[u8]) -> Option<(f64, f64)> {
    if data.starts_with(&[0xFF, 0xD8]) {
        let (_, app0) = jpeg_segments(data)
            .into_iter()
            .find(|(marker, contents)| *marker == 0xE0 && contents.starts_with(b"JFIF\0"))?;
        let unit = *app0.get(7)?;
        let x = f64::from(be_u16(app0, 8)?);
        let y = f64::from(be_u16(app0, 10)?);
        return match unit {
            1 => Some((x, y)),
            2 => Some((x * 2.54, y * 2.54)),
            _ => None,
        };
    }

    if data.starts_with(PNG_SIGNATURE) {
        let (_, phys) = png_chunks(data)
            .into_iter()
            .find(|(kind, _)| kind == b"pHYs")?;
        if *phys.get(8)? != 1 {
            return None;
        }
        let x = f64::from(be_u32(phys, 0)?) * 0.0254;
        let y = f64::from(be_u32(phys, 4)?) * 0.0254;
        return Some((x.round(), y.round()));
    }

    None
}

fn describe_icc_profile(icc: &[u8]) -> String {
    if let Some(description) = icc_description(icc) {
        return description;
    }

    let space = icc
        .get(16..20)
        .map(|s| {
            String::from_utf8_lossy(s)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        })
        .unwrap_or_default();
    if space.is_empty() {
        format!("ICC profile ({} bytes)", icc.len())
    } else {
        format!("ICC {} profile ({} bytes)", space, icc.len())
    }
}

fn icc_description(icc: &[u8]) -> Option<String> {
    let count = be_u32(icc, 128)? as usize;

    for index in 0..count.min(256) {
        let entry = 132 + index * 12;
        if icc.get(entry..entry + 4)? != b"desc" {
            continue;
        }
        let offset = be_u32(icc, entry + 4)? as usize;
        let size = be_u32(icc, entry + 8)? as usize;
        let tag = icc.get(offset..offset.checked_add(size)?)?;
        return parse_desc_tag(tag);
    }

    None
}

fn parse_desc_tag(tag: &[u8]) -> Option<String> {
    let text = match tag.get(0..4)? {
        b"desc" => {
            let length = be_u32(tag, 8)? as usize;
            let raw = tag.get(12..12 + length)?;
            String::from_utf8_lossy(raw).to_string()
        }
        b"mluc" => {
            if be_u32(tag, 8)? == 0 {
                return None;
            }
            let length = be_u32(tag, 20)? as usize;
            let offset = be_u32(tag, 24)? as usize;
            let raw = tag.get(offset..offset + length)?;
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => return None,
    };

    let text = text.trim_end_matches('\0').trim().to_string();
    (!text.is_empty()).then_some(text)
}
