// pixie-squeeze/src/utils/mod.rs
use crate::core::{OutputFormat, BYTES_PER_MB};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

pub fn is_supported_format(path: &Path) -> bool {
    let extensions = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn sanitize_filename(filename: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    filename
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect()
}

pub fn image_format_to_string(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Jpeg => "JPEG",
        image::ImageFormat::Png => "PNG",
        image::ImageFormat::Gif => "GIF",
        image::ImageFormat::WebP => "WebP",
        image::ImageFormat::Pnm => "PNM",
        image::ImageFormat::Tiff => "TIFF",
        image::ImageFormat::Tga => "TGA",
        image::ImageFormat::Bmp => "BMP",
        image::ImageFormat::Ico => "ICO",
        image::ImageFormat::Hdr => "HDR",
        image::ImageFormat::OpenExr => "OpenEXR",
        image::ImageFormat::Avif => "AVIF",
        image::ImageFormat::Qoi => "QOI",
        _ => "Unknown",
    }
    .to_string()
}

/// Expands files and directories into a sorted, de-duplicated list of images.
pub fn collect_image_paths(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();

    for input in inputs {
        if input.is_file() {
            if is_supported_format(input) {
                found.insert(input.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", input.display());
            }
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if is_supported_format(entry.path()) {
                found.insert(entry.into_path());
            }
        }
    }

    found.into_iter().collect()
}

/// `<stem>_compressed.<ext>` for the requested output format.
pub fn output_file_name(input_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");

    format!("{}_compressed.{}", sanitize_filename(stem), format.extension())
}

/// First path in `dir` named after `file_name` that does not exist yet.
pub fn unique_output_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let extension = name.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut counter = 1;
    loop {
        let path = dir.join(format!("{}_{}.{}", stem, counter, extension));
        if !path.exists() {
            return path;
        }
        counter += 1;
    }
}
