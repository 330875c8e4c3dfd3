#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use pixie_squeeze::{
        BatchProcessor, CompressionRequest, CompressionStrategy, EngineConfig, ExtractedMetadata,
        ImageJob, Loader, MetadataProcessor, OutputFormat, ProcessImageResponse, BYTES_PER_MB,
    };
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 64;
            Rgb([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                (noise * 4) as u8,
            ])
        }))
    }

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    /// Limits loose enough for small synthetic fixtures.
    fn small_target_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.limits.min_target_bytes = 1_000;
        config
    }

    fn job_from_file(dir: &TempDir, name: &str, data: &[u8]) -> ImageJob {
        let file = dir.child(name);
        file.write_binary(data).unwrap();
        ImageJob::from_path(file.path(), &Loader::new()).unwrap()
    }

    #[test]
    fn batch_with_corrupt_middle_image_keeps_siblings() {
        let dir = TempDir::new().unwrap();
        let jobs = vec![
            job_from_file(&dir, "first.png", &encode(&gradient(120, 90), ImageFormat::Png)),
            job_from_file(&dir, "broken.jpg", b"\xFF\xD8\xFF\xE0 truncated"),
            job_from_file(&dir, "third.png", &encode(&gradient(100, 100), ImageFormat::Png)),
        ];

        let batch = BatchProcessor::new(CompressionRequest::new(8_000), small_target_config())
            .unwrap()
            .process(&jobs)
            .unwrap();

        assert!(!batch.success);
        assert!(batch.outcomes[0].is_success());
        assert!(!batch.outcomes[1].is_success());
        assert!(batch.outcomes[2].is_success());

        for index in [0, 2] {
            let result = batch.outcomes[index].result.as_ref().unwrap();
            assert!(result.meets_target() || result.is_unreachable());
            assert_eq!(&result.data[..2], &[0xFF, 0xD8]);
        }

        let response = ProcessImageResponse::from_batch(&batch);
        assert_eq!(response.processed_files.len(), 3);
        assert!(response.processed_files[1].is_empty());
        assert!(response.images[1].error.is_some());
    }

    #[test]
    fn hybrid_png_that_fits_losslessly_takes_one_iteration() {
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 150, Rgb([40, 120, 200])));
        let jobs = vec![ImageJob::new("flat.png", encode(&flat, ImageFormat::Png))];
        let request = CompressionRequest {
            output_format: OutputFormat::Png,
            compression_strategy: CompressionStrategy::Hybrid,
            ..CompressionRequest::from_megabytes(0.5)
        };

        let batch = BatchProcessor::new(request, EngineConfig::default())
            .unwrap()
            .process(&jobs)
            .unwrap();
        let result = batch.outcomes[0].result.as_ref().unwrap();

        assert_eq!(result.analytics.processing_strategy, "hybrid-lossless");
        assert_eq!(result.analytics.iterations_required, 1);
        assert_eq!(result.analytics.quality_achieved, None);
        assert!(result.meets_target());

        let decoded = image::load_from_memory(&result.data).unwrap();
        assert_eq!(decoded.to_rgb8(), flat.to_rgb8());
    }

    #[test]
    fn jpeg_lossy_search_respects_budget_and_bounds() {
        let source = encode(&gradient(640, 480), ImageFormat::Png);
        let target = 20_000;
        let request = CompressionRequest::new(target);

        let batch = BatchProcessor::new(request, small_target_config())
            .unwrap()
            .process(&[ImageJob::new("photo.png", source)])
            .unwrap();
        let result = batch.outcomes[0].result.as_ref().unwrap();

        assert_eq!(result.analytics.processing_strategy, "lossy");
        assert!(result.analytics.iterations_required <= 8);
        if result.meets_target() {
            let quality = result.analytics.quality_achieved.unwrap();
            assert!((10..=95).contains(&quality));
        } else {
            assert!(result.is_unreachable());
        }
        assert_eq!(result.achieved_size_bytes, result.data.len() as u64);
        assert_eq!(result.analytics.algorithm_used, "mozjpeg-progressive");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let source = encode(&gradient(320, 240), ImageFormat::Png);
        let run = || {
            let request = CompressionRequest {
                output_format: OutputFormat::WebP,
                ..CompressionRequest::new(6_000)
            };
            let batch = BatchProcessor::new(request, small_target_config())
                .unwrap()
                .process(&[ImageJob::new("a.png", source.clone())])
                .unwrap();
            let result = batch.outcomes[0].result.as_ref().unwrap();
            (
                result.analytics.quality_achieved,
                result.analytics.iterations_required,
                result.achieved_size_bytes,
            )
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn tiny_target_engages_scale_fallback() {
        let source = encode(&gradient(800, 600), ImageFormat::Png);
        let request = CompressionRequest {
            output_format: OutputFormat::WebP,
            resampling_algorithm: pixie_squeeze::ResamplingAlgorithm::Nearest,
            ..CompressionRequest::new(1_000)
        };

        let batch = BatchProcessor::new(request, small_target_config())
            .unwrap()
            .process(&[ImageJob::new("big.png", source)])
            .unwrap();
        let result = batch.outcomes[0].result.as_ref().unwrap();

        assert!(result.was_downscaled());
        assert!(result.width < 800 && result.height < 600);
        assert!(result.meets_target() || result.is_unreachable());
    }

    #[test]
    fn preserved_exif_survives_to_output_file() {
        let dir = TempDir::new().unwrap();
        // Little-endian TIFF with a single Orientation = 6 entry.
        let tiff: Vec<u8> = vec![
            0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x12, 0x01, 0x03, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let metadata = ExtractedMetadata {
            exif: Some(tiff),
            ..Default::default()
        };
        let plain = encode(&gradient(96, 64), ImageFormat::Png);
        let tagged = MetadataProcessor::new().reattach(&plain, &metadata).unwrap();
        let job = job_from_file(&dir, "tagged.png", &tagged);

        let request = CompressionRequest {
            preserve_metadata: true,
            ..CompressionRequest::from_megabytes(0.2)
        };
        let batch = BatchProcessor::new(request, EngineConfig::default())
            .unwrap()
            .process(&[job])
            .unwrap();
        let result = batch.outcomes[0].result.as_ref().unwrap();

        let output = dir.child("tagged_compressed.jpg");
        output.write_binary(&result.data).unwrap();
        assert!(output.path().exists());

        let written = std::fs::read(output.path()).unwrap();
        let extracted = MetadataProcessor::new().extract(&written).unwrap();
        assert_eq!(extracted.orientation, Some(6));
        assert_eq!((result.width, result.height), (96, 64));

        let summary = result.metadata.as_ref().unwrap();
        assert!(summary.exif_data.as_ref().unwrap().contains_key("Orientation"));
        assert_eq!(summary.format_specific.as_ref().unwrap()["container"], "png");
    }

    #[test]
    fn request_outside_limits_is_rejected() {
        let jobs = vec![ImageJob::new("a.png", encode(&gradient(8, 8), ImageFormat::Png))];
        let request = CompressionRequest::new(51 * BYTES_PER_MB);

        let result = BatchProcessor::new(request, EngineConfig::default())
            .unwrap()
            .process(&jobs);
        assert!(result.is_err());
    }
}
