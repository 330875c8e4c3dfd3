use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use pixie_squeeze::cli::{Cli, Commands, RequestFlags};
use pixie_squeeze::utils::{collect_image_paths, format_file_size, output_file_name, unique_output_path};
use pixie_squeeze::{
    BatchProcessor, CompressionRequest, Compressor, EngineConfig, ImageJob, Loader,
    MetadataProcessor, ProcessImageResponse,
};
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match cli.command {
        Commands::Compress {
            inputs,
            target_mb,
            quality,
            format,
            strategy,
            algorithm,
            preserve_metadata,
            no_aspect_lock,
            baseline,
            no_optimize_png,
            output,
            report,
            config,
            threads,
            recursive,
            progress,
        } => {
            let request = CompressionRequest::from(RequestFlags {
                target_mb,
                quality,
                format,
                strategy,
                algorithm,
                preserve_metadata,
                no_aspect_lock,
                baseline,
                no_optimize_png,
            });

            let mut engine = match config {
                Some(path) => EngineConfig::from_toml_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            if threads > 0 {
                engine.concurrency = Some(threads);
            }

            let all_succeeded = process_compress(
                &inputs,
                recursive,
                request,
                engine,
                &output,
                report.as_deref(),
                progress,
            )?;

            if !all_succeeded {
                std::process::exit(2);
            }
        }
        Commands::Info { input } => {
            process_info(&input)?;
        }
    }

    Ok(())
}

fn process_compress(
    inputs: &[PathBuf],
    recursive: bool,
    request: CompressionRequest,
    engine: EngineConfig,
    output_dir: &Path,
    report_path: Option<&Path>,
    progress: bool,
) -> anyhow::Result<bool> {
    let paths = collect_image_paths(inputs, recursive);
    if paths.is_empty() {
        bail!("No supported images found in the given inputs");
    }

    let chunk_size = engine.limits.max_batch_size;
    let format = request.output_format;
    let processor = BatchProcessor::new(request, engine)?.with_progress(progress);
    let loader = Loader::new();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut responses = Vec::new();
    let mut all_succeeded = true;

    for chunk in paths.chunks(chunk_size) {
        let jobs = chunk
            .iter()
            .map(|path| ImageJob::from_path(path, &loader))
            .collect::<Result<Vec<_>, _>>()?;

        let batch = processor.process(&jobs)?;
        all_succeeded &= batch.success;

        for outcome in &batch.outcomes {
            match &outcome.result {
                Ok(result) => {
                    let path = unique_output_path(output_dir, &output_file_name(&outcome.filename, format));
                    std::fs::write(&path, &result.data)
                        .with_context(|| format!("Failed to write {}", path.display()))?;

                    println!(
                        "{} -> {} ({} -> {}, {}x{}, {} iteration(s), {})",
                        outcome.filename,
                        path.display(),
                        format_file_size(result.original_size_bytes),
                        format_file_size(result.achieved_size_bytes),
                        result.width,
                        result.height,
                        result.analytics.iterations_required,
                        result.analytics.processing_strategy
                    );
                    for recommendation in &result.recommendations {
                        println!("  note: {}", recommendation);
                    }
                }
                Err(e) => eprintln!("{}: {}", outcome.filename, e),
            }
        }

        println!("{}", batch.message());
        responses.push(ProcessImageResponse::from_batch(&batch));
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&responses)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to: {}", path.display());
    }

    Ok(all_succeeded)
}

fn process_info(input: &Path) -> anyhow::Result<()> {
    use pixie_squeeze::Codec;
    use pixie_squeeze::utils::image_format_to_string;

    let data = Loader::new().read_file(input)?;
    let decoded = Compressor::new()
        .decode(&data)
        .with_context(|| format!("Failed to decode {}", input.display()))?;
    let metadata = MetadataProcessor::new().extract(&data)?;

    let (width, height) = (decoded.image.width(), decoded.image.height());
    let aspect_ratio = width as f32 / height.max(1) as f32;

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(data.len() as u64));
    println!("Dimensions: {} x {} pixels", width, height);
    println!("Aspect Ratio: {:.2}:1", aspect_ratio);
    println!("Format: {}", image_format_to_string(decoded.format));
    println!("Color: {:?}", decoded.image.color());

    let summary = &metadata.summary;
    if let Some((x, y)) = summary.dpi {
        println!("DPI: {:.0} x {:.0}", x, y);
    }
    if let Some(profile) = &summary.color_profile {
        println!("Color Profile: {}", profile);
    }
    if let Some(fields) = &summary.format_specific {
        for (key, value) in fields {
            println!("{}: {}", key, value);
        }
    }

    match &summary.exif_data {
        Some(exif) => {
            println!("\n=== EXIF Metadata ===");
            for (tag, value) in exif {
                println!("{}: {}", tag, value);
            }
        }
        None => println!("Has EXIF metadata: false"),
    }

    Ok(())
}
