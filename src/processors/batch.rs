// pixie-squeeze/src/processors/batch.rs
use super::compressor::{Codec, Compressor};
use crate::core::processor::{ImageJob, ImageProcessor};
use crate::core::result::{BatchResult, ImageOutcome};
use crate::core::{CancelFlag, CompressError, CompressionRequest, EngineConfig, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Fans a batch of jobs sharing one request out over a worker pool.
pub struct BatchProcessor {
    request: CompressionRequest,
    config: EngineConfig,
    codec: Arc<dyn Codec>,
    cancel: CancelFlag,
    show_progress: bool,
}

impl BatchProcessor {
    pub fn new(request: CompressionRequest, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            request,
            config,
            codec: Arc::new(Compressor::new()),
            cancel: CancelFlag::new(),
            show_progress: false,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Raising the returned flag lets in-flight trial encodes finish but
    /// starts no new iteration or job.
    pub fn abort_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn request(&self) -> &CompressionRequest {
        &self.request
    }

    /// Request-level checks. A failure here rejects the whole batch.
    pub fn validate(&self, jobs: &[ImageJob]) -> Result<()> {
        let max = self.config.limits.max_batch_size;

        if jobs.is_empty() {
            return Err(CompressError::Validation(
                "Batch must contain at least one image".to_string(),
            ));
        }

        if jobs.len() > max {
            return Err(CompressError::Validation(format!(
                "Batch of {} images exceeds the limit of {}",
                jobs.len(),
                max
            )));
        }

        self.request.validate(&self.config.limits)
    }

    pub fn process(&self, jobs: &[ImageJob]) -> Result<BatchResult> {
        self.validate(jobs)?;

        let started = Instant::now();
        let threads = self.worker_count(jobs.len());
        log::info!(
            "Processing {} image(s) on {} worker(s), target {} bytes",
            jobs.len(),
            threads,
            self.request.target_size_bytes
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| CompressError::Config(format!("Failed to create thread pool: {}", e)))?;

        let pb = self.create_progress_bar(jobs.len());

        // collect() keeps input order; each task owns only its slot.
        let outcomes: Vec<ImageOutcome> = pool.install(|| {
            jobs.par_iter()
                .progress_with(pb.clone())
                .map(|job| self.process_job(job))
                .collect()
        });

        let batch = BatchResult::new(outcomes, started.elapsed());

        pb.finish_with_message(batch.message());
        log::info!(
            "{} in {:.2?} ({} iteration(s) total)",
            batch.message(),
            batch.processing_time,
            batch.analytics.total_iterations
        );

        Ok(batch)
    }

    fn process_job(&self, job: &ImageJob) -> ImageOutcome {
        let processor = ImageProcessor::new(&self.request, &self.config, self.codec.as_ref());
        let result = processor.process(job, &self.cancel);

        if let Err(e) = &result {
            log::warn!("Failed to process {}: {}", job.filename, e);
        }

        ImageOutcome {
            filename: job.filename.clone(),
            original_size_bytes: job.data.len() as u64,
            result,
        }
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        self.config
            .concurrency
            .unwrap_or(available)
            .min(jobs)
            .max(1)
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
