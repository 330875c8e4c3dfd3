// pixie-squeeze/src/core/result.rs
use super::processor::JobError;
use super::OutputFormat;
use crate::processors::ImageMetadata;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Recommendations containing this word mark a result whose target could
/// not be met within the search bounds.
pub const UNREACHABLE_MARKER: &str = "unreachable";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionAnalytics {
    pub algorithm_used: String,
    pub iterations_required: u32,
    pub quality_achieved: Option<u8>,
    pub processing_strategy: String,
    pub size_reduction_percentage: f64,
    pub optimization_notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub format: OutputFormat,
    pub original_size_bytes: u64,
    pub target_size_bytes: u64,
    pub achieved_size_bytes: u64,
    pub compression_ratio: f64,
    pub analytics: CompressionAnalytics,
    pub recommendations: Vec<String>,
    /// Present when metadata was preserved.
    pub metadata: Option<ImageMetadata>,
}

impl CompressionResult {
    pub fn is_unreachable(&self) -> bool {
        self.recommendations
            .iter()
            .any(|r| r.to_ascii_lowercase().contains(UNREACHABLE_MARKER))
    }

    pub fn meets_target(&self) -> bool {
        self.achieved_size_bytes <= self.target_size_bytes
    }

    pub fn was_downscaled(&self) -> bool {
        self.width < self.source_width || self.height < self.source_height
    }
}

pub fn compression_ratio(original: u64, achieved: u64) -> f64 {
    if achieved == 0 {
        return 0.0;
    }
    original as f64 / achieved as f64
}

pub fn size_reduction_percentage(original: u64, achieved: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }

    let savings = (original as f64 - achieved as f64) / original as f64 * 100.0;
    savings.max(0.0)
}

/// One input slot of a batch.
#[derive(Debug)]
pub struct ImageOutcome {
    pub filename: String,
    pub original_size_bytes: u64,
    pub result: std::result::Result<CompressionResult, JobError>,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchAnalytics {
    pub total_images: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_original_size_bytes: u64,
    pub total_processed_size_bytes: u64,
    pub average_compression_ratio: f64,
    pub total_iterations: u64,
    pub strategies_used: BTreeMap<String, usize>,
}

impl BatchAnalytics {
    pub fn from_outcomes(outcomes: &[ImageOutcome]) -> Self {
        let mut analytics = BatchAnalytics {
            total_images: outcomes.len(),
            ..Default::default()
        };
        let mut ratio_sum = 0.0;

        for outcome in outcomes {
            analytics.total_original_size_bytes += outcome.original_size_bytes;

            match &outcome.result {
                Ok(result) => {
                    analytics.successful += 1;
                    analytics.total_processed_size_bytes += result.achieved_size_bytes;
                    analytics.total_iterations += u64::from(result.analytics.iterations_required);
                    ratio_sum += result.compression_ratio;
                    *analytics
                        .strategies_used
                        .entry(result.analytics.processing_strategy.clone())
                        .or_insert(0) += 1;
                }
                Err(_) => analytics.failed += 1,
            }
        }

        if analytics.successful > 0 {
            analytics.average_compression_ratio = ratio_sum / analytics.successful as f64;
        }

        analytics
    }
}

#[derive(Debug)]
pub struct BatchResult {
    /// Index-aligned with the input jobs.
    pub outcomes: Vec<ImageOutcome>,
    pub analytics: BatchAnalytics,
    /// True only when every job finished.
    pub success: bool,
    pub processing_time: Duration,
}

impl BatchResult {
    pub fn new(outcomes: Vec<ImageOutcome>, processing_time: Duration) -> Self {
        let analytics = BatchAnalytics::from_outcomes(&outcomes);
        let success = !outcomes.is_empty() && analytics.failed == 0;

        Self {
            outcomes,
            analytics,
            success,
            processing_time,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.analytics.successful > 0 && self.analytics.failed > 0
    }

    pub fn message(&self) -> String {
        let a = &self.analytics;
        if self.success {
            format!("Successfully processed {} image(s)", a.successful)
        } else if a.successful > 0 {
            format!(
                "Partially processed batch: {} of {} image(s) succeeded",
                a.successful, a.total_images
            )
        } else {
            format!("Failed to process all {} image(s)", a.total_images)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processor::Stage;
    use crate::core::CompressError;

    fn result(size: u64, ratio: f64, strategy: &str, iterations: u32) -> CompressionResult {
        CompressionResult {
            data: vec![0; size as usize],
            width: 10,
            height: 10,
            source_width: 10,
            source_height: 10,
            format: OutputFormat::Jpeg,
            original_size_bytes: 1000,
            target_size_bytes: 500,
            achieved_size_bytes: size,
            compression_ratio: ratio,
            analytics: CompressionAnalytics {
                algorithm_used: "jpeg-baseline".to_string(),
                iterations_required: iterations,
                quality_achieved: Some(50),
                processing_strategy: strategy.to_string(),
                size_reduction_percentage: 50.0,
                optimization_notes: Vec::new(),
            },
            recommendations: Vec::new(),
            metadata: None,
        }
    }

    #[test]
    fn ratio_and_reduction() {
        assert_eq!(compression_ratio(1000, 250), 4.0);
        assert_eq!(compression_ratio(1000, 0), 0.0);
        assert_eq!(size_reduction_percentage(1000, 250), 75.0);
        assert_eq!(size_reduction_percentage(1000, 2000), 0.0);
    }

    #[test]
    fn unreachable_marker_is_case_insensitive() {
        let mut r = result(400, 2.5, "lossy", 3);
        assert!(!r.is_unreachable());
        r.recommendations
            .push("Target Unreachable: allow further downscaling".to_string());
        assert!(r.is_unreachable());
    }

    #[test]
    fn aggregates_skip_failed_jobs() {
        let outcomes = vec![
            ImageOutcome {
                filename: "a.jpg".into(),
                original_size_bytes: 1000,
                result: Ok(result(400, 2.5, "lossy", 3)),
            },
            ImageOutcome {
                filename: "b.jpg".into(),
                original_size_bytes: 800,
                result: Err(JobError::new(
                    Stage::Decoding,
                    CompressError::CorruptInput("bad".into()),
                )),
            },
            ImageOutcome {
                filename: "c.png".into(),
                original_size_bytes: 1000,
                result: Ok(result(200, 5.0, "hybrid-lossless", 1)),
            },
        ];

        let batch = BatchResult::new(outcomes, Duration::from_millis(5));
        let a = &batch.analytics;

        assert!(!batch.success);
        assert!(batch.is_partial());
        assert_eq!(a.total_images, 3);
        assert_eq!(a.successful, 2);
        assert_eq!(a.failed, 1);
        assert_eq!(a.total_original_size_bytes, 2800);
        assert_eq!(a.total_processed_size_bytes, 600);
        assert_eq!(a.total_iterations, 4);
        assert_eq!(a.average_compression_ratio, 3.75);
        assert_eq!(a.strategies_used.get("lossy"), Some(&1));
        assert_eq!(a.strategies_used.get("hybrid-lossless"), Some(&1));
        assert!(batch.message().contains("2 of 3"));
    }
}
