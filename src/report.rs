// pixie-squeeze/src/report.rs
//! Transport form of a batch.
//!
//! Failed images keep their slot in both `images` and `processed_files`
//! (empty string) so the arrays stay aligned with the submitted order.

use crate::core::processor::Stage;
use crate::core::result::{BatchResult, CompressionAnalytics, ImageOutcome};
use crate::processors::ImageMetadata;
use crate::utils::bytes_to_mb;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ProcessImageResponse {
    pub success: bool,
    pub message: String,
    pub images: Vec<ImageInfo>,
    /// Base64 output, one entry per input.
    pub processed_files: Vec<String>,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_analytics: Option<BatchAnalyticsReport>,
}

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub filename: String,
    pub original_size_mb: f64,
    pub processed_size_mb: f64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub compression_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<CompressionAnalytics>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchAnalyticsReport {
    pub total_original_size_mb: f64,
    pub total_processed_size_mb: f64,
    pub average_compression_ratio: f64,
    pub total_iterations: u64,
    pub strategies_used: BTreeMap<String, usize>,
}

impl ProcessImageResponse {
    pub fn from_batch(batch: &BatchResult) -> Self {
        let (images, processed_files): (Vec<ImageInfo>, Vec<String>) =
            batch.outcomes.iter().map(image_entry).unzip();
        let a = &batch.analytics;

        Self {
            success: batch.success,
            message: batch.message(),
            images,
            processed_files,
            processing_time_ms: batch.processing_time.as_millis() as u64,
            batch_analytics: (a.successful > 0).then(|| BatchAnalyticsReport {
                total_original_size_mb: bytes_to_mb(a.total_original_size_bytes),
                total_processed_size_mb: bytes_to_mb(a.total_processed_size_bytes),
                average_compression_ratio: a.average_compression_ratio,
                total_iterations: a.total_iterations,
                strategies_used: a.strategies_used.clone(),
            }),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn image_entry(outcome: &ImageOutcome) -> (ImageInfo, String) {
    match &outcome.result {
        Ok(result) => (
            ImageInfo {
                filename: outcome.filename.clone(),
                original_size_mb: bytes_to_mb(result.original_size_bytes),
                processed_size_mb: bytes_to_mb(result.achieved_size_bytes),
                width: result.width,
                height: result.height,
                format: result.format.to_string(),
                compression_ratio: result.compression_ratio,
                metadata: result.metadata.clone(),
                analytics: Some(result.analytics.clone()),
                recommendations: result.recommendations.clone(),
                error: None,
            },
            STANDARD.encode(&result.data),
        ),
        Err(e) => (
            ImageInfo {
                filename: outcome.filename.clone(),
                original_size_mb: bytes_to_mb(outcome.original_size_bytes),
                processed_size_mb: 0.0,
                width: 0,
                height: 0,
                format: String::new(),
                compression_ratio: 0.0,
                metadata: None,
                analytics: None,
                recommendations: Vec::new(),
                error: Some(ErrorInfo {
                    kind: e.kind().to_string(),
                    stage: e.stage,
                    message: e.source.to_string(),
                }),
            },
            String::new(),
        ),
    }
}
