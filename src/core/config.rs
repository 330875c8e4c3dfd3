// pixie-squeeze/src/core/config.rs
//! Engine tunables.
//!
//! The search bounds, iteration caps, and decay factor are defaults, not
//! protocol constants. Everything here can be overridden from a TOML file:
//!
//! ```toml
//! concurrency = 4
//! png_effort = 4
//!
//! [search]
//! max_iterations = 12
//! scale_decay = 0.8
//! metadata_probe = "every-trial"
//!
//! [limits]
//! max_batch_size = 10
//! ```

use super::{CompressError, Result, BYTES_PER_MB};
use serde::Deserialize;
use std::path::Path;

/// How metadata bytes are accounted for while probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataProbe {
    /// Measure the overhead once and add it to every probe as a constant.
    #[default]
    FinalOnly,
    /// Reattach metadata to every trial encode before measuring it.
    EveryTrial,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub min_quality: u8,
    pub max_quality: u8,
    /// Trial encodes allowed per image, across all strategies.
    pub max_iterations: u32,
    pub max_scale_steps: u32,
    pub scale_decay: f64,
    /// Smallest width/height any downscale may produce.
    pub min_dimension: u32,
    pub metadata_probe: MetadataProbe,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_quality: 10,
            max_quality: 95,
            max_iterations: 8,
            max_scale_steps: 4,
            scale_decay: 0.85,
            min_dimension: 16,
            metadata_probe: MetadataProbe::FinalOnly,
        }
    }
}

/// Request-level bounds checked before any job starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_target_bytes: u64,
    pub max_target_bytes: u64,
    pub max_batch_size: usize,
    pub max_input_dimension: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_target_bytes: BYTES_PER_MB / 10,
            max_target_bytes: 50 * BYTES_PER_MB,
            max_batch_size: 10,
            max_input_dimension: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub limits: Limits,
    /// Worker cap; `None` means available CPU parallelism.
    pub concurrency: Option<usize>,
    /// oxipng preset used when PNG optimization is requested.
    pub png_effort: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            limits: Limits::default(),
            concurrency: None,
            png_effort: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(source).map_err(|e| CompressError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        log::debug!("Loaded engine config from {}", path.display());
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        let search = &self.search;

        if search.min_quality == 0 || search.max_quality > 100 {
            return Err(CompressError::Config(
                "Quality bounds must lie within 1..=100".to_string(),
            ));
        }

        if search.min_quality > search.max_quality {
            return Err(CompressError::Config(format!(
                "min_quality {} exceeds max_quality {}",
                search.min_quality, search.max_quality
            )));
        }

        if search.max_iterations == 0 {
            return Err(CompressError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        if !(search.scale_decay > 0.0 && search.scale_decay < 1.0) {
            return Err(CompressError::Config(format!(
                "scale_decay must lie in (0, 1), got {}",
                search.scale_decay
            )));
        }

        if search.min_dimension == 0 {
            return Err(CompressError::Config(
                "min_dimension must be at least 1".to_string(),
            ));
        }

        if self.limits.min_target_bytes > self.limits.max_target_bytes {
            return Err(CompressError::Config(
                "min_target_bytes exceeds max_target_bytes".to_string(),
            ));
        }

        if self.limits.max_batch_size == 0 {
            return Err(CompressError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }

        if self.png_effort > 6 {
            return Err(CompressError::Config(
                "png_effort must lie within 0..=6".to_string(),
            ));
        }

        if self.concurrency == Some(0) {
            return Err(CompressError::Config(
                "concurrency must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }
}
