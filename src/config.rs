//! Configuration types for the extraction pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across the worker and the sweeper, log them,
//! and diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely
//! on well-documented defaults for the rest.

use crate::error::ServiceError;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::service::DocumentService`].
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docufield::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input_size(448)
///     .cleanup_after_processing(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Side length of the square image fed to the model, in pixels. Default: 448.
    ///
    /// The whole document is padded onto a white square canvas and scaled to
    /// `input_size × input_size` before normalisation, so this must match
    /// what the model was trained on.
    pub input_size: u32,

    /// Minimum dimension enforced before padding, in pixels. Default: 14.
    ///
    /// Inputs smaller than this in either dimension are upscaled
    /// isotropically so the model never sees a degenerate sliver.
    pub min_size: u32,

    /// Maximum tokens the model may generate per document. Default: 512.
    ///
    /// The field-enumeration replies are short; 512 covers every template
    /// with room for verbose amounts and addresses. Setting this too low
    /// silently truncates the reply mid-field.
    pub max_new_tokens: usize,

    /// Directory where large uploads are written. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Delete the originally-uploaded file once processing completes.
    /// Default: true.
    ///
    /// The file is only removed when the raw bytes have first been captured
    /// in memory — the pipeline never deletes the only copy of a document.
    pub cleanup_after_processing: bool,

    /// Uploads below this size are kept memory-only (no disk file) when
    /// cleanup is enabled. Default: 1 MiB.
    pub memory_threshold_bytes: u64,

    /// Hard cap on a single upload. Default: 16 MiB.
    pub max_upload_bytes: u64,

    /// Upload files older than this are removed by the sweeper. Default: 24 h.
    pub max_upload_age: Duration,

    /// How often the sweeper scans the uploads directory and prunes the
    /// result store. Default: 1 h.
    pub sweep_interval: Duration,

    /// Terminal (completed/error) jobs are evicted from the result store
    /// once older than this. Default: 24 h.
    pub store_retention: Duration,

    /// Maximum number of jobs held in the result store. Default: 1024.
    ///
    /// When full, the oldest terminal jobs are evicted first; in-flight
    /// jobs are never dropped.
    pub store_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size: 448,
            min_size: 14,
            max_new_tokens: 512,
            upload_dir: PathBuf::from("uploads"),
            cleanup_after_processing: true,
            memory_threshold_bytes: 1024 * 1024,
            max_upload_bytes: 16 * 1024 * 1024,
            max_upload_age: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(3600),
            store_retention: Duration::from_secs(24 * 3600),
            store_capacity: 1024,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_size(mut self, px: u32) -> Self {
        self.config.input_size = px.max(1);
        self
    }

    pub fn min_size(mut self, px: u32) -> Self {
        self.config.min_size = px.max(1);
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.config.max_new_tokens = n.max(1);
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn cleanup_after_processing(mut self, v: bool) -> Self {
        self.config.cleanup_after_processing = v;
        self
    }

    pub fn memory_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.memory_threshold_bytes = bytes;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes.max(1);
        self
    }

    pub fn max_upload_age(mut self, age: Duration) -> Self {
        self.config.max_upload_age = age;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn store_retention(mut self, retention: Duration) -> Self {
        self.config.store_retention = retention;
        self
    }

    pub fn store_capacity(mut self, n: usize) -> Self {
        self.config.store_capacity = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ServiceError> {
        let c = &self.config;
        if c.min_size > c.input_size {
            return Err(ServiceError::InvalidConfig(format!(
                "min_size ({}) must not exceed input_size ({})",
                c.min_size, c.input_size
            )));
        }
        if c.memory_threshold_bytes > c.max_upload_bytes {
            return Err(ServiceError::InvalidConfig(format!(
                "memory_threshold_bytes ({}) must not exceed max_upload_bytes ({})",
                c.memory_threshold_bytes, c.max_upload_bytes
            )));
        }
        if c.sweep_interval.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "sweep_interval must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.input_size, 448);
        assert_eq!(config.min_size, 14);
        assert_eq!(config.max_new_tokens, 512);
        assert!(config.cleanup_after_processing);
    }

    #[test]
    fn min_size_over_input_size_rejected() {
        let err = PipelineConfig::builder()
            .input_size(100)
            .min_size(200)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_size"));
    }

    #[test]
    fn threshold_over_cap_rejected() {
        let err = PipelineConfig::builder()
            .max_upload_bytes(1024)
            .memory_threshold_bytes(4096)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("memory_threshold_bytes"));
    }

    #[test]
    fn setters_clamp_zero() {
        let config = PipelineConfig::builder()
            .input_size(0)
            .min_size(0)
            .store_capacity(0)
            .build()
            .unwrap();
        assert_eq!(config.input_size, 1);
        assert_eq!(config.min_size, 1);
        assert_eq!(config.store_capacity, 1);
    }
}
