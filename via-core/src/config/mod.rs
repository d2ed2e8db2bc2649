//! Configuration for the VIA pipeline
//!
//! The orchestrator receives a [`PipelineConfig`] at construction; there is
//! no global settings object. Configuration selects the analysis backends,
//! bounds the worker pool, and sets the retry/timeout policy every stage
//! runs under.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::config_error;

/// Configuration for the pipeline orchestrator and its collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_size_bytes")]
    pub max_upload_size_bytes: u64,

    /// Number of workers pulling stage work items from the queue
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Capacity of the work queue; submissions wait when it is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Whether explicit job cancellation is accepted
    ///
    /// Off by default; when disabled, cancellation requests are rejected
    /// with a conflict error.
    #[serde(default)]
    pub enable_cancellation: bool,

    /// Seconds around each transcript segment considered when correlating
    /// detections for analytics
    #[serde(default = "default_timeline_window_secs")]
    pub timeline_window_secs: f64,

    /// Retry/timeout policy applied to every pipeline stage
    #[serde(default)]
    pub stage: StagePolicy,

    /// Source acquisition settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Analysis backend selection
    #[serde(default)]
    pub backends: BackendConfig,
}

/// Per-stage execution policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Deadline for a single stage attempt, seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum execution attempts per stage (1 = no retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential backoff between attempts, milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl StagePolicy {
    /// The per-attempt deadline as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before re-running a stage after `attempt` failed attempts
    ///
    /// Doubles per attempt: base, 2x base, 4x base, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout_secs: default_stage_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Source acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Whether remote URL sources are accepted at all
    #[serde(default = "default_true")]
    pub allow_remote_urls: bool,

    /// Maximum download attempts for a remote source
    #[serde(default = "default_max_attempts")]
    pub max_download_attempts: u32,

    /// Base delay of the exponential download backoff, milliseconds
    #[serde(default = "default_download_backoff_base_ms")]
    pub download_backoff_base_ms: u64,
}

impl IngestConfig {
    /// Delay before re-trying a download after `attempt` failed attempts
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.download_backoff_base_ms.saturating_mul(factor))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allow_remote_urls: default_true(),
            max_download_attempts: default_max_attempts(),
            download_backoff_base_ms: default_download_backoff_base_ms(),
        }
    }
}

/// Analysis backend selection, resolved once at orchestrator construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Transcriber implementation identifier ("signature", "stub")
    #[serde(default = "default_transcriber")]
    pub transcriber: String,

    /// Detector implementation identifier ("signature", "stub")
    #[serde(default = "default_detector")]
    pub detector: String,

    /// Summarizer implementation identifier ("extractive", "stub")
    #[serde(default = "default_summarizer")]
    pub summarizer: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            transcriber: default_transcriber(),
            detector: default_detector(),
            summarizer: default_summarizer(),
        }
    }
}

fn default_max_upload_size_bytes() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_timeline_window_secs() -> f64 {
    4.0
}

fn default_stage_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_download_backoff_base_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_transcriber() -> String {
    "signature".to_string()
}

fn default_detector() -> String {
    "signature".to_string()
}

fn default_summarizer() -> String {
    "extractive".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: default_max_upload_size_bytes(),
            worker_pool_size: default_worker_pool_size(),
            queue_capacity: default_queue_capacity(),
            enable_cancellation: false,
            timeline_window_secs: default_timeline_window_secs(),
            stage: StagePolicy::default(),
            ingest: IngestConfig::default(),
            backends: BackendConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            config_error!("cannot read config file {}: {e}", path.as_ref().display())
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse configuration from a JSON string
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| config_error!("invalid config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(config_error!("worker_pool_size must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(config_error!("queue_capacity must be at least 1"));
        }
        if self.max_upload_size_bytes == 0 {
            return Err(config_error!("max_upload_size_bytes must be positive"));
        }
        if self.stage.max_attempts == 0 {
            return Err(config_error!("stage.max_attempts must be at least 1"));
        }
        if self.stage.timeout_secs == 0 {
            return Err(config_error!("stage.timeout_secs must be positive"));
        }
        if self.ingest.max_download_attempts == 0 {
            return Err(config_error!("ingest.max_download_attempts must be at least 1"));
        }
        if !(self.timeline_window_secs.is_finite() && self.timeline_window_secs >= 0.0) {
            return Err(config_error!("timeline_window_secs must be a non-negative number"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stage.max_attempts, 3);
        assert_eq!(config.worker_pool_size, 4);
        assert!(!config.enable_cancellation);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = StagePolicy {
            timeout_secs: 30,
            max_attempts: 4,
            backoff_base_ms: 100,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_partial_json_gets_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "worker_pool_size": 2, "stage": { "max_attempts": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.stage.max_attempts, 5);
        // untouched knobs keep their defaults
        assert_eq!(config.stage.timeout_secs, 300);
        assert_eq!(config.backends.summarizer, "extractive");
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let err = PipelineConfig::from_json_str(r#"{ "worker_pool_size": 0 }"#).unwrap_err();
        assert!(format!("{err}").contains("worker_pool_size"));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = PipelineConfig::default();
        config.stage.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
