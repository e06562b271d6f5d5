/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed sync engine configuration
[POS]:    Configuration layer - backend endpoints and retry timing
[UPDATE]: When adding new configuration options
*/

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the sync engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Backend base URL
    pub base_url: String,
    /// Project the collected records belong to
    pub project_id: String,
    /// Device/installation identifier sent with every upload
    pub client_id: String,
    /// Bearer token for the backend session
    pub auth_token: String,
    /// Directory holding the durable task store; defaults to the platform
    /// data dir
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Retry timing knobs
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Retry and backoff timing configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Fixed delay before an attachment upload is re-attempted
    #[serde(default = "default_attachment_retry_ms")]
    pub attachment_retry_ms: u64,
    /// Base of the exponential record-submission backoff
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Ceiling of the record-submission backoff
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            attachment_retry_ms: default_attachment_retry_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl TimingConfig {
    pub fn attachment_retry(&self) -> Duration {
        Duration::from_millis(self.attachment_retry_ms)
    }
}

fn default_attachment_retry_ms() -> u64 {
    4_000
}

fn default_backoff_base_ms() -> u64 {
    3_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

impl SyncConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the durable storage directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fieldsync")
        })
    }
}
