//! Artifact storage and client retry configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub file_ttl_seconds: u64,
}

impl StorageConfig {
    pub fn file_ttl(&self) -> Duration {
        Duration::from_secs(self.file_ttl_seconds)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("flowsmith"),
            file_ttl_seconds: 3600,
        }
    }
}

/// Retry behaviour of the `generate` client command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Cap on a single backoff; unset means uncapped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Lower bound on the per-attempt deadline. Keep it above the server's
    /// `request_timeout_seconds` so the server's own 504 reaches the client.
    pub deadline_seconds: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: None,
            deadline_seconds: 200,
        }
    }
}
