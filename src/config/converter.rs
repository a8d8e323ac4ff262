//! Preview converter configuration

use crate::orchestrator::render::default_converter_args;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub command: String,
    /// Arguments with `{input}` and `{output}` placeholders
    pub args: Vec<String>,
    pub timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    /// How long a probe result is trusted before re-probing
    pub probe_freshness_seconds: u64,
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn probe_freshness(&self) -> Duration {
        Duration::from_secs(self.probe_freshness_seconds)
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: "drawio".to_string(),
            args: default_converter_args(),
            timeout_seconds: 30,
            probe_timeout_seconds: 5,
            probe_freshness_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_defaults() {
        let config = ConverterConfig::default();
        assert_eq!(config.command, "drawio");
        assert!(config.args.iter().any(|a| a == "{input}"));
        assert!(config.args.iter().any(|a| a == "{output}"));
        assert_eq!(config.probe_freshness(), Duration::from_secs(60));
    }
}
