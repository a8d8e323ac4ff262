//! Configuration module for Flowsmith
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`FLOWSMITH_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use flowsmith::config::FlowsmithConfig;
//!
//! let toml = r#"
//! [server]
//! port = 9000
//!
//! [throttle]
//! max_requests = 3
//! "#;
//! let config: FlowsmithConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.server.port, 9000);
//! assert_eq!(config.throttle.max_requests, 3);
//! assert_eq!(config.cache.max_entries, 100);
//! ```

pub mod cache;
pub mod converter;
pub mod error;
pub mod logging;
pub mod model;
pub mod server;
pub mod storage;

pub use cache::{CacheConfig, ThrottleConfig};
pub use converter::ConverterConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use model::ModelConfig;
pub use server::ServerConfig;
pub use storage::{RetryConfig, StorageConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the Flowsmith server and client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowsmithConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub converter: ConverterConfig,
    pub cache: CacheConfig,
    pub throttle: ThrottleConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl FlowsmithConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `FLOWSMITH_*` environment variable overrides.
    ///
    /// Values that fail to parse are ignored and the current value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = env_parse("FLOWSMITH_PORT") {
            self.server.port = port;
        }
        if let Ok(host) = std::env::var("FLOWSMITH_HOST") {
            self.server.host = host;
        }
        if let Some(secs) = env_parse("FLOWSMITH_REQUEST_TIMEOUT") {
            self.server.request_timeout_seconds = secs;
        }

        if let Ok(endpoint) = std::env::var("FLOWSMITH_MODEL_ENDPOINT") {
            self.model.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("FLOWSMITH_MODEL") {
            self.model.model = model;
        }

        if let Ok(command) = std::env::var("FLOWSMITH_CONVERTER") {
            self.converter.command = command;
        }
        if let Ok(dir) = std::env::var("FLOWSMITH_STORAGE_DIR") {
            self.storage.dir = dir.into();
        }

        if let Ok(throttle) = std::env::var("FLOWSMITH_THROTTLE") {
            self.throttle.enabled = throttle.to_lowercase() == "true";
        }
        if let Some(max) = env_parse("FLOWSMITH_THROTTLE_MAX") {
            self.throttle.max_requests = max;
        }

        if let Ok(level) = std::env::var("FLOWSMITH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_parse("FLOWSMITH_LOG_FORMAT") {
            self.logging.format = format;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "port must be non-zero"));
        }
        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "server.request_timeout_seconds",
                "request timeout must be at least one second",
            ));
        }
        if self.model.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("model.endpoint", "endpoint cannot be empty"));
        }
        if self.model.max_prompt_chars == 0 {
            return Err(ConfigError::invalid(
                "model.max_prompt_chars",
                "prompt limit must be non-zero",
            ));
        }
        if self.converter.command.trim().is_empty() {
            return Err(ConfigError::invalid("converter.command", "command cannot be empty"));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "cache must hold at least one entry"));
        }
        if self.throttle.enabled && self.throttle.max_requests == 0 {
            return Err(ConfigError::invalid(
                "throttle.max_requests",
                "an enabled throttle must allow at least one request",
            ));
        }
        if self.throttle.enabled && self.throttle.window_seconds == 0 {
            return Err(ConfigError::invalid("throttle.window_seconds", "window must be non-zero"));
        }
        if let Some(max) = self.retry.max_delay_ms {
            if max < self.retry.base_delay_ms {
                return Err(ConfigError::invalid(
                    "retry.max_delay_ms",
                    "cap must not be below base_delay_ms",
                ));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
