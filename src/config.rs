//! Bridge configuration types and defaults.
//!
//! This module defines the policies that govern argument handling, the
//! per-call timeout baked into the generated proxy, and the diagnostic
//! logging toggle.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default per-call timeout in milliseconds (10 seconds)
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 10_000;

/// Configuration for a script bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Drop calls that carry a null/undefined argument (default: true)
    #[serde(default = "default_true")]
    pub ignore_null_arguments: bool,

    /// Decode string arguments holding JSON arrays/objects (default: true)
    #[serde(default = "default_true")]
    pub decode_json_strings: bool,

    /// Client-side timeout for each call in milliseconds (default: 10s)
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_ms: u64,

    /// Emit extraction and routing diagnostics (default: true)
    #[serde(default = "default_true")]
    pub log_enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ignore_null_arguments: true,
            decode_json_strings: true,
            callback_timeout_ms: DEFAULT_CALLBACK_TIMEOUT_MS,
            log_enabled: true,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the null-argument policy
    pub fn with_ignore_null_arguments(mut self, enable: bool) -> Self {
        self.ignore_null_arguments = enable;
        self
    }

    /// Enable or disable JSON string decoding
    pub fn with_decode_json_strings(mut self, enable: bool) -> Self {
        self.decode_json_strings = enable;
        self
    }

    /// Set the per-call timeout
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable diagnostics
    pub fn with_log_enabled(mut self, enable: bool) -> Self {
        self.log_enabled = enable;
        self
    }

    /// Per-call timeout as a duration
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// Parse a configuration from JSON, filling defaults for missing fields
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callback_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "callback_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn default_callback_timeout() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}
