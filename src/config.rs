//! Configuration for the leads sync engine.
//!
//! # Example
//!
//! ```
//! use leads_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.request_timeout_ms, 15_000);
//!
//! // From TOML, unspecified fields fall back to defaults
//! let config = SyncConfig::from_toml_str(r#"
//!     api_base_url = "https://crm.example.com/api"
//!     store_url = "sqlite://leads.db?mode=rwc"
//! "#).unwrap();
//! assert!(config.refresh_after_drain);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the leads REST API (e.g., "https://crm.example.com/api")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Local store connection string (e.g., "sqlite://leads_sync.db?mode=rwc")
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Per-request timeout for remote calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Connectivity assumed at startup, before the host reports anything
    #[serde(default = "default_true")]
    pub start_online: bool,

    /// Reload from the server after a drain that replayed something
    #[serde(default = "default_true")]
    pub refresh_after_drain: bool,
}

fn default_api_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_store_url() -> String { "sqlite://leads_sync.db?mode=rwc".to_string() }
fn default_request_timeout_ms() -> u64 { 15_000 }
fn default_true() -> bool { true }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            store_url: default_store_url(),
            request_timeout_ms: default_request_timeout_ms(),
            start_online: true,
            refresh_after_drain: true,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "api_base_url",
                reason: "must not be empty".into(),
            });
        }
        if self.store_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store_url",
                reason: "must not be empty".into(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
