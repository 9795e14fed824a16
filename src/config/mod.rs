//! Runtime configuration for the analytics service
//!
//! Configuration is layered with increasing precedence:
//!
//! 1. Hardcoded defaults
//! 2. An optional TOML file (`--config analytics.toml`)
//! 3. Environment variables (`NOTEMATE_*`, plus `PORT`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{AnalyticsError, Result};

/// Valid log levels for configuration validation.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Snapshot file the aggregate is checkpointed to.
    pub data_file: PathBuf,

    /// Persist the aggregate every time the event total reaches a multiple of this.
    pub checkpoint_interval: u64,

    /// Upper bound on a single checkpoint write.
    #[serde(with = "humantime_serde")]
    pub persist_timeout: Duration,

    pub bind_address: String,

    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/analytics.json"),
            checkpoint_interval: 10,
            persist_timeout: Duration::from_secs(5),
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl AnalyticsConfig {
    /// Load defaults, an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_optional_file(path)?;
        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid with `path` when given. No environment lookups.
    pub fn from_optional_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup, so tests never touch the
    /// process environment.
    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_file) = lookup("NOTEMATE_DATA_FILE") {
            self.data_file = PathBuf::from(data_file);
        }

        if let Some(raw) = lookup("NOTEMATE_CHECKPOINT_INTERVAL") {
            match raw.parse::<u64>() {
                Ok(value) => self.checkpoint_interval = value,
                Err(e) => warn!("Ignoring NOTEMATE_CHECKPOINT_INTERVAL={}: {}", raw, e),
            }
        }

        if let Some(raw) = lookup("NOTEMATE_PERSIST_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&raw) {
                Ok(value) => self.persist_timeout = value,
                Err(e) => warn!("Ignoring NOTEMATE_PERSIST_TIMEOUT={}: {}", raw, e),
            }
        }

        if let Some(address) = lookup("NOTEMATE_BIND_ADDRESS") {
            self.bind_address = address;
        }

        if let Some(raw) = lookup("NOTEMATE_PORT").or_else(|| lookup("PORT")) {
            match raw.parse::<u16>() {
                Ok(value) => self.port = value,
                Err(e) => warn!("Ignoring port override {}: {}", raw, e),
            }
        }

        if let Some(level) = lookup("NOTEMATE_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(AnalyticsError::Config(
                "checkpoint_interval must be greater than zero".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(AnalyticsError::Config(format!(
                "invalid log_level '{}', expected one of {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
