//! Configuration management for the read service
//!
//! TOML configuration with per-field defaults and environment variable
//! overrides. Every section may be omitted from the file.
//!
//! ```toml
//! [reads]
//! request_timeout_ms = 30000
//! max_group_keys = 16
//! batch_size = 500
//!
//! [deletion]
//! delete_data = true
//!
//! [logging]
//! log_level = "debug"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Read dispatcher settings
    #[serde(default)]
    pub reads: ReadsConfig,

    /// Bucket deletion settings
    #[serde(default)]
    pub deletion: DeletionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Read dispatcher configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReadsConfig {
    /// Deadline applied to requests whose context has none (0 = no deadline)
    #[serde(default)]
    pub request_timeout_ms: u64,

    /// Maximum number of group keys in a group read
    #[serde(default = "default_max_group_keys")]
    pub max_group_keys: usize,

    /// Advisory number of points per value batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Bucket deletion configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeletionConfig {
    /// Delete time-series data after the bucket lookup succeeds
    #[serde(default = "default_true")]
    pub delete_data: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

fn default_max_group_keys() -> usize {
    64
}

fn default_batch_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ReadsConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 0,
            max_group_keys: default_max_group_keys(),
            batch_size: default_batch_size(),
        }
    }
}

impl ReadsConfig {
    /// Request deadline, if configured
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// Validate read settings
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "reads.batch_size must be > 0".to_string(),
            ));
        }
        if self.max_group_keys == 0 {
            return Err(Error::Configuration(
                "reads.max_group_keys must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { delete_data: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("READS_REQUEST_TIMEOUT_MS") {
            self.reads.request_timeout_ms = v;
        }
        if let Some(v) = env_parse("READS_MAX_GROUP_KEYS") {
            self.reads.max_group_keys = v;
        }
        if let Some(v) = env_parse("READS_BATCH_SIZE") {
            self.reads.batch_size = v;
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.reads.validate()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Returns `false` when a
/// subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .try_init()
        .is_ok()
}
