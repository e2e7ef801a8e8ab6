//! Application configuration
//!
//! Settings are read from a TOML file with three sections, every key optional:
//!
//! ```toml
//! [redial]
//! target_number = "5551234"
//! max_attempts = 10
//! ring_timeout_secs = 30
//!
//! [watcher]
//! enabled = true
//! call_ui_package = "com.android.incallui"
//! termination_control_ids = ["com.android.incallui:id/end_call"]
//! active_run_only = false
//! policy = { mode = "immediate" }
//!
//! [logging]
//! level = "info"
//! json = false
//! file_info = false
//! spans = false
//! ```
//!
//! Environment variables override the file: `AUTOCALL_NUMBER`,
//! `AUTOCALL_MAX_ATTEMPTS`, `AUTOCALL_RING_TIMEOUT` and `AUTOCALL_LOG`.

use std::path::Path;

use autocall_call_ui_watcher::WatcherConfig;
use autocall_redial_core::{RetryConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_RING_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::error::{AutocallError, AutocallResult};
use crate::logging::parse_log_level;

pub const ENV_NUMBER: &str = "AUTOCALL_NUMBER";
pub const ENV_MAX_ATTEMPTS: &str = "AUTOCALL_MAX_ATTEMPTS";
pub const ENV_RING_TIMEOUT: &str = "AUTOCALL_RING_TIMEOUT";
pub const ENV_LOG: &str = "AUTOCALL_LOG";

/// Redial defaults, completed by user input at run start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedialSettings {
    pub target_number: Option<String>,
    pub max_attempts: u32,
    pub ring_timeout_secs: u32,
}

impl Default for RedialSettings {
    fn default() -> Self {
        Self {
            target_number: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ring_timeout_secs: DEFAULT_RING_TIMEOUT_SECS,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
    /// Log span enter and exit
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            spans: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocallConfig {
    pub redial: RedialSettings,
    pub watcher: WatcherConfig,
    pub logging: LoggingSettings,
}

impl AutocallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> AutocallResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> AutocallResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AutocallError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_target_number(mut self, number: impl Into<String>) -> Self {
        self.redial.target_number = Some(number.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.redial.max_attempts = max_attempts;
        self
    }

    pub fn with_ring_timeout_secs(mut self, secs: u32) -> Self {
        self.redial.ring_timeout_secs = secs;
        self
    }

    pub fn with_watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Apply `AUTOCALL_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> AutocallResult<()> {
        if let Ok(number) = std::env::var(ENV_NUMBER) {
            self.redial.target_number = Some(number);
        }
        if let Ok(value) = std::env::var(ENV_MAX_ATTEMPTS) {
            self.redial.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_RING_TIMEOUT) {
            self.redial.ring_timeout_secs = parse_env(ENV_RING_TIMEOUT, &value)?;
        }
        if let Ok(level) = std::env::var(ENV_LOG) {
            self.logging.level = level;
        }
        self.validate()
    }

    /// Check limits, watcher settings and log level
    ///
    /// A missing target number is allowed here; it is required only when a
    /// run is started.
    pub fn validate(&self) -> AutocallResult<()> {
        if self.redial.max_attempts == 0 {
            return Err(AutocallError::config("redial.max_attempts must be at least 1"));
        }
        if self.redial.ring_timeout_secs == 0 {
            return Err(AutocallError::config("redial.ring_timeout_secs must be at least 1"));
        }
        self.watcher.validate()?;
        parse_log_level(&self.logging.level)?;
        Ok(())
    }

    /// Run configuration for the configured target number
    pub fn retry_config(&self) -> AutocallResult<RetryConfig> {
        let number = self.redial.target_number.clone().unwrap_or_default();
        let config = RetryConfig::new(number.trim())
            .with_max_attempts(self.redial.max_attempts)
            .with_ring_timeout_secs(self.redial.ring_timeout_secs);
        config.validate()?;
        Ok(config)
    }
}

fn parse_env(name: &str, value: &str) -> AutocallResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| AutocallError::config(format!("{} must be a positive integer, got {:?}", name, value)))
}
