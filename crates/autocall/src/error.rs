//! Error types for the autocall facade

use std::path::PathBuf;

use autocall_call_ui_watcher::WatcherError;
use autocall_redial_core::RedialError;
use thiserror::Error;

/// Result type for facade operations
pub type AutocallResult<T> = Result<T, AutocallError>;

/// Errors surfaced by configuration, logging and host wiring
#[derive(Debug, Error)]
pub enum AutocallError {
    /// Redial core error
    #[error("Redial error: {0}")]
    Redial(#[from] RedialError),

    /// Call UI watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Logging could not be initialized
    #[error("Logging error: {message}")]
    Logging { message: String },
}

impl AutocallError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a logging error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}
