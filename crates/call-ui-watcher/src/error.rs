//! Error types for the call-UI watcher

use thiserror::Error;

/// Result type for watcher operations
pub type WatcherResult<T> = Result<T, WatcherError>;

/// Errors that can occur while setting up the watcher
///
/// Runtime misses (no call screen, control not rendered yet) are not errors;
/// they are reported as a [`crate::WatchOutcome`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatcherError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The configured policy needs a timer service that was not provided
    #[error("Termination policy {policy} requires a timer service")]
    TimerServiceRequired { policy: String },
}

impl WatcherError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
