//! Error types for the redial core

use thiserror::Error;

use crate::types::Capability;

/// Result type for redial operations
pub type RedialResult<T> = Result<T, RedialError>;

/// Errors that can occur while orchestrating a redial run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RedialError {
    /// User supplied configuration rejected before a run starts
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A host capability (permission or service) is not available
    #[error("Missing capability: {capability}")]
    CapabilityMissing { capability: Capability },

    /// Orchestrator built with unusable settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The orchestrator control task is no longer running
    #[error("Orchestrator is not running")]
    NotRunning,

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RedialError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a missing capability error
    pub fn capability_missing(capability: Capability) -> Self {
        Self::CapabilityMissing { capability }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The capability this error reports as missing, if any
    pub fn missing_capability(&self) -> Option<Capability> {
        match self {
            Self::CapabilityMissing { capability } => Some(*capability),
            _ => None,
        }
    }
}
