//! Watcher configuration
//!
//! The termination control is found by its view id inside the host call
//! screen. Those ids belong to the host's call UI and change between OS
//! releases, so both the package and an ordered list of candidate ids are
//! configurable.
//!
//! ```rust
//! use autocall_call_ui_watcher::{TerminationPolicy, WatcherConfig};
//! use std::time::Duration;
//!
//! let config = WatcherConfig::default()
//!     .with_control_id("com.android.dialer:id/incall_end_call")
//!     .with_policy(TerminationPolicy::deferred(Duration::from_secs(20)));
//!
//! assert_eq!(config.termination_control_ids.len(), 2);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WatcherError, WatcherResult};

/// Package of the stock in-call screen
pub const DEFAULT_CALL_UI_PACKAGE: &str = "com.android.incallui";

/// View id of the stock end-call button
pub const DEFAULT_END_CALL_ID: &str = "com.android.incallui:id/end_call";

/// When a detected call screen gets its call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// End the call on every detection of the call screen
    Immediate,
    /// End the call once, `delay_secs` after the first detection
    Deferred { delay_secs: u64 },
    /// Only record detections
    ObserveOnly,
}

impl TerminationPolicy {
    pub fn deferred(delay: Duration) -> Self {
        TerminationPolicy::Deferred {
            delay_secs: delay.as_secs(),
        }
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        TerminationPolicy::Immediate
    }
}

impl fmt::Display for TerminationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationPolicy::Immediate => write!(f, "immediate"),
            TerminationPolicy::Deferred { delay_secs } => write!(f, "deferred ({}s)", delay_secs),
            TerminationPolicy::ObserveOnly => write!(f, "observe-only"),
        }
    }
}

/// Call-UI watcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Master switch; a disabled watcher ignores every notification
    pub enabled: bool,
    /// Package name identifying the call screen
    pub call_ui_package: String,
    /// Candidate view ids of the termination control, tried in order
    pub termination_control_ids: Vec<String>,
    /// When to end a detected call
    pub policy: TerminationPolicy,
    /// Only end calls while a redial run is active
    pub active_run_only: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            call_ui_package: DEFAULT_CALL_UI_PACKAGE.to_string(),
            termination_control_ids: vec![DEFAULT_END_CALL_ID.to_string()],
            policy: TerminationPolicy::default(),
            active_run_only: false,
        }
    }
}

impl WatcherConfig {
    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_call_ui_package(mut self, package: impl Into<String>) -> Self {
        self.call_ui_package = package.into();
        self
    }

    /// Append a fallback termination control id
    pub fn with_control_id(mut self, view_id: impl Into<String>) -> Self {
        self.termination_control_ids.push(view_id.into());
        self
    }

    pub fn with_active_run_only(mut self, active_run_only: bool) -> Self {
        self.active_run_only = active_run_only;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> WatcherResult<()> {
        if self.call_ui_package.trim().is_empty() {
            return Err(WatcherError::config("call UI package must not be empty"));
        }
        if self.termination_control_ids.is_empty() {
            return Err(WatcherError::config("at least one termination control id is required"));
        }
        if self.termination_control_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(WatcherError::config("termination control ids must not be blank"));
        }
        if let TerminationPolicy::Deferred { delay_secs: 0 } = self.policy {
            return Err(WatcherError::config("deferred termination delay must be at least 1 second"));
        }
        Ok(())
    }
}
