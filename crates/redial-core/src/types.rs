//! Type definitions shared by the redial core
//!
//! # Type Categories
//!
//! - **Configuration** - [`RetryConfig`], fixed for the lifetime of a run
//! - **Run bookkeeping** - [`RunState`], [`RunId`], [`PendingTimer`]
//! - **Call state** - [`CallPhase`] and the host's [`NativeCallState`]
//! - **Observable state** - [`RedialState`], [`RedialStatus`], [`StopReason`]
//!
//! # Examples
//!
//! ```rust
//! use autocall_redial_core::types::{CallPhase, NativeCallState, RetryConfig};
//!
//! let config = RetryConfig::new("5551234")
//!     .with_max_attempts(3)
//!     .with_ring_timeout_secs(15);
//! assert!(config.validate().is_ok());
//!
//! assert_eq!(CallPhase::from_native(NativeCallState::OFFHOOK), Some(CallPhase::Connected));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RedialError, RedialResult};

/// Default number of dial attempts in a run
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default ring timeout in seconds
pub const DEFAULT_RING_TIMEOUT_SECS: u32 = 30;

/// Delay between a call going idle and the next attempt
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(2);

// ===== CONFIGURATION =====

/// Parameters of a redial run
///
/// Set from user input when a run starts and never changed while it is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Destination number handed to the dialer
    pub target_number: String,
    /// Upper bound on dial attempts, at least 1
    pub max_attempts: u32,
    /// Seconds an attempt may ring before manual hang-up is requested, at least 1
    pub ring_timeout_secs: u32,
}

impl RetryConfig {
    /// Create a configuration with the default limits
    pub fn new(target_number: impl Into<String>) -> Self {
        Self {
            target_number: target_number.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ring_timeout_secs: DEFAULT_RING_TIMEOUT_SECS,
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the ring timeout in seconds
    pub fn with_ring_timeout_secs(mut self, secs: u32) -> Self {
        self.ring_timeout_secs = secs;
        self
    }

    /// Build a configuration from raw text fields
    ///
    /// The number is trimmed. Numeric fields that are blank or not a number
    /// fall back to their defaults; an explicit zero is rejected.
    ///
    /// ```rust
    /// use autocall_redial_core::types::RetryConfig;
    ///
    /// let config = RetryConfig::from_user_input(" 5551234 ", "", "abc").unwrap();
    /// assert_eq!(config.target_number, "5551234");
    /// assert_eq!(config.max_attempts, 10);
    /// assert_eq!(config.ring_timeout_secs, 30);
    ///
    /// assert!(RetryConfig::from_user_input("", "3", "5").is_err());
    /// ```
    pub fn from_user_input(
        number: &str,
        max_attempts_text: &str,
        ring_timeout_text: &str,
    ) -> RedialResult<Self> {
        let config = Self {
            target_number: number.trim().to_string(),
            max_attempts: parse_or(max_attempts_text, DEFAULT_MAX_ATTEMPTS),
            ring_timeout_secs: parse_or(ring_timeout_text, DEFAULT_RING_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before a run starts
    pub fn validate(&self) -> RedialResult<()> {
        if self.target_number.trim().is_empty() {
            return Err(RedialError::invalid_input("target number is empty"));
        }
        if self.max_attempts == 0 {
            return Err(RedialError::invalid_input("max attempts must be at least 1"));
        }
        if self.ring_timeout_secs == 0 {
            return Err(RedialError::invalid_input("ring timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// Ring timeout as a duration
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.ring_timeout_secs))
    }
}

fn parse_or(text: &str, default: u32) -> u32 {
    text.trim().parse().unwrap_or(default)
}

// ===== HOST CAPABILITIES =====

/// Host capabilities the components depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Permission to initiate outgoing calls
    PlaceCalls,
    /// Permission to read telephony state
    ReadPhoneState,
    /// User-enabled accessibility automation service
    AccessibilityAutomation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::PlaceCalls => write!(f, "place calls"),
            Capability::ReadPhoneState => write!(f, "read phone state"),
            Capability::AccessibilityAutomation => write!(f, "accessibility automation"),
        }
    }
}

// ===== CALL STATE =====

/// Raw telephony state identifier as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeCallState(pub i32);

impl NativeCallState {
    /// No call activity
    pub const IDLE: NativeCallState = NativeCallState(0);
    /// A call is ringing
    pub const RINGING: NativeCallState = NativeCallState(1);
    /// At least one call is dialing, active or on hold
    pub const OFFHOOK: NativeCallState = NativeCallState(2);
}

/// Normalized call phase delivered to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallPhase {
    Idle,
    Ringing,
    Connected,
}

impl CallPhase {
    /// Map a host identifier, `None` for identifiers this crate does not know
    pub fn from_native(state: NativeCallState) -> Option<Self> {
        match state {
            NativeCallState::IDLE => Some(CallPhase::Idle),
            NativeCallState::RINGING => Some(CallPhase::Ringing),
            NativeCallState::OFFHOOK => Some(CallPhase::Connected),
            _ => None,
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Idle => write!(f, "IDLE"),
            CallPhase::Ringing => write!(f, "RINGING"),
            CallPhase::Connected => write!(f, "CONNECTED"),
        }
    }
}

// ===== RUN BOOKKEEPING =====

/// Identifier of a single redial run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one armed timer; never reused within an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// What an armed timer is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Ring timeout of the attempt in flight
    Ring,
    /// Cooldown before the next attempt
    Cooldown,
}

/// The single timer a run may have pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub token: TimerToken,
    pub kind: TimerKind,
}

/// Mutable bookkeeping of the current run
///
/// Invariants: `attempts_made <= max_attempts`, and an inactive run has no
/// pending timer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Whether a run is in progress
    pub is_active: bool,
    /// Attempts that have completed (went idle and cooled down)
    pub attempts_made: u32,
    /// Dialer invocations in this run
    pub dials_placed: u32,
    /// Timer currently armed, if any
    pub pending_timer: Option<PendingTimer>,
}

// ===== OBSERVABLE STATE =====

/// Orchestrator state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedialState {
    /// No run has been started
    Idle,
    /// Attempt in flight, ring timer armed
    Dialing,
    /// Cooldown before the next attempt
    WaitingToRetry,
    /// Run complete or cancelled
    Stopped,
}

/// Why a run ended without reaching its attempt limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// The call went off hook; the live call is left to the user
    Connected,
    /// `stop()` or shutdown
    Cancelled,
}

/// How a run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunOutcome {
    Connected,
    LimitReached,
    Cancelled,
}

/// Status string surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedialStatus {
    Idle,
    Dialing { attempt: u32, max_attempts: u32 },
    Ringing { attempt: u32 },
    ManualHangupRequired { attempt: u32 },
    WaitingToRetry { next_attempt: u32 },
    LimitReached { attempts: u32 },
    Stopped { reason: StopReason },
}

impl RedialStatus {
    /// Whether this status belongs to a run that is still in progress
    pub fn is_run_active(&self) -> bool {
        matches!(
            self,
            RedialStatus::Dialing { .. }
                | RedialStatus::Ringing { .. }
                | RedialStatus::ManualHangupRequired { .. }
                | RedialStatus::WaitingToRetry { .. }
        )
    }

    /// Whether this status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, RedialStatus::LimitReached { .. } | RedialStatus::Stopped { .. })
    }
}

impl fmt::Display for RedialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedialStatus::Idle => write!(f, "idle"),
            RedialStatus::Dialing { attempt, max_attempts } => {
                write!(f, "dialing attempt {} of {}", attempt, max_attempts)
            }
            RedialStatus::Ringing { .. } => write!(f, "ringing"),
            RedialStatus::ManualHangupRequired { .. } => write!(f, "manual hang-up required"),
            RedialStatus::WaitingToRetry { .. } => write!(f, "waiting to retry"),
            RedialStatus::LimitReached { .. } => write!(f, "limit reached"),
            RedialStatus::Stopped { .. } => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_mapping() {
        assert_eq!(CallPhase::from_native(NativeCallState::IDLE), Some(CallPhase::Idle));
        assert_eq!(CallPhase::from_native(NativeCallState::RINGING), Some(CallPhase::Ringing));
        assert_eq!(CallPhase::from_native(NativeCallState::OFFHOOK), Some(CallPhase::Connected));
        assert_eq!(CallPhase::from_native(NativeCallState(7)), None);
    }

    #[test]
    fn test_validate_rejects_blank_number() {
        let err = RetryConfig::new("   ").validate().unwrap_err();
        assert!(matches!(err, RedialError::InvalidInput { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(RetryConfig::new("1").with_max_attempts(0).validate().is_err());
        assert!(RetryConfig::new("1").with_ring_timeout_secs(0).validate().is_err());
        assert!(RetryConfig::new("1").validate().is_ok());
    }

    #[test]
    fn test_user_input_defaults_and_zero() {
        let config = RetryConfig::from_user_input("5551234", "3", " 12 ").unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.ring_timeout_secs, 12);

        let config = RetryConfig::from_user_input("5551234", "x", "").unwrap();
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.ring_timeout_secs, DEFAULT_RING_TIMEOUT_SECS);

        assert!(RetryConfig::from_user_input("5551234", "0", "5").is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(RedialStatus::LimitReached { attempts: 3 }.to_string(), "limit reached");
        assert_eq!(
            RedialStatus::Stopped { reason: StopReason::Connected }.to_string(),
            "stopped"
        );
        assert_eq!(
            RedialStatus::Dialing { attempt: 2, max_attempts: 3 }.to_string(),
            "dialing attempt 2 of 3"
        );
        assert!(RedialStatus::WaitingToRetry { next_attempt: 2 }.is_run_active());
        assert!(!RedialStatus::Idle.is_run_active());
    }
}
