//! # Redial Core - Automatic Redial Orchestration
//!
//! This crate drives repeated outbound call attempts to a single number:
//! - **[`orchestrator`]**: control task deciding when to dial, wait and stop
//! - **[`state_machine`]**: the pure transition logic behind it
//! - **[`monitor`]**: adapter from host telephony notifications to [`CallPhase`]
//! - **[`dialer`]**: the host call-initiation seam
//! - **[`timer`]**: injectable single-shot timers, real and virtual
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autocall_redial_core::{
//!     Dialer, ManualTimerService, RedialOrchestrator, RedialResult, RetryConfig, TelephonyFeed,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct PrintDialer;
//!
//! #[async_trait]
//! impl Dialer for PrintDialer {
//!     async fn place_call(&self, number: &str) -> RedialResult<()> {
//!         println!("calling {}", number);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> RedialResult<()> {
//!     let telephony = Arc::new(TelephonyFeed::new());
//!     let orchestrator = RedialOrchestrator::builder(Arc::new(PrintDialer), telephony)
//!         .timers(Arc::new(ManualTimerService::new()))
//!         .spawn()?;
//!
//!     orchestrator
//!         .start(RetryConfig::new("5551234").with_max_attempts(3).with_ring_timeout_secs(20))
//!         .await?;
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod dialer;
pub mod error;
pub mod events;
pub mod monitor;
pub mod orchestrator;
pub mod state_machine;
pub mod timer;
pub mod types;

// Re-export main types
pub use dialer::Dialer;
pub use error::{RedialError, RedialResult};
pub use events::{EventEmitter, EventStream, RedialEvent};
pub use monitor::{CallStateMonitor, TelephonyFeed, TelephonyHost};
pub use orchestrator::{OrchestratorBuilder, OrchestratorSnapshot, RedialOrchestrator};
pub use state_machine::{Action, MachineInput, RedialMachine};
pub use timer::{ManualTimerService, TimerCallback, TimerHandle, TimerService, TokioTimerService};
pub use types::{
    CallPhase, Capability, NativeCallState, RedialState, RedialStatus, RetryConfig, RunId,
    RunOutcome, RunState, StopReason, DEFAULT_MAX_ATTEMPTS, DEFAULT_RING_TIMEOUT_SECS,
    RETRY_COOLDOWN,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
