//! # Call UI Watcher
//!
//! Watches host window-state notifications for the in-call screen and
//! activates its termination control. Runs independently of the redial
//! orchestrator; see [`watcher`] for what that means for ordering.
//!
//! ```rust
//! use autocall_call_ui_watcher::{CallUiWatcher, UiAutomation, UiNode, WatchOutcome, WatcherConfig, WindowStateEvent};
//! use std::sync::Arc;
//!
//! struct NoWindow;
//!
//! impl UiAutomation for NoWindow {
//!     fn find_by_view_id(&self, _view_id: &str) -> Vec<UiNode> {
//!         Vec::new()
//!     }
//!     fn click(&self, _node: &UiNode) -> bool {
//!         false
//!     }
//! }
//!
//! let watcher = CallUiWatcher::builder(WatcherConfig::default(), Arc::new(NoWindow))
//!     .build()
//!     .unwrap();
//! watcher.on_service_connected();
//!
//! let outcome = watcher.on_window_state_changed(&WindowStateEvent::window_state("com.android.incallui"));
//! assert_eq!(outcome, WatchOutcome::ControlMissing);
//! ```

pub mod automation;
pub mod config;
pub mod error;
pub mod watcher;

pub use automation::{UiAutomation, UiNode, WindowEventType, WindowStateEvent};
pub use config::{TerminationPolicy, WatcherConfig, DEFAULT_CALL_UI_PACKAGE, DEFAULT_END_CALL_ID};
pub use error::{WatcherError, WatcherResult};
pub use watcher::{CallUiWatcher, CallUiWatcherBuilder, WatchOutcome, WatcherStats};
