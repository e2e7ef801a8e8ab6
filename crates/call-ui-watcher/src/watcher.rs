//! Call-termination watcher
//!
//! [`CallUiWatcher`] reacts to window-state notifications from the host
//! automation service. When the foregrounded package is the call screen it
//! looks up the termination control and clicks it if the control reports
//! itself clickable. A control that is absent or not rendered yet is not an
//! error: the notification is simply done with, and nothing is retried.
//!
//! The watcher does not talk to the redial orchestrator. At most it reads the
//! orchestrator's observable status when `active_run_only` is set. Because
//! both react to the same call independently, the watcher can end a call
//! long before the orchestrator's ring timeout would have expired, and there
//! is no ordering between the two.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use autocall_redial_core::{RedialStatus, TimerHandle, TimerService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::automation::{UiAutomation, WindowEventType, WindowStateEvent};
use crate::config::{TerminationPolicy, WatcherConfig};
use crate::error::{WatcherError, WatcherResult};

/// What a notification led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchOutcome {
    /// Watcher disabled, service not connected, or not a window-state change
    Ignored,
    /// The foregrounded surface is not the call screen
    NotCallSurface,
    /// `active_run_only` is set and no redial run is active
    NoActiveRun,
    /// Detected under the observe-only policy
    Observed,
    /// A deferred termination was armed
    Deferred,
    /// A deferred termination is already armed
    AlreadyPending,
    /// The termination control was clicked
    Terminated,
    /// No termination control in the active window
    ControlMissing,
    /// The control exists but is not clickable
    NotClickable,
    /// The host refused the click
    ClickRejected,
}

/// Counters since the watcher was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStats {
    pub detections: u64,
    pub terminations: u64,
    pub control_missing: u64,
    pub not_clickable: u64,
}

#[derive(Default)]
struct Counters {
    detections: AtomicU64,
    terminations: AtomicU64,
    control_missing: AtomicU64,
    not_clickable: AtomicU64,
}

struct WatcherInner {
    config: WatcherConfig,
    automation: Arc<dyn UiAutomation>,
    timers: Option<Arc<dyn TimerService>>,
    run_status: Option<watch::Receiver<RedialStatus>>,
    connected: AtomicBool,
    deferred: Mutex<Option<TimerHandle>>,
    counters: Counters,
}

/// Builder for [`CallUiWatcher`]
pub struct CallUiWatcherBuilder {
    config: WatcherConfig,
    automation: Arc<dyn UiAutomation>,
    timers: Option<Arc<dyn TimerService>>,
    run_status: Option<watch::Receiver<RedialStatus>>,
}

impl CallUiWatcherBuilder {
    /// Timer service used by the deferred policy
    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Observable orchestrator status consulted by `active_run_only`
    pub fn run_status(mut self, status: watch::Receiver<RedialStatus>) -> Self {
        self.run_status = Some(status);
        self
    }

    pub fn build(self) -> WatcherResult<CallUiWatcher> {
        self.config.validate()?;
        if matches!(self.config.policy, TerminationPolicy::Deferred { .. }) && self.timers.is_none() {
            return Err(WatcherError::TimerServiceRequired {
                policy: self.config.policy.to_string(),
            });
        }
        if self.config.active_run_only && self.run_status.is_none() {
            return Err(WatcherError::config(
                "active_run_only requires the orchestrator status channel",
            ));
        }

        Ok(CallUiWatcher {
            inner: Arc::new(WatcherInner {
                config: self.config,
                automation: self.automation,
                timers: self.timers,
                run_status: self.run_status,
                connected: AtomicBool::new(false),
                deferred: Mutex::new(None),
                counters: Counters::default(),
            }),
        })
    }
}

/// Observer of the host call screen
///
/// Inert until [`CallUiWatcher::on_service_connected`] is called by the host.
#[derive(Clone)]
pub struct CallUiWatcher {
    inner: Arc<WatcherInner>,
}

impl CallUiWatcher {
    pub fn builder(config: WatcherConfig, automation: Arc<dyn UiAutomation>) -> CallUiWatcherBuilder {
        CallUiWatcherBuilder {
            config,
            automation,
            timers: None,
            run_status: None,
        }
    }

    /// The host enabled the automation service
    pub fn on_service_connected(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        info!(
            "Call UI watcher connected (policy: {}, package: {})",
            self.inner.config.policy, self.inner.config.call_ui_package
        );
    }

    /// The host interrupted feedback; nothing is in flight to abandon
    pub fn on_interrupt(&self) {
        debug!("Call UI watcher interrupted");
    }

    /// The host disabled the automation service
    pub fn on_service_disconnected(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.deferred.lock().take() {
            handle.cancel();
        }
        info!("Call UI watcher disconnected");
    }

    /// Whether notifications are currently acted on
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    /// Whether a deferred termination is armed
    pub fn has_pending_termination(&self) -> bool {
        self.inner.deferred.lock().is_some()
    }

    pub fn stats(&self) -> WatcherStats {
        let counters = &self.inner.counters;
        WatcherStats {
            detections: counters.detections.load(Ordering::Relaxed),
            terminations: counters.terminations.load(Ordering::Relaxed),
            control_missing: counters.control_missing.load(Ordering::Relaxed),
            not_clickable: counters.not_clickable.load(Ordering::Relaxed),
        }
    }

    /// Handle one window notification
    pub fn on_window_state_changed(&self, event: &WindowStateEvent) -> WatchOutcome {
        let inner = &self.inner;
        if !inner.is_active() || event.event_type != WindowEventType::WindowStateChanged {
            return WatchOutcome::Ignored;
        }
        if event.package_name.as_deref() != Some(inner.config.call_ui_package.as_str()) {
            trace!("Foreground package {:?} is not the call UI", event.package_name);
            return WatchOutcome::NotCallSurface;
        }

        inner.counters.detections.fetch_add(1, Ordering::Relaxed);
        debug!("Call UI detected ({:?})", event.class_name);

        if !inner.run_permits() {
            debug!("No active redial run, leaving the call alone");
            return WatchOutcome::NoActiveRun;
        }

        match inner.config.policy {
            TerminationPolicy::Immediate => inner.terminate(),
            TerminationPolicy::ObserveOnly => WatchOutcome::Observed,
            TerminationPolicy::Deferred { delay_secs } => {
                self.defer(Duration::from_secs(delay_secs))
            }
        }
    }

    /// Run the watcher on its own task over a channel of host notifications
    pub fn spawn(&self, mut events: mpsc::Receiver<WindowStateEvent>) -> JoinHandle<()> {
        let watcher = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let outcome = watcher.on_window_state_changed(&event);
                trace!("Window event handled: {:?}", outcome);
            }
            debug!("Window event stream closed");
        })
    }

    fn defer(&self, delay: Duration) -> WatchOutcome {
        let timers = match &self.inner.timers {
            Some(timers) => timers,
            None => return WatchOutcome::Ignored,
        };

        let mut deferred = self.inner.deferred.lock();
        if deferred.is_some() {
            return WatchOutcome::AlreadyPending;
        }

        let inner = Arc::clone(&self.inner);
        let handle = timers.schedule(
            delay,
            Box::new(move || {
                inner.deferred.lock().take();
                if inner.is_active() && inner.run_permits() {
                    let outcome = inner.terminate();
                    debug!("Deferred termination: {:?}", outcome);
                }
            }),
        );
        *deferred = Some(handle);
        debug!("Call termination deferred by {:?}", delay);
        WatchOutcome::Deferred
    }
}

impl WatcherInner {
    fn is_active(&self) -> bool {
        self.config.enabled && self.connected.load(Ordering::SeqCst)
    }

    fn run_permits(&self) -> bool {
        if !self.config.active_run_only {
            return true;
        }
        self.run_status
            .as_ref()
            .map(|status| status.borrow().is_run_active())
            .unwrap_or(false)
    }

    fn terminate(&self) -> WatchOutcome {
        for view_id in &self.config.termination_control_ids {
            let node = match self.automation.find_by_view_id(view_id).into_iter().next() {
                Some(node) => node,
                None => continue,
            };

            if !node.clickable {
                self.counters.not_clickable.fetch_add(1, Ordering::Relaxed);
                debug!("Termination control {} is not clickable", view_id);
                return WatchOutcome::NotClickable;
            }
            if self.automation.click(&node) {
                self.counters.terminations.fetch_add(1, Ordering::Relaxed);
                info!("Ended call via {}", view_id);
                return WatchOutcome::Terminated;
            }
            debug!("Click on {} was rejected", view_id);
            return WatchOutcome::ClickRejected;
        }

        self.counters.control_missing.fetch_add(1, Ordering::Relaxed);
        debug!("No termination control in the active window");
        WatchOutcome::ControlMissing
    }
}
