//! Single-shot, cancellable timers behind an injectable service
//!
//! The orchestrator never sleeps itself. It asks a [`TimerService`] to run a
//! callback after a delay and keeps the returned [`TimerHandle`] so the timer
//! can be cancelled before it is re-armed.
//!
//! - [`TokioTimerService`] spawns a sleeping task per timer on a Tokio runtime.
//! - [`ManualTimerService`] keeps a virtual clock that only moves when
//!   [`ManualTimerService::advance`] is called, which makes timer-driven
//!   transitions testable without wall-clock waits.
//!
//! ```rust
//! use autocall_redial_core::timer::{ManualTimerService, TimerService};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let timers = ManualTimerService::new();
//! let fired = Arc::new(AtomicBool::new(false));
//! let flag = fired.clone();
//! let _handle = timers.schedule(Duration::from_secs(2), Box::new(move || {
//!     flag.store(true, Ordering::SeqCst);
//! }));
//!
//! assert_eq!(timers.advance(Duration::from_secs(1)), 0);
//! assert_eq!(timers.advance(Duration::from_secs(1)), 1);
//! assert!(fired.load(Ordering::SeqCst));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::trace;

use crate::error::{RedialError, RedialResult};

/// Work run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules single-shot callbacks
pub trait TimerService: Send + Sync {
    /// Run `callback` once after `delay`
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Cancellation handle for a scheduled timer
///
/// Dropping the handle detaches the timer; only [`TimerHandle::cancel`]
/// prevents it from firing. Cancelling a timer that already fired does nothing.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    /// Create a handle from the service-specific cancel operation
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Prevent the timer from firing if it has not fired yet
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Timers backed by `tokio::time::sleep`
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    runtime: Handle,
}

impl TokioTimerService {
    /// Use an explicit runtime handle
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling context
    pub fn from_current() -> RedialResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| RedialError::internal(format!("no Tokio runtime available: {}", e)))
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

struct ManualEntry {
    id: u64,
    deadline: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    entries: Vec<ManualEntry>,
}

/// Virtual-clock timers for deterministic tests and simulations
#[derive(Clone, Default)]
pub struct ManualTimerService {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of timers armed and not yet fired or cancelled
    pub fn pending(&self) -> usize {
        self.clock.lock().entries.len()
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<Duration> {
        self.clock.lock().entries.iter().map(|e| e.deadline).min()
    }

    /// Move the clock forward, firing every timer that falls due in deadline order
    ///
    /// Callbacks run without the clock lock held, so they may schedule or
    /// cancel timers; newly scheduled timers due within the window fire too.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.lock().now + by;
        let mut fired = 0;

        loop {
            let due = {
                let mut clock = self.clock.lock();
                let next = clock
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.deadline <= target)
                    .min_by_key(|(_, e)| (e.deadline, e.id))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let entry = clock.entries.remove(index);
                        clock.now = entry.deadline;
                        Some(entry)
                    }
                    None => None,
                }
            };

            match due {
                Some(entry) => {
                    trace!("manual timer {} fired at {:?}", entry.id, entry.deadline);
                    (entry.callback)();
                    fired += 1;
                }
                None => break,
            }
        }

        self.clock.lock().now = target;
        fired
    }
}

impl TimerService for ManualTimerService {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = {
            let mut clock = self.clock.lock();
            let id = clock.next_id;
            clock.next_id += 1;
            let deadline = clock.now + delay;
            clock.entries.push(ManualEntry {
                id,
                deadline,
                callback,
            });
            id
        };

        let clock = Arc::downgrade(&self.clock);
        TimerHandle::new(move || {
            if let Some(clock) = clock.upgrade() {
                clock.lock().entries.retain(|e| e.id != id);
            }
        })
    }
}

impl fmt::Debug for ManualTimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualTimerService")
            .field("now", &clock.now)
            .field("pending", &clock.entries.len())
            .finish()
    }
}
