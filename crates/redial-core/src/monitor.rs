//! Call-state monitoring
//!
//! [`CallStateMonitor`] adapts the host's telephony notifications into
//! [`CallPhase`] values for the orchestrator. The host exposes its state as a
//! latest-value [`watch`] channel, so nothing is buffered: when two
//! notifications arrive before the monitor gets to run, only the newer one is
//! forwarded. The state current at subscription time is treated as already
//! seen and is not replayed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{RedialError, RedialResult};
use crate::types::{CallPhase, Capability, NativeCallState};

/// Host source of telephony state notifications
pub trait TelephonyHost: Send + Sync {
    /// Start listening for call-state changes
    ///
    /// Fails with [`RedialError::CapabilityMissing`] when the host has not
    /// granted phone-state access.
    fn listen_call_state(&self) -> RedialResult<watch::Receiver<NativeCallState>>;
}

/// Subscription to the host telephony stream, active while a run is active
pub struct CallStateMonitor {
    host: Arc<dyn TelephonyHost>,
    listener: Option<JoinHandle<()>>,
}

impl CallStateMonitor {
    pub fn new(host: Arc<dyn TelephonyHost>) -> Self {
        Self {
            host,
            listener: None,
        }
    }

    /// Start forwarding normalized phases to `sink`
    ///
    /// Replaces any previous subscription. Must be called from within a Tokio
    /// runtime.
    pub fn subscribe<F>(&mut self, sink: F) -> RedialResult<()>
    where
        F: Fn(CallPhase) + Send + 'static,
    {
        self.unsubscribe();

        let mut rx = self.host.listen_call_state()?;
        rx.borrow_and_update();

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let native = *rx.borrow_and_update();
                match CallPhase::from_native(native) {
                    Some(phase) => {
                        debug!("Telephony state changed to {}", phase);
                        sink(phase);
                    }
                    None => debug!("Ignoring unknown native call state {}", native.0),
                }
            }
            debug!("Telephony state stream closed");
        });

        self.listener = Some(task);
        Ok(())
    }

    /// Stop forwarding; safe to call when not subscribed
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.listener.take() {
            task.abort();
            debug!("Unsubscribed from telephony state");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for CallStateMonitor {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A [`TelephonyHost`] fed by whoever owns it
///
/// Hosts that receive telephony callbacks publish them here; the permission
/// flag models the runtime-granted phone-state capability.
pub struct TelephonyFeed {
    tx: watch::Sender<NativeCallState>,
    permitted: AtomicBool,
}

impl TelephonyFeed {
    /// Create a feed that starts idle with phone-state access granted
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(NativeCallState::IDLE);
        Self {
            tx,
            permitted: AtomicBool::new(true),
        }
    }

    /// Publish a new host state, overwriting any undelivered one
    pub fn publish(&self, state: NativeCallState) {
        self.tx.send_replace(state);
    }

    /// Publish a normalized phase
    pub fn publish_phase(&self, phase: CallPhase) {
        self.publish(match phase {
            CallPhase::Idle => NativeCallState::IDLE,
            CallPhase::Ringing => NativeCallState::RINGING,
            CallPhase::Connected => NativeCallState::OFFHOOK,
        });
    }

    /// Grant or revoke phone-state access for later subscriptions
    pub fn set_permission(&self, granted: bool) {
        self.permitted.store(granted, Ordering::SeqCst);
    }

    /// Latest published state
    pub fn current(&self) -> NativeCallState {
        *self.tx.borrow()
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for TelephonyFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TelephonyHost for TelephonyFeed {
    fn listen_call_state(&self) -> RedialResult<watch::Receiver<NativeCallState>> {
        if !self.permitted.load(Ordering::SeqCst) {
            return Err(RedialError::capability_missing(Capability::ReadPhoneState));
        }
        Ok(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn monitor_with_sink(
        feed: &Arc<TelephonyFeed>,
    ) -> (CallStateMonitor, mpsc::UnboundedReceiver<CallPhase>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = CallStateMonitor::new(feed.clone());
        monitor
            .subscribe(move |phase| {
                let _ = tx.send(phase);
            })
            .unwrap();
        (monitor, rx)
    }

    #[tokio::test]
    async fn test_forwards_normalized_phases() {
        let feed = Arc::new(TelephonyFeed::new());
        let (_monitor, mut rx) = monitor_with_sink(&feed);

        feed.publish(NativeCallState::RINGING);
        assert_eq!(rx.recv().await, Some(CallPhase::Ringing));

        feed.publish(NativeCallState::OFFHOOK);
        assert_eq!(rx.recv().await, Some(CallPhase::Connected));
    }

    #[tokio::test]
    async fn test_later_notification_overwrites_earlier() {
        let feed = Arc::new(TelephonyFeed::new());
        let (_monitor, mut rx) = monitor_with_sink(&feed);

        // Both land before the listener task gets scheduled.
        feed.publish(NativeCallState::RINGING);
        feed.publish(NativeCallState::IDLE);

        assert_eq!(rx.recv().await, Some(CallPhase::Idle));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_current_state_not_replayed_and_unknown_ignored() {
        let feed = Arc::new(TelephonyFeed::new());
        feed.publish(NativeCallState::OFFHOOK);
        let (_monitor, mut rx) = monitor_with_sink(&feed);

        feed.publish(NativeCallState(42));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        feed.publish(NativeCallState::IDLE);
        assert_eq!(rx.recv().await, Some(CallPhase::Idle));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_forwarding() {
        let feed = Arc::new(TelephonyFeed::new());
        let (mut monitor, mut rx) = monitor_with_sink(&feed);
        assert!(monitor.is_subscribed());

        monitor.unsubscribe();
        monitor.unsubscribe();
        assert!(!monitor.is_subscribed());

        feed.publish(NativeCallState::RINGING);
        // The aborted task drops its sender, closing the channel.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_missing_permission_is_reported() {
        let feed = Arc::new(TelephonyFeed::new());
        feed.set_permission(false);

        let mut monitor = CallStateMonitor::new(feed.clone());
        let err = monitor.subscribe(|_| {}).unwrap_err();
        assert_eq!(err.missing_capability(), Some(Capability::ReadPhoneState));
        assert!(!monitor.is_subscribed());
    }
}
