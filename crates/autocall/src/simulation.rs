//! Simulated phone host
//!
//! [`SimulatedPhone`] stands in for a device: it places calls, reports
//! telephony state and renders an in-call screen with an end-call button.
//! Each outgoing call either gets answered or rings out according to a
//! [`PhoneScript`]. Clicking the end-call button hangs up the current call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autocall_call_ui_watcher::{UiAutomation, UiNode, WindowStateEvent};
use autocall_redial_core::{
    Capability, Dialer, NativeCallState, RedialError, RedialResult, TelephonyFeed, TelephonyHost,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the window notification channel
const WINDOW_EVENT_CAPACITY: usize = 32;

/// How the far end behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneScript {
    /// Attempt number that gets answered; `None` never answers
    pub answer_on_attempt: Option<u32>,
    /// How long an unanswered call rings before the far end gives up
    pub ring_for: Duration,
    /// How long an answered call rings before it connects
    pub answer_after: Duration,
    /// Package name reported for the in-call screen
    pub call_ui_package: String,
    /// View id of the rendered end-call button
    pub end_call_id: String,
}

impl Default for PhoneScript {
    fn default() -> Self {
        Self {
            answer_on_attempt: None,
            ring_for: Duration::from_secs(5),
            answer_after: Duration::from_secs(2),
            call_ui_package: autocall_call_ui_watcher::DEFAULT_CALL_UI_PACKAGE.to_string(),
            end_call_id: autocall_call_ui_watcher::DEFAULT_END_CALL_ID.to_string(),
        }
    }
}

impl PhoneScript {
    pub fn answer_on(mut self, attempt: u32) -> Self {
        self.answer_on_attempt = Some(attempt);
        self
    }

    pub fn with_ring_for(mut self, ring_for: Duration) -> Self {
        self.ring_for = ring_for;
        self
    }

    pub fn with_answer_after(mut self, answer_after: Duration) -> Self {
        self.answer_after = answer_after;
        self
    }
}

#[derive(Debug, Default)]
struct CallSlot {
    placed: Vec<String>,
    /// Id of the call on screen; ids count up from 1 per placed call
    active: Option<u64>,
    connected: bool,
    ended_by_click: u32,
}

struct PhoneInner {
    script: PhoneScript,
    feed: TelephonyFeed,
    call_permitted: AtomicBool,
    windows: mpsc::Sender<WindowStateEvent>,
    slot: Mutex<CallSlot>,
}

impl PhoneInner {
    /// The far end answered or gave up
    fn resolve(&self, call_id: u64, answered: bool) {
        let mut slot = self.slot.lock();
        if slot.active != Some(call_id) {
            return;
        }
        if answered {
            slot.connected = true;
            drop(slot);
            info!("Call {} answered", call_id);
            self.feed.publish(NativeCallState::OFFHOOK);
        } else {
            slot.active = None;
            drop(slot);
            info!("Call {} rang out", call_id);
            self.feed.publish(NativeCallState::IDLE);
        }
    }
}

/// Phone simulation implementing every host capability
#[derive(Clone)]
pub struct SimulatedPhone {
    inner: Arc<PhoneInner>,
}

impl SimulatedPhone {
    /// Create a phone and the window notification stream of its screen
    pub fn new(script: PhoneScript) -> (Self, mpsc::Receiver<WindowStateEvent>) {
        let (windows, rx) = mpsc::channel(WINDOW_EVENT_CAPACITY);
        let phone = Self {
            inner: Arc::new(PhoneInner {
                script,
                feed: TelephonyFeed::new(),
                call_permitted: AtomicBool::new(true),
                windows,
                slot: Mutex::new(CallSlot::default()),
            }),
        };
        (phone, rx)
    }

    /// Grant or revoke the call-placing capability
    pub fn set_call_permission(&self, granted: bool) {
        self.inner.call_permitted.store(granted, Ordering::SeqCst);
    }

    /// Grant or revoke phone-state access
    pub fn set_phone_state_permission(&self, granted: bool) {
        self.inner.feed.set_permission(granted);
    }

    /// Numbers dialed so far, in order
    pub fn placed_calls(&self) -> Vec<String> {
        self.inner.slot.lock().placed.clone()
    }

    /// Calls ended through the end-call button
    pub fn ended_by_click(&self) -> u32 {
        self.inner.slot.lock().ended_by_click
    }

    /// Whether a call is currently on screen
    pub fn in_call(&self) -> bool {
        self.inner.slot.lock().active.is_some()
    }

    /// Whether the current call was answered
    pub fn is_connected(&self) -> bool {
        let slot = self.inner.slot.lock();
        slot.active.is_some() && slot.connected
    }

    /// Hang up from the device side
    pub fn hang_up(&self) {
        let ended = self.inner.slot.lock().active.take().is_some();
        if ended {
            self.inner.feed.publish(NativeCallState::IDLE);
        }
    }

    pub fn current_state(&self) -> NativeCallState {
        self.inner.feed.current()
    }
}

#[async_trait]
impl Dialer for SimulatedPhone {
    async fn place_call(&self, number: &str) -> RedialResult<()> {
        if !self.inner.call_permitted.load(Ordering::SeqCst) {
            return Err(RedialError::capability_missing(Capability::PlaceCalls));
        }

        let call_id = {
            let mut slot = self.inner.slot.lock();
            slot.placed.push(number.to_string());
            let call_id = slot.placed.len() as u64;
            slot.active = Some(call_id);
            slot.connected = false;
            call_id
        };
        info!("Placing call {} to {}", call_id, number);
        self.inner.feed.publish(NativeCallState::RINGING);

        let script = &self.inner.script;
        let event = WindowStateEvent::window_state(script.call_ui_package.clone())
            .with_class_name("InCallActivity");
        if let Err(e) = self.inner.windows.try_send(event) {
            warn!("Dropped call screen notification: {}", e);
        }

        let answered = script.answer_on_attempt.map(u64::from) == Some(call_id);
        let delay = if answered {
            script.answer_after
        } else {
            script.ring_for
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.resolve(call_id, answered);
        });
        Ok(())
    }
}

impl TelephonyHost for SimulatedPhone {
    fn listen_call_state(&self) -> RedialResult<watch::Receiver<NativeCallState>> {
        self.inner.feed.listen_call_state()
    }
}

impl UiAutomation for SimulatedPhone {
    fn find_by_view_id(&self, view_id: &str) -> Vec<UiNode> {
        if view_id != self.inner.script.end_call_id {
            return Vec::new();
        }
        match self.inner.slot.lock().active {
            Some(call_id) => vec![UiNode::new(call_id, view_id, true)],
            None => Vec::new(),
        }
    }

    fn click(&self, node: &UiNode) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.active != Some(node.node_id) || node.view_id != self.inner.script.end_call_id {
            return false;
        }
        slot.active = None;
        slot.ended_by_click += 1;
        drop(slot);
        debug!("End-call button pressed for call {}", node.node_id);
        self.inner.feed.publish(NativeCallState::IDLE);
        true
    }
}
