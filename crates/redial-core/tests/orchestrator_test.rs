//! Integration tests for the redial orchestrator
//!
//! Timers run on a virtual clock so every transition is driven explicitly.

use async_trait::async_trait;
use autocall_redial_core::{
    CallPhase, Capability, Dialer, ManualTimerService, NativeCallState, RedialError,
    RedialEvent, RedialOrchestrator, RedialResult, RedialState, RedialStatus, RetryConfig,
    RunOutcome, StopReason, TelephonyFeed,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RecordingDialer {
    calls: Mutex<Vec<String>>,
    denied: AtomicBool,
}

impl RecordingDialer {
    fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn place_call(&self, number: &str) -> RedialResult<()> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(RedialError::capability_missing(Capability::PlaceCalls));
        }
        self.calls.lock().push(number.to_string());
        Ok(())
    }
}

struct Harness {
    dialer: Arc<RecordingDialer>,
    telephony: Arc<TelephonyFeed>,
    timers: ManualTimerService,
    orchestrator: RedialOrchestrator,
}

impl Harness {
    fn new() -> Self {
        let dialer = Arc::new(RecordingDialer::default());
        let telephony = Arc::new(TelephonyFeed::new());
        let timers = ManualTimerService::new();
        let orchestrator = RedialOrchestrator::builder(dialer.clone(), telephony.clone())
            .timers(Arc::new(timers.clone()))
            .spawn()
            .expect("spawn orchestrator");
        Self {
            dialer,
            telephony,
            timers,
            orchestrator,
        }
    }

    /// Let forwarded notifications and timer commands reach the control task
    async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        self.orchestrator.snapshot().await.expect("snapshot");
    }

    /// Push a host telephony notification through the monitor
    async fn host_state(&self, state: NativeCallState) {
        self.telephony.publish(state);
        self.settle().await;
    }

    async fn advance(&self, by: Duration) {
        self.timers.advance(by);
        self.settle().await;
    }
}

fn scenario_config() -> RetryConfig {
    RetryConfig::new("5551234")
        .with_max_attempts(3)
        .with_ring_timeout_secs(1)
}

#[tokio::test]
async fn test_unanswered_calls_redial_until_limit() {
    let h = Harness::new();
    let mut events = h.orchestrator.event_receiver();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;

    for attempt in 1..=3 {
        assert_eq!(h.dialer.count(), attempt);
        h.host_state(NativeCallState::RINGING).await;
        assert_eq!(h.orchestrator.status(), RedialStatus::Ringing { attempt: attempt as u32 });
        h.host_state(NativeCallState::IDLE).await;
        assert_eq!(h.orchestrator.snapshot().await.unwrap().state, RedialState::WaitingToRetry);
        h.advance(COOLDOWN).await;
    }

    assert_eq!(h.dialer.count(), 3);
    assert!(h.dialer.calls.lock().iter().all(|n| n == "5551234"));
    assert_eq!(h.orchestrator.status().to_string(), "limit reached");

    let snapshot = h.orchestrator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, RedialState::Stopped);
    assert_eq!(snapshot.run_state.attempts_made, 3);
    assert!(!snapshot.run_state.is_active);
    assert!(snapshot.run_state.pending_timer.is_none());
    assert_eq!(h.timers.pending(), 0);
    assert_eq!(h.telephony.listener_count(), 0);

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let RedialEvent::RunFinished { outcome, dials_placed, .. } = event {
            finished = Some((outcome, dials_placed));
        }
    }
    assert_eq!(finished, Some((RunOutcome::LimitReached, 3)));
}

#[tokio::test]
async fn test_connected_after_second_attempt_stops_for_good() {
    let h = Harness::new();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;

    h.host_state(NativeCallState::IDLE).await;
    h.advance(COOLDOWN).await;
    assert_eq!(h.dialer.count(), 2);

    h.host_state(NativeCallState::OFFHOOK).await;
    assert_eq!(
        h.orchestrator.status(),
        RedialStatus::Stopped {
            reason: StopReason::Connected
        }
    );
    assert_eq!(h.orchestrator.status().to_string(), "stopped");

    // The user hangs up later; nothing is redialed.
    h.orchestrator.on_call_state_changed(CallPhase::Idle).await.unwrap();
    h.host_state(NativeCallState::IDLE).await;
    h.advance(Duration::from_secs(60)).await;
    assert_eq!(h.dialer.count(), 2);
    assert_eq!(h.orchestrator.snapshot().await.unwrap().state, RedialState::Stopped);
}

#[tokio::test]
async fn test_ring_timeout_requests_manual_hangup() {
    let h = Harness::new();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;

    h.advance(Duration::from_secs(1)).await;
    assert_eq!(
        h.orchestrator.status(),
        RedialStatus::ManualHangupRequired { attempt: 1 }
    );
    assert_eq!(h.orchestrator.status().to_string(), "manual hang-up required");

    // Waiting longer does not dial again without an idle notification.
    h.advance(Duration::from_secs(30)).await;
    assert_eq!(h.dialer.count(), 1);
    assert_eq!(h.orchestrator.snapshot().await.unwrap().run_state.attempts_made, 0);
}

#[tokio::test]
async fn test_stop_during_cooldown_prevents_next_dial() {
    let h = Harness::new();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;
    h.host_state(NativeCallState::IDLE).await;
    assert_eq!(h.timers.pending(), 1);

    h.orchestrator.stop().await.unwrap();
    h.orchestrator.stop().await.unwrap();
    assert_eq!(h.timers.pending(), 0);

    h.advance(Duration::from_secs(10)).await;
    assert_eq!(h.dialer.count(), 1);
    assert_eq!(
        h.orchestrator.status(),
        RedialStatus::Stopped {
            reason: StopReason::Cancelled
        }
    );
}

#[tokio::test]
async fn test_idle_published_between_runs_is_not_replayed() {
    let h = Harness::new();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.orchestrator.stop().await.unwrap();

    // Published after the old subscription ended; the new run must not see it.
    h.telephony.publish(NativeCallState::IDLE);
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;

    let snapshot = h.orchestrator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, RedialState::Dialing);
    assert_eq!(h.dialer.count(), 2);
}

#[tokio::test]
async fn test_restart_resets_attempts() {
    let h = Harness::new();
    let first = h.orchestrator.start(scenario_config()).await.unwrap();
    h.settle().await;
    h.host_state(NativeCallState::IDLE).await;
    h.advance(COOLDOWN).await;
    assert_eq!(h.orchestrator.snapshot().await.unwrap().run_state.attempts_made, 1);

    h.orchestrator.stop().await.unwrap();
    let second = h.orchestrator.start(scenario_config()).await.unwrap();
    assert_ne!(first, second);

    let snapshot = h.orchestrator.snapshot().await.unwrap();
    assert_eq!(snapshot.run_state.attempts_made, 0);
    assert_eq!(snapshot.run_state.dials_placed, 1);
    assert_eq!(snapshot.run_id, Some(second));
}

#[tokio::test]
async fn test_empty_number_is_rejected_without_dialing() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .start(RetryConfig::new("").with_max_attempts(3))
        .await
        .unwrap_err();
    assert!(matches!(err, RedialError::InvalidInput { .. }));

    h.settle().await;
    assert_eq!(h.dialer.count(), 0);
    assert_eq!(h.orchestrator.status(), RedialStatus::Idle);
    assert_eq!(h.telephony.listener_count(), 0);
}

#[tokio::test]
async fn test_missing_capabilities_are_noticed_once() {
    let h = Harness::new();
    h.dialer.denied.store(true, Ordering::SeqCst);
    h.telephony.set_permission(false);
    let mut events = h.orchestrator.event_receiver();

    h.orchestrator.start(scenario_config()).await.unwrap();
    h.orchestrator.on_call_state_changed(CallPhase::Idle).await.unwrap();
    h.advance(COOLDOWN).await;

    let notices: Vec<Capability> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            RedialEvent::Notice { capability, .. } => Some(capability),
            _ => None,
        })
        .collect();
    assert_eq!(notices.len(), 2);
    assert!(notices.contains(&Capability::PlaceCalls));
    assert!(notices.contains(&Capability::ReadPhoneState));

    // The run keeps going; only the affected components are inert.
    assert_eq!(
        h.orchestrator.status(),
        RedialStatus::Dialing {
            attempt: 2,
            max_attempts: 3
        }
    );
}

#[tokio::test]
async fn test_shutdown_ends_control_task() {
    let h = Harness::new();
    h.orchestrator.start(scenario_config()).await.unwrap();
    h.orchestrator.shutdown().await.unwrap();

    assert_eq!(h.timers.pending(), 0);
    let err = h.orchestrator.snapshot().await.unwrap_err();
    assert_eq!(err, RedialError::NotRunning);
}

#[tokio::test(start_paused = true)]
async fn test_tokio_timers_drive_full_run() {
    let dialer = Arc::new(RecordingDialer::default());
    let telephony = Arc::new(TelephonyFeed::new());
    let orchestrator = RedialOrchestrator::builder(dialer.clone(), telephony.clone())
        .spawn()
        .unwrap();
    let mut status = orchestrator.status_watch();

    orchestrator
        .start(RetryConfig::new("5551234").with_max_attempts(2).with_ring_timeout_secs(5))
        .await
        .unwrap();

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        telephony.publish(NativeCallState::IDLE);
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    let last = status.wait_for(|s| s.is_terminal()).await.unwrap().clone();
    assert_eq!(last, RedialStatus::LimitReached { attempts: 2 });
    assert_eq!(dialer.count(), 2);
}
