//! Redial orchestration
//!
//! The [`RedialOrchestrator`] is a handle to a control task that owns the
//! [`RedialMachine`] and is the only place run state is mutated. User
//! commands, call-state notifications from the [`CallStateMonitor`] and timer
//! callbacks are all sent to that task over one channel and handled in
//! arrival order, so a just-armed timer and an incoming idle notification can
//! never race on the run state.
//!
//! Notifications from an earlier telephony subscription carry a stale
//! subscription number and are dropped, and timer firings for cancelled
//! timers are ignored by the machine, so nothing queued before `stop()` can
//! act on a later run.
//!
//! The call-UI watcher is not wired in here. It reacts to the
//! host call screen on its own and may end a call before the ring timeout
//! expires; no ordering between the two is guaranteed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use autocall_redial_core::{
//!     Dialer, RedialOrchestrator, RedialResult, RetryConfig, TelephonyFeed,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct HostDialer;
//!
//! #[async_trait]
//! impl Dialer for HostDialer {
//!     async fn place_call(&self, number: &str) -> RedialResult<()> {
//!         println!("dialing {}", number);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> RedialResult<()> {
//! let telephony = Arc::new(TelephonyFeed::new());
//! let orchestrator = RedialOrchestrator::builder(Arc::new(HostDialer), telephony.clone()).spawn()?;
//!
//! orchestrator.start(RetryConfig::new("5551234").with_max_attempts(3)).await?;
//! println!("status: {}", orchestrator.status());
//! orchestrator.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::dialer::Dialer;
use crate::error::{RedialError, RedialResult};
use crate::events::{EventEmitter, EventStream, RedialEvent};
use crate::monitor::{CallStateMonitor, TelephonyHost};
use crate::state_machine::{Action, MachineInput, RedialMachine};
use crate::timer::{TimerHandle, TimerService, TokioTimerService};
use crate::types::{
    CallPhase, Capability, RedialState, RedialStatus, RetryConfig, RunId, RunState, TimerToken,
    RETRY_COOLDOWN,
};

/// Events buffered per subscriber before it starts lagging
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSnapshot {
    pub state: RedialState,
    pub status: RedialStatus,
    pub run_state: RunState,
    pub config: Option<RetryConfig>,
    pub run_id: Option<RunId>,
}

enum Command {
    Start {
        config: RetryConfig,
        reply: oneshot::Sender<RedialResult<RunId>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    CallState {
        phase: CallPhase,
        subscription: Option<u64>,
        reply: Option<oneshot::Sender<()>>,
    },
    TimerFired(TimerToken),
    Snapshot {
        reply: oneshot::Sender<OrchestratorSnapshot>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Builder for [`RedialOrchestrator`]
pub struct OrchestratorBuilder {
    dialer: Arc<dyn Dialer>,
    telephony: Arc<dyn TelephonyHost>,
    timers: Option<Arc<dyn TimerService>>,
    cooldown: Duration,
    event_capacity: usize,
}

impl OrchestratorBuilder {
    /// Use a specific timer service (defaults to Tokio timers)
    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Override the delay between a call going idle and the next attempt
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Capacity of the broadcast event channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the control task on the current Tokio runtime
    ///
    /// Fails with [`RedialError::Configuration`] for a zero cooldown or event
    /// capacity.
    pub fn spawn(self) -> RedialResult<RedialOrchestrator> {
        if self.cooldown.is_zero() {
            return Err(RedialError::config("retry cooldown must be non-zero"));
        }
        if self.event_capacity == 0 {
            return Err(RedialError::config("event capacity must be at least 1"));
        }
        let runtime = Handle::try_current()
            .map_err(|e| RedialError::internal(format!("no Tokio runtime available: {}", e)))?;
        let timers = match self.timers {
            Some(timers) => timers,
            None => Arc::new(TokioTimerService::new(runtime.clone())),
        };

        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RedialStatus::Idle);
        let events = EventEmitter::new(self.event_capacity);

        let task = ControlTask {
            machine: RedialMachine::with_cooldown(self.cooldown),
            dialer: self.dialer,
            timers,
            monitor: CallStateMonitor::new(self.telephony),
            pending_timer: None,
            commands: commands.clone(),
            status: status_tx,
            events: events.clone(),
            run_id: None,
            subscription: 0,
            notified: HashSet::new(),
        };
        runtime.spawn(task.run(receiver));

        Ok(RedialOrchestrator {
            commands,
            status: status_rx,
            events,
        })
    }
}

/// Handle to a running redial control task
///
/// Dropping the handle stops any active run and ends the task.
pub struct RedialOrchestrator {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<RedialStatus>,
    events: EventEmitter,
}

impl std::fmt::Debug for RedialOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedialOrchestrator")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl RedialOrchestrator {
    /// Start configuring an orchestrator
    pub fn builder(dialer: Arc<dyn Dialer>, telephony: Arc<dyn TelephonyHost>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            dialer,
            telephony,
            timers: None,
            cooldown: RETRY_COOLDOWN,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Start a new run, replacing any active one
    ///
    /// Fails with [`RedialError::InvalidInput`] when the target number is empty
    /// or a limit is zero; in that case nothing is dialed.
    pub async fn start(&self, config: RetryConfig) -> RedialResult<RunId> {
        self.request(|reply| Command::Start { config, reply }).await?
    }

    /// Cancel the active run; calling it again has no effect
    pub async fn stop(&self) -> RedialResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Deliver a call-state transition to the current run
    ///
    /// Hosts that push telephony state directly instead of through a
    /// [`TelephonyHost`] use this entry point.
    pub async fn on_call_state_changed(&self, phase: CallPhase) -> RedialResult<()> {
        self.request(|reply| Command::CallState {
            phase,
            subscription: None,
            reply: Some(reply),
        })
        .await
    }

    /// Current state, run bookkeeping and configuration
    ///
    /// Answered after every command sent before it has been handled.
    pub async fn snapshot(&self) -> RedialResult<OrchestratorSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop any run and end the control task
    pub async fn shutdown(&self) -> RedialResult<()> {
        self.request(|reply| Command::Shutdown { reply: Some(reply) }).await
    }

    /// Latest observable status
    pub fn status(&self) -> RedialStatus {
        self.status.borrow().clone()
    }

    /// Latest-value channel of the observable status
    pub fn status_watch(&self) -> watch::Receiver<RedialStatus> {
        self.status.clone()
    }

    /// Subscribe to orchestrator events
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Subscribe to orchestrator events with a plain broadcast receiver
    pub fn event_receiver(&self) -> tokio::sync::broadcast::Receiver<RedialEvent> {
        self.events.receiver()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> RedialResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| RedialError::NotRunning)?;
        rx.await.map_err(|_| RedialError::NotRunning)
    }
}

impl Drop for RedialOrchestrator {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown { reply: None });
    }
}

struct ControlTask {
    machine: RedialMachine,
    dialer: Arc<dyn Dialer>,
    timers: Arc<dyn TimerService>,
    monitor: CallStateMonitor,
    pending_timer: Option<(TimerToken, TimerHandle)>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Sender<RedialStatus>,
    events: EventEmitter,
    run_id: Option<RunId>,
    subscription: u64,
    notified: HashSet<Capability>,
}

impl ControlTask {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!("Redial control task started");

        while let Some(command) = receiver.recv().await {
            match command {
                Command::Start { config, reply } => {
                    let result = self.start(config).await;
                    let _ = reply.send(result);
                }
                Command::Stop { reply } => {
                    self.apply(MachineInput::Stop).await;
                    let _ = reply.send(());
                }
                Command::CallState {
                    phase,
                    subscription,
                    reply,
                } => {
                    match subscription {
                        Some(number) if number != self.subscription => {
                            debug!("Dropping {} from stale subscription {}", phase, number);
                        }
                        _ => self.apply(MachineInput::CallState(phase)).await,
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }
                Command::TimerFired(token) => {
                    if matches!(&self.pending_timer, Some((pending, _)) if *pending == token) {
                        self.pending_timer = None;
                    }
                    self.apply(MachineInput::TimerFired(token)).await;
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown { reply } => {
                    self.apply(MachineInput::Stop).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    break;
                }
            }
        }

        self.monitor.unsubscribe();
        if let Some((_, handle)) = self.pending_timer.take() {
            handle.cancel();
        }
        debug!("Redial control task finished");
    }

    async fn start(&mut self, config: RetryConfig) -> RedialResult<RunId> {
        let number = config.target_number.clone();
        let max_attempts = config.max_attempts;

        let actions = match self.machine.process(MachineInput::Start(config)) {
            Ok(actions) => actions,
            Err(e) => {
                warn!("Refusing to start redial run: {}", e);
                return Err(e);
            }
        };

        let run_id = RunId::new();
        self.run_id = Some(run_id);
        info!(
            "Starting redial run {} to {} (max {} attempts)",
            run_id, number, max_attempts
        );
        self.events.emit(RedialEvent::RunStarted {
            run_id,
            target_number: number,
            max_attempts,
        });

        self.execute(actions).await;
        Ok(run_id)
    }

    async fn apply(&mut self, input: MachineInput) {
        match self.machine.process(input) {
            Ok(actions) => self.execute(actions).await,
            Err(e) => warn!("Redial transition rejected: {}", e),
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Subscribe => self.subscribe(),
                Action::Unsubscribe => {
                    self.subscription += 1;
                    self.monitor.unsubscribe();
                }
                Action::PlaceCall { number, attempt } => self.place_call(&number, attempt).await,
                Action::ArmTimer { token, kind, delay } => {
                    if let Some((_, previous)) = self.pending_timer.take() {
                        previous.cancel();
                    }
                    debug!("Arming {:?} timer {:?} for {:?}", kind, token, delay);
                    let commands = self.commands.clone();
                    let handle = self.timers.schedule(
                        delay,
                        Box::new(move || {
                            let _ = commands.send(Command::TimerFired(token));
                        }),
                    );
                    self.pending_timer = Some((token, handle));
                }
                Action::CancelTimer { token } => match self.pending_timer.take() {
                    Some((pending, handle)) if pending == token => {
                        debug!("Cancelled timer {:?}", token);
                        handle.cancel();
                    }
                    other => self.pending_timer = other,
                },
                Action::Publish(status) => {
                    debug!("Status: {}", status);
                    self.status.send_replace(status.clone());
                    self.events.emit(RedialEvent::StatusChanged {
                        run_id: self.run_id,
                        status,
                    });
                }
                Action::RunFinished {
                    outcome,
                    dials_placed,
                } => {
                    if let Some(run_id) = self.run_id {
                        info!(
                            "Redial run {} finished: {:?} after {} dial(s)",
                            run_id, outcome, dials_placed
                        );
                        self.events.emit(RedialEvent::RunFinished {
                            run_id,
                            outcome,
                            dials_placed,
                        });
                    }
                }
            }
        }
    }

    fn subscribe(&mut self) {
        self.subscription += 1;
        let subscription = self.subscription;
        let commands = self.commands.clone();

        let result = self.monitor.subscribe(move |phase| {
            let _ = commands.send(Command::CallState {
                phase,
                subscription: Some(subscription),
                reply: None,
            });
        });
        if let Err(e) = result {
            self.report_failure(e);
        }
    }

    async fn place_call(&mut self, number: &str, attempt: u32) {
        info!("Placing call to {} (attempt {})", number, attempt);
        match self.dialer.place_call(number).await {
            Ok(()) => {
                if let Some(run_id) = self.run_id {
                    self.events.emit(RedialEvent::DialPlaced {
                        run_id,
                        attempt,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => self.report_failure(e),
        }
    }

    fn report_failure(&mut self, error: RedialError) {
        match error.missing_capability() {
            Some(capability) if self.notified.insert(capability) => {
                warn!("{}; the affected component stays inactive", error);
                self.events.emit(RedialEvent::Notice {
                    capability,
                    message: format!("Permission required: {}", capability),
                });
            }
            Some(capability) => debug!("Still missing capability: {}", capability),
            None => warn!("Host call failed: {}", error),
        }
    }

    fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            state: self.machine.state(),
            status: self.machine.status().clone(),
            run_state: self.machine.run_state().clone(),
            config: self.machine.config().cloned(),
            run_id: self.run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::TelephonyFeed;
    use crate::timer::ManualTimerService;
    use crate::types::{CallPhase, Capability, PendingTimer, RedialState, RetryConfig, TimerKind};
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};
    use tracing_test::traced_test;

    struct NoPermission;

    #[async_trait]
    impl Dialer for NoPermission {
        async fn place_call(&self, _number: &str) -> RedialResult<()> {
            Err(RedialError::capability_missing(Capability::PlaceCalls))
        }
    }

    struct AcceptingDialer;

    #[async_trait]
    impl Dialer for AcceptingDialer {
        async fn place_call(&self, _number: &str) -> RedialResult<()> {
            Ok(())
        }
    }

    async fn deliver(orchestrator: &RedialOrchestrator, phase: CallPhase, subscription: u64) {
        let (reply, done) = oneshot::channel();
        orchestrator
            .commands
            .send(Command::CallState {
                phase,
                subscription: Some(subscription),
                reply: Some(reply),
            })
            .unwrap();
        done.await.unwrap();
    }

    fn orchestrator() -> RedialOrchestrator {
        RedialOrchestrator::builder(Arc::new(NoPermission), Arc::new(TelephonyFeed::new()))
            .timers(Arc::new(ManualTimerService::new()))
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_dial_capability_is_logged_once() {
        let orchestrator = orchestrator();
        let config = RetryConfig::new("5551234").with_max_attempts(2);
        assert_ok!(orchestrator.start(config.clone()).await);
        assert_ok!(orchestrator.start(config).await);
        assert_ok!(orchestrator.snapshot().await);

        assert!(logs_contain("Missing capability: place calls"));
        assert!(logs_contain("Still missing capability: place calls"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("stays inactive")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let orchestrator = orchestrator();
        assert_ok!(orchestrator.shutdown().await);
        assert_err!(orchestrator.stop().await);
        assert_err!(orchestrator.on_call_state_changed(CallPhase::Idle).await);
    }

    #[tokio::test]
    async fn test_notification_from_previous_subscription_is_dropped() {
        let timers = ManualTimerService::new();
        let orchestrator =
            RedialOrchestrator::builder(Arc::new(AcceptingDialer), Arc::new(TelephonyFeed::new()))
                .timers(Arc::new(timers.clone()))
                .spawn()
                .unwrap();
        let config = RetryConfig::new("5551234").with_max_attempts(3);

        // Subscription 1 belongs to the first run; stopping ends it and a
        // restart subscribes again as 3.
        assert_ok!(orchestrator.start(config.clone()).await);
        assert_ok!(orchestrator.stop().await);
        assert_ok!(orchestrator.start(config).await);

        for old in [1, 2] {
            deliver(&orchestrator, CallPhase::Idle, old).await;
            deliver(&orchestrator, CallPhase::Connected, old).await;
        }
        let snapshot = orchestrator.snapshot().await.unwrap();
        assert_eq!(snapshot.state, RedialState::Dialing);
        assert!(matches!(
            snapshot.run_state.pending_timer,
            Some(PendingTimer { kind: TimerKind::Ring, .. })
        ));
        assert_eq!(timers.pending(), 1);

        deliver(&orchestrator, CallPhase::Idle, 3).await;
        let snapshot = orchestrator.snapshot().await.unwrap();
        assert_eq!(snapshot.state, RedialState::WaitingToRetry);
        assert!(matches!(
            snapshot.run_state.pending_timer,
            Some(PendingTimer { kind: TimerKind::Cooldown, .. })
        ));
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_settings() {
        let build = || RedialOrchestrator::builder(Arc::new(AcceptingDialer), Arc::new(TelephonyFeed::new()));

        let err = build().cooldown(Duration::ZERO).spawn().unwrap_err();
        assert!(matches!(err, RedialError::Configuration { .. }));
        let err = build().event_capacity(0).spawn().unwrap_err();
        assert!(matches!(err, RedialError::Configuration { .. }));
        assert_ok!(build().event_capacity(1).spawn());
    }
}
