//! Redial state machine
//!
//! [`RedialMachine`] is the pure decision core of the orchestrator. It owns the
//! [`RunState`] and turns each [`MachineInput`] into a list of [`Action`]s
//! (dial, arm or cancel a timer, subscribe, publish a status) without
//! performing any of them. The orchestrator task executes the actions, which
//! keeps every transition testable without timers or a host.
//!
//! ```text
//!            start                 IDLE                cooldown fired
//!   Idle ───────────► Dialing ────────────► WaitingToRetry ─────────► Dialing
//!                       │  ▲                       │
//!             CONNECTED │  └─ ring timer: status   │ attempts exhausted
//!             or stop() ▼     only                 ▼
//!                    Stopped ◄─────────────────────┘
//! ```
//!
//! Timers are identified by a [`TimerToken`] that is never reused. A firing
//! whose token does not match the pending timer belongs to a cancelled timer
//! and is ignored.

use std::time::Duration;

use tracing::debug;

use crate::error::RedialResult;
use crate::types::{
    CallPhase, PendingTimer, RedialState, RedialStatus, RetryConfig, RunOutcome, RunState,
    StopReason, TimerKind, TimerToken, RETRY_COOLDOWN,
};

/// Everything that can drive the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineInput {
    Start(RetryConfig),
    CallState(CallPhase),
    TimerFired(TimerToken),
    Stop,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Subscribe to telephony state for the new run
    Subscribe,
    /// Drop the telephony subscription
    Unsubscribe,
    /// Invoke the dialer
    PlaceCall { number: String, attempt: u32 },
    /// Arm a single-shot timer
    ArmTimer {
        token: TimerToken,
        kind: TimerKind,
        delay: Duration,
    },
    /// Cancel a previously armed timer
    CancelTimer { token: TimerToken },
    /// Update the observable status
    Publish(RedialStatus),
    /// The run ended
    RunFinished { outcome: RunOutcome, dials_placed: u32 },
}

/// Redial run state machine
#[derive(Debug)]
pub struct RedialMachine {
    state: RedialState,
    status: RedialStatus,
    config: Option<RetryConfig>,
    run: RunState,
    cooldown: Duration,
    next_token: u64,
}

impl RedialMachine {
    pub fn new() -> Self {
        Self::with_cooldown(RETRY_COOLDOWN)
    }

    /// Machine with a non-standard cooldown between attempts
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            state: RedialState::Idle,
            status: RedialStatus::Idle,
            config: None,
            run: RunState::default(),
            cooldown,
            next_token: 0,
        }
    }

    pub fn state(&self) -> RedialState {
        self.state
    }

    pub fn status(&self) -> &RedialStatus {
        &self.status
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn config(&self) -> Option<&RetryConfig> {
        self.config.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.run.is_active
    }

    /// Apply one input and return the actions it requires
    ///
    /// Only `Start` can fail, with an invalid-input error and no actions.
    pub fn process(&mut self, input: MachineInput) -> RedialResult<Vec<Action>> {
        let mut actions = Vec::new();
        match input {
            MachineInput::Start(config) => self.start(config, &mut actions)?,
            MachineInput::CallState(phase) => self.call_state(phase, &mut actions),
            MachineInput::TimerFired(token) => self.timer_fired(token, &mut actions),
            MachineInput::Stop => self.stop(&mut actions),
        }
        Ok(actions)
    }

    fn start(&mut self, config: RetryConfig, actions: &mut Vec<Action>) -> RedialResult<()> {
        config.validate()?;

        if self.run.is_active {
            debug!("Restarting while a run is active, tearing down the old run");
            self.cancel_pending(actions);
            actions.push(Action::Unsubscribe);
        }

        self.run = RunState {
            is_active: true,
            ..RunState::default()
        };
        self.config = Some(config);
        actions.push(Action::Subscribe);
        self.dial(actions);
        Ok(())
    }

    fn call_state(&mut self, phase: CallPhase, actions: &mut Vec<Action>) {
        if !self.run.is_active {
            debug!("Ignoring {} with no active run", phase);
            return;
        }

        match (phase, self.state) {
            (CallPhase::Connected, _) => {
                self.cancel_pending(actions);
                self.finish(RunOutcome::Connected, actions);
            }
            (CallPhase::Idle, RedialState::Dialing) => {
                self.cancel_pending(actions);
                self.state = RedialState::WaitingToRetry;
                self.arm(TimerKind::Cooldown, self.cooldown, actions);
                let next_attempt = self.run.attempts_made.saturating_add(2);
                self.publish(RedialStatus::WaitingToRetry { next_attempt }, actions);
            }
            (CallPhase::Ringing, _) => {
                let attempt = self.current_attempt();
                self.publish(RedialStatus::Ringing { attempt }, actions);
            }
            (phase, state) => {
                debug!("Ignoring {} in state {:?}", phase, state);
            }
        }
    }

    fn timer_fired(&mut self, token: TimerToken, actions: &mut Vec<Action>) {
        let pending = match self.run.pending_timer {
            Some(pending) if pending.token == token && self.run.is_active => pending,
            _ => {
                debug!("Ignoring stale timer {:?}", token);
                return;
            }
        };
        self.run.pending_timer = None;

        match pending.kind {
            TimerKind::Ring => {
                let attempt = self.current_attempt();
                self.publish(RedialStatus::ManualHangupRequired { attempt }, actions);
            }
            TimerKind::Cooldown => {
                self.run.attempts_made += 1;
                if self.run.attempts_made >= self.max_attempts() {
                    self.finish(RunOutcome::LimitReached, actions);
                } else {
                    self.dial(actions);
                }
            }
        }
    }

    fn stop(&mut self, actions: &mut Vec<Action>) {
        match self.state {
            RedialState::Stopped => {}
            RedialState::Idle => {
                self.state = RedialState::Stopped;
                self.publish(
                    RedialStatus::Stopped {
                        reason: StopReason::Cancelled,
                    },
                    actions,
                );
            }
            RedialState::Dialing | RedialState::WaitingToRetry => {
                self.cancel_pending(actions);
                self.finish(RunOutcome::Cancelled, actions);
            }
        }
    }

    fn dial(&mut self, actions: &mut Vec<Action>) {
        let (number, ring_timeout, max_attempts) = match &self.config {
            Some(config) => (
                config.target_number.clone(),
                config.ring_timeout(),
                config.max_attempts,
            ),
            None => return,
        };

        self.state = RedialState::Dialing;
        self.run.dials_placed += 1;
        let attempt = self.current_attempt();
        actions.push(Action::PlaceCall { number, attempt });
        self.publish(
            RedialStatus::Dialing {
                attempt,
                max_attempts,
            },
            actions,
        );
        self.arm(TimerKind::Ring, ring_timeout, actions);
    }

    fn finish(&mut self, outcome: RunOutcome, actions: &mut Vec<Action>) {
        actions.push(Action::Unsubscribe);
        self.run.is_active = false;
        self.run.pending_timer = None;
        self.state = RedialState::Stopped;

        let status = match outcome {
            RunOutcome::LimitReached => RedialStatus::LimitReached {
                attempts: self.run.attempts_made,
            },
            RunOutcome::Connected => RedialStatus::Stopped {
                reason: StopReason::Connected,
            },
            RunOutcome::Cancelled => RedialStatus::Stopped {
                reason: StopReason::Cancelled,
            },
        };
        self.publish(status, actions);
        actions.push(Action::RunFinished {
            outcome,
            dials_placed: self.run.dials_placed,
        });
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration, actions: &mut Vec<Action>) {
        self.cancel_pending(actions);
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.run.pending_timer = Some(PendingTimer { token, kind });
        actions.push(Action::ArmTimer { token, kind, delay });
    }

    fn cancel_pending(&mut self, actions: &mut Vec<Action>) {
        if let Some(pending) = self.run.pending_timer.take() {
            actions.push(Action::CancelTimer {
                token: pending.token,
            });
        }
    }

    fn publish(&mut self, status: RedialStatus, actions: &mut Vec<Action>) {
        self.status = status.clone();
        actions.push(Action::Publish(status));
    }

    fn current_attempt(&self) -> u32 {
        self.run.attempts_made.saturating_add(1)
    }

    fn max_attempts(&self) -> u32 {
        self.config.as_ref().map(|c| c.max_attempts).unwrap_or(0)
    }
}

impl Default for RedialMachine {
    fn default() -> Self {
        Self::new()
    }
}
