//! Event system for the redial orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{Capability, RedialStatus, RunId, RunOutcome};

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedialEvent {
    /// A run was started
    RunStarted {
        run_id: RunId,
        target_number: String,
        max_attempts: u32,
    },

    /// The dialer was invoked
    DialPlaced {
        run_id: RunId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// The observable status changed
    StatusChanged {
        run_id: Option<RunId>,
        status: RedialStatus,
    },

    /// A run ended
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        dials_placed: u32,
    },

    /// User-visible notice about a missing host capability, sent once per capability
    Notice {
        capability: Capability,
        message: String,
    },
}

/// Event stream type
pub type EventStream = BroadcastStream<RedialEvent>;

/// Event emitter shared by the orchestrator and its subscribers
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RedialEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: RedialEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe as a stream
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe with a plain receiver
    pub fn receiver(&self) -> broadcast::Receiver<RedialEvent> {
        self.sender.subscribe()
    }
}
