//! Event types for the speval event system
//!
//! Provides the shared event definitions and the broadcast EventBus used to
//! observe evaluation progress without polling the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Evaluation lifecycle events
///
/// Events are broadcast via EventBus and can be serialized for streaming to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvalEvent {
    /// Parent task and its component rows were created
    TaskCreated {
        task_id: String,
        owner_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A worker report was applied to a component row
    ComponentReported {
        task_id: String,
        component_id: i64,
        component_kind: String,
        /// Upper-case status after the report
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// Second wave of jobs handed to the dispatcher
    Wave2Dispatched {
        task_id: String,
        job_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Parent progress advanced
    TaskProgress {
        task_id: String,
        progress: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Outcome record persisted and parent marked COMPLETED
    TaskCompleted {
        task_id: String,
        outcome_id: i64,
        rating: f64,
        timestamp: DateTime<Utc>,
    },

    /// Parent marked FAILED
    TaskFailed {
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl EvalEvent {
    /// Parent task the event belongs to
    pub fn task_id(&self) -> &str {
        match self {
            EvalEvent::TaskCreated { task_id, .. }
            | EvalEvent::ComponentReported { task_id, .. }
            | EvalEvent::Wave2Dispatched { task_id, .. }
            | EvalEvent::TaskProgress { task_id, .. }
            | EvalEvent::TaskCompleted { task_id, .. }
            | EvalEvent::TaskFailed { task_id, .. } => task_id,
        }
    }
}

/// Broadcast bus for EvalEvent
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EvalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EvalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: EvalEvent) -> Result<usize, broadcast::error::SendError<EvalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EvalEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
