//! EventBus - broadcast-based event system for queue and pipeline events.
//!
//! The queue announces every enqueued job (the `job` event) and every settle;
//! the pipeline announces its stage transitions. HTTP handlers and tests
//! subscribe to observe progress.

use crate::pipeline::Stage;
use crate::queue::JobStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the queue and the pipeline.
///
/// Events carry ids and statuses only. Job params and answer content are
/// fetched from the queue or the message store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was appended to the durable store
    Job {
        /// Job id
        job_id: String,
        /// Method name
        method: String,
    },
    /// The tick loop took a job
    JobTaken {
        /// Job id
        job_id: String,
    },
    /// A job reached a terminal status
    JobSettled {
        /// Job id
        job_id: String,
        /// Terminal status
        status: JobStatus,
    },
    /// A pipeline request moved to a new stage
    StageChanged {
        /// Request identifier
        request_id: Uuid,
        /// New stage
        stage: Stage,
    },
    /// One fanned-out dispatch settled before the deadline
    CandidateSettled {
        /// Request identifier
        request_id: Uuid,
        /// Agent that answered
        agent: String,
        /// Whether it produced an answer
        fulfilled: bool,
    },
    /// A pipeline request persisted its answer
    RequestCompleted {
        /// Request identifier
        request_id: Uuid,
        /// Persisted message id
        message_id: String,
    },
    /// A pipeline request failed
    RequestFailed {
        /// Request identifier
        request_id: Uuid,
        /// Error description
        error: String,
    },
}

/// Broadcast-based event bus.
///
/// Slow subscribers will miss events (lagged) rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: Event) -> usize {
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
