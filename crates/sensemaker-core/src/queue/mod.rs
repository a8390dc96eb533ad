//! Job queue
//!
//! Durable, ordered execution of named side-effect jobs:
//! - Jobs are serialized into an external list store (Redis in production)
//! - A fixed-frequency tick takes the head when nothing is in flight
//! - Each handler runs under a per-tick budget
//! - Taken jobs are acknowledged after settling; unacknowledged jobs are
//!   recovered on start, so delivery is at-least-once and handlers must be
//!   idempotent

mod config;
mod job;
mod queue_impl;
mod redis_store;
mod store;


pub use config::QueueConfig;
pub use job::{Job, JobStatus};
pub use queue_impl::{HandlerFuture, JobQueue, MethodHandler, TickOutcome, VERIFY_METHOD};
pub use redis_store::{RedisListStore, DEFAULT_COLLECTION};
pub use store::{ListStore, MemoryListStore, JOB_COMPLETED_CHANNEL, JOB_TAKEN_CHANNEL};
