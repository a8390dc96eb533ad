//! Sensemaker Core - Orchestration Engine
//!
//! This crate provides the orchestration core of the Sensemaker assistant:
//! - Pool: routes queries to model-qualified agent members, one request per member
//! - Queue: durable FIFO job queue over an external list store, one job in flight
//! - Worker: in-memory LIFO executor for fire-and-forget background tasks
//! - Pipeline: fans a query out to every agent under a deadline and reduces the answers
//! - EventBus: broadcast of queue and pipeline events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event_bus;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod worker;

pub use error::{format_error_for_cli, Error, Result, TimeoutScope, UserFriendlyError};
pub use event_bus::{Event, EventBus};
pub use pipeline::{
    sanitize_search_term, CandidateAnswer, CandidateStatus, ConversationStore, DocumentIndex,
    Matter, MemoryMessageStore, MessageStatus, Pipeline, PipelineConfig, PipelineRequest,
    PipelineResponse, Retriever, RetrievedDocument, SqliteMessageStore, Stage, StoredMessage,
};
pub use pool::{
    AgentPool, FirstAvailable, MemberSnapshot, MemberStatus, PoolConfig, PoolHealth, PoolRequest,
    SelectionStrategy,
};
pub use queue::{
    Job, JobQueue, JobStatus, ListStore, MemoryListStore, MethodHandler, QueueConfig,
    RedisListStore, TickOutcome,
};
pub use worker::{TakeOutcome, Worker, WorkerConfig, WorkerHandler, WorkerJob};
