//! Request pipeline
//!
//! One query, one answer, many backends:
//! - Context: prior messages, matter attachments and a metadata header
//! - Expansion (optional): a derived search term pulls matching documents in
//! - Fan-out: the query goes to the pool and the retriever concurrently
//! - Race: candidates that settle before the global deadline are kept
//! - Reduction: a summarizer merges the survivors into the persisted answer

mod pipeline_impl;
mod prompt;
mod retrieval;
mod search;
mod sqlite_store;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use pipeline_impl::Pipeline;
pub use retrieval::{DocumentIndex, RetrievedDocument, Retriever};
pub use search::sanitize_search_term;
pub use sqlite_store::SqliteMessageStore;
pub use store::{
    ConversationStore, Matter, MemoryMessageStore, MessageStatus, StoredMessage,
    PLACEHOLDER_CONTENT,
};
pub use types::{
    CandidateAnswer, CandidateStatus, PipelineConfig, PipelineRequest, PipelineResponse, Stage,
};
