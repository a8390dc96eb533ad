//! Agent transport trait
//!
//! Every agent backend the pool or pipeline talks to implements this trait.
//! Connection details live in the implementation, never in the caller.

use crate::completion::{AgentQuery, AgentResponse};
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Trait for agent backends
#[async_trait::async_trait]
pub trait AgentTransport: Send + Sync {
    /// Agent name, used to attribute candidate answers
    fn name(&self) -> &str;

    /// Send one query.
    ///
    /// Implementations should stop work and return `Error::Cancelled` once
    /// `cancel` fires. Callers may also stop waiting on their own deadline, so
    /// cancellation is cooperative.
    async fn query(&self, request: AgentQuery, cancel: CancellationToken)
        -> Result<AgentResponse>;

    /// List the models this backend serves.
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn AgentTransport>;
