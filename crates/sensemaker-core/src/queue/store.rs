//! Durable list store abstraction
//!
//! The queue keeps serialized jobs in a named list. Taking a job moves it to a
//! processing list where it stays until acknowledged, so a crash between take
//! and settle leaves the job recoverable.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Pub/sub channel announcing a taken job
pub const JOB_TAKEN_CHANNEL: &str = "job:taken";

/// Pub/sub channel announcing a settled job
pub const JOB_COMPLETED_CHANNEL: &str = "job:completed";

/// A FIFO list with a processing side-list
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append a payload at the tail. Returns the new length.
    async fn push(&self, payload: &str) -> Result<usize>;

    /// Move the head into the processing list and return it
    async fn take(&self) -> Result<Option<String>>;

    /// Remove a settled payload from the processing list
    async fn ack(&self, payload: &str) -> Result<()>;

    /// Move every unacknowledged payload back to the head, oldest first.
    /// Returns how many were recovered.
    async fn recover(&self) -> Result<usize>;

    /// Pending payloads in order
    async fn list(&self) -> Result<Vec<String>>;

    /// Pending count
    async fn depth(&self) -> Result<usize>;

    /// Drop pending and processing payloads
    async fn clear(&self) -> Result<()>;

    /// Announce a job transition to external listeners
    async fn publish(&self, _channel: &str, _payload: &str) -> Result<()> {
        Ok(())
    }
}

/// In-process list store for tests and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryListStore {
    pending: Mutex<VecDeque<String>>,
    processing: Mutex<Vec<String>>,
}

impl MemoryListStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unacknowledged payloads
    #[must_use]
    pub fn processing(&self) -> Vec<String> {
        self.processing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push(&self, payload: &str) -> Result<usize> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_back(payload.to_string());
        Ok(pending.len())
    }

    async fn take(&self) -> Result<Option<String>> {
        let head = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(payload) = &head {
            self.processing
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(payload.clone());
        }
        Ok(head)
    }

    async fn ack(&self, payload: &str) -> Result<()> {
        let mut processing = self.processing.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = processing.iter().position(|p| p == payload) {
            processing.remove(pos);
        }
        Ok(())
    }

    async fn recover(&self) -> Result<usize> {
        let stranded: Vec<String> = self
            .processing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let count = stranded.len();

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for payload in stranded.into_iter().rev() {
            pending.push_front(payload);
        }
        Ok(count)
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect())
    }

    async fn depth(&self) -> Result<usize> {
        Ok(self.pending.lock().unwrap_or_else(|e| e.into_inner()).len())
    }

    async fn clear(&self) -> Result<()> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.processing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
