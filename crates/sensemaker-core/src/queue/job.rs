//! Job record and status

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Job lifecycle status.
///
/// Transitions only `pending -> running -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the store
    Pending,
    /// Taken by the tick loop
    Running,
    /// Handler succeeded
    Completed,
    /// Handler failed, timed out, or no handler existed
    Failed,
}

impl JobStatus {
    /// Whether `next` is a legal forward transition
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Completed or failed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// A named side-effect job.
///
/// Serializes as `{id, method, params, status, result?, error?}`; the retry
/// fields are only written when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id; derived from content when empty
    #[serde(default)]
    pub id: String,
    /// Registered method name
    pub method: String,
    /// Ordered params passed to the handler
    #[serde(default)]
    pub params: Vec<Value>,
    /// Lifecycle status
    #[serde(default = "default_status")]
    pub status: JobStatus,
    /// Handler result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Remaining retries after a failure
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
    /// Id of the failed job this one retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

fn default_status() -> JobStatus {
    JobStatus::Pending
}

impl Job {
    /// Create a pending job without an id
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: String::new(),
            method: method.into(),
            params,
            status: JobStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            retry_of: None,
        }
    }

    /// Set an explicit id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Allow `attempts` retries after failure
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// SHA-256 over the job's content (method, params and retry lineage)
    #[must_use]
    pub fn content_id(&self) -> String {
        let content = serde_json::json!({
            "method": self.method,
            "params": self.params,
            "attempts": self.attempts,
            "retry_of": self.retry_of,
        });
        format!("{:x}", Sha256::digest(content.to_string().as_bytes()))
    }

    /// Apply a forward transition. Returns false and leaves the job unchanged
    /// when the transition would go backwards or skip a state.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// A fresh pending job retrying this one, if attempts remain
    #[must_use]
    pub fn retry(&self) -> Option<Job> {
        if self.attempts == 0 {
            return None;
        }
        let mut next = Job::new(self.method.clone(), self.params.clone());
        next.attempts = self.attempts - 1;
        next.retry_of = Some(self.id.clone());
        next.id = next.content_id();
        Some(next)
    }
}
