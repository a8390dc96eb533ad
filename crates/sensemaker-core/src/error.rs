//! Error types for sensemaker-core
//!
//! This module provides error types and user-friendly error formatting.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which bounded wait expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutScope {
    /// Pool per-member dispatch timeout
    Member,
    /// Queue per-tick budget
    JobTick,
    /// Pipeline global deadline
    Pipeline,
    /// Summarizer adoption timeout
    Summarizer,
}

impl fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Member => "member dispatch",
            Self::JobTick => "job tick",
            Self::Pipeline => "pipeline deadline",
            Self::Summarizer => "summarizer",
        };
        f.write_str(label)
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// No member serves the requested model
    #[error("no candidate serves model '{model}'")]
    NoCandidate {
        /// Requested model
        model: String,
    },

    /// Every qualifying member is occupied
    #[error("all members serving model '{model}' are busy")]
    AllBusy {
        /// Requested model
        model: String,
    },

    /// A bounded wait expired
    #[error("{scope} timed out after {after_ms}ms")]
    Timeout {
        /// Which wait expired
        scope: TimeoutScope,
        /// Configured bound in milliseconds
        after_ms: u64,
    },

    /// A registered job handler failed
    #[error("handler for '{method}' failed: {message}")]
    Handler {
        /// Method name
        method: String,
        /// Failure description
        message: String,
    },

    /// The summarizer failed or returned nothing
    #[error("reduction failed: {0}")]
    Reduction(String),

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Member id already registered
    #[error("member '{0}' already registered")]
    DuplicateMember(String),

    /// Job id already known
    #[error("job '{0}' already exists")]
    DuplicateJob(String),

    /// Method already registered
    #[error("method '{0}' already registered")]
    DuplicateMethod(String),

    /// List or message store failure
    #[error("store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Agent transport error
    #[error("agent error: {0}")]
    Llm(#[from] sensemaker_llm::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::NoCandidate { model } => format!("No agent serves the model '{}'.", model),
            Error::AllBusy { .. } => "All agents are busy right now.".to_string(),
            Error::Timeout { scope, .. } => format!("The {} took too long.", scope),
            Error::Handler { method, .. } => format!("The '{}' job failed.", method),
            Error::Reduction(_) | Error::Llm(_) => {
                "Something went wrong while composing the answer.".to_string()
            }
            Error::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            Error::DuplicateMember(id) => format!("Agent '{}' is already registered.", id),
            Error::DuplicateJob(id) => format!("Job '{}' is already queued.", id),
            Error::DuplicateMethod(name) => format!("Method '{}' is already registered.", name),
            Error::Store(_) | Error::Serialization(_) | Error::Internal(_) => {
                "An internal error occurred.".to_string()
            }
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::NoCandidate { .. } => Some(
                "Check the pool members in config/default.toml or run `sensemaker models`."
                    .to_string(),
            ),
            Error::AllBusy { .. } | Error::Timeout { .. } => {
                Some("Try again in a moment.".to_string())
            }
            Error::Store(_) => Some("Check that Redis and the database are reachable.".to_string()),
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    output.push('\n');

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&suggestion);
        output.push('\n');
    }

    output.push_str(&format!("(details: {})", error));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            scope: TimeoutScope::Member,
            after_ms: 60_000,
        };
        assert_eq!(err.to_string(), "member dispatch timed out after 60000ms");
    }

    #[test]
    fn test_format_error_for_cli() {
        let err = Error::NoCandidate {
            model: "llama3.2".to_string(),
        };
        let text = format_error_for_cli(&err);
        assert!(text.contains("llama3.2"));
        assert!(text.contains("sensemaker models"));
    }

    #[test]
    fn test_llm_error_converts() {
        let err: Error = sensemaker_llm::Error::Cancelled.into();
        assert!(matches!(err, Error::Llm(_)));
    }
}
