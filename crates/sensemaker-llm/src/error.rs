//! Error types for sensemaker-llm

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint not configured
    #[error("endpoint not configured: {0}")]
    NotConfigured(String),

    /// Backend returned a non-success status
    #[error("api error: {0}")]
    Api(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The caller cancelled the request before it settled
    #[error("request cancelled")]
    Cancelled,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure happened before the backend could answer
    /// (connection refused, DNS, timeout).
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
