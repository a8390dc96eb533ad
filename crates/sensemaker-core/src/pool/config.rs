use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model used when a request names none
pub const DEFAULT_MODEL: &str = "llama3.2";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_init_timeout_ms() -> u64 {
    30_000
}

/// Pool-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Default model for requests that do not name one
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request dispatch timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Model probe timeout in milliseconds
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            init_timeout_ms: default_init_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the probe timeout
    #[must_use]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe timeout
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}
