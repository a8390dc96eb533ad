//! Endpoint configuration for one agent backend

use crate::completion::DEFAULT_TEMPERATURE;
use crate::security::mask_token;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default backend host
pub const DEFAULT_HOST: &str = "localhost";

/// Default backend port (Ollama)
pub const DEFAULT_PORT: u16 = 11434;

/// Default HTTP timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Connection details for an agent backend
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Agent name; also used as the pool member id
    pub name: String,
    /// Hostname
    #[serde(default = "default_host")]
    pub host: String,
    /// Port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use https
    #[serde(default)]
    pub secure: bool,
    /// Bearer credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Model used when a query does not name one
    #[serde(default)]
    pub model: String,
    /// Static model-affinity list, used when the backend cannot be probed
    #[serde(default)]
    pub models: Vec<String>,
    /// System prompt prepended to every conversation that lacks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP client timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("token", &self.token.as_deref().map(mask_token))
            .field("model", &self.model)
            .field("models", &self.models)
            .field("temperature", &self.temperature)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl EndpointConfig {
    /// Create a config for a named agent on the default host
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            port: default_port(),
            secure: false,
            token: None,
            model: String::new(),
            models: Vec::new(),
            prompt: None,
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Set host and port
    #[must_use]
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Use https
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the bearer credential
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the HTTP timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Base URL, e.g. `http://localhost:11434`
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// HTTP client timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
