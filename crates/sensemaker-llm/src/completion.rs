//! Request and response types exchanged with an agent backend

use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Default sampling temperature for agent queries
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// A single query sent to one agent backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentQuery {
    /// The user query, appended as the final user message
    pub query: String,
    /// Model to run; empty means the endpoint's configured model
    #[serde(default)]
    pub model: String,
    /// Prior conversation and context messages
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Sampling temperature; falls back to the endpoint's setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Ask the backend for a JSON object response
    #[serde(default)]
    pub json: bool,
}

impl AgentQuery {
    /// Create a query with no prior context
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: String::new(),
            messages: Vec::new(),
            temperature: None,
            json: false,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the context messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Request a JSON object response
    #[must_use]
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Raw answer returned by an agent backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Name of the agent that produced the answer
    pub name: String,
    /// Model that produced the answer
    pub model: String,
    /// The query that was answered
    pub query: String,
    /// Answer text
    pub content: String,
    /// Token usage when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}
