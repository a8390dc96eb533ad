//! Sensemaker LLM - Agent transport abstraction
//!
//! This crate provides the network edge of the orchestration core:
//! - Transport: the `AgentTransport` trait every agent backend implements
//! - Endpoint: connection details for one backend (host, port, credential, model)
//! - HTTP: an OpenAI-compatible chat transport with Ollama-style model probing
//! - Mock: a scriptable transport for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod message;
pub mod mock;
pub mod security;
pub mod transport;

pub use completion::{AgentQuery, AgentResponse, TokenUsage, DEFAULT_TEMPERATURE};
pub use endpoint::EndpointConfig;
pub use error::{Error, Result};
pub use http::HttpAgent;
pub use message::{Message, MessageRole};
pub use mock::{MockTransport, ScriptedReply};
pub use transport::{AgentTransport, SharedTransport};
