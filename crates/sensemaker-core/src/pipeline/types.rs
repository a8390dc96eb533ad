//! Pipeline request, response and configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_deadline_ms() -> u64 {
    15_000
}

fn default_expansion() -> bool {
    true
}

fn default_search_term_max_chars() -> usize {
    50
}

fn default_history_limit() -> usize {
    50
}

fn default_retrieval_limit() -> usize {
    4
}

fn default_temperature() -> f32 {
    sensemaker_llm::DEFAULT_TEMPERATURE
}

fn default_summarizer_timeout_ms() -> u64 {
    600_000
}

fn default_retriever_name() -> String {
    "trainer".to_string()
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Global deadline for the fan-out race, in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Derive a search term and fold matching documents into the context
    #[serde(default = "default_expansion")]
    pub expansion: bool,
    /// Cap on the derived search term, in characters
    #[serde(default = "default_search_term_max_chars")]
    pub search_term_max_chars: usize,
    /// Prior messages loaded into the context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Documents folded in by expansion
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
    /// One pool query per entry; empty means the pool default model once per member
    #[serde(default)]
    pub fanout_models: Vec<String>,
    /// Sampling temperature for fan-out and reduction
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// How long the summarizer may take, in milliseconds
    #[serde(default = "default_summarizer_timeout_ms")]
    pub summarizer_timeout_ms: u64,
    /// Agent name attributed to the retriever's candidate
    #[serde(default = "default_retriever_name")]
    pub retriever_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            expansion: default_expansion(),
            search_term_max_chars: default_search_term_max_chars(),
            history_limit: default_history_limit(),
            retrieval_limit: default_retrieval_limit(),
            fanout_models: Vec::new(),
            temperature: default_temperature(),
            summarizer_timeout_ms: default_summarizer_timeout_ms(),
            retriever_name: default_retriever_name(),
        }
    }
}

impl PipelineConfig {
    /// Set the global deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Enable or disable expansion
    #[must_use]
    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expansion = enabled;
        self
    }

    /// Set the fan-out models
    #[must_use]
    pub fn with_fanout_models(mut self, models: Vec<String>) -> Self {
        self.fanout_models = models;
        self
    }

    /// Set the summarizer timeout
    #[must_use]
    pub fn with_summarizer_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Global deadline
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Summarizer timeout
    #[must_use]
    pub fn summarizer_timeout(&self) -> Duration {
        Duration::from_millis(self.summarizer_timeout_ms)
    }

    /// Longest a request can take at the configured deadline: expansion and
    /// fan-out are each bounded by the deadline, reduction by the summarizer timeout.
    #[must_use]
    pub fn request_budget(&self) -> Duration {
        self.deadline() * 2 + self.summarizer_timeout()
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading history, matter and metadata
    BuildingContext,
    /// Deriving a search term and retrieving documents
    Expanding,
    /// Starting every dispatch
    Dispatching,
    /// Waiting on dispatches until the deadline
    Racing,
    /// Summarizing the surviving candidates
    Reducing,
    /// Answer written to the message store
    Persisted,
}

/// One inbound query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Conversation the answer belongs to
    pub conversation_id: String,
    /// The user query
    pub query: String,
    /// Subject line describing what the conversation is about
    #[serde(default)]
    pub subject: Option<String>,
    /// Matter whose attachments join the context
    #[serde(default)]
    pub matter_id: Option<String>,
    /// Overrides the configured deadline
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl PipelineRequest {
    /// Create a request
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    /// Attach a subject
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a matter
    #[must_use]
    pub fn with_matter(mut self, matter_id: impl Into<String>) -> Self {
        self.matter_id = Some(matter_id.into());
        self
    }

    /// Override the deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }
}

/// The persisted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResponse {
    /// Message id of the answer
    pub id: String,
    /// Summarized content
    pub content: String,
    /// Agents whose candidates were reduced
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Whether a dispatch produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// Answered with content
    Fulfilled,
    /// Failed or answered empty
    Rejected,
}

/// One backend's answer before reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAnswer {
    /// Agent that answered
    pub agent_name: String,
    /// Answer content; empty when rejected
    pub content: String,
    /// Outcome
    pub status: CandidateStatus,
    /// Failure description when rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CandidateAnswer {
    /// A candidate with content; empty content counts as rejected
    #[must_use]
    pub fn fulfilled(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        if content.trim().is_empty() {
            return Self::rejected(agent_name, "empty answer");
        }
        Self {
            agent_name: agent_name.into(),
            content,
            status: CandidateStatus::Fulfilled,
            error: None,
        }
    }

    /// A failed candidate
    #[must_use]
    pub fn rejected(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            content: String::new(),
            status: CandidateStatus::Rejected,
            error: Some(error.into()),
        }
    }

    /// Whether the candidate takes part in reduction
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.status == CandidateStatus::Fulfilled
    }
}
