//! Conversation store
//!
//! The pipeline reads prior messages, writes a placeholder when a request
//! starts and completes it when the answer is ready.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensemaker_llm::{Message, MessageRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Content of a placeholder while its answer is computed
pub const PLACEHOLDER_CONTENT: &str = "Thinking...";

/// Message lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Placeholder; the answer is still being computed
    Computing,
    /// Final content
    Ready,
}

impl MessageStatus {
    /// Stored column value
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Computing => "computing",
            Self::Ready => "ready",
        }
    }

    /// Parse a stored column value; unknown values read as ready
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "computing" => Self::Computing,
            _ => Self::Ready,
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message id
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Author role
    pub role: MessageRole,
    /// Content
    pub content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Create a ready message
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            status: MessageStatus::Ready,
            created_at: Utc::now(),
        }
    }

    /// Create a computing placeholder
    #[must_use]
    pub fn placeholder(conversation_id: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Computing,
            ..Self::new(conversation_id, MessageRole::Assistant, PLACEHOLDER_CONTENT)
        }
    }

    /// As a chat message
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

/// A case or project a conversation is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matter {
    /// Matter id
    pub id: String,
    /// Title
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Attachment contents folded into the context
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Conversation and matter storage used by the pipeline
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The last `limit` messages of a conversation, oldest first
    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>>;

    /// Append a ready message
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage>;

    /// Append a computing placeholder
    async fn create_placeholder(&self, conversation_id: &str) -> Result<StoredMessage>;

    /// Write final content and mark the message ready
    async fn complete(&self, message_id: &str, content: &str) -> Result<()>;

    /// Look up one message
    async fn message(&self, message_id: &str) -> Result<Option<StoredMessage>>;

    /// Look up a matter
    async fn matter(&self, matter_id: &str) -> Result<Option<Matter>>;

    /// Store a conversation title
    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<()>;

    /// A conversation's title, if one was set
    async fn title(&self, conversation_id: &str) -> Result<Option<String>>;
}

/// In-process conversation store
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
    matters: RwLock<HashMap<String, Matter>>,
    titles: RwLock<HashMap<String, String>>,
}

impl MemoryMessageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a matter
    pub fn insert_matter(&self, matter: Matter) {
        self.matters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(matter.id.clone(), matter);
    }

    fn push(&self, message: StoredMessage) -> StoredMessage {
        self.messages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        message
    }
}

#[async_trait]
impl ConversationStore for MemoryMessageStore {
    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let messages = self.messages.read().unwrap_or_else(|e| e.into_inner());
        let all: Vec<StoredMessage> = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage> {
        Ok(self.push(StoredMessage::new(conversation_id, role, content)))
    }

    async fn create_placeholder(&self, conversation_id: &str) -> Result<StoredMessage> {
        Ok(self.push(StoredMessage::placeholder(conversation_id)))
    }

    async fn complete(&self, message_id: &str, content: &str) -> Result<()> {
        let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::Store(format!("no such message: {}", message_id)))?;
        message.content = content.to_string();
        message.status = MessageStatus::Ready;
        Ok(())
    }

    async fn message(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self
            .messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn matter(&self, matter_id: &str) -> Result<Option<Matter>> {
        Ok(self
            .matters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(matter_id)
            .cloned())
    }

    async fn set_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        self.titles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation_id.to_string(), title.to_string());
        Ok(())
    }

    async fn title(&self, conversation_id: &str) -> Result<Option<String>> {
        Ok(self
            .titles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_completes() {
        let store = MemoryMessageStore::new();
        let placeholder = store.create_placeholder("c1").await.unwrap();
        assert_eq!(placeholder.status, MessageStatus::Computing);
        assert_eq!(placeholder.content, PLACEHOLDER_CONTENT);

        store.complete(&placeholder.id, "answer").await.unwrap();
        let stored = store.message(&placeholder.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Ready);
        assert_eq!(stored.content, "answer");
    }

    #[tokio::test]
    async fn test_complete_unknown_message_fails() {
        let store = MemoryMessageStore::new();
        assert!(matches!(
            store.complete("missing", "x").await,
            Err(Error::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_history_limited_to_latest() {
        let store = MemoryMessageStore::new();
        for i in 0..5 {
            store
                .append_message("c1", MessageRole::User, &format!("m{}", i))
                .await
                .unwrap();
        }
        store.append_message("c2", MessageRole::User, "other").await.unwrap();

        let history = store.conversation_messages("c1", 2).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);
    }

    #[test]
    fn test_status_round_trips_through_column() {
        for status in [MessageStatus::Computing, MessageStatus::Ready] {
            assert_eq!(MessageStatus::from_stored(status.as_str()), status);
        }
    }
}
