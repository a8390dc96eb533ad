//! Message types for agent conversations

use serde::{Deserialize, Serialize};

/// Role in a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions, context headers)
    System,
    /// User message
    User,
    /// Assistant message; stored conversations call this role `agent`
    #[serde(alias = "agent")]
    Assistant,
}

impl MessageRole {
    /// Returns the wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a stored role name. Unknown roles are treated as user input.
    #[must_use]
    pub fn from_stored(role: &str) -> Self {
        match role {
            "system" => Self::System,
            "assistant" | "agent" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a message with an explicit role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_role_alias() {
        let msg: Message = serde_json::from_str(r#"{"role":"agent","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(
            serde_json::to_value(&msg).unwrap()["role"],
            serde_json::json!("assistant")
        );
    }

    #[test]
    fn test_from_stored() {
        assert_eq!(MessageRole::from_stored("agent"), MessageRole::Assistant);
        assert_eq!(MessageRole::from_stored("system"), MessageRole::System);
        assert_eq!(MessageRole::from_stored("whatever"), MessageRole::User);
    }
}
