//! OpenAI-compatible HTTP agent
//!
//! Chat goes to `POST /v1/chat/completions`. Model probing tries the Ollama
//! tag listing (`GET /api/tags`) first and falls back to `GET /v1/models`.

use crate::completion::{AgentQuery, AgentResponse, TokenUsage};
use crate::endpoint::EndpointConfig;
use crate::error::{Error, Result};
use crate::message::{Message, MessageRole};
use crate::security::sanitize_api_error;
use crate::transport::AgentTransport;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `GET /api/tags`
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// `GET /v1/models`; some servers use `data`, others `models`
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ============================================================================
// Agent
// ============================================================================

/// HTTP agent speaking the OpenAI chat-completions dialect
pub struct HttpAgent {
    client: Client,
    config: EndpointConfig,
}

impl HttpAgent {
    /// Create a new agent for an endpoint
    pub fn new(config: EndpointConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(Error::NotConfigured("agent name is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Endpoint configuration
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Compose the outgoing message list: configured system prompt first
    /// (unless the conversation already has one), then the context, then the query.
    fn compose<'a>(&'a self, request: &'a AgentQuery) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(request.messages.len() + 2);

        let has_system = request
            .messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System);
        if let (Some(prompt), false) = (self.config.prompt.as_deref(), has_system) {
            messages.push(ChatMessage {
                role: MessageRole::System.as_str(),
                content: prompt,
            });
        }

        messages.extend(request.messages.iter().map(|m: &Message| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        messages.push(ChatMessage {
            role: MessageRole::User.as_str(),
            content: &request.query,
        });

        messages
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.config.timeout_ms)
        } else if e.is_connect() {
            Error::Network(format!(
                "failed to connect to agent {} at {}",
                self.config.name,
                self.config.base_url()
            ))
        } else {
            Error::Network(e.to_string())
        }
    }

    async fn send_chat(&self, request: &AgentQuery) -> Result<AgentResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let model = if request.model.is_empty() {
            self.config.model.as_str()
        } else {
            request.model.as_str()
        };

        let body = ChatRequest {
            model,
            messages: self.compose(request),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            stream: false,
            response_format: request.json.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        debug!(agent = %self.config.name, model = %model, "sending chat request");

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Api(sanitize_api_error(&format!(
                "HTTP {}: {}",
                status, text
            ))));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidResponse(sanitize_api_error(&format!("{}: {}", e, text))))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::InvalidResponse("response has no choices".to_string()))?;

        Ok(AgentResponse {
            name: self.config.name.clone(),
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            query: request.query.clone(),
            content,
            usage: parsed.usage,
        })
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url());
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Error::Api(format!("tags returned {}", response.status())));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn list_openai_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.config.base_url());
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Error::Api(format!("models returned {}", response.status())));
        }

        let listing: ModelsResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(listing
            .data
            .into_iter()
            .chain(listing.models)
            .map(|m| m.id)
            .collect())
    }
}

#[async_trait::async_trait]
impl AgentTransport for HttpAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, request, cancel), fields(agent = %self.config.name))]
    async fn query(
        &self,
        request: AgentQuery,
        cancel: CancellationToken,
    ) -> Result<AgentResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("chat request cancelled by caller");
                Err(Error::Cancelled)
            }
            result = self.send_chat(&request) => result,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        match self.list_tags().await {
            Ok(models) => Ok(models),
            Err(e) => {
                warn!(agent = %self.config.name, error = %e, "tag listing failed, trying /v1/models");
                self.list_openai_models().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(prompt: Option<&str>) -> HttpAgent {
        let mut config = EndpointConfig::new("alpha").with_model("llama3.2");
        config.prompt = prompt.map(String::from);
        HttpAgent::new(config).unwrap()
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            HttpAgent::new(EndpointConfig::new("")),
            Err(Error::NotConfigured(_))
        ));
    }

    #[test]
    fn test_compose_prepends_prompt() {
        let agent = agent(Some("You are Sensemaker."));
        let request = AgentQuery::new("what changed?")
            .with_messages(vec![Message::user("hi"), Message::assistant("hello")]);

        let composed = agent.compose(&request);
        assert_eq!(composed.len(), 4);
        assert_eq!(composed[0].role, "system");
        assert_eq!(composed[0].content, "You are Sensemaker.");
        assert_eq!(composed[2].role, "assistant");
        assert_eq!(composed[3].content, "what changed?");
    }

    #[test]
    fn test_compose_keeps_existing_system_message() {
        let agent = agent(Some("default prompt"));
        let request =
            AgentQuery::new("q").with_messages(vec![Message::system("custom"), Message::user("a")]);

        let composed = agent.compose(&request);
        assert_eq!(composed.len(), 3);
        assert_eq!(composed[0].content, "custom");
    }

    #[test]
    fn test_chat_request_json_format() {
        let agent = agent(None);
        let request = AgentQuery::new("q").with_json();
        let body = ChatRequest {
            model: "m",
            messages: agent.compose(&request),
            temperature: 0.5,
            stream: false,
            response_format: request.json.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_models_response_accepts_both_shapes() {
        let openai: ModelsResponse =
            serde_json::from_str(r#"{"data":[{"id":"gpt-4o"}]}"#).unwrap();
        assert_eq!(openai.data.len(), 1);

        let other: ModelsResponse =
            serde_json::from_str(r#"{"models":[{"id":"qwen"}]}"#).unwrap();
        assert_eq!(other.models[0].id, "qwen");
    }

    /// Accepts connections and never answers
    async fn silent_server() -> (u16, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let (port, server) = silent_server().await;
        let config = EndpointConfig::new("alpha").with_address("127.0.0.1", port);
        let agent = HttpAgent::new(config).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = agent.query(AgentQuery::new("q"), cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        server.abort();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hanging_request() {
        let (port, server) = silent_server().await;
        let config = EndpointConfig::new("alpha").with_address("127.0.0.1", port);
        let agent = HttpAgent::new(config).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            agent.query(AgentQuery::new("q"), cancel),
        )
        .await
        .expect("cancellation should end the request");
        assert!(matches!(result, Err(Error::Cancelled)));
        server.abort();
    }
}
