//! Mock agent transport for testing
//!
//! Replies are scripted per call: each one can delay, succeed or fail. When the
//! script runs out the transport echoes a default answer immediately.

use crate::completion::{AgentQuery, AgentResponse};
use crate::error::{Error, Result};
use crate::transport::AgentTransport;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted reply
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    /// How long the call takes before settling
    pub delay: Duration,
    /// Answer content, or an error message
    pub outcome: std::result::Result<String, String>,
}

impl ScriptedReply {
    /// Reply with content immediately
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(content.into()),
        }
    }

    /// Fail with an api error immediately
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(message.into()),
        }
    }

    /// Settle after a delay
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A mock agent that returns queued replies or a default echo.
pub struct MockTransport {
    name: String,
    models: Option<Vec<String>>,
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    received: Arc<Mutex<Vec<AgentQuery>>>,
    calls: AtomicUsize,
    cancellations: AtomicUsize,
}

impl MockTransport {
    /// Create a mock agent serving the given models
    #[must_use]
    pub fn new(name: impl Into<String>, models: &[&str]) -> Self {
        Self {
            name: name.into(),
            models: Some(models.iter().map(|m| (*m).to_string()).collect()),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            received: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        }
    }

    /// Make the model probe fail
    #[must_use]
    pub fn with_failing_probe(mut self) -> Self {
        self.models = None;
        self
    }

    /// Queue a reply
    #[must_use]
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue a reply on a shared handle
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of queries received
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of queries that observed cancellation
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Queries received so far
    #[must_use]
    pub fn received(&self) -> Vec<AgentQuery> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl AgentTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        request: AgentQuery,
        cancel: CancellationToken,
    ) -> Result<AgentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::content(format!("{} answers: {}", self.name, request.query)));

        if !reply.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(reply.delay) => {}
                _ = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    return Err(Error::Cancelled);
                }
            }
        }

        match reply.outcome {
            Ok(content) => Ok(AgentResponse {
                name: self.name.clone(),
                model: request.model.clone(),
                query: request.query,
                content,
                usage: None,
            }),
            Err(message) => Err(Error::Api(message)),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.models
            .clone()
            .ok_or_else(|| Error::Network(format!("{} is unreachable", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockTransport::new("alpha", &["m1"]).with_reply(ScriptedReply::content("first"));

        let first = mock
            .query(AgentQuery::new("q"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.content, "first");

        let second = mock
            .query(AgentQuery::new("q"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.content, "alpha answers: q");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_and_probe() {
        let mock = MockTransport::new("beta", &[])
            .with_failing_probe()
            .with_reply(ScriptedReply::failure("boom"));

        assert!(mock.list_models().await.is_err());
        let result = mock.query(AgentQuery::new("q"), CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Api(m)) if m == "boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_observed() {
        let mock = MockTransport::new("gamma", &["m1"])
            .with_reply(ScriptedReply::content("late").after(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let child = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let result = mock.query(AgentQuery::new("q"), cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(mock.cancellations(), 1);
    }
}
