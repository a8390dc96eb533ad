use super::config::PoolConfig;
use super::member::{AgentMember, MemberSnapshot, MemberStatus, OutstandingGuard};
use super::strategy::{FirstAvailable, SelectionStrategy};
use crate::error::{Error, Result, TimeoutScope};
use futures::future::join_all;
use sensemaker_llm::{AgentQuery, AgentResponse, Message, SharedTransport};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A query routed through the pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolRequest {
    /// The user query (required)
    pub query: String,
    /// Requested model; `None` uses the pool default
    #[serde(default)]
    pub model: Option<String>,
    /// Context messages
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Ask for a JSON response
    #[serde(default)]
    pub json: bool,
}

impl PoolRequest {
    /// Create a request for the pool default model
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Request a specific model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach context messages
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
}

/// Aggregate member health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    /// Registered members
    pub total: usize,
    /// Members whose probe succeeded
    pub ready: usize,
    /// Members whose probe failed
    pub failed: usize,
    /// Members still probing
    pub initializing: usize,
    /// Members with an outstanding request
    pub busy: usize,
    /// At least one member is ready
    pub is_healthy: bool,
}

/// The agent pool
pub struct AgentPool {
    config: PoolConfig,
    members: RwLock<Vec<Arc<AgentMember>>>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl AgentPool {
    /// Create an empty pool using first-available selection
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            members: RwLock::new(Vec::new()),
            strategy: Arc::new(FirstAvailable),
        }
    }

    /// Replace the selection strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Pool configuration
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Pool default model
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    /// Number of registered members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no members are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a member and probe its served models.
    ///
    /// `affinity` is the static model list used when the probe fails. A failed
    /// probe never rejects; only a duplicate member id does.
    #[instrument(skip(self, transport, affinity), fields(member = %transport.name()))]
    pub async fn add_member(
        &self,
        transport: SharedTransport,
        affinity: Vec<String>,
    ) -> Result<()> {
        let member = Arc::new(AgentMember::new(transport, affinity));

        {
            let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
            if members.iter().any(|m| m.id() == member.id()) {
                return Err(Error::DuplicateMember(member.id().to_string()));
            }
            members.push(Arc::clone(&member));
        }

        member.probe(self.config.init_timeout()).await;
        info!(status = ?member.status(), "member registered");
        Ok(())
    }

    /// Re-probe every member's served models concurrently
    pub async fn sync_models(&self) {
        let members = self.snapshot_members();
        let timeout = self.config.init_timeout();
        join_all(members.iter().map(|m| m.probe(timeout))).await;
        debug!(members = members.len(), "model lists synchronized");
    }

    /// Route one query to a qualifying, non-busy member.
    ///
    /// Fails with `NoCandidate` when no member serves the model and `AllBusy`
    /// when every qualifying member already has an outstanding request. The
    /// member's slot is released when the call settles, times out, or this
    /// future is dropped.
    #[instrument(skip(self, request), fields(model = tracing::field::Empty))]
    pub async fn query(&self, request: PoolRequest) -> Result<AgentResponse> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidRequest("query is required".to_string()));
        }

        let model = request
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.model.clone());
        tracing::Span::current().record("model", model.as_str());

        let guard = self.select(&model)?;
        let member = Arc::clone(guard.member());
        debug!(member = %member.id(), request_id = %guard.request_id(), "dispatching");

        let mut agent_query = AgentQuery::new(request.query)
            .with_model(model)
            .with_messages(request.messages);
        agent_query.temperature = request.temperature;
        agent_query.json = request.json;

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let timeout = self.config.timeout();

        let outcome =
            tokio::time::timeout(timeout, member.transport().query(agent_query, cancel.clone()))
                .await;
        drop(guard);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!(member = %member.id(), error = %e, "member query failed");
                Err(e.into())
            }
            Err(_) => {
                cancel.cancel();
                warn!(member = %member.id(), timeout_ms = self.config.timeout_ms, "member query timed out");
                Err(Error::Timeout {
                    scope: TimeoutScope::Member,
                    after_ms: self.config.timeout_ms,
                })
            }
        }
    }

    /// Aggregate health across members
    #[must_use]
    pub fn health(&self) -> PoolHealth {
        let members = self.snapshot_members();
        let count = |status: MemberStatus| members.iter().filter(|m| m.status() == status).count();
        let ready = count(MemberStatus::Ready);

        PoolHealth {
            total: members.len(),
            ready,
            failed: count(MemberStatus::Failed),
            initializing: count(MemberStatus::Initializing),
            busy: members.iter().filter(|m| m.is_busy()).count(),
            is_healthy: ready > 0,
        }
    }

    /// Per-member snapshots in registration order
    #[must_use]
    pub fn members(&self) -> Vec<MemberSnapshot> {
        self.snapshot_members()
            .iter()
            .map(|m| m.snapshot())
            .collect()
    }

    fn snapshot_members(&self) -> Vec<Arc<AgentMember>> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Filter by model, rank with the strategy, claim the first free slot.
    fn select(&self, model: &str) -> Result<OutstandingGuard> {
        let candidates: Vec<Arc<AgentMember>> = self
            .snapshot_members()
            .into_iter()
            .filter(|m| m.serves(model))
            .collect();

        if candidates.is_empty() {
            return Err(Error::NoCandidate {
                model: model.to_string(),
            });
        }

        let views: Vec<MemberSnapshot> = candidates.iter().map(|m| m.snapshot()).collect();
        for index in self.strategy.rank(&views) {
            let Some(candidate) = candidates.get(index) else {
                continue;
            };
            if let Some(guard) = candidate.try_claim(self.config.timeout()) {
                return Ok(guard);
            }
        }

        debug!(strategy = self.strategy.name(), candidates = candidates.len(), "no free member");
        Err(Error::AllBusy {
            model: model.to_string(),
        })
    }
}
