use super::prompt::{
    documents_block, expansion_query, metadata_header, reduction_query, EXPANSION_PROMPT,
    SUMMARIZER_PROMPT,
};
use super::retrieval::Retriever;
use super::search::sanitize_search_term;
use super::store::{ConversationStore, MessageStatus};
use super::types::{CandidateAnswer, PipelineConfig, PipelineRequest, PipelineResponse, Stage};
use crate::error::{Error, Result, TimeoutScope};
use crate::event_bus::{Event, EventBus};
use crate::pool::{AgentPool, PoolRequest};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use sensemaker_llm::{AgentQuery, Message, MessageRole, SharedTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Context assembled for one request
struct RequestContext {
    /// Prior conversation turns
    history: Vec<Message>,
    /// Metadata header, matter attachments and retrieved documents
    preamble: String,
}

impl RequestContext {
    fn query_text(&self, query: &str) -> String {
        format!("{}\n[question]\n{}", self.preamble, query)
    }
}

/// Outcome of the fan-out race
struct RaceResult {
    candidates: Vec<CandidateAnswer>,
    timed_out: bool,
}

/// Answers one query with every available backend under a deadline.
///
/// Each request writes a computing placeholder, fans the query out to the
/// pool and the retriever, keeps whatever settles before the deadline and
/// has a summarizer reduce the survivors into the placeholder's content.
pub struct Pipeline {
    config: PipelineConfig,
    pool: Arc<AgentPool>,
    store: Arc<dyn ConversationStore>,
    summarizer: SharedTransport,
    searcher: Option<SharedTransport>,
    retriever: Option<Arc<dyn Retriever>>,
    events: EventBus,
    clock: AtomicU64,
}

impl Pipeline {
    /// Create a pipeline over a pool, a conversation store and a summarizer
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        pool: Arc<AgentPool>,
        store: Arc<dyn ConversationStore>,
        summarizer: SharedTransport,
    ) -> Self {
        Self {
            config,
            pool,
            store,
            summarizer,
            searcher: None,
            retriever: None,
            events: EventBus::default(),
            clock: AtomicU64::new(0),
        }
    }

    /// Use an agent to derive search terms during expansion
    #[must_use]
    pub fn with_searcher(mut self, searcher: SharedTransport) -> Self {
        self.searcher = Some(searcher);
        self
    }

    /// Search documents during expansion and answer alongside the pool
    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Publish events on a shared bus
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Pipeline configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Event bus
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Requests handled so far
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Produce and persist one answer.
    ///
    /// Individual backend failures are tolerated while at least one candidate
    /// answers before the deadline. Fails when no candidate survives or the
    /// summarizer fails; the placeholder then stays `computing`.
    #[instrument(skip(self, request), fields(request_id = tracing::field::Empty, conversation = %request.conversation_id))]
    pub async fn handle_request(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        if request.conversation_id.trim().is_empty() {
            return Err(Error::InvalidRequest("conversation id is required".to_string()));
        }
        if request.query.trim().is_empty() {
            return Err(Error::InvalidRequest("query is required".to_string()));
        }

        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let result = self.process(request_id, &request).await;
        if let Err(e) = &result {
            warn!(error = %e, "request failed");
            self.events.publish(Event::RequestFailed {
                request_id,
                error: e.to_string(),
            });
        }
        result
    }

    async fn process(
        &self,
        request_id: Uuid,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse> {
        let clock = self.clock.fetch_add(1, Ordering::SeqCst) + 1;

        self.enter(request_id, Stage::BuildingContext);
        let mut context = self.build_context(request, clock).await?;
        let placeholder = self.store.create_placeholder(&request.conversation_id).await?;

        if self.config.expansion {
            self.enter(request_id, Stage::Expanding);
            if let Some(block) = self.expand(&request.query).await {
                context.preamble.push_str(&block);
            }
        }

        self.enter(request_id, Stage::Dispatching);
        let deadline_ms = request.deadline_ms.unwrap_or(self.config.deadline_ms);
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        let dispatches = self.dispatch(&request.query, &context);
        info!(dispatches = dispatches.len(), deadline_ms, "fanning out");

        self.enter(request_id, Stage::Racing);
        let race = self.race(request_id, dispatches, deadline).await;

        let fulfilled: Vec<CandidateAnswer> = race
            .candidates
            .into_iter()
            .filter(CandidateAnswer::is_fulfilled)
            .collect();
        if fulfilled.is_empty() {
            return Err(if race.timed_out {
                Error::Timeout {
                    scope: TimeoutScope::Pipeline,
                    after_ms: deadline_ms,
                }
            } else {
                Error::Reduction("no candidate produced an answer".to_string())
            });
        }

        self.enter(request_id, Stage::Reducing);
        let content = self.reduce(&request.query, &fulfilled).await?;

        self.store.complete(&placeholder.id, &content).await?;
        self.enter(request_id, Stage::Persisted);
        self.events.publish(Event::RequestCompleted {
            request_id,
            message_id: placeholder.id.clone(),
        });

        let agents: Vec<String> = fulfilled.into_iter().map(|c| c.agent_name).collect();
        info!(message_id = %placeholder.id, agents = ?agents, "request completed");

        Ok(PipelineResponse {
            id: placeholder.id,
            content,
            agents,
        })
    }

    fn enter(&self, request_id: Uuid, stage: Stage) {
        debug!(stage = ?stage, "stage");
        self.events.publish(Event::StageChanged { request_id, stage });
    }

    async fn build_context(&self, request: &PipelineRequest, clock: u64) -> Result<RequestContext> {
        let stored = self
            .store
            .conversation_messages(&request.conversation_id, self.config.history_limit)
            .await?;

        let mut history: Vec<Message> = stored
            .iter()
            .filter(|m| m.status == MessageStatus::Ready)
            .map(|m| m.to_message())
            .collect();
        // The caller usually stores the user's message before asking.
        if history
            .last()
            .is_some_and(|m| m.role == MessageRole::User && m.content == request.query)
        {
            history.pop();
        }

        let matter = match request.matter_id.as_deref() {
            Some(id) => match self.store.matter(id).await {
                Ok(Some(matter)) => Some(matter),
                Ok(None) => {
                    warn!(matter_id = %id, "matter not found");
                    None
                }
                Err(e) => {
                    warn!(matter_id = %id, error = %e, "could not load matter");
                    None
                }
            },
            None => None,
        };

        Ok(RequestContext {
            history,
            preamble: metadata_header(clock, Utc::now(), request.subject.as_deref(), matter.as_ref()),
        })
    }

    /// Best effort: any failure leaves the context unchanged.
    async fn expand(&self, query: &str) -> Option<String> {
        let retriever = self.retriever.as_ref()?;

        let term = match &self.searcher {
            Some(searcher) => {
                let agent_query = AgentQuery::new(expansion_query(query))
                    .with_messages(vec![Message::system(EXPANSION_PROMPT)])
                    .with_temperature(self.config.temperature);
                let cancel = CancellationToken::new();
                let _cancel_on_drop = cancel.clone().drop_guard();

                match tokio::time::timeout(
                    self.config.deadline(),
                    searcher.query(agent_query, cancel.clone()),
                )
                .await
                {
                    Ok(Ok(response)) => response.content,
                    Ok(Err(e)) => {
                        warn!(agent = %searcher.name(), error = %e, "search term derivation failed");
                        return None;
                    }
                    Err(_) => {
                        warn!(agent = %searcher.name(), "search term derivation timed out");
                        return None;
                    }
                }
            }
            None => query.to_string(),
        };

        let term = sanitize_search_term(&term, self.config.search_term_max_chars);
        if term.is_empty() {
            debug!("empty search term, skipping retrieval");
            return None;
        }

        match retriever.search(&term, self.config.retrieval_limit).await {
            Ok(documents) if documents.is_empty() => None,
            Ok(documents) => {
                debug!(term = %term, documents = documents.len(), "expansion found documents");
                Some(documents_block(&term, &documents))
            }
            Err(e) => {
                warn!(term = %term, error = %e, "document search failed");
                None
            }
        }
    }

    fn fanout_models(&self) -> Vec<String> {
        if self.config.fanout_models.is_empty() {
            vec![self.pool.default_model().to_string(); self.pool.len()]
        } else {
            self.config.fanout_models.clone()
        }
    }

    fn dispatch<'a>(
        &'a self,
        query: &str,
        context: &RequestContext,
    ) -> Vec<BoxFuture<'a, CandidateAnswer>> {
        let query_text = context.query_text(query);
        let pool = self.pool.as_ref();
        let mut dispatches: Vec<BoxFuture<'a, CandidateAnswer>> = self
            .fanout_models()
            .into_iter()
            .map(|model| {
                let request = PoolRequest::new(query_text.clone())
                    .with_model(model.clone())
                    .with_messages(context.history.clone())
                    .with_temperature(self.config.temperature);
                async move {
                    match pool.query(request).await {
                        Ok(response) => CandidateAnswer::fulfilled(response.name, response.content),
                        Err(e) => CandidateAnswer::rejected(format!("pool:{}", model), e.to_string()),
                    }
                }
                .boxed()
            })
            .collect();

        if let Some(retriever) = &self.retriever {
            let name = self.config.retriever_name.clone();
            let query = query.to_string();
            let history = context.history.clone();
            dispatches.push(
                async move {
                    match retriever.answer(&query, &history).await {
                        Ok(content) => CandidateAnswer::fulfilled(name, content),
                        Err(e) => CandidateAnswer::rejected(name, e.to_string()),
                    }
                }
                .boxed(),
            );
        }

        dispatches
    }

    /// Collect whatever settles before `deadline`; the rest are dropped, which
    /// cancels their transport calls and frees their pool members.
    async fn race(
        &self,
        request_id: Uuid,
        dispatches: Vec<BoxFuture<'_, CandidateAnswer>>,
        deadline: Instant,
    ) -> RaceResult {
        let mut pending: FuturesUnordered<_> = dispatches.into_iter().collect();
        let mut candidates = Vec::with_capacity(pending.len());

        let timed_out = loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(candidate)) => {
                    match &candidate.error {
                        Some(error) => {
                            warn!(agent = %candidate.agent_name, error = %error, "candidate rejected")
                        }
                        None => debug!(agent = %candidate.agent_name, "candidate fulfilled"),
                    }
                    self.events.publish(Event::CandidateSettled {
                        request_id,
                        agent: candidate.agent_name.clone(),
                        fulfilled: candidate.is_fulfilled(),
                    });
                    candidates.push(candidate);
                }
                Ok(None) => break false,
                Err(_) => {
                    warn!(abandoned = pending.len(), "deadline reached");
                    break true;
                }
            }
        };

        RaceResult {
            candidates,
            timed_out,
        }
    }

    async fn reduce(&self, query: &str, candidates: &[CandidateAnswer]) -> Result<String> {
        let agent_query = AgentQuery::new(reduction_query(query, candidates))
            .with_messages(vec![Message::system(SUMMARIZER_PROMPT)])
            .with_temperature(self.config.temperature);
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let outcome = tokio::time::timeout(
            self.config.summarizer_timeout(),
            self.summarizer.query(agent_query, cancel.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                Err(Error::Reduction("summarizer returned an empty answer".to_string()))
            }
            Ok(Ok(response)) => Ok(response.content.trim().to_string()),
            Ok(Err(e)) => Err(Error::Reduction(e.to_string())),
            Err(_) => Err(Error::Reduction(
                Error::Timeout {
                    scope: TimeoutScope::Summarizer,
                    after_ms: self.config.summarizer_timeout_ms,
                }
                .to_string(),
            )),
        }
    }
}
