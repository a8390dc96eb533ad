//! Service wiring
//!
//! Builds the pool, queue, worker and pipeline from configuration and
//! registers the job handlers on them.

use super::AppConfig;
use super::handlers;
use anyhow::{Context, Result};
use futures::future::join_all;
use sensemaker_core::{
    AgentPool, ConversationStore, DocumentIndex, EventBus, JobQueue, ListStore, MemoryListStore,
    MemoryMessageStore, Pipeline, QueueConfig, RedisListStore, SqliteMessageStore, Worker,
};
use sensemaker_llm::{EndpointConfig, HttpAgent, SharedTransport};
use std::sync::Arc;
use tracing::{info, warn};

/// Backends a [`Services`] instance is assembled from
pub struct Components {
    /// Durable list behind the job queue
    pub list_store: Arc<dyn ListStore>,
    /// Conversation and message store
    pub store: Arc<dyn ConversationStore>,
    /// Agent that reduces candidate answers
    pub summarizer: SharedTransport,
    /// Agent that derives search terms
    pub searcher: Option<SharedTransport>,
    /// Pool members with their static model affinity
    pub members: Vec<(SharedTransport, Vec<String>)>,
}

/// Everything the HTTP API and the CLI operate on
pub struct Services {
    pub config: AppConfig,
    pub pool: Arc<AgentPool>,
    pub queue: Arc<JobQueue>,
    pub worker: Arc<Worker>,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn ConversationStore>,
    pub index: Arc<DocumentIndex>,
}

impl Services {
    /// Connect every backend named in the configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let components = Components {
            list_store: open_list_store(&config)?,
            store: open_message_store(&config).await?,
            summarizer: http_agent(&config.summarizer)?,
            searcher: config.searcher.as_ref().map(http_agent).transpose()?,
            members: member_transports(&config)?,
        };
        Self::assemble(config, components).await
    }

    /// Assemble services over already-built backends
    pub async fn assemble(config: AppConfig, components: Components) -> Result<Self> {
        let events = EventBus::default();
        let pool = Arc::new(populate_pool(&config, components.members).await?);
        let index = Arc::new(DocumentIndex::new());

        let mut pipeline = Pipeline::new(
            config.pipeline.clone(),
            pool.clone(),
            components.store.clone(),
            components.summarizer.clone(),
        )
        .with_retriever(index.clone())
        .with_event_bus(events.clone());
        if let Some(searcher) = components.searcher {
            pipeline = pipeline.with_searcher(searcher);
        }
        let pipeline = Arc::new(pipeline);

        let queue = JobQueue::new(queue_config(&config), components.list_store)
            .with_event_bus(events.clone());
        handlers::register_queue_methods(&queue, pipeline.clone(), index.clone())?;

        let worker = Worker::new(config.worker.clone());
        handlers::register_worker_handlers(
            &worker,
            components.store.clone(),
            components.summarizer,
        )?;

        Ok(Self {
            config,
            pool,
            queue: Arc::new(queue),
            worker: Arc::new(worker),
            pipeline,
            store: components.store,
            index,
        })
    }
}

/// Queue settings with a tick budget long enough for a queued request to
/// run the whole pipeline
fn queue_config(config: &AppConfig) -> QueueConfig {
    let queue = config.queue.clone();
    let needed = config.pipeline.request_budget();
    if queue.tick_budget() >= needed {
        return queue;
    }
    warn!(
        configured_ms = queue.tick_budget().as_millis() as u64,
        raised_ms = needed.as_millis() as u64,
        "Queue tick budget is shorter than a pipeline request, raising it"
    );
    queue.with_tick_budget(needed)
}

/// Redis list when a URL is configured, process memory otherwise
pub fn open_list_store(config: &AppConfig) -> Result<Arc<dyn ListStore>> {
    if config.redis.url.is_empty() {
        warn!("No Redis URL configured, jobs will not survive a restart");
        return Ok(Arc::new(MemoryListStore::new()));
    }

    let store = RedisListStore::with_collection(&config.redis.url, &config.queue.collection)
        .context("Failed to open Redis job list")?;
    info!(collection = %config.queue.collection, "Redis job list initialized");
    Ok(Arc::new(store))
}

/// SQLite file when a path is configured, process memory otherwise
pub async fn open_message_store(config: &AppConfig) -> Result<Arc<dyn ConversationStore>> {
    if config.database.path.is_empty() {
        warn!("No database path configured, conversations are kept in memory");
        return Ok(Arc::new(MemoryMessageStore::new()));
    }

    let store = SqliteMessageStore::new(&config.database.path)
        .await
        .context("Failed to open message database")?;
    info!(path = %config.database.path, "Message database initialized");
    Ok(Arc::new(store))
}

/// Build the pool and probe every configured member
pub async fn build_pool(config: &AppConfig) -> Result<AgentPool> {
    populate_pool(config, member_transports(config)?).await
}

async fn populate_pool(
    config: &AppConfig,
    members: Vec<(SharedTransport, Vec<String>)>,
) -> Result<AgentPool> {
    let pool = AgentPool::new(config.pool.clone());
    let results = join_all(
        members
            .into_iter()
            .map(|(transport, affinity)| pool.add_member(transport, affinity)),
    )
    .await;
    for result in results {
        result?;
    }

    let health = pool.health();
    if health.is_healthy {
        info!(ready = health.ready, total = health.total, "Agent pool initialized");
    } else {
        warn!(total = health.total, "No pool member is ready");
    }
    Ok(pool)
}

fn member_transports(config: &AppConfig) -> Result<Vec<(SharedTransport, Vec<String>)>> {
    config
        .members
        .iter()
        .map(|endpoint| Ok((http_agent(endpoint)?, endpoint.models.clone())))
        .collect()
}

fn http_agent(endpoint: &EndpointConfig) -> Result<SharedTransport> {
    let agent = HttpAgent::new(endpoint.clone())
        .with_context(|| format!("Failed to build agent '{}'", endpoint.name))?;
    Ok(Arc::new(agent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handlers::HANDLE_REQUEST;
    use crate::server::loader::DEFAULT_CONFIG;
    use config::{Config, File, FileFormat};
    use sensemaker_core::{Job, JobStatus, MessageStatus, PipelineRequest, TickOutcome};
    use sensemaker_llm::{MockTransport, ScriptedReply};
    use serde_json::json;
    use std::time::Duration;

    fn shipped_config() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_tick_budget_covers_a_pipeline_request() {
        let shipped = shipped_config();
        assert!(shipped.queue.tick_budget() >= shipped.pipeline.request_budget());

        let mut config = AppConfig::default();
        config.queue.tick_budget_ms = None;
        assert_eq!(
            queue_config(&config).tick_budget(),
            config.pipeline.request_budget()
        );

        config.queue.tick_budget_ms = Some(3_600_000);
        assert_eq!(
            queue_config(&config).tick_budget(),
            Duration::from_secs(3600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_outlasting_tick_interval_completes() {
        let config = shipped_config();
        let model = config.pool.model.clone();
        // Longer than the one second tick interval
        let slow =
            ScriptedReply::content("Rent is due on the 5th.").after(Duration::from_millis(1500));
        let member = Arc::new(MockTransport::new("local", &[model.as_str()]).with_reply(slow));
        let summarizer = Arc::new(
            MockTransport::new("summarizer", &[]).with_reply(ScriptedReply::content("Pay by the 5th.")),
        );
        let components = Components {
            list_store: Arc::new(MemoryListStore::new()),
            store: Arc::new(MemoryMessageStore::new()),
            summarizer,
            searcher: None,
            members: vec![(member as SharedTransport, Vec::new())],
        };
        let services = Services::assemble(config, components).await.unwrap();

        let request = PipelineRequest::new("c1", "When is rent due?");
        services
            .queue
            .add_job(Job::new(HANDLE_REQUEST, vec![json!(request)]))
            .await
            .unwrap();

        match services.queue.tick().await.unwrap() {
            TickOutcome::Settled(job) => {
                assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
                assert_eq!(job.result.unwrap()["content"], "Pay by the 5th.");
            }
            other => panic!("expected a settled job, got {:?}", other),
        }

        let history = services.store.conversation_messages("c1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MessageStatus::Ready);
    }
}
