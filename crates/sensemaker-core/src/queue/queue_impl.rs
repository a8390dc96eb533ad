use super::config::QueueConfig;
use super::job::{Job, JobStatus};
use super::store::{ListStore, JOB_COMPLETED_CHANNEL, JOB_TAKEN_CHANNEL};
use crate::error::{Error, Result, TimeoutScope};
use crate::event_bus::{Event, EventBus};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Built-in method that always succeeds with `true`
pub const VERIFY_METHOD: &str = "verify";

/// Ingestion kinds that settle as completed when no handler is registered
const INGESTION_METHODS: &[&str] = &["IngestDocument", "IngestFile"];

/// Future returned by a method handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Handler invoked with a job's params
pub type MethodHandler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// What a single tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// A job was already in flight
    Busy,
    /// The store was empty
    Idle,
    /// A job was taken and settled
    Settled(Job),
    /// A payload could not be parsed and was dropped
    Discarded(String),
}

struct InFlight {
    job_id: Option<String>,
    since: Instant,
}

/// Owns the queue's in-flight slot; dropping it clears the slot.
struct InFlightGuard {
    slot: Arc<Mutex<Option<InFlight>>>,
}

impl InFlightGuard {
    fn claim(slot: &Arc<Mutex<Option<InFlight>>>) -> Option<Self> {
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
        if current.is_some() {
            return None;
        }
        *current = Some(InFlight {
            job_id: None,
            since: Instant::now(),
        });
        Some(Self {
            slot: Arc::clone(slot),
        })
    }

    fn assign(&self, job_id: &str) {
        if let Some(current) = self
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            current.job_id = Some(job_id.to_string());
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Durable single-consumer job queue
pub struct JobQueue {
    config: QueueConfig,
    store: Arc<dyn ListStore>,
    methods: RwLock<HashMap<String, MethodHandler>>,
    jobs: RwLock<HashMap<String, Job>>,
    settled: Mutex<VecDeque<String>>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    clock: AtomicU64,
    events: EventBus,
}

impl JobQueue {
    /// Create a queue over a list store. The `verify` method is pre-registered.
    #[must_use]
    pub fn new(config: QueueConfig, store: Arc<dyn ListStore>) -> Self {
        let verify: MethodHandler =
            Arc::new(|_: Vec<Value>| -> HandlerFuture { Box::pin(async { Ok(json!(true)) }) });
        let methods = HashMap::from([(VERIFY_METHOD.to_string(), verify)]);

        Self {
            config,
            store,
            methods: RwLock::new(methods),
            jobs: RwLock::new(HashMap::new()),
            settled: Mutex::new(VecDeque::new()),
            in_flight: Arc::new(Mutex::new(None)),
            clock: AtomicU64::new(0),
            events: EventBus::default(),
        }
    }

    /// Publish events on a shared bus
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Queue configuration
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Event bus this queue publishes on
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ticks elapsed
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Whether a job is currently in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Id of the in-flight job and how long it has been running
    #[must_use]
    pub fn current(&self) -> Option<(String, std::time::Duration)> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|f| f.job_id.clone().map(|id| (id, f.since.elapsed())))
    }

    /// Register a handler. One handler per name.
    pub fn register_method(&self, name: impl Into<String>, handler: MethodHandler) -> Result<()> {
        let name = name.into();
        let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
        if methods.contains_key(&name) {
            return Err(Error::DuplicateMethod(name));
        }
        debug!(method = %name, "method registered");
        methods.insert(name, handler);
        Ok(())
    }

    /// Register an async fn as a handler
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register_method(
            name,
            Arc::new(move |params: Vec<Value>| -> HandlerFuture { Box::pin(handler(params)) }),
        )
    }

    /// Append a job to the durable store.
    ///
    /// Derives a content id when the job has none. A job whose id is still
    /// pending or running is rejected and the queue is left unchanged.
    #[instrument(skip(self, job), fields(method = %job.method))]
    pub async fn add_job(&self, mut job: Job) -> Result<Job> {
        if job.method.is_empty() {
            return Err(Error::InvalidRequest("job method is required".to_string()));
        }
        if job.id.is_empty() {
            job.id = job.content_id();
        }
        job.status = JobStatus::Pending;
        job.result = None;
        job.error = None;

        let payload = serde_json::to_string(&job)?;

        let previous = {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            if jobs.get(&job.id).is_some_and(|j| !j.status.is_terminal()) {
                return Err(Error::DuplicateJob(job.id));
            }
            jobs.insert(job.id.clone(), job.clone())
        };

        if let Err(e) = self.store.push(&payload).await {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            match previous {
                Some(prev) => jobs.insert(job.id.clone(), prev),
                None => jobs.remove(&job.id),
            };
            return Err(e);
        }

        info!(job_id = %job.id, "job enqueued");
        self.events.publish(Event::Job {
            job_id: job.id.clone(),
            method: job.method.clone(),
        });
        Ok(job)
    }

    /// Latest known state of a job
    #[must_use]
    pub fn job(&self, id: &str) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Pending jobs in order
    pub async fn jobs(&self) -> Result<Vec<Job>> {
        let payloads = self.store.list().await?;
        Ok(payloads
            .iter()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect())
    }

    /// Pending count
    pub async fn depth(&self) -> Result<usize> {
        self.store.depth().await
    }

    /// Drop every pending job
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, job| job.status.is_terminal());
        Ok(())
    }

    /// Run one tick: take the head if nothing is in flight, execute it under
    /// the tick budget, settle, acknowledge, and release the slot.
    #[instrument(skip(self), fields(clock = tracing::field::Empty))]
    pub async fn tick(&self) -> Result<TickOutcome> {
        let clock = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("clock", clock);

        let Some(slot) = InFlightGuard::claim(&self.in_flight) else {
            return Ok(TickOutcome::Busy);
        };

        let Some(payload) = self.store.take().await? else {
            return Ok(TickOutcome::Idle);
        };

        let mut job: Job = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "dropping unreadable job payload");
                self.store.ack(&payload).await?;
                return Ok(TickOutcome::Discarded(e.to_string()));
            }
        };

        job.transition(JobStatus::Running);
        slot.assign(&job.id);
        self.record(&job);
        self.events.publish(Event::JobTaken {
            job_id: job.id.clone(),
        });
        self.announce(JOB_TAKEN_CHANNEL, &job.id).await;

        let settled = self.execute(job).await;
        self.record(&settled);
        self.store.ack(&payload).await?;

        match settled.status {
            JobStatus::Completed => info!(job_id = %settled.id, "job completed"),
            _ => warn!(job_id = %settled.id, error = ?settled.error, "job failed"),
        }
        self.events.publish(Event::JobSettled {
            job_id: settled.id.clone(),
            status: settled.status,
        });
        if let Ok(summary) = serde_json::to_string(&settled) {
            self.announce(JOB_COMPLETED_CHANNEL, &summary).await;
        }

        if settled.status == JobStatus::Failed {
            if let Some(retry) = settled.retry() {
                match self.add_job(retry).await {
                    Ok(next) => info!(job_id = %next.id, retry_of = %settled.id, "job requeued"),
                    Err(e) => error!(job_id = %settled.id, error = %e, "failed to requeue job"),
                }
            }
        }

        drop(slot);
        Ok(TickOutcome::Settled(settled))
    }

    /// Tick at the configured frequency until shutdown.
    ///
    /// Unacknowledged jobs from a previous run are moved back to the head first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(collection = %self.config.collection, "job queue starting");

        match self.store.recover().await {
            Ok(0) => {}
            Ok(count) => info!(count, "recovered jobs from a previous run"),
            Err(e) => error!(error = %e, "job recovery failed"),
        }

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.tick() => {
                            if let Err(e) = result {
                                error!(error = %e, "queue tick failed");
                            }
                        }
                        _ = shutdown.cancelled() => {
                            warn!("shutdown during a tick; the job will be recovered on restart");
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("job queue shutting down");
        Ok(())
    }

    /// Store the job's latest state. Settled jobs beyond the history limit
    /// are forgotten oldest first; live jobs are never evicted.
    fn record(&self, job: &Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), job.clone());
        if !job.status.is_terminal() {
            return;
        }

        let mut settled = self.settled.lock().unwrap_or_else(|e| e.into_inner());
        settled.retain(|id| id != &job.id);
        settled.push_back(job.id.clone());
        while settled.len() > self.config.history_limit {
            let Some(oldest) = settled.pop_front() else {
                break;
            };
            if jobs.get(&oldest).is_some_and(|j| j.status.is_terminal()) {
                jobs.remove(&oldest);
                debug!(job_id = %oldest, "settled job evicted from history");
            }
        }
    }

    async fn announce(&self, channel: &str, payload: &str) {
        if let Err(e) = self.store.publish(channel, payload).await {
            debug!(channel, error = %e, "job announcement failed");
        }
    }

    async fn execute(&self, mut job: Job) -> Job {
        let handler = self
            .methods
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job.method)
            .cloned();

        let outcome = match handler {
            Some(handler) => self.invoke(&job, handler).await,
            None => unhandled(&job.method),
        };

        match outcome {
            Ok(value) if reports_failure(&value) => {
                job.error = Some(
                    value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("handler reported failure")
                        .to_string(),
                );
                job.result = Some(value);
                job.transition(JobStatus::Failed);
            }
            Ok(value) => {
                job.result = Some(value);
                job.transition(JobStatus::Completed);
            }
            Err(e) => {
                job.error = Some(e.to_string());
                job.transition(JobStatus::Failed);
            }
        }
        job
    }

    /// Run a handler on its own task so a panic settles the job instead of
    /// unwinding the tick loop. The task is aborted once the budget expires.
    async fn invoke(&self, job: &Job, handler: MethodHandler) -> Result<Value> {
        let budget = self.config.tick_budget();
        let mut task = tokio::spawn(handler(job.params.clone()));

        match tokio::time::timeout(budget, &mut task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(Error::Handler {
                method: job.method.clone(),
                message: e.to_string(),
            }),
            Ok(Err(join)) => Err(Error::Handler {
                method: job.method.clone(),
                message: format!("handler panicked: {}", join),
            }),
            Err(_) => {
                task.abort();
                Err(Error::Timeout {
                    scope: TimeoutScope::JobTick,
                    after_ms: budget.as_millis() as u64,
                })
            }
        }
    }
}

fn reports_failure(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("FAILED")
}

fn unhandled(method: &str) -> Result<Value> {
    if INGESTION_METHODS.contains(&method) {
        debug!(method, "no ingestion handler registered, completing with stub");
        return Ok(json!({
            "status": "COMPLETED",
            "message": "No handler registered; ingestion skipped.",
        }));
    }
    warn!(method, "unhandled job type");
    Ok(json!({ "status": "FAILED", "message": "Unhandled job type." }))
}
