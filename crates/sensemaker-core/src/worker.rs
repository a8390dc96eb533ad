//! Worker - fire-and-forget background execution
//!
//! Unlike the job queue, the worker keeps jobs in memory only and takes the
//! most recently added job first. It suits latest-wins side effects (refreshing
//! a summary, re-indexing after an edit) where an older pending job is stale
//! once a newer one arrives. Jobs of unregistered type are dropped with a
//! warning, not retried.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Future returned by a worker handler
pub type WorkerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Handler invoked with a job's params
pub type WorkerHandler = Arc<dyn Fn(Vec<Value>) -> WorkerFuture + Send + Sync>;

fn default_frequency_hz() -> f64 {
    1.0
}

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Tick frequency in Hz
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency_hz(),
        }
    }
}

impl WorkerConfig {
    /// Time between ticks
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz.max(0.001))
    }
}

/// A background job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    /// Handler type
    #[serde(rename = "type")]
    pub job_type: String,
    /// Ordered params
    #[serde(default)]
    pub params: Vec<Value>,
}

impl WorkerJob {
    /// Create a job
    #[must_use]
    pub fn new(job_type: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            job_type: job_type.into(),
            params,
        }
    }
}

/// What a single take did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOutcome {
    /// A job is still running
    Busy,
    /// The stack was empty
    Idle,
    /// A handler was started for the given type
    Started(String),
    /// No handler for the given type; the job was discarded
    Dropped(String),
}

struct Working {
    job_type: String,
    since: Instant,
}

/// Owns the `working` slot; dropped inside the handler task so the slot is
/// released on success, error, or panic.
struct WorkingGuard {
    slot: Arc<Mutex<Option<Working>>>,
}

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        if let Some(done) = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!(job_type = %done.job_type, elapsed_ms = done.since.elapsed().as_millis() as u64, "worker job finished");
        }
    }
}

/// In-memory LIFO job executor
pub struct Worker {
    config: WorkerConfig,
    handlers: RwLock<HashMap<String, WorkerHandler>>,
    stack: Mutex<Vec<WorkerJob>>,
    working: Arc<Mutex<Option<Working>>>,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

impl Worker {
    /// Create an idle worker
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            stack: Mutex::new(Vec::new()),
            working: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind a handler to a job type
    pub fn register(&self, job_type: impl Into<String>, handler: WorkerHandler) -> Result<()> {
        let job_type = job_type.into();
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.contains_key(&job_type) {
            return Err(Error::DuplicateMethod(job_type));
        }
        handlers.insert(job_type, handler);
        Ok(())
    }

    /// Bind an async fn to a job type
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(
            job_type,
            Arc::new(move |params: Vec<Value>| -> WorkerFuture { Box::pin(handler(params)) }),
        )
    }

    /// Push a job on top of the stack
    pub fn add_job(&self, job: WorkerJob) {
        debug!(job_type = %job.job_type, "worker job added");
        self.stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job);
    }

    /// Jobs waiting on the stack
    #[must_use]
    pub fn pending(&self) -> usize {
        self.stack.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether a handler is running
    #[must_use]
    pub fn is_working(&self) -> bool {
        self.working
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Pop the most recent job and start its handler on a background task.
    pub fn take_job(&self) -> TakeOutcome {
        let (guard, handler, job) = {
            let mut working = self.working.lock().unwrap_or_else(|e| e.into_inner());
            if working.is_some() {
                return TakeOutcome::Busy;
            }

            let Some(job) = self.stack.lock().unwrap_or_else(|e| e.into_inner()).pop() else {
                return TakeOutcome::Idle;
            };

            let handler = self
                .handlers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&job.job_type)
                .cloned();
            let Some(handler) = handler else {
                warn!(job_type = %job.job_type, "no handler registered, dropping worker job");
                return TakeOutcome::Dropped(job.job_type);
            };

            *working = Some(Working {
                job_type: job.job_type.clone(),
                since: Instant::now(),
            });
            (
                WorkingGuard {
                    slot: Arc::clone(&self.working),
                },
                handler,
                job,
            )
        };

        let job_type = job.job_type.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = handler(job.params).await {
                warn!(job_type = %job.job_type, error = %e, "worker job failed");
            }
        });

        TakeOutcome::Started(job_type)
    }

    /// Take jobs at the configured frequency until shutdown
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(frequency_hz = self.config.frequency_hz, "worker starting");

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.take_job();
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!(pending = self.pending(), "worker shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn wait_idle(worker: &Worker) {
        while worker.is_working() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_lifo_order() {
        let worker = Worker::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        worker
            .register_fn("record", move |params| {
                let tx = tx.clone();
                async move {
                    tx.send(params[0].clone())?;
                    Ok(())
                }
            })
            .unwrap();

        for i in 0..3 {
            worker.add_job(WorkerJob::new("record", vec![json!(i)]));
        }

        for expected in [2, 1, 0] {
            assert_eq!(worker.take_job(), TakeOutcome::Started("record".to_string()));
            assert_eq!(rx.recv().await.unwrap(), json!(expected));
            wait_idle(&worker).await;
        }
        assert_eq!(worker.take_job(), TakeOutcome::Idle);
    }

    #[tokio::test]
    async fn test_working_flag_blocks_reentry() {
        let worker = Worker::default();
        let gate = Arc::new(tokio::sync::Notify::new());
        let waiter = gate.clone();
        worker
            .register_fn("slow", move |_| {
                let waiter = waiter.clone();
                async move {
                    waiter.notified().await;
                    Ok(())
                }
            })
            .unwrap();

        worker.add_job(WorkerJob::new("slow", vec![]));
        worker.add_job(WorkerJob::new("slow", vec![]));

        assert_eq!(worker.take_job(), TakeOutcome::Started("slow".to_string()));
        assert_eq!(worker.take_job(), TakeOutcome::Busy);
        assert_eq!(worker.pending(), 1);

        gate.notify_one();
        wait_idle(&worker).await;
        assert_eq!(worker.take_job(), TakeOutcome::Started("slow".to_string()));
    }

    #[tokio::test]
    async fn test_unregistered_type_dropped() {
        let worker = Worker::default();
        worker.add_job(WorkerJob::new("unknown", vec![]));

        assert_eq!(worker.take_job(), TakeOutcome::Dropped("unknown".to_string()));
        assert!(!worker.is_working());
        assert_eq!(worker.pending(), 0);
    }

    async fn crash(_params: Vec<Value>) -> anyhow::Result<()> {
        panic!("worker handler bug")
    }

    #[tokio::test]
    async fn test_panic_releases_working() {
        let worker = Worker::default();
        worker.register_fn("crash", crash).unwrap();
        worker.add_job(WorkerJob::new("crash", vec![]));

        assert_eq!(worker.take_job(), TakeOutcome::Started("crash".to_string()));
        wait_idle(&worker).await;
        assert!(!worker.is_working());
    }

    #[tokio::test]
    async fn test_handler_error_releases_working() {
        let worker = Worker::default();
        worker
            .register_fn("fails", |_| async { Err(anyhow::anyhow!("nope")) })
            .unwrap();
        worker.add_job(WorkerJob::new("fails", vec![]));

        worker.take_job();
        wait_idle(&worker).await;
        assert_eq!(worker.take_job(), TakeOutcome::Idle);
    }

    #[test]
    fn test_job_wire_shape() {
        let job = WorkerJob::new("summarize", vec![json!("c1")]);
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            json!({"type": "summarize", "params": ["c1"]})
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let worker = Worker::default();
        worker.register_fn("a", |_| async { Ok(()) }).unwrap();
        assert!(worker.register_fn("a", |_| async { Ok(()) }).is_err());
    }
}
