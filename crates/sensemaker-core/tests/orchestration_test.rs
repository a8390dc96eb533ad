//! End-to-end flows across the pool, queue, worker and pipeline

use sensemaker_core::{
    AgentPool, ConversationStore, DocumentIndex, Event, EventBus, Job, JobQueue, JobStatus,
    MemoryListStore, MemoryMessageStore, MessageStatus, Pipeline, PipelineConfig,
    PipelineRequest, PoolConfig, QueueConfig, TakeOutcome, TickOutcome, Worker, WorkerJob,
};
use sensemaker_llm::{MockTransport, ScriptedReply};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn pool(members: &[Arc<MockTransport>]) -> Arc<AgentPool> {
    let pool = AgentPool::new(PoolConfig::default().with_model("m1"));
    for m in members {
        pool.add_member(m.clone(), Vec::new()).await.unwrap();
    }
    Arc::new(pool)
}

#[tokio::test]
async fn test_queued_request_runs_through_pipeline() {
    let events = EventBus::default();
    let store = Arc::new(MemoryMessageStore::new());
    let alpha = Arc::new(MockTransport::new("alpha", &["m1"]));
    let summarizer = Arc::new(
        MockTransport::new("summarizer", &[]).with_reply(ScriptedReply::content("The answer.")),
    );

    let pipeline = Arc::new(
        Pipeline::new(
            PipelineConfig::default().with_expansion(false),
            pool(&[alpha]).await,
            store.clone(),
            summarizer,
        )
        .with_event_bus(events.clone()),
    );

    let queue = JobQueue::new(
        QueueConfig::default().with_tick_budget(Duration::from_secs(5)),
        Arc::new(MemoryListStore::new()),
    )
    .with_event_bus(events.clone());

    let handler_pipeline = pipeline.clone();
    queue
        .register_fn("HandleRequest", move |params: Vec<Value>| {
            let pipeline = handler_pipeline.clone();
            async move {
                let request: PipelineRequest = serde_json::from_value(params[0].clone())?;
                let response = pipeline.handle_request(request).await?;
                Ok(json!({ "status": "COMPLETED", "id": response.id, "content": response.content }))
            }
        })
        .unwrap();

    let mut rx = events.subscribe();
    let job = queue
        .add_job(Job::new(
            "HandleRequest",
            vec![json!({ "conversation_id": "c1", "query": "what is due?" })],
        ))
        .await
        .unwrap();

    let settled = match queue.tick().await.unwrap() {
        TickOutcome::Settled(job) => job,
        other => panic!("expected a settled job, got {:?}", other),
    };
    assert_eq!(settled.id, job.id);
    assert_eq!(settled.status, JobStatus::Completed);

    let result = settled.result.unwrap();
    assert_eq!(result["content"], "The answer.");
    let message = store
        .message(result["id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, MessageStatus::Ready);

    // Queue and pipeline events share one bus.
    let mut saw_job = false;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        saw_job |= matches!(event, Event::Job { .. });
        saw_completed |= matches!(event, Event::RequestCompleted { .. });
    }
    assert!(saw_job && saw_completed);
}

#[tokio::test]
async fn test_failed_pipeline_fails_the_job() {
    let store = Arc::new(MemoryMessageStore::new());
    let summarizer = Arc::new(
        MockTransport::new("summarizer", &[]).with_reply(ScriptedReply::failure("offline")),
    );
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::default().with_expansion(false),
        pool(&[Arc::new(MockTransport::new("alpha", &["m1"]))]).await,
        store.clone(),
        summarizer,
    ));

    let queue = JobQueue::new(QueueConfig::default(), Arc::new(MemoryListStore::new()));
    queue
        .register_fn("HandleRequest", move |_params: Vec<Value>| {
            let pipeline = pipeline.clone();
            async move {
                pipeline
                    .handle_request(PipelineRequest::new("c1", "question"))
                    .await?;
                Ok(Value::Null)
            }
        })
        .unwrap();
    queue.add_job(Job::new("HandleRequest", vec![])).await.unwrap();

    match queue.tick().await.unwrap() {
        TickOutcome::Settled(job) => {
            assert_eq!(job.status, JobStatus::Failed);
            assert!(job.error.unwrap().contains("offline"));
        }
        other => panic!("expected a settled job, got {:?}", other),
    }

    let messages = store.conversation_messages("c1", 10).await.unwrap();
    assert_eq!(messages[0].status, MessageStatus::Computing);
}

#[tokio::test]
async fn test_worker_feeds_retrieval_index() {
    let index = Arc::new(DocumentIndex::new());
    let worker = Worker::default();

    let target = index.clone();
    worker
        .register_fn("IngestDocument", move |params: Vec<Value>| {
            let index = target.clone();
            async move {
                let content = params
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("document content missing"))?;
                index.ingest(content);
                Ok(())
            }
        })
        .unwrap();

    worker.add_job(WorkerJob::new("IngestDocument", vec![json!("Rent is due monthly.")]));
    assert_eq!(
        worker.take_job(),
        TakeOutcome::Started("IngestDocument".to_string())
    );
    while worker.is_working() {
        tokio::task::yield_now().await;
    }

    assert_eq!(index.len(), 1);
}
