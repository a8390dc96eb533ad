use super::retrieval::MockRetriever;
use super::*;
use crate::error::{Error, TimeoutScope};
use crate::event_bus::Event;
use crate::pool::{AgentPool, PoolConfig};
use sensemaker_llm::{MessageRole, MockTransport, ScriptedReply};
use std::sync::Arc;
use std::time::Duration;

fn member(name: &str, models: &[&str], reply: ScriptedReply) -> Arc<MockTransport> {
    Arc::new(MockTransport::new(name, models).with_reply(reply))
}

async fn pool_with(members: &[Arc<MockTransport>]) -> Arc<AgentPool> {
    let pool = AgentPool::new(
        PoolConfig::default()
            .with_model("m1")
            .with_timeout(Duration::from_secs(60)),
    );
    for m in members {
        pool.add_member(m.clone(), Vec::new()).await.unwrap();
    }
    Arc::new(pool)
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_deadline(Duration::from_secs(1))
        .with_expansion(false)
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<MemoryMessageStore>,
    summarizer: Arc<MockTransport>,
}

fn harness(config: PipelineConfig, pool: Arc<AgentPool>) -> Harness {
    let store = Arc::new(MemoryMessageStore::new());
    let summarizer = Arc::new(MockTransport::new("summarizer", &[]));
    let pipeline = Pipeline::new(config, pool, store.clone(), summarizer.clone());
    Harness {
        pipeline,
        store,
        summarizer,
    }
}

async fn only_message(store: &MemoryMessageStore, conversation_id: &str) -> StoredMessage {
    let mut messages = store.conversation_messages(conversation_id, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    messages.remove(0)
}

#[tokio::test(start_paused = true)]
async fn test_fast_candidate_wins_over_deadline() {
    let fast = member(
        "fast",
        &["m1"],
        ScriptedReply::content("fast answer").after(Duration::from_millis(10)),
    );
    let slow = member(
        "slow",
        &["m1"],
        ScriptedReply::content("slow answer").after(Duration::from_secs(5)),
    );
    let pool = pool_with(&[fast.clone(), slow.clone()]).await;
    let h = harness(config(), pool.clone());

    let response = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "how long is the lease?"))
        .await
        .unwrap();

    assert_eq!(response.agents, vec!["fast".to_string()]);
    let reduced = &h.summarizer.received()[0].query;
    assert!(reduced.contains("fast answer"));
    assert!(!reduced.contains("slow answer"));

    let stored = only_message(&h.store, "c1").await;
    assert_eq!(stored.id, response.id);
    assert_eq!(stored.status, MessageStatus::Ready);
    assert_eq!(stored.content, response.content);

    // The abandoned dispatch released its member.
    assert!(pool.members().iter().all(|m| !m.busy));
}

#[tokio::test]
async fn test_partial_failure_tolerated() {
    // Replies take a moment so each dispatch claims a different member.
    let alpha = member(
        "alpha",
        &["m1"],
        ScriptedReply::failure("model crashed").after(Duration::from_millis(5)),
    );
    let beta = member(
        "beta",
        &["m1"],
        ScriptedReply::content("beta answer").after(Duration::from_millis(5)),
    );
    let pool = pool_with(&[alpha, beta]).await;

    let index = Arc::new(DocumentIndex::new());
    index.ingest("The lease runs for twelve months.");

    let h = harness(config(), pool);
    let pipeline = h.pipeline.with_retriever(index);

    let response = pipeline
        .handle_request(PipelineRequest::new("c1", "how long does the lease run?"))
        .await
        .unwrap();

    let mut agents = response.agents.clone();
    agents.sort();
    assert_eq!(agents, vec!["beta".to_string(), "trainer".to_string()]);

    let reduced = &h.summarizer.received()[0].query;
    assert!(reduced.contains("beta answer"));
    assert!(reduced.contains("twelve months"));
}

#[tokio::test]
async fn test_summarizer_failure_leaves_placeholder_computing() {
    let pool = pool_with(&[member("alpha", &["m1"], ScriptedReply::content("answer"))]).await;
    let h = harness(config(), pool);
    h.summarizer.push_reply(ScriptedReply::failure("summarizer offline"));
    let mut rx = h.pipeline.events().subscribe();

    let result = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await;
    assert!(matches!(result, Err(Error::Reduction(msg)) if msg.contains("summarizer offline")));

    let stored = only_message(&h.store, "c1").await;
    assert_eq!(stored.status, MessageStatus::Computing);
    assert_eq!(stored.content, PLACEHOLDER_CONTENT);

    let mut failed = false;
    while let Ok(event) = rx.try_recv() {
        failed |= matches!(event, Event::RequestFailed { .. });
        assert!(!matches!(event, Event::RequestCompleted { .. }));
    }
    assert!(failed);
}

#[tokio::test]
async fn test_empty_summary_is_a_reduction_error() {
    let pool = pool_with(&[member("alpha", &["m1"], ScriptedReply::content("answer"))]).await;
    let h = harness(config(), pool);
    h.summarizer.push_reply(ScriptedReply::content("   "));

    let result = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await;
    assert!(matches!(result, Err(Error::Reduction(_))));
}

#[tokio::test(start_paused = true)]
async fn test_summarizer_timeout_is_a_reduction_error() {
    let pool = pool_with(&[member("alpha", &["m1"], ScriptedReply::content("answer"))]).await;
    let h = harness(
        config().with_summarizer_timeout(Duration::from_secs(2)),
        pool,
    );
    h.summarizer
        .push_reply(ScriptedReply::content("late").after(Duration::from_secs(30)));

    let result = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await;
    assert!(matches!(result, Err(Error::Reduction(msg)) if msg.contains("summarizer timed out")));
}

#[tokio::test(start_paused = true)]
async fn test_nothing_before_deadline_times_out() {
    let slow = member(
        "slow",
        &["m1"],
        ScriptedReply::content("late").after(Duration::from_secs(5)),
    );
    let pool = pool_with(&[slow]).await;
    let h = harness(config(), pool);

    let result = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await;
    assert!(matches!(
        result,
        Err(Error::Timeout {
            scope: TimeoutScope::Pipeline,
            after_ms: 1000
        })
    ));
    assert_eq!(h.summarizer.calls(), 0);
    assert_eq!(
        only_message(&h.store, "c1").await.status,
        MessageStatus::Computing
    );
}

#[tokio::test]
async fn test_all_candidates_rejected() {
    let pool = pool_with(&[
        member(
            "alpha",
            &["m1"],
            ScriptedReply::failure("down").after(Duration::from_millis(5)),
        ),
        member(
            "beta",
            &["m1"],
            ScriptedReply::content("").after(Duration::from_millis(5)),
        ),
    ])
    .await;
    let h = harness(config(), pool);

    let result = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await;
    assert!(matches!(result, Err(Error::Reduction(_))));
    assert_eq!(h.summarizer.calls(), 0);
}

#[tokio::test]
async fn test_expansion_failure_is_non_fatal() {
    let pool = pool_with(&[member("alpha", &["m1"], ScriptedReply::content("answer"))]).await;
    let searcher = Arc::new(
        MockTransport::new("searcher", &[]).with_reply(ScriptedReply::failure("searcher down")),
    );

    let mut retriever = MockRetriever::new();
    retriever.expect_search().never();
    retriever
        .expect_answer()
        .returning(|_, _| Ok("From the index.".to_string()));

    let h = harness(config().with_expansion(true), pool);
    let pipeline = h
        .pipeline
        .with_searcher(searcher.clone())
        .with_retriever(Arc::new(retriever));

    let response = pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await
        .unwrap();
    assert_eq!(searcher.calls(), 1);
    assert!(response.agents.contains(&"alpha".to_string()));
}

#[tokio::test]
async fn test_expansion_folds_documents_into_context() {
    let alpha = member("alpha", &["m1"], ScriptedReply::content("answer"));
    let pool = pool_with(&[alpha.clone()]).await;
    let searcher = Arc::new(
        MockTransport::new("searcher", &[])
            .with_reply(ScriptedReply::content("  “lease renewal”\n")),
    );

    let mut retriever = MockRetriever::new();
    retriever
        .expect_search()
        .withf(|term, limit| term == "lease renewal" && *limit == 4)
        .times(1)
        .returning(|_, _| {
            Ok(vec![RetrievedDocument {
                id: "doc-7".to_string(),
                content: "Renewal requires ninety days notice.".to_string(),
                score: 1.0,
            }])
        });
    retriever.expect_answer().returning(|_, _| Ok(String::new()));

    let h = harness(config().with_expansion(true), pool);
    let pipeline = h
        .pipeline
        .with_searcher(searcher)
        .with_retriever(Arc::new(retriever));

    let response = pipeline
        .handle_request(PipelineRequest::new("c1", "when must I renew?"))
        .await
        .unwrap();

    let sent = &alpha.received()[0].query;
    assert!(sent.contains("[documents matching \"lease renewal\"]"));
    assert!(sent.contains("ninety days notice"));
    // An empty retriever answer is not a candidate.
    assert_eq!(response.agents, vec!["alpha".to_string()]);
}

#[tokio::test]
async fn test_context_carries_history_and_header() {
    let alpha = member("alpha", &["m1"], ScriptedReply::content("answer"));
    let pool = pool_with(&[alpha.clone()]).await;
    let h = harness(config(), pool);

    h.store
        .append_message("c1", MessageRole::User, "earlier question")
        .await
        .unwrap();
    h.store
        .append_message("c1", MessageRole::Assistant, "earlier answer")
        .await
        .unwrap();
    h.store
        .append_message("c1", MessageRole::User, "what now?")
        .await
        .unwrap();

    h.pipeline
        .handle_request(PipelineRequest::new("c1", "what now?").with_subject("Tenancy"))
        .await
        .unwrap();

    let sent = &alpha.received()[0];
    let history: Vec<(MessageRole, &str)> = sent
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        history,
        vec![
            (MessageRole::User, "earlier question"),
            (MessageRole::Assistant, "earlier answer"),
        ]
    );
    assert!(sent.query.contains("clock: 1"));
    assert!(sent.query.contains("subject: Tenancy"));
    assert!(sent.query.ends_with("[question]\nwhat now?"));
}

#[tokio::test]
async fn test_own_placeholder_does_not_consume_history_window() {
    let alpha = member("alpha", &["m1"], ScriptedReply::content("answer"));
    let pool = pool_with(&[alpha.clone()]).await;
    let mut config = config();
    config.history_limit = 2;
    let h = harness(config, pool);

    h.store
        .append_message("c1", MessageRole::User, "earlier question")
        .await
        .unwrap();
    h.store
        .append_message("c1", MessageRole::Assistant, "earlier answer")
        .await
        .unwrap();

    h.pipeline
        .handle_request(PipelineRequest::new("c1", "follow up"))
        .await
        .unwrap();

    let sent = &alpha.received()[0];
    let history: Vec<&str> = sent.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(history, vec!["earlier question", "earlier answer"]);
}

#[tokio::test]
async fn test_matter_attachments_and_missing_matter() {
    let alpha = Arc::new(MockTransport::new("alpha", &["m1"]));
    let pool = pool_with(&[alpha.clone()]).await;
    let h = harness(config(), pool);
    h.store.insert_matter(Matter {
        id: "m-1".to_string(),
        title: "Smith v. Jones".to_string(),
        description: None,
        attachments: vec!["Exhibit A: the lease".to_string()],
    });

    h.pipeline
        .handle_request(PipelineRequest::new("c1", "summarize").with_matter("m-1"))
        .await
        .unwrap();
    assert!(alpha.received()[0].query.contains("Exhibit A: the lease"));

    h.pipeline
        .handle_request(PipelineRequest::new("c2", "summarize").with_matter("unknown"))
        .await
        .unwrap();
    assert_eq!(h.pipeline.clock(), 2);
}

#[tokio::test]
async fn test_fanout_models_each_get_a_query() {
    let alpha = Arc::new(MockTransport::new("alpha", &["m1"]));
    let beta = Arc::new(MockTransport::new("beta", &["m2"]));
    let pool = pool_with(&[alpha.clone(), beta.clone()]).await;
    let h = harness(
        config().with_fanout_models(vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]),
        pool,
    );

    let response = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await
        .unwrap();

    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 1);
    // No member serves m3; its dispatch is rejected without failing the request.
    assert_eq!(response.agents.len(), 2);
}

#[tokio::test]
async fn test_stage_events_in_order() {
    let pool = pool_with(&[Arc::new(MockTransport::new("alpha", &["m1"]))]).await;
    let h = harness(config(), pool);
    let mut rx = h.pipeline.events().subscribe();

    let response = h
        .pipeline
        .handle_request(PipelineRequest::new("c1", "question"))
        .await
        .unwrap();

    let mut stages = Vec::new();
    let mut completed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::StageChanged { stage, .. } => stages.push(stage),
            Event::RequestCompleted { message_id, .. } => completed = Some(message_id),
            _ => {}
        }
    }

    assert_eq!(
        stages,
        vec![
            Stage::BuildingContext,
            Stage::Dispatching,
            Stage::Racing,
            Stage::Reducing,
            Stage::Persisted,
        ]
    );
    assert_eq!(completed, Some(response.id));
}

#[tokio::test]
async fn test_invalid_request_rejected_before_placeholder() {
    let pool = pool_with(&[]).await;
    let h = harness(config(), pool);

    let result = h.pipeline.handle_request(PipelineRequest::new("c1", "  ")).await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));

    let result = h.pipeline.handle_request(PipelineRequest::new("", "question")).await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));

    assert!(h.store.conversation_messages("c1", 10).await.unwrap().is_empty());
}
