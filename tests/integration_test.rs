//! Integration tests for Sensemaker
//!
//! These tests verify the integration between the crates:
//! - sensemaker-llm: endpoint configuration and the HTTP transport
//! - sensemaker-core: pool membership, the request pipeline and SQLite persistence

use sensemaker_core::{
    AgentPool, ConversationStore, MemberStatus, MessageStatus, Pipeline, PipelineConfig,
    PipelineRequest, PoolConfig, SqliteMessageStore,
};
use sensemaker_llm::{
    AgentTransport, EndpointConfig, HttpAgent, MessageRole, MockTransport, ScriptedReply,
    SharedTransport,
};
use std::sync::Arc;
use std::time::Duration;

/// An endpoint nothing listens on
fn unreachable_endpoint(name: &str) -> EndpointConfig {
    EndpointConfig::new(name)
        .with_address("127.0.0.1", 1)
        .with_model("m1")
        .with_timeout(Duration::from_secs(2))
}

// ============================================================================
// Endpoint and transport
// ============================================================================

#[test]
fn test_endpoint_config_deserialize() {
    let config: EndpointConfig = serde_json::from_value(serde_json::json!({
        "name": "remote",
        "host": "agents.internal",
        "port": 8443,
        "secure": true,
        "token": "sk-test-abcdef123456",
        "models": ["m1", "m2"],
    }))
    .unwrap();

    assert_eq!(config.base_url(), "https://agents.internal:8443");
    assert_eq!(config.models, vec!["m1", "m2"]);

    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-test-abcdef123456"));
}

#[tokio::test]
async fn test_unreachable_member_falls_back_to_affinity() {
    let agent: SharedTransport = Arc::new(HttpAgent::new(unreachable_endpoint("offline")).unwrap());
    assert!(agent.list_models().await.is_err());

    let pool = AgentPool::new(
        PoolConfig::default()
            .with_model("m1")
            .with_init_timeout(Duration::from_secs(5)),
    );
    pool.add_member(agent, vec!["m1".to_string()]).await.unwrap();

    let health = pool.health();
    assert_eq!(health.failed, 1);
    assert!(!health.is_healthy);

    let members = pool.members();
    assert_eq!(members[0].status, MemberStatus::Failed);
    assert_eq!(members[0].models, vec!["m1"]);
}

// ============================================================================
// Pipeline over SQLite
// ============================================================================

#[tokio::test]
async fn test_pipeline_persists_to_sqlite() {
    let store = Arc::new(SqliteMessageStore::in_memory().await.unwrap());
    store
        .append_message("c1", MessageRole::User, "Who fixes the boiler?")
        .await
        .unwrap();

    let pool = AgentPool::new(PoolConfig::default().with_model("m1"));
    pool.add_member(
        Arc::new(
            MockTransport::new("alpha", &["m1"])
                .with_reply(ScriptedReply::content("The landlord.")),
        ),
        Vec::new(),
    )
    .await
    .unwrap();

    let summarizer = Arc::new(
        MockTransport::new("summarizer", &[])
            .with_reply(ScriptedReply::content("Your landlord must repair it.")),
    );
    let pipeline = Pipeline::new(
        PipelineConfig::default()
            .with_deadline(Duration::from_secs(2))
            .with_expansion(false),
        Arc::new(pool),
        store.clone(),
        summarizer.clone(),
    );

    let response = pipeline
        .handle_request(PipelineRequest::new("c1", "Who fixes the boiler?"))
        .await
        .unwrap();
    assert_eq!(response.content, "Your landlord must repair it.");
    assert_eq!(response.agents, vec!["alpha"]);

    let history = store.conversation_messages("c1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, response.id);
    assert_eq!(history[1].status, MessageStatus::Ready);
    assert_eq!(history[1].role, MessageRole::Assistant);

    let reduction = &summarizer.received()[0];
    assert!(reduction.query.contains("The landlord."));
}

#[tokio::test]
async fn test_pipeline_tolerates_unreachable_member() {
    let store = Arc::new(SqliteMessageStore::in_memory().await.unwrap());
    let pool = AgentPool::new(
        PoolConfig::default()
            .with_model("m1")
            .with_init_timeout(Duration::from_secs(5)),
    );
    pool.add_member(
        Arc::new(HttpAgent::new(unreachable_endpoint("offline")).unwrap()),
        vec!["m1".to_string()],
    )
    .await
    .unwrap();
    pool.add_member(Arc::new(MockTransport::new("alpha", &["m1"])), Vec::new())
        .await
        .unwrap();

    let summarizer = Arc::new(
        MockTransport::new("summarizer", &[]).with_reply(ScriptedReply::content("Merged.")),
    );
    let pipeline = Pipeline::new(
        PipelineConfig::default()
            .with_deadline(Duration::from_secs(5))
            .with_expansion(false),
        Arc::new(pool),
        store.clone(),
        summarizer,
    );

    let response = pipeline
        .handle_request(PipelineRequest::new("c1", "Is a deposit refundable?"))
        .await
        .unwrap();
    assert_eq!(response.content, "Merged.");
    assert!(response.agents.iter().any(|a| a == "alpha"));

    let stored = store.message(&response.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Ready);
}
