//! Job handlers registered on the queue and the worker
//!
//! Queue methods (durable, FIFO):
//! - `IngestDocument`: params `[text, id?]`, adds the text to the retrieval index
//! - `HandleRequest`: params `[PipelineRequest]`, answers a query in the background
//!
//! Worker jobs (in memory, latest first):
//! - `TitleConversation`: params `[conversation_id]`, names a conversation once

use anyhow::{anyhow, Context};
use sensemaker_core::{
    sanitize_search_term, ConversationStore, DocumentIndex, JobQueue, MessageStatus, Pipeline,
    PipelineRequest, Worker,
};
use sensemaker_llm::{AgentQuery, AgentTransport, SharedTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Queue method that feeds the retrieval index
pub const INGEST_DOCUMENT: &str = "IngestDocument";

/// Queue method that runs the pipeline
pub const HANDLE_REQUEST: &str = "HandleRequest";

/// Worker job that titles a conversation
pub const TITLE_CONVERSATION: &str = "TitleConversation";

const MAX_TITLE_CHARS: usize = 100;
const TITLE_HISTORY: usize = 20;
const TITLE_PROMPT: &str =
    "Write a short title for the conversation so far. Reply with the title only.";

/// Register the queue methods
pub fn register_queue_methods(
    queue: &JobQueue,
    pipeline: Arc<Pipeline>,
    index: Arc<DocumentIndex>,
) -> sensemaker_core::Result<()> {
    queue.register_fn(INGEST_DOCUMENT, move |params: Vec<Value>| {
        let index = index.clone();
        async move {
            let text = params
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("{} expects the document text as its first param", INGEST_DOCUMENT))?;
            let id = match params.get(1).and_then(Value::as_str) {
                Some(id) => index.ingest_with_id(id, text),
                None => index.ingest(text),
            };
            debug!(document_id = %id, "document indexed");
            Ok(json!({ "status": "COMPLETED", "id": id }))
        }
    })?;

    queue.register_fn(HANDLE_REQUEST, move |params: Vec<Value>| {
        let pipeline = pipeline.clone();
        async move {
            let raw = params
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("{} expects a request as its first param", HANDLE_REQUEST))?;
            let request: PipelineRequest =
                serde_json::from_value(raw).context("malformed pipeline request")?;
            let response = pipeline.handle_request(request).await?;
            Ok(json!({
                "status": "COMPLETED",
                "id": response.id,
                "content": response.content,
                "agents": response.agents,
            }))
        }
    })?;

    Ok(())
}

/// Register the worker jobs
pub fn register_worker_handlers(
    worker: &Worker,
    store: Arc<dyn ConversationStore>,
    summarizer: SharedTransport,
) -> sensemaker_core::Result<()> {
    worker.register_fn(TITLE_CONVERSATION, move |params: Vec<Value>| {
        let store = store.clone();
        let summarizer = summarizer.clone();
        async move {
            let conversation_id = params
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("{} expects a conversation id", TITLE_CONVERSATION))?;
            title_conversation(store.as_ref(), summarizer.as_ref(), conversation_id).await
        }
    })
}

/// Ask the summarizer for a title unless the conversation already has one
pub async fn title_conversation(
    store: &dyn ConversationStore,
    summarizer: &dyn AgentTransport,
    conversation_id: &str,
) -> anyhow::Result<()> {
    if store.title(conversation_id).await?.is_some() {
        return Ok(());
    }

    let messages: Vec<_> = store
        .conversation_messages(conversation_id, TITLE_HISTORY)
        .await?
        .iter()
        .filter(|m| m.status == MessageStatus::Ready)
        .map(|m| m.to_message())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }

    let response = summarizer
        .query(
            AgentQuery::new(TITLE_PROMPT).with_messages(messages),
            CancellationToken::new(),
        )
        .await?;

    let title = sanitize_search_term(&response.content, MAX_TITLE_CHARS);
    if !title.is_empty() {
        store.set_title(conversation_id, &title).await?;
        info!(conversation = %conversation_id, title = %title, "conversation titled");
    }
    Ok(())
}
