//! Conversation message endpoints
//!
//! Posting a message appends it to the conversation, answers it through the
//! pipeline and schedules a title for the conversation on the worker.

use axum::extract::{Extension, Path, Query};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use sensemaker_core::{PipelineRequest, PipelineResponse, StoredMessage, WorkerJob};
use sensemaker_llm::MessageRole;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiResponse};
use crate::server::handlers::TITLE_CONVERSATION;
use crate::server::Services;

/// Body of a posted message
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(alias = "content")]
    pub query: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub matter_id: Option<String>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// History query
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn post_message(
    Extension(services): Extension<Arc<Services>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<ApiResponse<PipelineResponse>>, ApiError> {
    let mut request = PipelineRequest::new(&conversation_id, &body.query);
    request.subject = body.subject;
    request.matter_id = body.matter_id;
    request.deadline_ms = body.deadline_ms;

    if !body.query.trim().is_empty() {
        services
            .store
            .append_message(&conversation_id, MessageRole::User, &body.query)
            .await?;
    }

    let response = services.pipeline.handle_request(request).await?;
    info!(conversation = %conversation_id, message = %response.id, "message answered");

    services.worker.add_job(WorkerJob::new(
        TITLE_CONVERSATION,
        vec![json!(conversation_id)],
    ));

    Ok(Json(ApiResponse::success(response)))
}

async fn list_messages(
    Extension(services): Extension<Arc<Services>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<StoredMessage>>>, ApiError> {
    let messages = services
        .store
        .conversation_messages(&conversation_id, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(messages)))
}

/// Create message routes
pub fn messages_routes() -> Router {
    Router::new().route(
        "/api/conversations/:id/messages",
        post(post_message).get(list_messages),
    )
}
