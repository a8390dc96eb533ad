//! Web API module for Sensemaker
//!
//! Provides REST API endpoints for:
//! - Health and pool status
//! - Conversation messages answered by the pipeline
//! - Durable job submission and lookup

pub mod health;
pub mod jobs;
pub mod messages;
pub mod pool;


use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::{Extension, Router};
use sensemaker_core::{Error, UserFriendlyError};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::server::Services;

pub use health::health_routes;
pub use jobs::jobs_routes;
pub use messages::messages_routes;
pub use pool::pool_routes;

/// Create the API router with all endpoints
pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(messages_routes())
        .merge(jobs_routes())
        .merge(pool_routes())
        .layer(Extension(services))
}

/// Standard API response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Core error rendered as an [`ApiResponse`]
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NoCandidate { .. } | Error::AllBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::DuplicateJob(_) | Error::DuplicateMember(_) | Error::DuplicateMethod(_) => {
                StatusCode::CONFLICT
            }
            Error::Reduction(_) | Error::Llm(_) => StatusCode::BAD_GATEWAY,
            Error::Handler { .. }
            | Error::Store(_)
            | Error::Serialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "request failed");
        }
        let body = ApiResponse::<()>::error(self.0.user_message());
        (status, Json(body)).into_response()
    }
}
