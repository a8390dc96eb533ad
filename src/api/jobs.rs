//! Job queue endpoints

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use sensemaker_core::Job;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, ApiResponse};
use crate::server::Services;

/// Job submission
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Retries after failure; the queue's configured default when absent
    #[serde(default)]
    pub attempts: Option<u32>,
}

impl SubmitJobRequest {
    fn into_job(self, default_attempts: u32) -> Job {
        let job = Job::new(self.method, self.params)
            .with_attempts(self.attempts.unwrap_or(default_attempts));
        match self.id {
            Some(id) => job.with_id(id),
            None => job,
        }
    }
}

async fn submit_job(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Job>>), ApiError> {
    let job = body.into_job(services.queue.config().attempts);
    let job = services.queue.add_job(job).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))))
}

async fn list_jobs(
    Extension(services): Extension<Arc<Services>>,
) -> Result<Json<ApiResponse<Vec<Job>>>, ApiError> {
    Ok(Json(ApiResponse::success(services.queue.jobs().await?)))
}

async fn get_job(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<Job>>) {
    match services.queue.job(&id) {
        Some(job) => (StatusCode::OK, Json(ApiResponse::success(job))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Job not found: {}", id))),
        ),
    }
}

/// Create job routes
pub fn jobs_routes() -> Router {
    Router::new()
        .route("/api/jobs", get(list_jobs).post(submit_job))
        .route("/api/jobs/:id", get(get_job))
}
