//! Health check endpoint
//!
//! `/health` reports the version, pool health and queue state. It answers
//! 200 while at least one member is ready and 503 otherwise. An unreachable
//! job store omits `queue_depth`.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use sensemaker_core::PoolHealth;
use serde::Serialize;
use std::sync::Arc;

use crate::server::Services;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub pool: PoolHealth,
    pub queue_busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
    pub worker_pending: usize,
    pub documents: usize,
}

async fn health_check(
    Extension(services): Extension<Arc<Services>>,
) -> (StatusCode, Json<HealthResponse>) {
    let pool = services.pool.health();
    let (code, status) = if pool.is_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            pool,
            queue_busy: services.queue.is_busy(),
            queue_depth: services.queue.depth().await.ok(),
            worker_pending: services.worker.pending(),
            documents: services.index.len(),
        }),
    )
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}
