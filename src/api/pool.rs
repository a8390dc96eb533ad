//! Pool inspection endpoint

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use sensemaker_core::{MemberSnapshot, PoolHealth};
use serde::Serialize;
use std::sync::Arc;

use super::ApiResponse;
use crate::server::Services;

/// Pool view
#[derive(Debug, Serialize)]
pub struct PoolView {
    pub default_model: String,
    pub health: PoolHealth,
    pub members: Vec<MemberSnapshot>,
}

async fn get_pool(Extension(services): Extension<Arc<Services>>) -> Json<ApiResponse<PoolView>> {
    Json(ApiResponse::success(PoolView {
        default_model: services.pool.default_model().to_string(),
        health: services.pool.health(),
        members: services.pool.members(),
    }))
}

/// Create pool routes
pub fn pool_routes() -> Router {
    Router::new().route("/api/pool", get(get_pool))
}
