use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub database: bool,
    pub queued_jobs: i64,
}

/// Liveness probe: process version, repository reachability, queue depth.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthStatus>>, ApiError> {
    let stats = db::models::batch_job::BatchJob::stats(&state.db.pool).await;
    let status = HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        database: stats.is_ok(),
        queued_jobs: stats.map(|s| s.queued).unwrap_or(-1),
    };
    Ok(Json(ApiResponse::success(status)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
