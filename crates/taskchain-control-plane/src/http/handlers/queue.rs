//! Queue introspection handlers.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::http::responses::ApiError;
use crate::queue::{QueueMetrics, QueueStatus};
use crate::state::AppState;
use crate::store::StoreStats;

/// GET /queue/status
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Result<Json<QueueStatus>, ApiError> {
    Ok(Json(state.queue.get_status().await?))
}

/// GET /metrics
pub async fn metrics_json(State(state): State<Arc<AppState>>) -> Json<QueueMetrics> {
    Json(state.queue.get_metrics().await)
}

/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(state.store.get_stats().await?))
}
