//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task submission and lifecycle (`/tasks`)
//! - Queue introspection (`/queue/status`, `/metrics`, `/stats`)
//! - Live events over SSE (`/events`)
//! - The governance audit chain (`/protocol/*`)
//! - Health check (`/health`) and Prometheus metrics (`/metrics/prometheus`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for dashboard access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Task routes
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route(
            "/tasks/:id",
            get(handlers::get_task)
                .patch(handlers::patch_task)
                .delete(handlers::cancel_task),
        )
        .route("/tasks/:id/retry", post(handlers::retry_task))
        .route("/tasks/:id/children", get(handlers::list_children))
        // Queue routes
        .route("/queue/status", get(handlers::queue_status))
        .route("/stats", get(handlers::stats))
        .route("/events", get(handlers::stream_events))
        // Governance routes
        .route("/protocol/standard", post(handlers::register_standard))
        .route("/protocol/compliance", post(handlers::record_compliance))
        .route("/protocol/grant", post(handlers::grant))
        .route("/protocol/access", get(handlers::access))
        .route("/protocol/entries", get(handlers::entries))
        .route("/protocol/verify", get(handlers::verify))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_json))
        .route("/metrics/prometheus", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
