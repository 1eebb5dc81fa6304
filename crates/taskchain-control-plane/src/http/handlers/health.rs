//! Health and metrics handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::warn;

use crate::http::responses::HealthResponse;
use crate::state::AppState;

/// Health check endpoint. 503 `degraded` while the store is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Health check could not reach the store");
            false
        }
    };

    let pool = if !state.pool.is_running().await {
        "stopped"
    } else if state.pool.is_healthy() {
        "running"
    } else {
        "unhealthy"
    };

    let body = HealthResponse {
        status: if store_ok { "ok" } else { "degraded" },
        store: if store_ok { "ok" } else { "unavailable" },
        pool,
        in_flight: state.queue.in_flight_count().await,
        uptime_secs: state.uptime_secs(),
    };
    let code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = crate::metrics::collect_metrics(&state).await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStore;
    use crate::config::Config;
    use crate::store::InMemoryTaskStore;

    #[tokio::test]
    async fn test_health_ok() {
        let state = AppState::in_memory(Config::default());
        let (code, Json(body)) = health_check(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.pool, "stopped");
    }

    #[tokio::test]
    async fn test_health_degraded_when_store_down() {
        let store = Arc::new(InMemoryTaskStore::new());
        let state = AppState::new(Config::default(), store.clone(), Arc::new(InMemoryAuditStore::new()));
        store.set_available(false);

        let (code, Json(body)) = health_check(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.store, "unavailable");
    }

    #[tokio::test]
    async fn test_prometheus_content_type() {
        let state = AppState::in_memory(Config::default());
        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
    }
}
