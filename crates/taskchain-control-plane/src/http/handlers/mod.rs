//! HTTP request handlers.

use axum::{extract::rejection::JsonRejection, Json};
use tracing::warn;

use super::responses::ApiError;

mod events;
mod health;
mod protocol;
mod queue;
mod tasks;

pub use events::stream_events;
pub use health::{health_check, metrics_handler};
pub use protocol::{access, entries, grant, record_compliance, register_standard, verify};
pub use queue::{metrics_json, queue_status, stats};
pub use tasks::{cancel_task, create_task, get_task, list_children, list_tasks, patch_task, retry_task};

/// Unwrap a JSON body, turning a rejection into a 400.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection, "Invalid JSON in request body");
        ApiError::InvalidRequest {
            message: rejection.body_text(),
        }
    })
}
