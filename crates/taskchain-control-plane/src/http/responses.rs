//! HTTP request and response types.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use taskchain_core::{AuditEntry, Task, TaskId};

use crate::audit::ChainError;
use crate::queue::QueueError;
use crate::store::StoreError;

// ============================================================================
// Task types
// ============================================================================

/// A task together with the ids of its children.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub child_task_ids: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

impl From<Vec<Task>> for TaskListResponse {
    fn from(tasks: Vec<Task>) -> Self {
        Self {
            count: tasks.len(),
            tasks,
        }
    }
}

/// Query string for `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub limit: Option<usize>,
}

/// Result of cancel and retry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskActionResponse {
    pub task_id: TaskId,
    pub success: bool,
    pub task: Task,
}

// ============================================================================
// Protocol (audit chain) types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterStandardRequest {
    pub actor: String,
    pub standard: String,
    #[serde(default)]
    pub definition: Value,
}

#[derive(Debug, Deserialize)]
pub struct RecordComplianceRequest {
    pub actor: String,
    pub standard: String,
    pub subject: String,
    pub compliant: bool,
    #[serde(default)]
    pub evidence: Value,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub actor: String,
    pub role: String,
    pub subject: String,
    /// Record a revocation instead of a grant.
    #[serde(default)]
    pub revoke: bool,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub role: String,
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub role: String,
    pub subject: String,
    pub granted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<String>,
    pub entries: usize,
}

// ============================================================================
// Health types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub store: &'static str,
    pub pool: &'static str,
    pub in_flight: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub channel: Option<String>,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// API errors with their HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed JSON body or query string.
    InvalidRequest { message: String },
    Validation { message: String },
    NotFound { message: String },
    /// The task is not in a state that allows the change.
    Conflict { message: String },
    Unavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            ApiError::InvalidRequest { message } => {
                (StatusCode::BAD_REQUEST, "invalid_request", message)
            }
            ApiError::Validation { message } => (StatusCode::BAD_REQUEST, "validation_error", message),
            ApiError::NotFound { message } => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict { message } => (StatusCode::CONFLICT, "invalid_transition", message),
            ApiError::Unavailable { message } => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
            }
            ApiError::Internal { message } => {
                error!(error = %message, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) => ApiError::Unavailable {
                message: e.to_string(),
            },
            StoreError::Corrupt(_) => ApiError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Validation(message) => ApiError::Validation { message },
            QueueError::NotFound(_) => ApiError::NotFound {
                message: e.to_string(),
            },
            QueueError::InvalidTransition { .. } => ApiError::Conflict {
                message: e.to_string(),
            },
            QueueError::Store(e) => e.into(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Validation(message) => ApiError::Validation { message },
            ChainError::Store(e) => e.into(),
            ChainError::Integrity { .. } | ChainError::HeadMoved => ApiError::Internal {
                message: e.to_string(),
            },
        }
    }
}
