//! Task submission, lookup and lifecycle handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use tracing::warn;

use taskchain_core::{AuditAction, NewTask, Task, TaskId, TaskPatch, TaskStatus};

use crate::http::responses::{
    ApiError, ListTasksQuery, TaskActionResponse, TaskListResponse, TaskResponse,
};
use crate::queue::TaskFilter;
use crate::state::AppState;

use super::json_body;

/// Header naming who performed an administrative action.
const ACTOR_HEADER: &str = "x-actor";
const DEFAULT_ACTOR: &str = "api";

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

async fn record(state: &AppState, headers: &HeaderMap, action: AuditAction, task: &Task) {
    let details = json!({ "taskId": task.id, "taskType": task.task_type });
    if let Err(e) = state.chain.append(&actor(headers), action, details).await {
        warn!(task_id = %task.id, action = %action, error = %e, "Failed to record audit entry");
    }
}

async fn with_children(state: &AppState, task: Task) -> Result<TaskResponse, ApiError> {
    let child_task_ids = state
        .store
        .find_by_parent_id(&task.id)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    Ok(TaskResponse {
        task,
        child_task_ids,
    })
}

/// POST /tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let submission = json_body(body)?;
    let task = state.queue.enqueue(submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(TaskResponse {
            task,
            child_task_ids: Vec::new(),
        }),
    ))
}

/// GET /tasks/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.queue.get_task(&TaskId::new(id)).await?;
    Ok(Json(with_children(&state, task).await?))
}

/// PATCH /tasks/:id
pub async fn patch_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let patch = json_body(body)?;
    let task = state.queue.apply_patch(&TaskId::new(id), patch).await?;
    Ok(Json(with_children(&state, task).await?))
}

/// DELETE /tasks/:id
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let task_id = TaskId::new(id);
    if !state.queue.cancel_task(&task_id).await? {
        return Err(ApiError::not_found(format!(
            "Task not found or not cancellable: {task_id}"
        )));
    }
    let task = state.queue.get_task(&task_id).await?;
    record(&state, &headers, AuditAction::TaskCancelled, &task).await;
    Ok(Json(TaskActionResponse {
        task_id,
        success: true,
        task,
    }))
}

/// POST /tasks/:id/retry
pub async fn retry_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let task_id = TaskId::new(id);
    if !state.queue.retry_task(&task_id).await? {
        return Err(ApiError::not_found(format!(
            "Task not found or not retryable: {task_id}"
        )));
    }
    let task = state.queue.get_task(&task_id).await?;
    record(&state, &headers, AuditAction::TaskRetried, &task).await;
    Ok(Json(TaskActionResponse {
        task_id,
        success: true,
        task,
    }))
}

/// GET /tasks?status=&type=&limit=
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let filter = TaskFilter {
        status,
        task_type: query.task_type,
        limit: query.limit,
    };
    Ok(Json(state.queue.list_tasks(filter).await?.into()))
}

/// GET /tasks/:id/children
pub async fn list_children(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let children = state.queue.children(&TaskId::new(id)).await?;
    Ok(Json(children.into()))
}
