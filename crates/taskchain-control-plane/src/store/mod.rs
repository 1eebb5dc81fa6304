//! Task persistence.
//!
//! [`TaskStore`] is the port the queue talks to. Every lifecycle write goes
//! through [`TaskStore::save_if_status`], a conditional write that only lands
//! when the stored status still matches what the caller read. The named
//! transitions (`mark_started`, `mark_completed`, ...) are built on top of it
//! and apply the state machine from `taskchain-core`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use taskchain_core::{CoreError, FailureKind, Task, TaskFailure, TaskId, TaskStatus};

mod memory;
mod retry;
mod sqlite;

pub use memory::InMemoryTaskStore;
pub use retry::{with_retry, StoreRetry, Transient};
pub use sqlite::SqliteTaskStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
///
/// A missing task is never an error; lookups return `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Task store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    /// Mean `completedAt - startedAt` over COMPLETED tasks.
    pub avg_duration_ms: Option<f64>,
}

impl StoreStats {
    /// Count for `status`, zero when absent.
    pub fn count(&self, status: TaskStatus) -> u64 {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

/// Task persistence contract.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Upsert by id. An existing row keeps its immutable fields (type, name,
    /// payload, priority, parent, limits, `createdAt`).
    async fn save(&self, task: &Task) -> StoreResult<()>;

    /// Write the mutable fields of `task` only if the stored status is still
    /// `expected`. Returns whether the write landed.
    async fn save_if_status(&self, task: &Task, expected: TaskStatus) -> StoreResult<bool>;

    async fn find_by_id(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Ordered by priority, then `createdAt`, then insertion order.
    async fn find_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>>;

    /// Newest first.
    async fn find_by_type(&self, task_type: &str) -> StoreResult<Vec<Task>>;

    /// Oldest first.
    async fn find_by_parent_id(&self, parent_id: &TaskId) -> StoreResult<Vec<Task>>;

    /// Raise progress of a RUNNING task (clamped to 100). Returns the task
    /// when the value changed.
    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<Option<Task>>;

    async fn get_stats(&self) -> StoreResult<StoreStats>;

    /// Newest first, at most `limit`.
    async fn get_recent_tasks(&self, limit: usize) -> StoreResult<Vec<Task>>;

    /// Delete terminal tasks completed before `older_than`.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> StoreResult<()>;

    /// Move a task to `status` through the state machine.
    ///
    /// Returns `None` when the task is missing, the transition is not
    /// allowed, or another writer changed the status first.
    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> StoreResult<Option<Task>> {
        transition_once(self, id, move |task, now| match status {
            TaskStatus::Queued if task.status == TaskStatus::Failed => task.rearm(false, now),
            TaskStatus::Queued => task.enqueue(now),
            TaskStatus::Running => task.start(now),
            TaskStatus::Completed => {
                let result = task.result.clone().unwrap_or(Value::Null);
                task.complete(result, now)
            }
            TaskStatus::Failed => {
                let failure = task
                    .error
                    .clone()
                    .unwrap_or_else(|| TaskFailure::new(FailureKind::Fatal, "marked failed"));
                task.fail(failure, now)
            }
            TaskStatus::Retrying => {
                let failure = task
                    .error
                    .clone()
                    .unwrap_or_else(|| TaskFailure::new(FailureKind::Retryable, "marked for retry"));
                task.schedule_retry(failure, now, now)
            }
            TaskStatus::Cancelled => task.cancel(now),
            TaskStatus::Pending => Err(CoreError::InvalidStateTransition {
                from: task.status,
                to: TaskStatus::Pending,
            }),
        })
        .await
    }

    /// QUEUED -> RUNNING.
    async fn mark_started(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        transition_once(self, id, |task, now| task.start(now)).await
    }

    /// RUNNING -> COMPLETED.
    async fn mark_completed(&self, id: &TaskId, result: Value) -> StoreResult<Option<Task>> {
        transition_once(self, id, move |task, now| task.complete(result, now)).await
    }

    /// RUNNING (or QUEUED) -> FAILED.
    async fn mark_failed(&self, id: &TaskId, failure: TaskFailure) -> StoreResult<Option<Task>> {
        transition_once(self, id, move |task, now| task.fail(failure, now)).await
    }

    /// Any non-terminal status -> CANCELLED.
    async fn mark_cancelled(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        transition_once(self, id, |task, now| task.cancel(now)).await
    }
}

/// Load, apply, and conditionally write back in one attempt.
async fn transition_once<S, F>(store: &S, id: &TaskId, apply: F) -> StoreResult<Option<Task>>
where
    S: TaskStore + ?Sized,
    F: FnOnce(&mut Task, DateTime<Utc>) -> Result<(), CoreError> + Send,
{
    let Some(mut task) = store.find_by_id(id).await? else {
        return Ok(None);
    };
    let expected = task.status;
    if apply(&mut task, Utc::now()).is_err() {
        return Ok(None);
    }
    if store.save_if_status(&task, expected).await? {
        Ok(Some(task))
    } else {
        Ok(None)
    }
}

/// Copy the fields `save` is allowed to overwrite.
pub(crate) fn merge_mutable(stored: &mut Task, incoming: &Task) {
    stored.status = incoming.status;
    stored.attempts = incoming.attempts;
    stored.progress = incoming.progress;
    stored.result = incoming.result.clone();
    stored.error = incoming.error.clone();
    stored.metadata = incoming.metadata.clone();
    stored.updated_at = incoming.updated_at;
    stored.started_at = incoming.started_at;
    stored.completed_at = incoming.completed_at;
    stored.scheduled_for = incoming.scheduled_for;
}

/// Dispatch order: priority band, then age, then insertion sequence.
pub(crate) fn dispatch_order(a: (&Task, u64), b: (&Task, u64)) -> Ordering {
    a.0.priority
        .rank()
        .cmp(&b.0.priority.rank())
        .then_with(|| a.0.created_at.cmp(&b.0.created_at))
        .then_with(|| a.1.cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskchain_core::NewTask;

    fn task() -> Task {
        Task::from_submission(NewTask::new("echo", json!({})), 3, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_named_transitions() {
        let store = InMemoryTaskStore::new();
        let t = task();
        store.save(&t).await.unwrap();

        let running = store.mark_started(&t.id).await.unwrap().unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert_eq!(running.attempts, 1);

        // Second start loses: the task is no longer QUEUED.
        assert!(store.mark_started(&t.id).await.unwrap().is_none());

        let done = store.mark_completed(&t.id, json!(42)).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result, Some(json!(42)));
        assert!(store.mark_cancelled(&t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_respects_state_machine() {
        let store = InMemoryTaskStore::new();
        let t = task();
        store.save(&t).await.unwrap();

        assert!(store.update_status(&t.id, TaskStatus::Completed).await.unwrap().is_none());
        assert!(store.update_status(&t.id, TaskStatus::Pending).await.unwrap().is_none());

        let failed = store
            .mark_failed(&t.id, TaskFailure::new(FailureKind::Fatal, "x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);

        let requeued = store.update_status(&t.id, TaskStatus::Queued).await.unwrap().unwrap();
        assert_eq!(requeued.status, TaskStatus::Queued);
        assert!(requeued.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_task_is_none_not_error() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new("missing");
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(store.mark_started(&id).await.unwrap().is_none());
        assert!(store.update_progress(&id, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_never_reads_as_not_found() {
        let store = InMemoryTaskStore::new();
        let t = task();
        store.save(&t).await.unwrap();
        store.set_available(false);

        assert!(matches!(
            store.find_by_id(&t.id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.mark_started(&t.id).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.find_by_id(&t.id).await.unwrap().is_some());
    }
}
