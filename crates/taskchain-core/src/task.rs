//! Task model and its lifecycle transitions.
//!
//! Every status change goes through a method on [`Task`] so the state machine
//! and the task invariants are enforced in one place, independent of which
//! store persists the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CoreError, ExecutionError, Priority, TaskId, TaskStatus};

/// Default number of automatic retries when a submission does not say.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries` on submission.
pub const MAX_RETRIES_LIMIT: u32 = 100;

const MAX_TYPE_LEN: usize = 128;
const MAX_NAME_LEN: usize = 256;

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Executor key.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Human-readable label.
    pub name: String,

    pub priority: Priority,

    pub status: TaskStatus,

    /// Opaque data handed to the executor.
    pub payload: Value,

    /// Opaque caller annotations.
    pub metadata: Value,

    /// Number of execution starts so far.
    pub attempts: u32,

    pub max_retries: u32,

    /// 0-100; only moves while RUNNING.
    pub progress: u8,

    pub result: Option<Value>,

    pub error: Option<TaskFailure>,

    pub parent_task_id: Option<TaskId>,

    /// Per-task execution timeout, overriding the pool default.
    pub timeout_ms: Option<u64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Eligibility gate for dequeue.
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a task from a validated submission.
    ///
    /// The task starts PENDING when `scheduled_for` lies in the future,
    /// otherwise QUEUED.
    pub fn from_submission(
        submission: NewTask,
        default_max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        submission.validate()?;

        let status = match submission.scheduled_for {
            Some(at) if at > now => TaskStatus::Pending,
            _ => TaskStatus::Queued,
        };
        let task_type = submission.task_type.trim().to_string();
        let name = submission
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| task_type.clone());

        Ok(Self {
            id: TaskId::generate(),
            task_type,
            name,
            priority: submission.priority.unwrap_or_default(),
            status,
            payload: submission.payload,
            metadata: normalize_metadata(submission.metadata),
            attempts: 0,
            max_retries: submission.max_retries.unwrap_or(default_max_retries),
            progress: 0,
            result: None,
            error: None,
            parent_task_id: submission.parent_task_id,
            timeout_ms: submission.timeout_ms,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            scheduled_for: submission.scheduled_for,
        })
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// QUEUED and past its `scheduled_for` gate.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Queued && self.is_due(now)
    }

    /// `scheduled_for` is absent or not in the future.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.map_or(true, |at| at <= now)
    }

    /// Another start would push `attempts` past `max_retries + 1`.
    pub fn retries_exhausted(&self) -> bool {
        self.attempts > self.max_retries
    }

    fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING/RETRYING -> QUEUED once the task is due.
    pub fn enqueue(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Retrying) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: TaskStatus::Queued,
            });
        }
        self.transition(TaskStatus::Queued, now)
    }

    /// QUEUED -> RUNNING. Increments `attempts`.
    ///
    /// Refuses to start when the attempt budget is spent; callers fail the
    /// task with [`FailureKind::RetriesExhausted`] instead.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.attempts >= self.max_retries.saturating_add(1) {
            return Err(CoreError::InvalidInput(format!(
                "task {} has used all {} attempts",
                self.id, self.attempts
            )));
        }
        self.transition(TaskStatus::Running, now)?;
        self.attempts += 1;
        self.progress = 0;
        self.started_at = Some(now);
        Ok(())
    }

    /// RUNNING -> COMPLETED with `result`.
    pub fn complete(&mut self, result: Value, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Completed, now)?;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        self.scheduled_for = None;
        Ok(())
    }

    /// RUNNING (or QUEUED, when rejected before execution) -> FAILED.
    pub fn fail(&mut self, failure: TaskFailure, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Failed, now)?;
        self.result = None;
        self.error = Some(failure);
        self.completed_at = Some(now);
        self.scheduled_for = None;
        Ok(())
    }

    /// RUNNING -> RETRYING, eligible again at `retry_at`.
    pub fn schedule_retry(
        &mut self,
        failure: TaskFailure,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.transition(TaskStatus::Retrying, now)?;
        self.error = Some(failure);
        self.scheduled_for = Some(retry_at);
        Ok(())
    }

    /// Any non-terminal status -> CANCELLED.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Cancelled, now)?;
        self.completed_at = Some(now);
        self.scheduled_for = None;
        Ok(())
    }

    /// Manual re-arm: FAILED -> QUEUED.
    pub fn rearm(&mut self, reset_attempts: bool, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.status != TaskStatus::Failed {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: TaskStatus::Queued,
            });
        }
        self.transition(TaskStatus::Queued, now)?;
        if reset_attempts {
            self.attempts = 0;
        }
        self.progress = 0;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.scheduled_for = None;
        Ok(())
    }

    /// Record what a handler produced after the task was cancelled under it.
    ///
    /// The status stays CANCELLED; the outcome is kept for inspection.
    pub fn record_late_outcome(&mut self, outcome: Result<Value, TaskFailure>, now: DateTime<Utc>) {
        if self.status != TaskStatus::Cancelled {
            return;
        }
        match outcome {
            Ok(value) => {
                self.result = Some(value);
                self.error = None;
            }
            Err(failure) => {
                self.result = None;
                self.error = Some(failure);
            }
        }
        self.updated_at = now;
    }

    /// Raise progress while RUNNING. Returns whether anything changed.
    pub fn set_progress(&mut self, progress: u8, now: DateTime<Utc>) -> bool {
        let progress = progress.min(100);
        if self.status != TaskStatus::Running || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.updated_at = now;
        true
    }

    /// Wall-clock execution time of the last attempt, when finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0)),
            _ => None,
        }
    }
}

fn normalize_metadata(metadata: Option<Value>) -> Value {
    match metadata {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Default::default()),
    }
}

/// A task submission, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl NewTask {
    /// Create a submission with just a type and payload.
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_task_id = Some(parent);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Schema checks that do not need the store.
    pub fn validate(&self) -> Result<(), CoreError> {
        let task_type = self.task_type.trim();
        if task_type.is_empty() {
            return Err(CoreError::InvalidInput("type is required".to_string()));
        }
        if task_type.len() > MAX_TYPE_LEN {
            return Err(CoreError::InvalidInput(format!(
                "type must be at most {MAX_TYPE_LEN} characters"
            )));
        }
        if self.name.as_ref().is_some_and(|n| n.len() > MAX_NAME_LEN) {
            return Err(CoreError::InvalidInput(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if self.max_retries.is_some_and(|m| m > MAX_RETRIES_LIMIT) {
            return Err(CoreError::InvalidInput(format!(
                "maxRetries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(CoreError::InvalidInput("timeoutMs must be positive".to_string()));
        }
        if let Some(metadata) = &self.metadata {
            if !(metadata.is_object() || metadata.is_null()) {
                return Err(CoreError::InvalidInput("metadata must be an object".to_string()));
            }
        }
        Ok(())
    }
}

/// Why a task attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No executor registered for the task type.
    ExecutorNotFound,
    /// Executor reported a transient failure.
    Retryable,
    /// Executor reported a non-retryable failure.
    Fatal,
    /// Execution exceeded its timeout.
    Timeout,
    /// The process stopped while the task was running.
    Interrupted,
    /// The attempt budget was already spent when the task came up again.
    RetriesExhausted,
}

impl FailureKind {
    /// Whether this kind may lead to another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable | Self::Timeout | Self::Interrupted)
    }
}

/// Failure record stored in a task's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn executor_not_found(task_type: &str) -> Self {
        Self::new(
            FailureKind::ExecutorNotFound,
            format!("no executor registered for task type '{task_type}'"),
        )
    }
}

impl From<ExecutionError> for TaskFailure {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Retryable(msg) => Self::new(FailureKind::Retryable, msg),
            ExecutionError::Fatal(msg) => Self::new(FailureKind::Fatal, msg),
        }
    }
}

/// Partial update from an external executor or an operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.progress.is_none() && self.result.is_none() && self.error.is_none()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.progress.is_some_and(|p| p > 100) {
            return Err(CoreError::InvalidInput("progress must be between 0 and 100".to_string()));
        }
        if self.result.is_some() && self.error.is_some() {
            return Err(CoreError::InvalidInput(
                "result and error are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}
