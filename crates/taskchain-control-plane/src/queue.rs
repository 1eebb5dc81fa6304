//! Priority task queue.
//!
//! The queue owns dispatch decisions: which QUEUED task runs next, whether a
//! failed attempt is retried, and when a delayed task becomes eligible. It
//! keeps no task state of its own beyond process counters and the
//! cancellation tokens of executions it handed out; everything else is read
//! back from the [`TaskStore`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskchain_core::{
    CoreError, FailureKind, NewTask, RetryPolicy, Task, TaskEvent, TaskEventKind, TaskFailure,
    TaskId, TaskPatch, TaskStatus, DEFAULT_MAX_RETRIES,
};

use crate::bus::EventBus;
use crate::store::{StoreError, TaskStore, Transient};

/// Default and maximum page size for [`TaskQueue::list_tasks`].
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// How many times a lifecycle write is re-read and retried after losing a
/// race before the caller sees a conflict.
const CAS_ATTEMPTS: usize = 5;

/// Queue errors.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for QueueError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidInput(msg) | CoreError::Serialization(msg) => Self::Validation(msg),
            CoreError::InvalidStateTransition { from, to } => Self::InvalidTransition { from, to },
            CoreError::TaskNotFound(id) => Self::NotFound(TaskId::new(id)),
        }
    }
}

impl Transient for QueueError {
    fn is_transient(&self) -> bool {
        matches!(self, QueueError::Store(e) if e.is_transient())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Queue behaviour knobs.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub default_max_retries: u32,
    pub retry_policy: RetryPolicy,
    pub reset_attempts_on_manual_retry: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            retry_policy: RetryPolicy::default(),
            reset_attempts_on_manual_retry: true,
        }
    }
}

/// A claimed task together with the token that cancels its execution.
#[derive(Debug, Clone)]
pub struct Claim {
    pub task: Task,
    pub cancel: CancellationToken,
}

/// Filter for [`TaskQueue::list_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    pub limit: Option<usize>,
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub total: u64,
    /// Count for every status, zero included.
    pub counts: BTreeMap<String, u64>,
    /// Executions handed out by this process and not yet settled.
    pub in_flight: usize,
}

/// Process-lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub enqueued: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub in_flight: usize,
    pub avg_execution_ms: Option<f64>,
    pub timestamp: i64,
}

/// Cancellation handle of an execution this process handed out.
struct InFlight {
    claim: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    cancelled: AtomicU64,
    execution_ms_total: AtomicU64,
    execution_samples: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, task: &Task) {
        if let Some(ms) = task.duration_ms() {
            self.execution_ms_total.fetch_add(ms as u64, Ordering::Relaxed);
            self.execution_samples.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Priority queue with retry/backoff over a [`TaskStore`].
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    config: QueueConfig,
    in_flight: Mutex<HashMap<TaskId, InFlight>>,
    next_claim: AtomicU64,
    counters: Counters,
    work_ready: Notify,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<EventBus>, config: QueueConfig) -> Self {
        Self {
            store,
            bus,
            config,
            in_flight: Mutex::new(HashMap::new()),
            next_claim: AtomicU64::new(0),
            counters: Counters::default(),
            work_ready: Notify::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn emit(&self, kind: TaskEventKind, task: &Task) {
        self.bus.publish(TaskEvent::from_task(kind, task));
    }

    /// Wait until new work may be available, or `max` elapses.
    pub async fn wait_for_work(&self, max: Duration) {
        let _ = tokio::time::timeout(max, self.work_ready.notified()).await;
    }

    // ------------------------------------------------------------------
    // Submission and lookup
    // ------------------------------------------------------------------

    /// Validate and persist a submission.
    pub async fn enqueue(&self, submission: NewTask) -> QueueResult<Task> {
        let task = Task::from_submission(submission, self.config.default_max_retries, Utc::now())?;

        if let Some(parent_id) = &task.parent_task_id {
            if self.store.find_by_id(parent_id).await?.is_none() {
                return Err(QueueError::Validation(format!(
                    "parent task not found: {parent_id}"
                )));
            }
        }

        self.store.save(&task).await?;
        Counters::bump(&self.counters.enqueued);

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = %task.priority.as_str(),
            status = %task.status,
            "Task enqueued"
        );
        self.emit(TaskEventKind::Created, &task);
        if task.status == TaskStatus::Queued {
            self.work_ready.notify_one();
        }
        Ok(task)
    }

    pub async fn get_task(&self, id: &TaskId) -> QueueResult<Task> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    /// Children of `parent_id`, oldest first.
    pub async fn children(&self, parent_id: &TaskId) -> QueueResult<Vec<Task>> {
        self.get_task(parent_id).await?;
        Ok(self.store.find_by_parent_id(parent_id).await?)
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> QueueResult<Vec<Task>> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        let mut tasks = match (filter.status, &filter.task_type) {
            (Some(status), task_type) => {
                let mut tasks = self.store.find_by_status(status).await?;
                if let Some(task_type) = task_type {
                    tasks.retain(|t| &t.task_type == task_type);
                }
                tasks
            }
            (None, Some(task_type)) => self.store.find_by_type(task_type).await?,
            (None, None) => self.store.get_recent_tasks(limit).await?,
        };
        tasks.truncate(limit);
        Ok(tasks)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Claim the next eligible task.
    pub async fn dequeue_next(&self) -> QueueResult<Option<Task>> {
        Ok(self.claim_next_where(|_| Ok(())).await?.map(|c| c.task))
    }

    /// Claim the next eligible task that `accept` does not reject.
    ///
    /// Rejected candidates are failed on the spot (QUEUED -> FAILED) without
    /// consuming an attempt. Candidates whose attempt budget is spent are
    /// failed with `retries_exhausted`.
    pub async fn claim_next_where<F>(&self, accept: F) -> QueueResult<Option<Claim>>
    where
        F: Fn(&Task) -> Result<(), TaskFailure> + Send + Sync,
    {
        self.promote_due().await?;

        let now = Utc::now();
        for task in self.store.find_by_status(TaskStatus::Queued).await? {
            if !task.is_due(now) {
                continue;
            }

            if let Err(failure) = accept(&task) {
                self.reject(task, failure).await?;
                continue;
            }

            if task.retries_exhausted() {
                let failure = TaskFailure::new(
                    FailureKind::RetriesExhausted,
                    format!("all {} attempts used", task.attempts),
                );
                self.reject(task, failure).await?;
                continue;
            }

            let mut claimed = task;
            claimed.start(now)?;

            if let Some(cancel) = self.try_claim(&claimed, TaskStatus::Queued).await? {
                Counters::bump(&self.counters.started);
                info!(
                    task_id = %claimed.id,
                    task_type = %claimed.task_type,
                    attempt = claimed.attempts,
                    "Task claimed"
                );
                self.emit(TaskEventKind::Started, &claimed);
                return Ok(Some(Claim {
                    task: claimed,
                    cancel,
                }));
            }

            debug!(task_id = %claimed.id, "Lost claim race, trying next candidate");
        }
        Ok(None)
    }

    /// Write `task` (already moved to RUNNING) if it is still in `from`.
    ///
    /// The token is registered before the write so a cancel landing right
    /// after it always finds the token. Only one claimer per task may hold
    /// an entry; a claimer that finds the slot taken backs off without
    /// touching the store, and a claimer whose write does not land removes
    /// its own entry and nobody else's.
    async fn try_claim(
        &self,
        task: &Task,
        from: TaskStatus,
    ) -> QueueResult<Option<CancellationToken>> {
        let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        match self.in_flight.lock().await.entry(task.id.clone()) {
            Entry::Occupied(_) => return Ok(None),
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    claim,
                    token: token.clone(),
                });
            }
        }

        let landed = self.store.save_if_status(task, from).await;
        if !matches!(landed, Ok(true)) {
            self.release(&task.id, claim).await;
        }
        Ok(landed?.then_some(token))
    }

    async fn release(&self, id: &TaskId, claim: u64) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(id).is_some_and(|e| e.claim == claim) {
            in_flight.remove(id);
        }
    }

    /// Fail every due QUEUED task that `accept` rejects, without claiming
    /// anything. Returns how many were failed.
    pub async fn reject_where<F>(&self, accept: F) -> QueueResult<usize>
    where
        F: Fn(&Task) -> Result<(), TaskFailure> + Send + Sync,
    {
        self.promote_due().await?;

        let now = Utc::now();
        let mut rejected = 0;
        for task in self.store.find_by_status(TaskStatus::Queued).await? {
            if !task.is_due(now) {
                continue;
            }
            if let Err(failure) = accept(&task) {
                if self.reject(task, failure).await? {
                    rejected += 1;
                }
            }
        }
        Ok(rejected)
    }

    async fn reject(&self, mut task: Task, failure: TaskFailure) -> QueueResult<bool> {
        let reason = failure.message.clone();
        task.fail(failure, Utc::now())?;
        if self.store.save_if_status(&task, TaskStatus::Queued).await? {
            Counters::bump(&self.counters.failed);
            warn!(task_id = %task.id, task_type = %task.task_type, reason = %reason, "Task rejected");
            self.emit(TaskEventKind::Failed, &task);
            return Ok(true);
        }
        Ok(false)
    }

    /// Move due PENDING and RETRYING tasks to QUEUED.
    pub async fn promote_due(&self) -> QueueResult<usize> {
        let now = Utc::now();
        let mut promoted = 0;
        for status in [TaskStatus::Pending, TaskStatus::Retrying] {
            for mut task in self.store.find_by_status(status).await? {
                if !task.is_due(now) {
                    continue;
                }
                task.enqueue(now)?;
                if self.store.save_if_status(&task, status).await? {
                    debug!(task_id = %task.id, from = %status, "Task promoted to QUEUED");
                    self.emit(TaskEventKind::Queued, &task);
                    promoted += 1;
                }
            }
        }
        if promoted > 0 {
            self.work_ready.notify_one();
        }
        Ok(promoted)
    }

    // ------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------

    async fn settle(&self, id: &TaskId) {
        self.in_flight.lock().await.remove(id);
    }

    /// RUNNING -> COMPLETED.
    pub async fn complete(&self, id: &TaskId, result: Value) -> QueueResult<Task> {
        if let Some(task) = self.store.mark_completed(id, result.clone()).await? {
            self.settle(id).await;
            Counters::bump(&self.counters.completed);
            self.counters.record_duration(&task);
            info!(task_id = %id, attempts = task.attempts, "Task completed");
            self.emit(TaskEventKind::Completed, &task);
            return Ok(task);
        }
        self.late_outcome(id, Ok(result), TaskStatus::Completed).await
    }

    /// Route a failed attempt: RETRYING with backoff while attempts remain
    /// and the failure is retryable, FAILED otherwise.
    pub async fn fail(&self, id: &TaskId, failure: TaskFailure) -> QueueResult<Task> {
        for _ in 0..CAS_ATTEMPTS {
            let mut task = self.get_task(id).await?;
            match task.status {
                TaskStatus::Running => {}
                TaskStatus::Cancelled => {
                    return self.late_outcome(id, Err(failure), TaskStatus::Failed).await;
                }
                from => {
                    return Err(QueueError::InvalidTransition {
                        from,
                        to: TaskStatus::Failed,
                    })
                }
            }

            let now = Utc::now();
            let retry = failure.kind.is_retryable() && !task.retries_exhausted();
            if retry {
                let delay = self.config.retry_policy.delay_for(task.attempts);
                let retry_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(now);
                task.schedule_retry(failure.clone(), retry_at, now)?;
            } else {
                task.fail(failure.clone(), now)?;
            }

            if !self.store.save_if_status(&task, TaskStatus::Running).await? {
                continue;
            }

            self.settle(id).await;
            if retry {
                Counters::bump(&self.counters.retried);
                warn!(
                    task_id = %id,
                    attempt = task.attempts,
                    max_retries = task.max_retries,
                    retry_at = %task.scheduled_for.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    error = %failure.message,
                    "Task attempt failed, retry scheduled"
                );
                self.emit(TaskEventKind::Retried, &task);
            } else {
                Counters::bump(&self.counters.failed);
                warn!(
                    task_id = %id,
                    attempts = task.attempts,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "Task failed"
                );
                self.emit(TaskEventKind::Failed, &task);
            }
            return Ok(task);
        }
        let current = self.get_task(id).await?;
        Err(QueueError::InvalidTransition {
            from: current.status,
            to: TaskStatus::Failed,
        })
    }

    /// An outcome arrived for a task that is no longer RUNNING.
    ///
    /// Cancelled tasks keep their status and record what the handler
    /// produced; anything else is an invalid transition.
    async fn late_outcome(
        &self,
        id: &TaskId,
        outcome: Result<Value, TaskFailure>,
        target: TaskStatus,
    ) -> QueueResult<Task> {
        self.settle(id).await;
        let mut task = self.get_task(id).await?;
        if task.status != TaskStatus::Cancelled {
            return Err(QueueError::InvalidTransition {
                from: task.status,
                to: target,
            });
        }
        task.record_late_outcome(outcome, Utc::now());
        self.store.save_if_status(&task, TaskStatus::Cancelled).await?;
        debug!(task_id = %id, "Recorded outcome of cancelled task");
        Ok(task)
    }

    /// Raise progress of a RUNNING task. Returns the task when it changed.
    pub async fn report_progress(
        &self,
        id: &TaskId,
        progress: u8,
        message: Option<String>,
    ) -> QueueResult<Option<Task>> {
        let updated = self.store.update_progress(id, progress).await?;
        if let Some(task) = &updated {
            self.bus.publish(TaskEvent::progress(task, message));
        }
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Caller-initiated transitions
    // ------------------------------------------------------------------

    /// Cancel a non-terminal task. `false` for unknown or terminal tasks.
    pub async fn cancel_task(&self, id: &TaskId) -> QueueResult<bool> {
        for _ in 0..CAS_ATTEMPTS {
            if let Some(task) = self.store.mark_cancelled(id).await? {
                if let Some(execution) = self.in_flight.lock().await.remove(id) {
                    execution.token.cancel();
                }
                Counters::bump(&self.counters.cancelled);
                info!(task_id = %id, "Task cancelled");
                self.emit(TaskEventKind::Cancelled, &task);
                return Ok(true);
            }
            // Missing, terminal, or the status moved under us.
            match self.store.find_by_id(id).await? {
                None => return Ok(false),
                Some(task) if task.is_terminal() => return Ok(false),
                Some(_) => continue,
            }
        }
        Ok(false)
    }

    /// Re-arm a FAILED task. `false` for unknown or non-FAILED tasks.
    pub async fn retry_task(&self, id: &TaskId) -> QueueResult<bool> {
        let Some(mut task) = self.store.find_by_id(id).await? else {
            return Ok(false);
        };
        if task.status != TaskStatus::Failed {
            return Ok(false);
        }
        task.rearm(self.config.reset_attempts_on_manual_retry, Utc::now())?;
        if !self.store.save_if_status(&task, TaskStatus::Failed).await? {
            return Ok(false);
        }
        info!(task_id = %id, attempts = task.attempts, "Task re-armed");
        self.emit(TaskEventKind::Queued, &task);
        self.work_ready.notify_one();
        Ok(true)
    }

    /// Apply a partial update from an external executor or operator.
    pub async fn apply_patch(&self, id: &TaskId, patch: TaskPatch) -> QueueResult<Task> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(QueueError::Validation("patch has no fields".to_string()));
        }

        let current = self.get_task(id).await?;

        if let Some(target) = patch.status.filter(|s| *s != current.status) {
            if !current.status.can_transition_to(target) {
                return Err(QueueError::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }
            match target {
                TaskStatus::Running => self.claim_specific(current).await?,
                TaskStatus::Completed => {
                    if let Some(p) = patch.progress {
                        self.report_progress(id, p, None).await?;
                    }
                    let result = patch.result.clone().unwrap_or(Value::Null);
                    return self.complete(id, result).await;
                }
                TaskStatus::Failed => {
                    let message = patch.error.clone().unwrap_or_else(|| "marked failed".to_string());
                    return self.fail_terminal(id, TaskFailure::new(FailureKind::Fatal, message)).await;
                }
                TaskStatus::Cancelled => {
                    if !self.cancel_task(id).await? {
                        let now = self.get_task(id).await?;
                        return Err(QueueError::InvalidTransition {
                            from: now.status,
                            to: TaskStatus::Cancelled,
                        });
                    }
                }
                TaskStatus::Queued => {
                    if !self.retry_task(id).await? {
                        let now = self.get_task(id).await?;
                        return Err(QueueError::InvalidTransition {
                            from: now.status,
                            to: TaskStatus::Queued,
                        });
                    }
                }
                TaskStatus::Pending | TaskStatus::Retrying => {
                    return Err(QueueError::InvalidTransition {
                        from: current.status,
                        to: target,
                    })
                }
            }
        } else if patch.result.is_some() || patch.error.is_some() {
            return Err(QueueError::Validation(
                "result and error require status COMPLETED or FAILED".to_string(),
            ));
        }

        if let Some(p) = patch.progress {
            self.report_progress(id, p, None).await?;
        }
        self.get_task(id).await
    }

    /// QUEUED -> RUNNING for a specific task, on behalf of an external executor.
    async fn claim_specific(&self, mut task: Task) -> QueueResult<()> {
        let from = task.status;
        task.start(Utc::now()).map_err(|_| QueueError::InvalidTransition {
            from,
            to: TaskStatus::Running,
        })?;
        if self.try_claim(&task, from).await?.is_none() {
            let now = self.get_task(&task.id).await?;
            return Err(QueueError::InvalidTransition {
                from: now.status,
                to: TaskStatus::Running,
            });
        }
        Counters::bump(&self.counters.started);
        self.emit(TaskEventKind::Started, &task);
        Ok(())
    }

    /// RUNNING -> FAILED regardless of remaining attempts.
    async fn fail_terminal(&self, id: &TaskId, failure: TaskFailure) -> QueueResult<Task> {
        match self.store.mark_failed(id, failure.clone()).await? {
            Some(task) => {
                self.settle(id).await;
                Counters::bump(&self.counters.failed);
                warn!(task_id = %id, error = %failure.message, "Task marked failed");
                self.emit(TaskEventKind::Failed, &task);
                Ok(task)
            }
            None => self.late_outcome(id, Err(failure), TaskStatus::Failed).await,
        }
    }

    // ------------------------------------------------------------------
    // Recovery and housekeeping
    // ------------------------------------------------------------------

    /// Route RUNNING tasks that no execution in this process owns through
    /// the retryable failure path.
    pub async fn recover(&self) -> QueueResult<usize> {
        let owned: Vec<TaskId> = self.in_flight.lock().await.keys().cloned().collect();
        let mut recovered = 0;
        for task in self.store.find_by_status(TaskStatus::Running).await? {
            if owned.contains(&task.id) {
                continue;
            }
            let failure = TaskFailure::new(
                FailureKind::Interrupted,
                "execution interrupted by a restart",
            );
            match self.fail(&task.id, failure).await {
                Ok(_) => recovered += 1,
                Err(QueueError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if recovered > 0 {
            info!(recovered, "Recovered interrupted tasks");
        }
        Ok(recovered)
    }

    /// Delete terminal tasks completed before `older_than`.
    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> QueueResult<u64> {
        let removed = self.store.cleanup(older_than).await?;
        if removed > 0 {
            info!(removed, "Retention sweep removed terminal tasks");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    pub async fn get_status(&self) -> QueueResult<QueueStatus> {
        let stats = self.store.get_stats().await?;
        let counts = TaskStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), stats.count(*s)))
            .collect();
        Ok(QueueStatus {
            total: stats.total,
            counts,
            in_flight: self.in_flight_count().await,
        })
    }

    pub async fn get_metrics(&self) -> QueueMetrics {
        let c = &self.counters;
        let samples = c.execution_samples.load(Ordering::Relaxed);
        let avg_execution_ms = (samples > 0)
            .then(|| c.execution_ms_total.load(Ordering::Relaxed) as f64 / samples as f64);
        QueueMetrics {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            started: c.started.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            in_flight: self.in_flight_count().await,
            avg_execution_ms,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
