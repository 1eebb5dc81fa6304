//! Executor trait, registry and per-execution context.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use taskchain_core::{ExecutionError, Task, TaskId};

use crate::queue::TaskQueue;

/// Type-specific task handler.
///
/// Errors are captured into the task record; they never escape the pool.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: TaskContext) -> Result<Value, ExecutionError>;
}

/// Adapter turning an async closure into a [`TaskExecutor`].
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> Result<Value, ExecutionError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as an executor.
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn TaskExecutor>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

/// What an executor gets to see of its task.
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_type: String,
    pub payload: Value,
    pub metadata: Value,
    /// 1-based attempt number.
    pub attempt: u32,
    queue: Arc<TaskQueue>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(task: &Task, queue: Arc<TaskQueue>, cancel: CancellationToken) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            metadata: task.metadata.clone(),
            attempt: task.attempts,
            queue,
            cancel,
        }
    }

    /// Report progress (0-100). Lower or repeated values are ignored.
    pub async fn report_progress(&self, progress: u8, message: Option<String>) {
        if let Err(e) = self.queue.report_progress(&self.task_id, progress, message).await {
            warn!(task_id = %self.task_id, error = %e, "Failed to record progress");
        }
    }

    /// Token cancelled when the task is cancelled or times out.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task is cancelled or times out.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Executors indexed by task type.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` for `task_type`, replacing any previous one.
    pub async fn register(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        let task_type = task_type.into();
        let replaced = self
            .executors
            .write()
            .await
            .insert(task_type.clone(), executor)
            .is_some();
        info!(task_type = %task_type, replaced, "Executor registered");
    }

    pub async fn unregister(&self, task_type: &str) -> bool {
        self.executors.write().await.remove(task_type).is_some()
    }

    pub async fn get(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.read().await.get(task_type).cloned()
    }

    /// Point-in-time copy of the registered executors.
    pub async fn snapshot(&self) -> HashMap<String, Arc<dyn TaskExecutor>> {
        self.executors.read().await.clone()
    }
}
