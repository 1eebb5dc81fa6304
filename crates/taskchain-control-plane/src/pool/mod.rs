//! Bounded worker pool.
//!
//! A single dispatcher loop acquires a concurrency permit, claims the next
//! task the registry can run, and spawns its execution on a [`TaskTracker`].
//! The permit travels with the execution, so at most `concurrency` tasks
//! are RUNNING on behalf of this pool at any time. While every slot is
//! busy the dispatcher keeps failing tasks no executor is registered for.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use taskchain_core::{FailureKind, Task, TaskFailure};

use crate::queue::{Claim, TaskQueue};
use crate::store::{with_retry, StoreRetry};

mod executor;

pub use executor::{executor_fn, ExecutorRegistry, FnExecutor, TaskContext, TaskExecutor};

/// Pool settings.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// Applied to tasks without their own `timeoutMs`.
    pub default_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub idle_poll: Duration,
    pub store_retry: StoreRetry,
}

/// Bounded pool executing claimed tasks with registered executors.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    registry: Arc<ExecutorRegistry>,
    config: PoolConfig,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    healthy: AtomicBool,
}

impl WorkerPool {
    pub fn new(queue: Arc<TaskQueue>, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            queue,
            registry: Arc::new(ExecutorRegistry::new()),
            slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub async fn register_executor(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.registry.register(task_type, executor).await;
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Executions currently holding a slot.
    pub fn active(&self) -> usize {
        self.concurrency() - self.slots.available_permits()
    }

    /// `false` while the dispatcher cannot reach the store.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.dispatcher
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Start the dispatcher. Calling it on a running pool is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.as_ref().is_some_and(|h| !h.is_finished()) || self.shutdown.is_cancelled() {
            return;
        }
        info!(concurrency = self.concurrency(), "Worker pool starting");
        let pool = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(pool.dispatch_loop()));
    }

    /// Stop claiming and wait for in-flight executions.
    ///
    /// Returns `false` when the shutdown timeout elapsed first; those tasks
    /// stay RUNNING until a later `recover()`.
    pub async fn stop(&self) -> bool {
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task ended abnormally");
            }
        }

        self.tracker.close();
        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Worker pool stopped");
                true
            }
            Err(_) => {
                warn!(
                    still_running = self.tracker.len(),
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "Shutdown timeout elapsed with executions in flight"
                );
                false
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>) {
        let mut consecutive_failures = 0u32;
        'dispatch: loop {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break 'dispatch,
                    permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => break 'dispatch,
                    },
                    _ = self.queue.wait_for_work(self.config.idle_poll) => {
                        self.reject_unrunnable().await;
                    }
                }
            };

            // Executions run the executor from the snapshot that accepted them.
            let executors = self.registry.snapshot().await;
            let claim = self
                .queue
                .claim_next_where(|task| runnable(&executors, task))
                .await;

            match claim {
                Ok(Some(claim)) => {
                    self.mark_healthy(&mut consecutive_failures);
                    match executors.get(&claim.task.task_type) {
                        Some(executor) => {
                            self.spawn_execution(claim, Arc::clone(executor), permit)
                        }
                        None => {
                            let failure = TaskFailure::executor_not_found(&claim.task.task_type);
                            if let Err(e) = self.queue.fail(&claim.task.id, failure).await {
                                warn!(task_id = %claim.task.id, error = %e, "Failed to record missing executor");
                            }
                        }
                    }
                }
                Ok(None) => {
                    self.mark_healthy(&mut consecutive_failures);
                    drop(permit);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.queue.wait_for_work(self.config.idle_poll) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.healthy.store(false, Ordering::SeqCst);
                    let delay = self.config.store_retry.backoff.delay_for(consecutive_failures);
                    error!(
                        error = %e,
                        consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Dispatcher could not read the queue"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        debug!("Dispatcher loop exited");
    }

    /// Fail QUEUED tasks without an executor while no slot is free.
    async fn reject_unrunnable(&self) {
        let executors = self.registry.snapshot().await;
        match self
            .queue
            .reject_where(|task| runnable(&executors, task))
            .await
        {
            Ok(0) => {}
            Ok(rejected) => debug!(rejected, "Rejected tasks without an executor"),
            Err(e) => debug!(error = %e, "Rejection sweep could not read the queue"),
        }
    }

    fn mark_healthy(&self, consecutive_failures: &mut u32) {
        if *consecutive_failures > 0 {
            info!("Dispatcher reached the store again");
            *consecutive_failures = 0;
        }
        self.healthy.store(true, Ordering::SeqCst);
    }

    fn spawn_execution(
        &self,
        claim: Claim,
        executor: Arc<dyn TaskExecutor>,
        permit: OwnedSemaphorePermit,
    ) {
        let queue = Arc::clone(&self.queue);
        let timeout = claim
            .task
            .timeout_ms
            .map(Duration::from_millis)
            .or(self.config.default_timeout);
        let retry = self.config.store_retry;

        self.tracker.spawn(async move {
            let _permit = permit;
            run_execution(queue, executor, claim, timeout, retry).await;
        });
    }
}

fn runnable(executors: &HashMap<String, Arc<dyn TaskExecutor>>, task: &Task) -> Result<(), TaskFailure> {
    if executors.contains_key(&task.task_type) {
        Ok(())
    } else {
        Err(TaskFailure::executor_not_found(&task.task_type))
    }
}

async fn run_execution(
    queue: Arc<TaskQueue>,
    executor: Arc<dyn TaskExecutor>,
    claim: Claim,
    timeout: Option<Duration>,
    retry: StoreRetry,
) {
    let Claim { task, cancel } = claim;
    let task_id = task.id.clone();
    let ctx = TaskContext::new(&task, Arc::clone(&queue), cancel.clone());

    debug!(task_id = %task_id, attempt = task.attempts, "Executing task");

    let execution = AssertUnwindSafe(executor.execute(ctx)).catch_unwind();
    let outcome: Result<Value, TaskFailure> = match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(result) => flatten(result),
            Err(_) => {
                cancel.cancel();
                Err(TaskFailure::new(
                    FailureKind::Timeout,
                    format!("execution exceeded {}ms", limit.as_millis()),
                ))
            }
        },
        None => flatten(execution.await),
    };

    let recorded = match outcome {
        Ok(value) => {
            with_retry(&retry, "complete", || queue.complete(&task_id, value.clone()))
                .await
                .map(|_| ())
        }
        Err(failure) => {
            with_retry(&retry, "fail", || queue.fail(&task_id, failure.clone()))
                .await
                .map(|_| ())
        }
    };
    if let Err(e) = recorded {
        error!(task_id = %task_id, error = %e, "Could not record task outcome");
    }
}

fn flatten(
    result: Result<Result<Value, taskchain_core::ExecutionError>, Box<dyn std::any::Any + Send>>,
) -> Result<Value, TaskFailure> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "executor panicked".to_string());
            Err(TaskFailure::new(FailureKind::Fatal, format!("panic: {message}")))
        }
    }
}
