//! Control plane configuration.

use std::time::Duration;

use taskchain_core::{RetryPolicy, DEFAULT_MAX_RETRIES};

use crate::pool::PoolConfig;
use crate::queue::QueueConfig;
use crate::scheduler::MaintenanceConfig;
use crate::store::StoreRetry;

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// SQLite URL; `None` keeps tasks and the audit chain in memory.
    pub database_url: Option<String>,

    /// Maximum number of tasks executing at once.
    pub concurrency: usize,

    /// `maxRetries` for submissions that do not carry one.
    pub default_max_retries: u32,

    /// Backoff between automatic retries.
    pub retry_policy: RetryPolicy,

    /// Whether `POST /tasks/:id/retry` gives the task a fresh attempt budget.
    pub reset_attempts_on_manual_retry: bool,

    /// Execution timeout for tasks without their own `timeoutMs`.
    pub task_timeout: Option<Duration>,

    /// How long `stop()` waits for in-flight executions.
    pub shutdown_timeout: Duration,

    /// How long an idle dispatcher sleeps before rescanning the queue.
    pub idle_poll: Duration,

    /// Maintenance tick (promotion of due tasks, retention sweep).
    pub maintenance_interval: Duration,

    /// Interval between metrics snapshots on the `metrics` channel.
    pub metrics_interval: Duration,

    /// Terminal tasks older than this are deleted. `None` disables the sweep.
    pub retention: Option<Duration>,

    /// Buffered events per subscriber before it starts lagging.
    pub event_capacity: usize,

    /// Attempts for a dispatcher store call before giving up on it.
    pub store_retry_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8080".to_string(),
            database_url: None,
            concurrency: 4,
            default_max_retries: DEFAULT_MAX_RETRIES,
            retry_policy: RetryPolicy::default(),
            reset_attempts_on_manual_retry: true,
            task_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            idle_poll: Duration::from_millis(500),
            maintenance_interval: Duration::from_secs(1),
            metrics_interval: Duration::from_secs(5),
            retention: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            event_capacity: 1024,
            store_retry_attempts: 5,
        }
    }
}

impl Config {
    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            default_max_retries: self.default_max_retries,
            retry_policy: self.retry_policy,
            reset_attempts_on_manual_retry: self.reset_attempts_on_manual_retry,
        }
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency.max(1),
            default_timeout: self.task_timeout,
            shutdown_timeout: self.shutdown_timeout,
            idle_poll: self.idle_poll,
            store_retry: StoreRetry {
                attempts: self.store_retry_attempts.max(1),
                backoff: RetryPolicy::new(Duration::from_millis(50), 2, Duration::from_secs(5)),
            },
        }
    }

    pub fn maintenance(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            interval: self.maintenance_interval,
            metrics_interval: self.metrics_interval,
            retention: self.retention,
        }
    }
}
