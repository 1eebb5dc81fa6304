//! Background maintenance: promotes due tasks, sweeps old terminal tasks
//! and publishes periodic metrics snapshots.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{QueueError, TaskQueue};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Maintenance failed: {0}")]
    Queue(#[from] QueueError),
}

/// Maintenance timings.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    pub metrics_interval: Duration,
    /// Age after which terminal tasks are deleted; `None` keeps them.
    pub retention: Option<Duration>,
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub promoted: usize,
    pub removed: u64,
}

/// Periodic housekeeping over a [`TaskQueue`].
pub struct Scheduler {
    queue: Arc<TaskQueue>,
    config: MaintenanceConfig,
}

impl Scheduler {
    pub fn new(queue: Arc<TaskQueue>, config: MaintenanceConfig) -> Self {
        Self { queue, config }
    }

    /// Run one maintenance pass.
    pub async fn tick(&self) -> Result<MaintenanceReport, SchedulerError> {
        let promoted = self.queue.promote_due().await?;

        let removed = match self.retention_cutoff() {
            Some(cutoff) => self.queue.cleanup(cutoff).await?,
            None => 0,
        };

        if promoted > 0 {
            debug!(promoted, "Promoted due tasks");
        }
        Ok(MaintenanceReport { promoted, removed })
    }

    fn retention_cutoff(&self) -> Option<chrono::DateTime<Utc>> {
        let retention = chrono::Duration::from_std(self.config.retention?).ok()?;
        Utc::now().checked_sub_signed(retention)
    }

    /// Run maintenance and metrics publishing until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut maintenance = tokio::time::interval(self.config.interval);
            maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut metrics = tokio::time::interval(self.config.metrics_interval);
            metrics.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval_ms = self.config.interval.as_millis() as u64,
                metrics_interval_ms = self.config.metrics_interval.as_millis() as u64,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = maintenance.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!(error = %e, "Maintenance pass failed");
                        }
                    }
                    _ = metrics.tick() => {
                        let snapshot = self.queue.get_metrics().await;
                        self.queue.bus().publish_metrics(snapshot);
                    }
                }
            }
            info!("Scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusMessage, EventBus};
    use crate::queue::QueueConfig;
    use crate::store::{InMemoryTaskStore, TaskStore};
    use serde_json::json;
    use taskchain_core::{EventChannel, NewTask, Task, TaskStatus};

    fn queue() -> (Arc<InMemoryTaskStore>, Arc<TaskQueue>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(TaskQueue::new(
            store.clone(),
            Arc::new(EventBus::new(64)),
            QueueConfig::default(),
        ));
        (store, queue)
    }

    fn config(retention: Option<Duration>) -> MaintenanceConfig {
        MaintenanceConfig {
            interval: Duration::from_millis(10),
            metrics_interval: Duration::from_millis(10),
            retention,
        }
    }

    #[tokio::test]
    async fn test_tick_promotes_due_tasks() {
        let (store, queue) = queue();
        let now = Utc::now();
        let mut task =
            Task::from_submission(NewTask::new("echo", json!({})).scheduled_for(now + chrono::Duration::hours(1)), 3, now)
                .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        task.scheduled_for = Some(now - chrono::Duration::seconds(1));
        store.save(&task).await.unwrap();

        let scheduler = Scheduler::new(queue.clone(), config(None));
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report, MaintenanceReport { promoted: 1, removed: 0 });
        assert_eq!(queue.get_task(&task.id).await.unwrap().status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn test_tick_sweeps_expired_terminal_tasks() {
        let (store, queue) = queue();
        let long_ago = Utc::now() - chrono::Duration::days(30);
        let mut old = Task::from_submission(NewTask::new("echo", json!({})), 3, long_ago).unwrap();
        old.status = TaskStatus::Completed;
        old.completed_at = Some(long_ago);
        store.save(&old).await.unwrap();
        let fresh = queue.enqueue(NewTask::new("echo", json!({}))).await.unwrap();

        let scheduler = Scheduler::new(queue.clone(), config(Some(Duration::from_secs(86_400))));
        assert_eq!(scheduler.tick().await.unwrap().removed, 1);
        assert!(store.find_by_id(&old.id).await.unwrap().is_none());
        assert!(store.find_by_id(&fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_publishes_metrics_until_shutdown() {
        let (_, queue) = queue();
        let mut sub = queue.bus().subscribe(EventChannel::Metrics);
        let shutdown = CancellationToken::new();
        let handle = Scheduler::new(queue.clone(), config(None)).spawn(shutdown.clone());

        let msg = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap();
        assert!(matches!(msg, Some(BusMessage::Metrics(_))));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
