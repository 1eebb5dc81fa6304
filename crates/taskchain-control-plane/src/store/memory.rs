//! In-memory task store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use taskchain_core::{Task, TaskId, TaskStatus};

use super::{dispatch_order, merge_mutable, StoreError, StoreResult, StoreStats, TaskStore};

struct StoredTask {
    /// Insertion sequence, the last ordering tie-breaker.
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct MemoryState {
    tasks: HashMap<TaskId, StoredTask>,
    next_seq: u64,
}

/// Process-local [`TaskStore`]. Contents are lost on restart.
pub struct InMemoryTaskStore {
    state: RwLock<MemoryState>,
    available: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    /// Matching tasks sorted by `cmp`, paired with their insertion sequence.
    async fn collect<P, C>(&self, keep: P, cmp: C) -> StoreResult<Vec<Task>>
    where
        P: Fn(&Task) -> bool,
        C: Fn((&Task, u64), (&Task, u64)) -> std::cmp::Ordering,
    {
        self.check()?;
        let state = self.state.read().await;
        let mut rows: Vec<&StoredTask> = state.tasks.values().filter(|s| keep(&s.task)).collect();
        rows.sort_by(|a, b| cmp((&a.task, a.seq), (&b.task, b.seq)));
        Ok(rows.into_iter().map(|s| s.task.clone()).collect())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: (&Task, u64), b: (&Task, u64)) -> std::cmp::Ordering {
    b.0.created_at.cmp(&a.0.created_at).then_with(|| b.1.cmp(&a.1))
}

fn oldest_first(a: (&Task, u64), b: (&Task, u64)) -> std::cmp::Ordering {
    a.0.created_at.cmp(&b.0.created_at).then_with(|| a.1.cmp(&b.1))
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: &Task) -> StoreResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        if let Some(stored) = state.tasks.get_mut(&task.id) {
            merge_mutable(&mut stored.task, task);
            return Ok(());
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.tasks.insert(
            task.id.clone(),
            StoredTask {
                seq,
                task: task.clone(),
            },
        );
        Ok(())
    }

    async fn save_if_status(&self, task: &Task, expected: TaskStatus) -> StoreResult<bool> {
        self.check()?;
        let mut state = self.state.write().await;
        match state.tasks.get_mut(&task.id) {
            Some(stored) if stored.task.status == expected => {
                merge_mutable(&mut stored.task, task);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.tasks.get(id).map(|s| s.task.clone()))
    }

    async fn find_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        self.collect(|t| t.status == status, dispatch_order).await
    }

    async fn find_by_type(&self, task_type: &str) -> StoreResult<Vec<Task>> {
        self.collect(|t| t.task_type == task_type, newest_first).await
    }

    async fn find_by_parent_id(&self, parent_id: &TaskId) -> StoreResult<Vec<Task>> {
        self.collect(|t| t.parent_task_id.as_ref() == Some(parent_id), oldest_first)
            .await
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<Option<Task>> {
        self.check()?;
        let mut state = self.state.write().await;
        let Some(stored) = state.tasks.get_mut(id) else {
            return Ok(None);
        };
        if stored.task.set_progress(progress, Utc::now()) {
            Ok(Some(stored.task.clone()))
        } else {
            Ok(None)
        }
    }

    async fn get_stats(&self) -> StoreResult<StoreStats> {
        self.check()?;
        let state = self.state.read().await;
        let mut stats = StoreStats::default();
        let mut total_duration = 0i64;
        let mut timed = 0i64;

        for stored in state.tasks.values() {
            let task = &stored.task;
            stats.total += 1;
            *stats.by_status.entry(task.status.as_str().to_string()).or_default() += 1;
            *stats.by_type.entry(task.task_type.clone()).or_default() += 1;
            if task.status == TaskStatus::Completed {
                if let Some(ms) = task.duration_ms() {
                    total_duration += ms;
                    timed += 1;
                }
            }
        }
        if timed > 0 {
            stats.avg_duration_ms = Some(total_duration as f64 / timed as f64);
        }
        Ok(stats)
    }

    async fn get_recent_tasks(&self, limit: usize) -> StoreResult<Vec<Task>> {
        let mut tasks = self.collect(|_| true, newest_first).await?;
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        self.check()?;
        let mut state = self.state.write().await;
        let before = state.tasks.len();
        state.tasks.retain(|_, stored| {
            let task = &stored.task;
            !(task.is_terminal() && task.completed_at.is_some_and(|at| at < older_than))
        });
        Ok((before - state.tasks.len()) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use taskchain_core::{FailureKind, NewTask, Priority, TaskFailure};

    fn submit(task_type: &str, priority: Priority, at: DateTime<Utc>) -> Task {
        let submission = NewTask::new(task_type, json!({})).with_priority(priority);
        Task::from_submission(submission, 3, at).unwrap()
    }

    #[tokio::test]
    async fn test_find_by_status_order() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let a = submit("x", Priority::Normal, now);
        let b = submit("x", Priority::Low, now);
        let c = submit("x", Priority::High, now);
        // Same timestamp as `a`; insertion order breaks the tie.
        let d = submit("x", Priority::Normal, now);
        for t in [&a, &b, &c, &d] {
            store.save(t).await.unwrap();
        }

        let ids: Vec<_> = store
            .find_by_status(TaskStatus::Queued)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![c.id, a.id, d.id, b.id]);
    }

    #[tokio::test]
    async fn test_save_does_not_clobber_immutable_fields() {
        let store = InMemoryTaskStore::new();
        let original = submit("report", Priority::High, Utc::now());
        store.save(&original).await.unwrap();

        let mut changed = original.clone();
        changed.task_type = "other".to_string();
        changed.payload = json!({"evil": true});
        changed.priority = Priority::Low;
        changed.progress = 7;
        store.save(&changed).await.unwrap();

        let stored = store.find_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.task_type, "report");
        assert_eq!(stored.payload, json!({}));
        assert_eq!(stored.priority, Priority::High);
        assert_eq!(stored.progress, 7);
    }

    #[tokio::test]
    async fn test_save_if_status_is_conditional() {
        let store = InMemoryTaskStore::new();
        let task = submit("x", Priority::Normal, Utc::now());
        store.save(&task).await.unwrap();

        let mut running = task.clone();
        running.start(Utc::now()).unwrap();
        assert!(store.save_if_status(&running, TaskStatus::Queued).await.unwrap());
        assert!(!store.save_if_status(&running, TaskStatus::Queued).await.unwrap());
    }

    #[tokio::test]
    async fn test_type_and_parent_queries() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let parent = submit("batch", Priority::Normal, now);
        store.save(&parent).await.unwrap();

        let first = Task::from_submission(
            NewTask::new("step", json!(1)).with_parent(parent.id.clone()),
            3,
            now + Duration::milliseconds(1),
        )
        .unwrap();
        let second = Task::from_submission(
            NewTask::new("step", json!(2)).with_parent(parent.id.clone()),
            3,
            now + Duration::milliseconds(2),
        )
        .unwrap();
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();

        let children = store.find_by_parent_id(&parent.id).await.unwrap();
        assert_eq!(children[0].id, first.id);
        assert_eq!(children[1].id, second.id);

        let steps = store.find_by_type("step").await.unwrap();
        assert_eq!(steps[0].id, second.id);

        let recent = store.get_recent_tasks(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, second.id);
    }

    #[tokio::test]
    async fn test_progress_only_while_running() {
        let store = InMemoryTaskStore::new();
        let task = submit("x", Priority::Normal, Utc::now());
        store.save(&task).await.unwrap();
        assert!(store.update_progress(&task.id, 50).await.unwrap().is_none());

        store.mark_started(&task.id).await.unwrap();
        assert_eq!(
            store.update_progress(&task.id, 50).await.unwrap().map(|t| t.progress),
            Some(50)
        );
        assert!(store.update_progress(&task.id, 20).await.unwrap().is_none());
        assert_eq!(
            store.update_progress(&task.id, 200).await.unwrap().map(|t| t.progress),
            Some(100)
        );
    }

    #[tokio::test]
    async fn test_cleanup_and_stats() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();

        let done = submit("a", Priority::Normal, now);
        let failed = submit("b", Priority::Normal, now);
        let live = submit("a", Priority::Normal, now);
        for t in [&done, &failed, &live] {
            store.save(t).await.unwrap();
        }
        store.mark_started(&done.id).await.unwrap();
        store.mark_completed(&done.id, json!("ok")).await.unwrap();
        store
            .mark_failed(&failed.id, TaskFailure::new(FailureKind::Fatal, "x"))
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(TaskStatus::Completed), 1);
        assert_eq!(stats.count(TaskStatus::Failed), 1);
        assert_eq!(stats.count(TaskStatus::Queued), 1);
        assert_eq!(stats.by_type.get("a"), Some(&2));
        assert!(stats.avg_duration_ms.is_some());

        assert_eq!(store.cleanup(now - Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(store.cleanup(Utc::now() + Duration::seconds(1)).await.unwrap(), 2);
        assert!(store.find_by_id(&live.id).await.unwrap().is_some());
    }
}
