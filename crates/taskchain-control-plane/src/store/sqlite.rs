//! SQLite task store.
//!
//! Timestamps are stored as Unix milliseconds, JSON columns as TEXT and
//! priority as its numeric rank so `ORDER BY priority` is the dispatch order.
//! The implicit `rowid` records insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use taskchain_core::{Priority, Task, TaskFailure, TaskId, TaskStatus};

use super::{StoreError, StoreResult, StoreStats, TaskStore};

const TASK_COLUMNS: &str = "id, task_type, name, priority, status, payload, metadata, attempts, \
     max_retries, progress, result, error, parent_task_id, timeout_ms, created_at, updated_at, \
     started_at, completed_at, scheduled_for";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Durable [`TaskStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: Pool<Sqlite>,
}

impl SqliteTaskStore {
    /// Wrap `pool`, creating the schema when missing.
    pub async fn new(pool: Pool<Sqlite>) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                error TEXT,
                parent_task_id TEXT,
                timeout_ms INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                scheduled_for INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_dispatch ON tasks(status, priority, created_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_type ON tasks(task_type, created_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_where(&self, clause: &str, bind: &str) -> StoreResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE {clause}");
        let rows = sqlx::query(&sql).bind(bind).fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }
}

fn to_json_text(value: &Value) -> String {
    value.to_string()
}

fn to_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|t| t.timestamp_millis())
}

fn from_millis(column: &str, ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("{column} out of range: {ms}")))
}

fn opt_from_millis(column: &str, ms: Option<i64>) -> StoreResult<Option<DateTime<Utc>>> {
    ms.map(|ms| from_millis(column, ms)).transpose()
}

fn parse_json(column: &str, raw: &str) -> StoreResult<Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn error_text(error: &Option<TaskFailure>) -> StoreResult<Option<String>> {
    error
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("error: {e}")))
}

fn task_from_row(row: &SqliteRow) -> StoreResult<Task> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<TaskStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let priority = Priority::from_rank(row.try_get("priority")?)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    let payload: String = row.try_get("payload")?;
    let metadata: String = row.try_get("metadata")?;
    let result: Option<String> = row.try_get("result")?;
    let error: Option<String> = row.try_get("error")?;
    let error = error
        .map(|raw| serde_json::from_str::<TaskFailure>(&raw))
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("error: {e}")))?;

    let attempts: i64 = row.try_get("attempts")?;
    let max_retries: i64 = row.try_get("max_retries")?;
    let progress: i64 = row.try_get("progress")?;
    let timeout_ms: Option<i64> = row.try_get("timeout_ms")?;
    let parent: Option<String> = row.try_get("parent_task_id")?;

    Ok(Task {
        id: TaskId::new(row.try_get::<String, _>("id")?),
        task_type: row.try_get("task_type")?,
        name: row.try_get("name")?,
        priority,
        status,
        payload: parse_json("payload", &payload)?,
        metadata: parse_json("metadata", &metadata)?,
        attempts: u32::try_from(attempts).map_err(|e| StoreError::Corrupt(format!("attempts: {e}")))?,
        max_retries: u32::try_from(max_retries)
            .map_err(|e| StoreError::Corrupt(format!("max_retries: {e}")))?,
        progress: progress.clamp(0, 100) as u8,
        result: result.map(|raw| parse_json("result", &raw)).transpose()?,
        error,
        parent_task_id: parent.map(TaskId::new),
        timeout_ms: timeout_ms.map(|ms| ms.max(0) as u64),
        created_at: from_millis("created_at", row.try_get("created_at")?)?,
        updated_at: from_millis("updated_at", row.try_get("updated_at")?)?,
        started_at: opt_from_millis("started_at", row.try_get("started_at")?)?,
        completed_at: opt_from_millis("completed_at", row.try_get("completed_at")?)?,
        scheduled_for: opt_from_millis("scheduled_for", row.try_get("scheduled_for")?)?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn save(&self, task: &Task) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, task_type, name, priority, status, payload, metadata, attempts,
                max_retries, progress, result, error, parent_task_id, timeout_ms,
                created_at, updated_at, started_at, completed_at, scheduled_for
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                attempts = excluded.attempts,
                progress = excluded.progress,
                result = excluded.result,
                error = excluded.error,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                scheduled_for = excluded.scheduled_for
            "#,
        )
        .bind(task.id.as_str())
        .bind(task.task_type.as_str())
        .bind(task.name.as_str())
        .bind(i64::from(task.priority.rank()))
        .bind(task.status.as_str())
        .bind(to_json_text(&task.payload))
        .bind(to_json_text(&task.metadata))
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_retries))
        .bind(i64::from(task.progress))
        .bind(task.result.as_ref().map(to_json_text))
        .bind(error_text(&task.error)?)
        .bind(task.parent_task_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(task.timeout_ms.map(|ms| ms.min(i64::MAX as u64) as i64))
        .bind(task.created_at.timestamp_millis())
        .bind(task.updated_at.timestamp_millis())
        .bind(to_millis(task.started_at))
        .bind(to_millis(task.completed_at))
        .bind(to_millis(task.scheduled_for))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_if_status(&self, task: &Task, expected: TaskStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?,
                attempts = ?,
                progress = ?,
                result = ?,
                error = ?,
                metadata = ?,
                updated_at = ?,
                started_at = ?,
                completed_at = ?,
                scheduled_for = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.progress))
        .bind(task.result.as_ref().map(to_json_text))
        .bind(error_text(&task.error)?)
        .bind(to_json_text(&task.metadata))
        .bind(task.updated_at.timestamp_millis())
        .bind(to_millis(task.started_at))
        .bind(to_millis(task.completed_at))
        .bind(to_millis(task.scheduled_for))
        .bind(task.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn find_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        self.fetch_where(
            "status = ? ORDER BY priority ASC, created_at ASC, rowid ASC",
            status.as_str(),
        )
        .await
    }

    async fn find_by_type(&self, task_type: &str) -> StoreResult<Vec<Task>> {
        self.fetch_where(
            "task_type = ? ORDER BY created_at DESC, rowid DESC",
            task_type,
        )
        .await
    }

    async fn find_by_parent_id(&self, parent_id: &TaskId) -> StoreResult<Vec<Task>> {
        self.fetch_where(
            "parent_task_id = ? ORDER BY created_at ASC, rowid ASC",
            parent_id.as_str(),
        )
        .await
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<Option<Task>> {
        let progress = i64::from(progress.min(100));
        let result = sqlx::query(
            "UPDATE tasks SET progress = ?, updated_at = ? \
             WHERE id = ? AND status = 'RUNNING' AND progress < ?",
        )
        .bind(progress)
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .bind(progress)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn get_stats(&self) -> StoreResult<StoreStats> {
        let mut stats = StoreStats::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            stats.total += n as u64;
            stats.by_status.insert(status, n as u64);
        }

        let rows = sqlx::query("SELECT task_type, COUNT(*) AS n FROM tasks GROUP BY task_type")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let task_type: String = row.try_get("task_type")?;
            let n: i64 = row.try_get("n")?;
            stats.by_type.insert(task_type, n as u64);
        }

        let row = sqlx::query(
            "SELECT AVG(completed_at - started_at) AS avg_ms FROM tasks \
             WHERE status = 'COMPLETED' AND started_at IS NOT NULL AND completed_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        stats.avg_duration_ms = row.try_get("avg_ms")?;

        Ok(stats)
    }

    async fn get_recent_tasks(&self, limit: usize) -> StoreResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED') \
             AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(older_than.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use taskchain_core::{FailureKind, NewTask};

    /// Single-connection pool so every query sees the same in-memory database.
    async fn memory_pool() -> Pool<Sqlite> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn store() -> SqliteTaskStore {
        SqliteTaskStore::new(memory_pool().await).await.unwrap()
    }

    fn submit(priority: Priority, at: DateTime<Utc>) -> Task {
        let submission = NewTask::new("echo", json!({"msg": "hi"}))
            .with_priority(priority)
            .with_timeout_ms(5_000);
        Task::from_submission(submission, 3, at).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let store = store().await;
        let mut task = submit(Priority::High, Utc::now());
        task.metadata = json!({"owner": "ops"});
        store.save(&task).await.unwrap();

        let loaded = store.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.task_type, "echo");
        assert_eq!(loaded.priority, Priority::High);
        assert_eq!(loaded.status, TaskStatus::Queued);
        assert_eq!(loaded.payload, json!({"msg": "hi"}));
        assert_eq!(loaded.metadata, json!({"owner": "ops"}));
        assert_eq!(loaded.timeout_ms, Some(5_000));
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            task.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_dispatch_order_matches_memory_store() {
        let store = store().await;
        let now = Utc::now();
        let a = submit(Priority::Normal, now);
        let b = submit(Priority::Low, now);
        let c = submit(Priority::High, now);
        let d = submit(Priority::Normal, now);
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
    async fn test_conditional_write_and_failure_record() {
        let store = store().await;
        let task = submit(Priority::Normal, Utc::now());
        store.save(&task).await.unwrap();

        let mut running = task.clone();
        running.start(Utc::now()).unwrap();
        assert!(store.save_if_status(&running, TaskStatus::Queued).await.unwrap());
        assert!(!store.save_if_status(&running, TaskStatus::Queued).await.unwrap());

        let failed = store
            .mark_failed(&task.id, TaskFailure::new(FailureKind::Timeout, "slow"))
            .await
            .unwrap()
            .unwrap();
        let loaded = store.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.error, failed.error);
        assert_eq!(loaded.attempts, 1);
    }

    #[tokio::test]
    async fn test_progress_stats_and_cleanup() {
        let store = store().await;
        let now = Utc::now();
        let task = submit(Priority::Normal, now);
        let other = submit(Priority::Normal, now);
        store.save(&task).await.unwrap();
        store.save(&other).await.unwrap();

        assert!(store.update_progress(&task.id, 10).await.unwrap().is_none());
        store.mark_started(&task.id).await.unwrap().unwrap();
        assert_eq!(
            store.update_progress(&task.id, 60).await.unwrap().map(|t| t.progress),
            Some(60)
        );
        assert!(store.update_progress(&task.id, 30).await.unwrap().is_none());
        store.mark_completed(&task.id, json!("done")).await.unwrap().unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(TaskStatus::Completed), 1);
        assert_eq!(stats.by_type.get("echo"), Some(&2));
        assert!(stats.avg_duration_ms.is_some());

        assert_eq!(store.cleanup(now - Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(store.cleanup(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);
        assert_eq!(store.get_recent_tasks(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = memory_pool().await;
        let store = SqliteTaskStore::new(pool.clone()).await.unwrap();
        pool.close().await;
        assert!(matches!(
            store.find_by_id(&TaskId::new("x")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_undecodable_row_is_corrupt() {
        let pool = memory_pool().await;
        let store = SqliteTaskStore::new(pool.clone()).await.unwrap();
        let task = submit(Priority::Normal, Utc::now());
        store.save(&task).await.unwrap();
        sqlx::query("UPDATE tasks SET status = 'EXPLODED' WHERE id = ?")
            .bind(task.id.as_str())
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            store.find_by_id(&task.id).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
