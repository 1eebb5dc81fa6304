//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::audit::{AuditChain, AuditStore, InMemoryAuditStore, SqliteAuditStore};
use crate::bus::EventBus;
use crate::config::Config;
use crate::pool::WorkerPool;
use crate::queue::TaskQueue;
use crate::store::{InMemoryTaskStore, SqliteTaskStore, StoreResult, TaskStore};

const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Everything the HTTP layer and background loops share.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn TaskStore>,
    pub bus: Arc<EventBus>,
    pub queue: Arc<TaskQueue>,
    pub pool: Arc<WorkerPool>,
    pub chain: Arc<AuditChain>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the queue, pool and audit chain over the given stores.
    pub fn new(
        config: Config,
        store: Arc<dyn TaskStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new(config.event_capacity));
        let queue = Arc::new(TaskQueue::new(store.clone(), bus.clone(), config.queue()));
        let pool = WorkerPool::new(queue.clone(), config.pool());
        let chain = Arc::new(AuditChain::new(audit_store));

        Arc::new(Self {
            config,
            store,
            bus,
            queue,
            pool,
            chain,
            started_at: Utc::now(),
        })
    }

    /// State backed by process-local stores.
    pub fn in_memory(config: Config) -> Arc<Self> {
        Self::new(
            config,
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryAuditStore::new()),
        )
    }

    /// Open the stores named by `config.database_url`, falling back to memory.
    pub async fn connect(config: Config) -> StoreResult<Arc<Self>> {
        let Some(url) = config.database_url.clone() else {
            info!("No database configured, keeping state in memory");
            return Ok(Self::in_memory(config));
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect(&url)
            .await?;
        let store = SqliteTaskStore::new(pool.clone()).await?;
        let audit_store = SqliteAuditStore::new(pool).await?;
        info!(database_url = %url, "SQLite stores ready");

        Ok(Self::new(config, Arc::new(store), Arc::new(audit_store)))
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskchain_core::NewTask;

    #[tokio::test]
    async fn test_in_memory_state_is_wired() {
        let state = AppState::in_memory(Config::default());
        let task = state
            .queue
            .enqueue(NewTask::new("echo", json!({})))
            .await
            .unwrap();
        assert!(state.store.find_by_id(&task.id).await.unwrap().is_some());
        assert_eq!(state.pool.concurrency(), 4);
        assert!(state.chain.verify().await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let config = Config {
            database_url: Some("sqlite::memory:".to_string()),
            ..Config::default()
        };
        let state = AppState::connect(config).await.unwrap();
        state.store.ping().await.unwrap();
    }
}
