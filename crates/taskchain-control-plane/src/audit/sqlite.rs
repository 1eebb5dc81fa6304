//! SQLite audit store: one row per entry keyed by hash, plus a single-row
//! head table updated in the same transaction as the insert.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use taskchain_core::{AuditAction, AuditEntry, AuditEntryId};

use super::AuditStore;
use crate::store::{StoreError, StoreResult};

const ENTRY_COLUMNS: &str = "hash, id, timestamp, actor, action, details, previous_hash";

/// Durable [`AuditStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

impl SqliteAuditStore {
    pub async fn new(pool: Pool<Sqlite>) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                previous_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_head (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                hash TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn entry_from_row(row: &SqliteRow) -> StoreResult<AuditEntry> {
    let action: String = row.try_get("action")?;
    let details: String = row.try_get("details")?;
    let id: String = row.try_get("id")?;
    Ok(AuditEntry {
        id: AuditEntryId::new(id),
        timestamp: row.try_get("timestamp")?,
        actor: row.try_get("actor")?,
        action: action
            .parse::<AuditAction>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        details: serde_json::from_str(&details)
            .map_err(|e| StoreError::Corrupt(format!("details: {e}")))?,
        hash: row.try_get("hash")?,
        previous_hash: row.try_get("previous_hash")?,
    })
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn head(&self) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT hash FROM audit_head WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get("hash")).transpose()?)
    }

    async fn get(&self, hash: &str) -> StoreResult<Option<AuditEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_entries WHERE hash = ?");
        let row = sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn all(&self) -> StoreResult<Vec<AuditEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_entries ORDER BY seq");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn append(&self, entry: &AuditEntry, expected_head: Option<&str>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> = sqlx::query("SELECT hash FROM audit_head WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.try_get("hash"))
            .transpose()?;
        if current.as_deref() != expected_head {
            return Ok(false);
        }

        let exists = sqlx::query("SELECT 1 FROM audit_entries WHERE hash = ?")
            .bind(entry.hash.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if exists {
            return Ok(false);
        }

        let details = serde_json::to_string(&entry.details)
            .map_err(|e| StoreError::Corrupt(format!("details: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO audit_entries (hash, id, timestamp, actor, action, details, previous_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.hash.as_str())
        .bind(entry.id.as_str())
        .bind(entry.timestamp)
        .bind(entry.actor.as_str())
        .bind(entry.action.as_str())
        .bind(details)
        .bind(entry.previous_hash.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO audit_head (id, hash) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET hash = excluded.hash",
        )
        .bind(entry.hash.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
