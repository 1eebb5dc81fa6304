//! In-memory audit store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskchain_core::AuditEntry;

use super::AuditStore;
use crate::store::StoreResult;

#[derive(Default)]
struct Ledger {
    entries: Vec<AuditEntry>,
    by_hash: HashMap<String, usize>,
    head: Option<String>,
}

/// Process-local [`AuditStore`].
#[derive(Default)]
pub struct InMemoryAuditStore {
    ledger: RwLock<Ledger>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or insert) an entry without touching the head.
    #[cfg(test)]
    pub(crate) async fn overwrite(&self, entry: AuditEntry) {
        let mut ledger = self.ledger.write().await;
        match ledger.by_hash.get(&entry.hash).copied() {
            Some(i) => ledger.entries[i] = entry,
            None => {
                let i = ledger.entries.len();
                ledger.by_hash.insert(entry.hash.clone(), i);
                ledger.entries.push(entry);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn remove(&self, hash: &str) {
        let mut ledger = self.ledger.write().await;
        ledger.entries.retain(|e| e.hash != hash);
        ledger.by_hash = ledger
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.hash.clone(), i))
            .collect();
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn head(&self) -> StoreResult<Option<String>> {
        Ok(self.ledger.read().await.head.clone())
    }

    async fn get(&self, hash: &str) -> StoreResult<Option<AuditEntry>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.by_hash.get(hash).map(|&i| ledger.entries[i].clone()))
    }

    async fn all(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.ledger.read().await.entries.clone())
    }

    async fn append(&self, entry: &AuditEntry, expected_head: Option<&str>) -> StoreResult<bool> {
        let mut ledger = self.ledger.write().await;
        if ledger.head.as_deref() != expected_head || ledger.by_hash.contains_key(&entry.hash) {
            return Ok(false);
        }
        let i = ledger.entries.len();
        ledger.by_hash.insert(entry.hash.clone(), i);
        ledger.entries.push(entry.clone());
        ledger.head = Some(entry.hash.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use taskchain_core::{AuditAction, GENESIS_HASH};

    fn entry(previous: &str, n: u32) -> AuditEntry {
        AuditEntry::new(previous, Utc::now(), "admin", AuditAction::RoleGranted, json!({"n": n}))
    }

    #[tokio::test]
    async fn test_append_requires_expected_head() {
        let store = InMemoryAuditStore::new();
        let first = entry(GENESIS_HASH, 1);
        assert!(store.append(&first, None).await.unwrap());
        assert_eq!(store.head().await.unwrap(), Some(first.hash.clone()));

        let stale = entry(GENESIS_HASH, 2);
        assert!(!store.append(&stale, None).await.unwrap());
        assert!(store.get(&stale.hash).await.unwrap().is_none());

        let second = entry(&first.hash, 3);
        assert!(store.append(&second, Some(first.hash.as_str())).await.unwrap());
        assert_eq!(store.all().await.unwrap(), vec![first, second]);
    }
}
