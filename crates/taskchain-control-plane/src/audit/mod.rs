//! Hash-chained audit log of administrative actions.
//!
//! Entries are keyed by their own hash; a single head record points at the
//! newest one. Appends are serialized per chain and the head only moves
//! through a compare-and-swap in the store, so every entry has a distinct
//! predecessor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use taskchain_core::{AuditAction, AuditEntry, GENESIS_HASH};

use crate::store::{StoreError, StoreResult};

mod memory;
mod sqlite;

pub use memory::InMemoryAuditStore;
pub use sqlite::SqliteAuditStore;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{0}")]
    Validation(String),

    #[error("audit chain broken at {broken_at_hash}")]
    Integrity { broken_at_hash: String },

    #[error("audit head moved during append")]
    HeadMoved,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Persistence port for the audit chain.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Hash of the newest entry, `None` for an empty chain.
    async fn head(&self) -> StoreResult<Option<String>>;

    async fn get(&self, hash: &str) -> StoreResult<Option<AuditEntry>>;

    /// Every stored entry in insertion order.
    async fn all(&self) -> StoreResult<Vec<AuditEntry>>;

    /// Store `entry` and point the head at it, but only while the head is
    /// still `expected_head`. Returns `false` (storing nothing) otherwise.
    async fn append(&self, entry: &AuditEntry, expected_head: Option<&str>) -> StoreResult<bool>;
}

/// Outcome of [`AuditChain::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_hash: Option<String>,
    /// Entries reached from the head.
    pub entries: usize,
}

impl Verification {
    fn intact(entries: usize) -> Self {
        Self {
            valid: true,
            broken_at_hash: None,
            entries,
        }
    }

    fn broken(at: &str, entries: usize) -> Self {
        Self {
            valid: false,
            broken_at_hash: Some(at.to_string()),
            entries,
        }
    }
}

/// Append-only ledger over an [`AuditStore`].
pub struct AuditChain {
    store: Arc<dyn AuditStore>,
    append_lock: Mutex<()>,
}

impl AuditChain {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            append_lock: Mutex::new(()),
        }
    }

    /// Append an entry after the current head and return its hash.
    pub async fn append(
        &self,
        actor: &str,
        action: AuditAction,
        details: Value,
    ) -> ChainResult<String> {
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(ChainError::Validation("actor must not be empty".to_string()));
        }

        let _guard = self.append_lock.lock().await;

        let head = self.store.head().await?;
        if let Some(hash) = &head {
            if self.store.get(hash).await?.is_none() {
                error!(head = %hash, "Audit head points at a missing entry");
                return Err(ChainError::Integrity {
                    broken_at_hash: hash.clone(),
                });
            }
        }

        let previous = head.as_deref().unwrap_or(GENESIS_HASH);
        let entry = AuditEntry::new(previous, Utc::now(), actor, action, details);

        if !self.store.append(&entry, head.as_deref()).await? {
            warn!(expected_head = previous, "Audit head moved under the append lock");
            return Err(ChainError::HeadMoved);
        }

        info!(
            hash = %entry.hash,
            previous_hash = %entry.previous_hash,
            actor = %entry.actor,
            action = %entry.action,
            "Audit entry appended"
        );
        Ok(entry.hash)
    }

    /// Walk head to genesis recomputing every hash.
    ///
    /// The first tampered entry, dangling link or loop found on the walk is
    /// reported. Stored entries the walk never reached are reported at the
    /// earliest one.
    pub async fn verify(&self) -> ChainResult<Verification> {
        let all = self.store.all().await?;
        let Some(head) = self.store.head().await? else {
            return Ok(match all.first() {
                Some(orphan) => Verification::broken(&orphan.hash, 0),
                None => Verification::intact(0),
            });
        };

        let by_hash: HashMap<&str, &AuditEntry> =
            all.iter().map(|e| (e.hash.as_str(), e)).collect();
        let mut visited: HashSet<&str> = HashSet::new();

        // Hash to blame when `cursor` cannot be resolved.
        let mut linked_from = head.as_str();
        let mut cursor = head.as_str();
        loop {
            let Some(entry) = by_hash.get(cursor) else {
                return Ok(Verification::broken(linked_from, visited.len()));
            };
            if !entry.is_intact() || !visited.insert(entry.hash.as_str()) {
                return Ok(Verification::broken(&entry.hash, visited.len()));
            }
            if entry.is_first() {
                break;
            }
            linked_from = entry.hash.as_str();
            cursor = entry.previous_hash.as_str();
        }

        if let Some(stray) = all.iter().find(|e| !visited.contains(e.hash.as_str())) {
            return Ok(Verification::broken(&stray.hash, visited.len()));
        }
        Ok(Verification::intact(visited.len()))
    }

    /// Up to `limit` entries, newest first.
    pub async fn entries(&self, limit: usize) -> ChainResult<Vec<AuditEntry>> {
        let mut out = Vec::new();
        let mut cursor = self.store.head().await?;
        while out.len() < limit {
            let Some(hash) = cursor else { break };
            let Some(entry) = self.store.get(&hash).await? else {
                warn!(hash = %hash, "Audit listing stopped at a missing entry");
                break;
            };
            cursor = (!entry.is_first()).then(|| entry.previous_hash.clone());
            out.push(entry);
        }
        Ok(out)
    }

    /// Whether `subject` currently holds `role`.
    ///
    /// Only entries linked from the head count and the newest grant or
    /// revocation for the pair decides. A tampered entry reached before a
    /// decision denies access.
    pub async fn has_grant(&self, role: &str, subject: &str) -> ChainResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = self.store.head().await?;
        while let Some(hash) = cursor {
            if !visited.insert(hash.clone()) {
                warn!(hash = %hash, "Audit chain loops back on itself");
                break;
            }
            let Some(entry) = self.store.get(&hash).await? else {
                break;
            };
            cursor = (!entry.is_first()).then(|| entry.previous_hash.clone());
            if !entry.is_intact() {
                warn!(hash = %entry.hash, role, subject, "Access check reached a tampered entry");
                return Ok(false);
            }
            if let Some(granted) = grant_decision(&entry, role, subject) {
                return Ok(granted);
            }
        }
        Ok(false)
    }

    pub async fn register_standard(
        &self,
        actor: &str,
        standard: &str,
        definition: Value,
    ) -> ChainResult<String> {
        require("standard", standard)?;
        let details = json!({ "standard": standard, "definition": definition });
        self.append(actor, AuditAction::StandardRegistered, details).await
    }

    pub async fn record_compliance(
        &self,
        actor: &str,
        standard: &str,
        subject: &str,
        compliant: bool,
        evidence: Value,
    ) -> ChainResult<String> {
        require("standard", standard)?;
        require("subject", subject)?;
        let details = json!({
            "standard": standard,
            "subject": subject,
            "compliant": compliant,
            "evidence": evidence,
        });
        self.append(actor, AuditAction::ComplianceRecorded, details).await
    }

    pub async fn grant_role(&self, actor: &str, role: &str, subject: &str) -> ChainResult<String> {
        require("role", role)?;
        require("subject", subject)?;
        let details = json!({ "role": role, "subject": subject });
        self.append(actor, AuditAction::RoleGranted, details).await
    }

    pub async fn revoke_role(&self, actor: &str, role: &str, subject: &str) -> ChainResult<String> {
        require("role", role)?;
        require("subject", subject)?;
        let details = json!({ "role": role, "subject": subject });
        self.append(actor, AuditAction::RoleRevoked, details).await
    }
}

fn grant_decision(entry: &AuditEntry, role: &str, subject: &str) -> Option<bool> {
    let granted = match entry.action {
        AuditAction::RoleGranted => true,
        AuditAction::RoleRevoked => false,
        _ => return None,
    };
    let same_pair = entry.details.get("role").and_then(Value::as_str) == Some(role)
        && entry.details.get("subject").and_then(Value::as_str) == Some(subject);
    same_pair.then_some(granted)
}

fn require(field: &str, value: &str) -> ChainResult<()> {
    if value.trim().is_empty() {
        return Err(ChainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Arc<InMemoryAuditStore>, AuditChain) {
        let store = Arc::new(InMemoryAuditStore::new());
        (store.clone(), AuditChain::new(store))
    }

    async fn append_five(chain: &AuditChain) -> Vec<String> {
        let mut hashes = Vec::new();
        for i in 0..5 {
            let hash = chain
                .register_standard("admin", &format!("std-{i}"), json!({"level": i}))
                .await
                .unwrap();
            hashes.push(hash);
        }
        hashes
    }

    #[tokio::test]
    async fn test_empty_chain_is_valid() {
        let (_, chain) = chain();
        assert_eq!(chain.verify().await.unwrap(), Verification::intact(0));
        assert!(chain.entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_verifies() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;

        let verification = chain.verify().await.unwrap();
        assert!(verification.valid);
        assert_eq!(verification.entries, 5);
        assert_eq!(store.head().await.unwrap().as_deref(), Some(hashes[4].as_str()));

        let first = store.get(&hashes[0]).await.unwrap().unwrap();
        assert_eq!(first.previous_hash, GENESIS_HASH);
        for pair in hashes.windows(2) {
            let later = store.get(&pair[1]).await.unwrap().unwrap();
            assert_eq!(later.previous_hash, pair[0]);
        }
    }

    #[tokio::test]
    async fn test_tampered_details_are_detected() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;

        let mut entry = store.get(&hashes[2]).await.unwrap().unwrap();
        entry.details = json!({"level": 99});
        store.overwrite(entry).await;

        let verification = chain.verify().await.unwrap();
        assert!(!verification.valid);
        assert_eq!(verification.broken_at_hash.as_deref(), Some(hashes[2].as_str()));
    }

    #[tokio::test]
    async fn test_rehashed_entry_breaks_the_next_link() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;

        let mut entry = store.get(&hashes[1]).await.unwrap().unwrap();
        store.remove(&hashes[1]).await;
        entry.actor = "mallory".to_string();
        entry.hash = entry.recompute_hash();
        store.overwrite(entry).await;

        let verification = chain.verify().await.unwrap();
        assert_eq!(verification.broken_at_hash.as_deref(), Some(hashes[2].as_str()));
    }

    #[tokio::test]
    async fn test_fork_is_detected() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;

        let stray = AuditEntry::new(
            hashes[1].clone(),
            Utc::now(),
            "mallory",
            AuditAction::RoleGranted,
            json!({"role": "admin", "subject": "mallory"}),
        );
        store.overwrite(stray.clone()).await;

        let verification = chain.verify().await.unwrap();
        assert!(!verification.valid);
        assert_eq!(verification.broken_at_hash, Some(stray.hash));
    }

    #[tokio::test]
    async fn test_unlinked_grant_confers_nothing() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;

        let forged = AuditEntry::new(
            hashes[4].clone(),
            Utc::now(),
            "mallory",
            AuditAction::RoleGranted,
            json!({"role": "admin", "subject": "mallory"}),
        );
        store.overwrite(forged).await;

        assert!(!chain.verify().await.unwrap().valid);
        assert!(!chain.has_grant("admin", "mallory").await.unwrap());
    }

    #[tokio::test]
    async fn test_tampered_entry_denies_access() {
        let (store, chain) = chain();
        chain.grant_role("admin", "reviewer", "alice").await.unwrap();
        chain.grant_role("admin", "reviewer", "bob").await.unwrap();
        let revoked = chain.revoke_role("admin", "reviewer", "alice").await.unwrap();
        assert!(!chain.has_grant("reviewer", "alice").await.unwrap());

        let mut entry = store.get(&revoked).await.unwrap().unwrap();
        entry.details = json!({"role": "reviewer", "subject": "bob"});
        store.overwrite(entry).await;

        assert!(!chain.has_grant("reviewer", "alice").await.unwrap());
        assert!(!chain.has_grant("reviewer", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_are_newest_first() {
        let (_, chain) = chain();
        let hashes = append_five(&chain).await;

        let listed: Vec<String> = chain
            .entries(3)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.hash)
            .collect();
        assert_eq!(listed, vec![hashes[4].clone(), hashes[3].clone(), hashes[2].clone()]);
        assert_eq!(chain.entries(50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_latest_grant_or_revoke_wins() {
        let (_, chain) = chain();
        assert!(!chain.has_grant("reviewer", "alice").await.unwrap());

        chain.grant_role("admin", "reviewer", "alice").await.unwrap();
        chain.grant_role("admin", "reviewer", "bob").await.unwrap();
        assert!(chain.has_grant("reviewer", "alice").await.unwrap());

        chain.revoke_role("admin", "reviewer", "alice").await.unwrap();
        assert!(!chain.has_grant("reviewer", "alice").await.unwrap());
        assert!(chain.has_grant("reviewer", "bob").await.unwrap());
        assert!(!chain.has_grant("owner", "bob").await.unwrap());

        chain.grant_role("admin", "reviewer", "alice").await.unwrap();
        assert!(chain.has_grant("reviewer", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_linear() {
        let (store, chain) = chain();
        let chain = Arc::new(chain);

        let mut handles = Vec::new();
        for i in 0..10 {
            let chain = chain.clone();
            handles.push(tokio::spawn(async move {
                chain
                    .record_compliance("auditor", "iso", &format!("svc-{i}"), true, Value::Null)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.all().await.unwrap();
        let predecessors: HashSet<&str> = all.iter().map(|e| e.previous_hash.as_str()).collect();
        assert_eq!(predecessors.len(), 10);
        assert!(chain.verify().await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_append_validates_input() {
        let (_, chain) = chain();
        assert!(matches!(
            chain.append("  ", AuditAction::TaskCancelled, json!({})).await,
            Err(ChainError::Validation(_))
        ));
        assert!(matches!(
            chain.grant_role("admin", "", "alice").await,
            Err(ChainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_dangling_head_refuses_append() {
        let (store, chain) = chain();
        let hashes = append_five(&chain).await;
        store.remove(&hashes[4]).await;

        match chain.grant_role("admin", "reviewer", "alice").await {
            Err(ChainError::Integrity { broken_at_hash }) => assert_eq!(broken_at_hash, hashes[4]),
            other => panic!("unexpected: {other:?}"),
        }
        let verification = chain.verify().await.unwrap();
        assert_eq!(verification.broken_at_hash.as_deref(), Some(hashes[4].as_str()));
    }
}
