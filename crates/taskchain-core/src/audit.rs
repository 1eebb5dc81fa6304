//! Hash-linked audit entries.
//!
//! `hash = SHA-256(previous_hash | timestamp | actor | action | canonical(details))`
//! with `0x1F` as the field separator. Canonical details are compact JSON
//! with object keys sorted at every depth, so the digest does not depend on
//! how a store happened to order keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{AuditEntryId, CoreError};

/// `previous_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const FIELD_SEPARATOR: &[u8] = &[0x1f];

/// Administrative actions recorded on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StandardRegistered,
    ComplianceRecorded,
    RoleGranted,
    RoleRevoked,
    TaskCancelled,
    TaskRetried,
}

impl AuditAction {
    pub const ALL: [AuditAction; 6] = [
        Self::StandardRegistered,
        Self::ComplianceRecorded,
        Self::RoleGranted,
        Self::RoleRevoked,
        Self::TaskCancelled,
        Self::TaskRetried,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardRegistered => "standard_registered",
            Self::ComplianceRecorded => "compliance_recorded",
            Self::RoleGranted => "role_granted",
            Self::RoleRevoked => "role_revoked",
            Self::TaskCancelled => "task_cancelled",
            Self::TaskRetried => "task_retried",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown audit action: {s}")))
    }
}

/// One link of the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    /// Unix timestamp (milliseconds).
    pub timestamp: i64,
    pub actor: String,
    pub action: AuditAction,
    pub details: Value,
    pub hash: String,
    pub previous_hash: String,
}

impl AuditEntry {
    /// Build the entry that follows `previous_hash`, computing its hash.
    pub fn new(
        previous_hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        action: AuditAction,
        details: Value,
    ) -> Self {
        let previous_hash = previous_hash.into();
        let actor = actor.into();
        let timestamp = timestamp.timestamp_millis();
        let hash = compute_hash(&previous_hash, timestamp, &actor, action, &details);
        Self {
            id: AuditEntryId::generate(),
            timestamp,
            actor,
            action,
            details,
            hash,
            previous_hash,
        }
    }

    /// Hash recomputed from the stored fields.
    pub fn recompute_hash(&self) -> String {
        compute_hash(
            &self.previous_hash,
            self.timestamp,
            &self.actor,
            self.action,
            &self.details,
        )
    }

    /// Stored hash matches the content.
    pub fn is_intact(&self) -> bool {
        self.recompute_hash() == self.hash
    }

    pub fn is_first(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Hex SHA-256 over the chained fields.
pub fn compute_hash(
    previous_hash: &str,
    timestamp_ms: i64,
    actor: &str,
    action: AuditAction,
    details: &Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(timestamp_ms.to_string().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(actor.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(action.as_str().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(canonical_json(details).as_bytes());
    hex::encode(hasher.finalize())
}

/// Compact JSON with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": [1, {"d": 2, "c": 3}], "x": null}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"x":null,"y":[1,{"c":3,"d":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_hex() {
        let ts = Utc::now();
        let a = AuditEntry::new(GENESIS_HASH, ts, "root", AuditAction::RoleGranted, json!({"role": "admin"}));
        let b = AuditEntry::new(GENESIS_HASH, ts, "root", AuditAction::RoleGranted, json!({"role": "admin"}));
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
        assert_eq!(a.hash.len(), 64);
        assert!(a.is_intact());
        assert!(a.is_first());
    }

    #[test]
    fn test_every_field_feeds_the_hash() {
        let ts = Utc::now();
        let base = AuditEntry::new(GENESIS_HASH, ts, "root", AuditAction::RoleGranted, json!({"k": 1}));

        let mut tampered = base.clone();
        tampered.details = json!({"k": 2});
        assert!(!tampered.is_intact());

        let mut tampered = base.clone();
        tampered.actor = "mallory".to_string();
        assert!(!tampered.is_intact());

        let mut tampered = base.clone();
        tampered.action = AuditAction::RoleRevoked;
        assert!(!tampered.is_intact());

        let mut tampered = base;
        tampered.previous_hash = "f".repeat(64);
        assert!(!tampered.is_intact());
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let ts = 1_700_000_000_000;
        let a = compute_hash(GENESIS_HASH, ts, "ab", AuditAction::TaskRetried, &json!("c"));
        let b = compute_hash(GENESIS_HASH, ts, "a", AuditAction::TaskRetried, &json!("bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_action_parse() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("mined".parse::<AuditAction>().is_err());
    }
}
