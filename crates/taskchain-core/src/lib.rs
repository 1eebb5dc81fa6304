//! taskchain core domain types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! The task lifecycle state machine, retry policy, event vocabulary and the
//! audit-chain hashing rules all live here so every store and transport
//! shares one definition of them.

pub mod audit;
pub mod error;
pub mod event;
pub mod ids;
pub mod retry;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, GENESIS_HASH};
pub use error::{CoreError, ExecutionError};
pub use event::{EventChannel, TaskEvent, TaskEventKind};
pub use ids::{AuditEntryId, TaskId};
pub use retry::RetryPolicy;
pub use status::{Priority, TaskStatus};
pub use task::{FailureKind, NewTask, Task, TaskFailure, TaskPatch, DEFAULT_MAX_RETRIES};
