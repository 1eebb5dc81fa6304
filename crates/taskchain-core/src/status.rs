//! Status and priority enums for Tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle status of a Task.
///
/// ```text
/// PENDING -> QUEUED -> RUNNING -> COMPLETED | FAILED | RETRYING
/// RETRYING -> QUEUED
/// any non-terminal -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Persisted but not yet eligible (scheduled for the future).
    #[default]
    Pending,
    /// Eligible and waiting for a worker slot.
    Queued,
    /// Claimed by a worker and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully, no further automatic retries.
    Failed,
    /// Failed transiently; waiting out the backoff delay.
    Retrying,
    /// Cancelled by a caller.
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 7] = [
        Self::Pending,
        Self::Queued,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Retrying,
        Self::Cancelled,
    ];

    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Two edges leave the strict diagram: `QUEUED -> FAILED` rejects a task
    /// before execution (no executor, retries exhausted) and `FAILED -> QUEUED`
    /// is the explicit manual re-arm.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, next) {
            (Pending, Queued) | (Queued, Running) | (Retrying, Queued) => true,
            (Running, Completed) | (Running, Failed) | (Running, Retrying) => true,
            (Queued, Failed) => true,
            (Failed, Queued) => true,
            (from, Cancelled) => from.is_active(),
            _ => false,
        }
    }

    /// Storage/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown task status: {s}")))
    }
}

/// Dispatch priority. Lower rank runs first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank: CRITICAL=1 ... LOW=4.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }

    /// Inverse of [`Priority::rank`].
    pub fn from_rank(rank: i64) -> Result<Self, CoreError> {
        match rank {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Normal),
            4 => Ok(Self::Low),
            other => Err(CoreError::InvalidInput(format!("invalid priority rank: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by rank, so `Critical < Low` and sorting ascending yields dispatch order.
impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = TaskStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled]
        );
    }

    #[test]
    fn test_nothing_leaves_completed_or_cancelled() {
        for next in TaskStatus::ALL {
            assert!(!TaskStatus::Completed.can_transition_to(next));
            assert!(!TaskStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_cancel_allowed_from_every_active_state() {
        for from in [
            TaskStatus::Pending,
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Retrying,
        ] {
            assert!(from.can_transition_to(TaskStatus::Cancelled), "{from}");
        }
    }

    #[test]
    fn test_retrying_only_requeues() {
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Retrying.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("queued".parse::<TaskStatus>().unwrap(), TaskStatus::Queued);
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_priority_order() {
        let mut p = vec![Priority::Low, Priority::Critical, Priority::Normal, Priority::High];
        p.sort();
        assert_eq!(
            p,
            vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
        );
        assert_eq!(Priority::from_rank(1).unwrap(), Priority::Critical);
        assert!(Priority::from_rank(9).is_err());
    }
}
