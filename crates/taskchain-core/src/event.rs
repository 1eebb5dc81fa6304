//! Task lifecycle events and subscription channels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{CoreError, Task, TaskFailure, TaskId, TaskStatus};

/// A lifecycle notification for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    /// Bus-assigned sequence number; 0 until published.
    pub seq: u64,
    pub task_id: TaskId,
    pub task_type: String,
    pub kind: TaskEventKind,
    /// Status after the transition.
    pub status: TaskStatus,
    pub attempts: u32,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    /// Unix timestamp (milliseconds) when the event occurred.
    pub timestamp_ms: i64,
}

impl TaskEvent {
    /// Snapshot `task` as an event of the given kind.
    pub fn from_task(kind: TaskEventKind, task: &Task) -> Self {
        Self {
            seq: 0,
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            kind,
            status: task.status,
            attempts: task.attempts,
            progress: task.progress,
            message: None,
            result: task.result.clone(),
            error: task.error.clone(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Progress event with an optional human message.
    pub fn progress(task: &Task, message: Option<String>) -> Self {
        let mut event = Self::from_task(TaskEventKind::Progress, task);
        event.message = message;
        event
    }

    /// Wire event name consumed by dashboards.
    pub fn wire_name(&self) -> &'static str {
        match self.kind {
            TaskEventKind::Created => "task:created",
            TaskEventKind::Progress => "task:progress",
            _ => "task:status",
        }
    }

    /// Wire payload matching [`TaskEvent::wire_name`].
    pub fn wire_payload(&self) -> Value {
        match self.kind {
            TaskEventKind::Progress => {
                let mut body = json!({
                    "taskId": self.task_id,
                    "progress": self.progress,
                });
                if let Some(message) = &self.message {
                    body["message"] = json!(message);
                }
                body
            }
            TaskEventKind::Created => json!({
                "taskId": self.task_id,
                "type": self.task_type,
                "status": self.status,
                "timestamp": self.timestamp_ms,
            }),
            _ => json!({
                "taskId": self.task_id,
                "status": self.status,
                "execution": {
                    "event": self.kind,
                    "attempts": self.attempts,
                    "progress": self.progress,
                    "result": self.result,
                    "error": self.error,
                    "timestamp": self.timestamp_ms,
                },
            }),
        }
    }
}

/// Type of lifecycle event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Queued,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
    Retried,
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventChannel {
    /// Every task event.
    All,
    /// Events for a single task.
    Task(TaskId),
    /// Events for tasks of one type.
    Type(String),
    /// Periodic queue metrics snapshots only.
    Metrics,
}

impl EventChannel {
    /// Whether a task event belongs on this channel.
    pub fn matches(&self, event: &TaskEvent) -> bool {
        match self {
            Self::All => true,
            Self::Task(id) => &event.task_id == id,
            Self::Type(t) => &event.task_type == t,
            Self::Metrics => false,
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Task(id) => write!(f, "task:{id}"),
            Self::Type(t) => write!(f, "type:{t}"),
            Self::Metrics => f.write_str("metrics"),
        }
    }
}

/// Accepts `all`, `task:<id>`, `type:<type>`, `metrics`, optionally prefixed
/// with `subscribe:`.
impl FromStr for EventChannel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let name = raw.strip_prefix("subscribe:").unwrap_or(raw);
        let invalid = || CoreError::InvalidInput(format!("unknown channel: {s}"));

        match name {
            "all" | "" => Ok(Self::All),
            "metrics" => Ok(Self::Metrics),
            _ => match name.split_once(':') {
                Some(("task", id)) if !id.is_empty() => Ok(Self::Task(TaskId::new(id))),
                Some(("type", t)) if !t.is_empty() => Ok(Self::Type(t.to_string())),
                _ => Err(invalid()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewTask;

    fn sample_task() -> Task {
        Task::from_submission(NewTask::new("echo", json!({})), 3, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn test_event_from_task() {
        let task = sample_task();
        let event = TaskEvent::from_task(TaskEventKind::Created, &task);
        assert_eq!(event.task_id, task.id);
        assert_eq!(event.status, TaskStatus::Queued);
        assert!(event.timestamp_ms > 0);
        assert_eq!(event.wire_name(), "task:created");
    }

    #[test]
    fn test_status_wire_payload() {
        let task = sample_task();
        let event = TaskEvent::from_task(TaskEventKind::Cancelled, &task);
        assert_eq!(event.wire_name(), "task:status");
        let body = event.wire_payload();
        assert_eq!(body["taskId"], json!(task.id.as_str()));
        assert_eq!(body["execution"]["event"], json!("cancelled"));
    }

    #[test]
    fn test_progress_wire_payload() {
        let task = sample_task();
        let event = TaskEvent::progress(&task, Some("halfway".to_string()));
        let body = event.wire_payload();
        assert_eq!(event.wire_name(), "task:progress");
        assert_eq!(body["message"], json!("halfway"));
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("subscribe:all".parse::<EventChannel>().unwrap(), EventChannel::All);
        assert_eq!("metrics".parse::<EventChannel>().unwrap(), EventChannel::Metrics);
        assert_eq!(
            "subscribe:task:abc".parse::<EventChannel>().unwrap(),
            EventChannel::Task(TaskId::new("abc"))
        );
        assert_eq!(
            "type:report".parse::<EventChannel>().unwrap(),
            EventChannel::Type("report".to_string())
        );
        assert!("task:".parse::<EventChannel>().is_err());
        assert!("bogus".parse::<EventChannel>().is_err());
    }

    #[test]
    fn test_channel_matching() {
        let task = sample_task();
        let event = TaskEvent::from_task(TaskEventKind::Queued, &task);
        assert!(EventChannel::All.matches(&event));
        assert!(EventChannel::Task(task.id.clone()).matches(&event));
        assert!(!EventChannel::Task(TaskId::new("other")).matches(&event));
        assert!(EventChannel::Type("echo".to_string()).matches(&event));
        assert!(!EventChannel::Metrics.matches(&event));
    }
}
