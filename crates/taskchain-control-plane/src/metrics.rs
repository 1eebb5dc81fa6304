//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use taskchain_core::TaskStatus;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_task_metrics(state, &mut output).await;
    collect_lifecycle_metrics(state, &mut output).await;
    collect_pool_metrics(state, &mut output);

    output
}

/// Tasks currently stored, by status.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    let status = match state.queue.get_status().await {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "Skipping task gauges, store unavailable");
            return;
        }
    };

    writeln!(
        output,
        "# HELP taskchain_tasks_total Number of stored tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE taskchain_tasks_total gauge").ok();
    for s in TaskStatus::ALL {
        let count = status.counts.get(s.as_str()).copied().unwrap_or(0);
        let label = s.as_str().to_ascii_lowercase();
        writeln!(output, "taskchain_tasks_total{{status=\"{label}\"}} {count}").ok();
    }
}

/// Lifecycle counters since process start.
async fn collect_lifecycle_metrics(state: &Arc<AppState>, output: &mut String) {
    let m = state.queue.get_metrics().await;

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskchain_task_transitions_total Lifecycle transitions since start"
    )
    .ok();
    writeln!(output, "# TYPE taskchain_task_transitions_total counter").ok();
    for (event, value) in [
        ("enqueued", m.enqueued),
        ("started", m.started),
        ("completed", m.completed),
        ("failed", m.failed),
        ("retried", m.retried),
        ("cancelled", m.cancelled),
    ] {
        writeln!(
            output,
            "taskchain_task_transitions_total{{event=\"{event}\"}} {value}"
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskchain_tasks_in_flight Executions claimed and not yet settled"
    )
    .ok();
    writeln!(output, "# TYPE taskchain_tasks_in_flight gauge").ok();
    writeln!(output, "taskchain_tasks_in_flight {}", m.in_flight).ok();

    if let Some(avg) = m.avg_execution_ms {
        writeln!(output).ok();
        writeln!(
            output,
            "# HELP taskchain_task_execution_avg_ms Mean execution time of completed tasks"
        )
        .ok();
        writeln!(output, "# TYPE taskchain_task_execution_avg_ms gauge").ok();
        writeln!(output, "taskchain_task_execution_avg_ms {avg:.3}").ok();
    }
}

fn collect_pool_metrics(state: &Arc<AppState>, output: &mut String) {
    writeln!(output).ok();
    writeln!(output, "# HELP taskchain_pool_slots Worker pool slots").ok();
    writeln!(output, "# TYPE taskchain_pool_slots gauge").ok();
    writeln!(
        output,
        "taskchain_pool_slots{{state=\"active\"}} {}",
        state.pool.active()
    )
    .ok();
    writeln!(
        output,
        "taskchain_pool_slots{{state=\"capacity\"}} {}",
        state.pool.concurrency()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskchain_event_subscribers Open event bus subscriptions"
    )
    .ok();
    writeln!(output, "# TYPE taskchain_event_subscribers gauge").ok();
    writeln!(
        output,
        "taskchain_event_subscribers {}",
        state.bus.subscriber_count()
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use taskchain_core::NewTask;

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::in_memory(Config::default());
        let output = collect_metrics(&state).await;

        assert!(output.contains("taskchain_tasks_total{status=\"queued\"} 0"));
        assert!(output.contains("taskchain_tasks_total{status=\"retrying\"} 0"));
        assert!(output.contains("taskchain_task_transitions_total{event=\"enqueued\"} 0"));
        assert!(output.contains("taskchain_tasks_in_flight 0"));
        assert!(output.contains("taskchain_pool_slots{state=\"capacity\"} 4"));
        assert!(!output.contains("taskchain_task_execution_avg_ms"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts_tasks() {
        let state = AppState::in_memory(Config::default());
        state.queue.enqueue(NewTask::new("echo", json!({}))).await.unwrap();
        state.queue.enqueue(NewTask::new("echo", json!({}))).await.unwrap();

        let output = collect_metrics(&state).await;
        assert!(output.contains("taskchain_tasks_total{status=\"queued\"} 2"));
        assert!(output.contains("taskchain_task_transitions_total{event=\"enqueued\"} 2"));
    }
}
