//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemKey, QueueItem, QueueStats, RunId, RunState, Step, StepProgress};

/// Final tally of a processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: bool,
}

/// Events emitted by the orchestrator for real-time updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Queue counters changed.
    StatsUpdated {
        stats: QueueStats,
        timestamp: DateTime<Utc>,
    },
    /// The run state changed (idle, running, paused).
    StateChanged {
        old_state: RunState,
        new_state: RunState,
        timestamp: DateTime<Utc>,
    },
    /// An item left the pending queue and is now in flight.
    ItemStarted {
        run_id: RunId,
        item: QueueItem,
        timestamp: DateTime<Utc>,
    },
    /// The in-flight item is about to run a step.
    StepStarted {
        run_id: RunId,
        key: ItemKey,
        progress: StepProgress,
        timestamp: DateTime<Utc>,
    },
    /// The in-flight item finished every step.
    ItemCompleted {
        run_id: RunId,
        item: QueueItem,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The in-flight item failed on a step.
    ItemFailed {
        run_id: RunId,
        item: QueueItem,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<Step>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The in-flight item was stopped by the operator.
    ItemCancelled {
        run_id: RunId,
        item: QueueItem,
        timestamp: DateTime<Utc>,
    },
    /// The run ended, either drained or cancelled.
    QueueCompleted {
        run_id: RunId,
        summary: QueueSummary,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            QueueEvent::StatsUpdated { stats, .. } => format!(
                "{} pending, {} completed, {} failed",
                stats.pending, stats.completed, stats.failed
            ),
            QueueEvent::StateChanged { new_state, .. } => format!("Queue -> {}", new_state),
            QueueEvent::ItemStarted { item, .. } => format!("Started {}", item.label()),
            QueueEvent::StepStarted { key, progress, .. } => format!(
                "{} [{}/{}] {}",
                key,
                progress.step_index + 1,
                progress.total_steps,
                progress.message
            ),
            QueueEvent::ItemCompleted {
                item, duration_ms, ..
            } => format!("Translated {} in {}ms", item.label(), duration_ms),
            QueueEvent::ItemFailed {
                item, step, error, ..
            } => match step {
                Some(step) => format!("{} failed at {}: {}", item.label(), step, error),
                None => format!("{} failed: {}", item.label(), error),
            },
            QueueEvent::ItemCancelled { item, .. } => format!("Cancelled {}", item.label()),
            QueueEvent::QueueCompleted { summary, .. } => {
                let suffix = if summary.cancelled { " (cancelled)" } else { "" };
                format!(
                    "Queue finished: {} completed, {} failed{}",
                    summary.completed, summary.failed, suffix
                )
            }
        }
    }
}
