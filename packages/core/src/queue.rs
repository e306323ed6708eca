//! Queue state types: run state, configuration, snapshot and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{ItemKey, QueueItem, StepProgress};

/// Unique identifier for one processing run (one `start()` until the queue drains or is cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Create a new unique run ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current operational state of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run is active.
    #[default]
    Idle,
    /// Items are being dispatched.
    Running,
    /// A run is active but no new item will be dispatched until resumed.
    Paused,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
        }
    }
}

/// Configuration for orchestrator behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Snapshots older than this are discarded on load (seconds).
    pub stale_after_secs: u64,
    /// Largest `chunk_count` accepted from the backend's `init` step.
    pub max_chunk_count: u32,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3600,
            max_chunk_count: 200,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// - `QUEUE_STALE_AFTER_SECS` (default: 3600)
    /// - `QUEUE_MAX_CHUNK_COUNT` (default: 200)
    /// - `QUEUE_EVENT_CAPACITY` (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stale_after_secs: env_parse("QUEUE_STALE_AFTER_SECS")
                .unwrap_or(defaults.stale_after_secs),
            max_chunk_count: env_parse("QUEUE_MAX_CHUNK_COUNT").unwrap_or(defaults.max_chunk_count),
            event_capacity: env_parse::<usize>("QUEUE_EVENT_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.event_capacity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Persisted projection of the queue. The in-flight item is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueItem>,
    pub completed: Vec<QueueItem>,
    pub failed: Vec<QueueItem>,
    pub is_paused: bool,
    pub saved_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn new(
        queue: Vec<QueueItem>,
        completed: Vec<QueueItem>,
        failed: Vec<QueueItem>,
        is_paused: bool,
    ) -> Self {
        Self {
            queue,
            completed,
            failed,
            is_paused,
            saved_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.completed.is_empty() && self.failed.is_empty()
    }

    /// True when no item key appears in more than one list.
    pub fn is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::<ItemKey>::new();
        self.queue
            .iter()
            .chain(&self.completed)
            .chain(&self.failed)
            .all(|item| seen.insert(item.key()))
    }
}

/// Counters reported with every progress notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub state: RunState,
    /// Number of items waiting to be processed.
    pub pending: u64,
    /// 1 while an item is in flight, else 0.
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Items not yet finished (pending + in flight).
    pub fn active(&self) -> u64 {
        self.pending + self.in_flight
    }

    /// Total processed items.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn total(&self) -> u64 {
        self.active() + self.processed()
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// Full view of the orchestrator state, as returned by a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub state: RunState,
    pub cancelled: bool,
    pub pending: Vec<QueueItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<QueueItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepProgress>,
    pub completed: Vec<QueueItem>,
    pub failed: Vec<QueueItem>,
}

impl QueueStatus {
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            state: self.state,
            pending: self.pending.len() as u64,
            in_flight: u64::from(self.current.is_some()),
            completed: self.completed.len() as u64,
            failed: self.failed.len() as u64,
        }
    }
}
