//! Core domain types for the translation job queue.
//!
//! This crate contains shared types used across all packages:
//! - QueueItem and ItemKey for translation work units
//! - Step and JobState for the chunked backend protocol
//! - QueueSnapshot, QueueStats and QueueStatus for queue state
//! - Events for real-time updates

mod events;
mod item;
mod job;
mod queue;

pub use events::{QueueEvent, QueueSummary};
pub use item::{ItemError, ItemKey, QueueItem};
pub use job::{JobState, Step, StepParseError, StepProgress};
pub use queue::{QueueConfig, QueueSnapshot, QueueStats, QueueStatus, RunId, RunState};
