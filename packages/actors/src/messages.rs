//! Message types for actor communication.

use ractor::RpcReplyPort;
use tokio_util::sync::CancellationToken;
use translation_core::{ItemError, ItemKey, QueueItem, QueueStatus, RunId, StepProgress};

use crate::driver::{DriverError, JobReport};

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append items to the pending queue.
    AddItems { items: Vec<QueueItem> },

    /// Drop every list and flag.
    Clear,

    /// Begin a processing run.
    Start,

    /// Stop dispatching after the in-flight item.
    Pause,

    /// Continue dispatching.
    Resume,

    /// Stop the run; the in-flight item aborts before its next step.
    Cancel,

    /// Move one failed item back to the pending queue.
    Retry {
        key: ItemKey,
        reply: RpcReplyPort<Result<QueueItem, QueueError>>,
    },

    /// Move every failed item back to the pending queue.
    RetryFailed { reply: RpcReplyPort<usize> },

    /// Get the full queue state.
    GetStatus { reply: RpcReplyPort<QueueStatus> },

    /// Report that the worker is about to send a step.
    StepStarted {
        run_id: RunId,
        key: ItemKey,
        progress: StepProgress,
    },

    /// Report the outcome of the in-flight item.
    ItemFinished {
        run_id: RunId,
        key: ItemKey,
        outcome: Result<JobReport, DriverError>,
    },
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run the chunked job for one item.
    Process {
        run_id: RunId,
        item: Box<QueueItem>,
        cancel: CancellationToken,
    },
}

/// Error type for queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid item {key}: {source}")]
    InvalidItem { key: ItemKey, source: ItemError },

    #[error("Item not found: {0}")]
    ItemNotFound(ItemKey),

    #[error("Actor error: {0}")]
    Actor(String),
}
