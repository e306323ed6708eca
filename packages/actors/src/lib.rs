//! Actor system for the translation queue.
//!
//! This crate provides the Ractor-based orchestrator that drives translation
//! items through the chunked backend protocol, one item at a time.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns the pending, completed and failed lists and the run flags
//! - `WorkerActor` - Runs the `ChunkedJobDriver` for the in-flight item
//! - `TranslationQueue` - Cloneable handle used by callers
//!
//! # Usage
//!
//! ```ignore
//! use actors::TranslationQueue;
//!
//! let queue = TranslationQueue::spawn(config, backend, store).await?;
//! let mut events = queue.subscribe();
//!
//! queue.add_items(vec![QueueItem::new(42, "es")])?;
//! queue.start()?;
//! ```

mod driver;
mod handle;
mod listener;
mod messages;
mod queue_actor;
mod worker_actor;

pub use driver::{ChunkedJobDriver, DriverError, JobReport};
pub use handle::TranslationQueue;
pub use listener::{QueueListener, dispatch, spawn_listener};
pub use messages::{QueueError, QueueMessage, WorkerMessage};
pub use queue_actor::{CANCELLED_ERROR, QueueActor, QueueActorArgs};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
