//! Public handle for one translation queue.

use std::sync::Arc;
use std::time::Duration;

use backend::TranslationBackend;
use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
use storage::SnapshotStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use translation_core::{ItemKey, QueueConfig, QueueEvent, QueueItem, QueueStatus};

use crate::messages::{QueueError, QueueMessage};
use crate::queue_actor::{QueueActor, QueueActorArgs};

/// Cloneable handle to a running queue.
///
/// Commands are fire-and-forget casts; queries wait for the actor's reply.
/// Every command is applied in the order it was sent.
#[derive(Clone)]
pub struct TranslationQueue {
    actor: ActorRef<QueueMessage>,
    events: broadcast::Sender<QueueEvent>,
    handle: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl TranslationQueue {
    /// Spawn the queue actor. A stored snapshot younger than
    /// `config.stale_after_secs` is restored, but the queue does not start on
    /// its own.
    pub async fn spawn(
        config: QueueConfig,
        backend: Arc<dyn TranslationBackend>,
        store: SnapshotStore,
    ) -> Result<Self, QueueError> {
        let store = store.with_stale_after(Duration::from_secs(config.stale_after_secs));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let args = QueueActorArgs {
            config,
            backend,
            store,
            events: events.clone(),
        };
        let (actor, handle) = Actor::spawn(None, QueueActor, args)
            .await
            .map_err(|e| QueueError::Actor(format!("Failed to spawn queue: {}", e)))?;

        Ok(Self {
            actor,
            events,
            handle: Arc::new(std::sync::Mutex::new(Some(handle))),
        })
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append items to the pending queue.
    ///
    /// Rejects the whole batch if any item is invalid. Items already pending
    /// or in flight are skipped.
    pub fn add_items(&self, items: Vec<QueueItem>) -> Result<(), QueueError> {
        for item in &items {
            item.validate().map_err(|source| QueueError::InvalidItem {
                key: item.key(),
                source,
            })?;
        }
        self.cast(QueueMessage::AddItems { items })
    }

    pub fn start(&self) -> Result<(), QueueError> {
        self.cast(QueueMessage::Start)
    }

    pub fn pause(&self) -> Result<(), QueueError> {
        self.cast(QueueMessage::Pause)
    }

    pub fn resume(&self) -> Result<(), QueueError> {
        self.cast(QueueMessage::Resume)
    }

    /// Stop the run. The in-flight item aborts before its next step and is
    /// recorded as failed with the error `Cancelled`.
    pub fn cancel(&self) -> Result<(), QueueError> {
        self.cast(QueueMessage::Cancel)
    }

    /// Drop all items and flags, and remove the stored snapshot.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.cast(QueueMessage::Clear)
    }

    /// Move one failed item back to the end of the pending queue.
    pub async fn retry(&self, key: ItemKey) -> Result<QueueItem, QueueError> {
        self.query(|reply| QueueMessage::Retry { key, reply }).await?
    }

    /// Move every failed item back to the pending queue. Returns how many moved.
    pub async fn retry_failed(&self) -> Result<usize, QueueError> {
        self.query(|reply| QueueMessage::RetryFailed { reply }).await
    }

    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        self.query(|reply| QueueMessage::GetStatus { reply }).await
    }

    /// Stop the actor and wait for it to exit. An in-flight item is abandoned.
    pub async fn shutdown(self) -> Result<(), QueueError> {
        self.actor.stop(Some("shutdown".to_string()));
        let handle = self
            .handle
            .lock()
            .map_err(|_| QueueError::Actor("Queue handle poisoned".to_string()))?
            .take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| QueueError::Actor(format!("Queue task failed: {}", e)))?;
        }
        Ok(())
    }

    fn cast(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.actor
            .send_message(message)
            .map_err(|e| QueueError::Actor(format!("Failed to send message: {}", e)))
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> QueueMessage,
    ) -> Result<T, QueueError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = concurrency::oneshot();
        self.cast(build(tx.into()))?;
        rx.await
            .map_err(|_| QueueError::Actor("Failed to receive response".to_string()))
    }
}
