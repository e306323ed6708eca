//! Persistence of the queue snapshot in a single storage slot.
//!
//! Every operation here is infallible from the caller's point of view: the
//! orchestrator's in-memory state stays authoritative, so storage problems are
//! logged and swallowed.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use translation_core::{QueueItem, QueueSnapshot};

use crate::{Storage, StorageError};

/// Fixed key the snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "translation_queue";

/// Reads and writes the queue snapshot, applying the staleness policy on load.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    storage: Storage,
    key: String,
    stale_after: chrono::Duration,
}

impl SnapshotStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            key: SNAPSHOT_KEY.to_string(),
            stale_after: chrono::Duration::hours(1),
        }
    }

    /// Snapshots older than `stale_after` are discarded on load.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = chrono::Duration::from_std(stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        self
    }

    /// Write the snapshot, stamped with the current time.
    pub async fn save(&self, snapshot: &QueueSnapshot) {
        if let Err(e) = self.save_at(snapshot, Utc::now()).await {
            tracing::warn!("Failed to save queue snapshot: {}", e);
        }
    }

    /// Read the snapshot. Missing, unreadable and stale snapshots all yield `None`.
    pub async fn load(&self) -> Option<QueueSnapshot> {
        match self.load_at(Utc::now()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Ignoring unreadable queue snapshot: {}", e);
                None
            }
        }
    }

    /// Delete the stored snapshot.
    pub async fn clear(&self) {
        match self.storage.remove(&self.key).await {
            Ok(()) => tracing::debug!("Cleared queue snapshot {}", self.key),
            Err(e) => tracing::warn!("Failed to clear queue snapshot: {}", e),
        }
    }

    pub(crate) async fn save_at(
        &self,
        snapshot: &QueueSnapshot,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut stamped = snapshot.clone();
        stamped.saved_at = saved_at;
        let bytes = serde_json::to_vec(&stamped)?;
        self.storage.write(&self.key, Bytes::from(bytes)).await?;
        tracing::debug!(
            "Saved queue snapshot ({} pending, {} completed, {} failed)",
            stamped.queue.len(),
            stamped.completed.len(),
            stamped.failed.len()
        );
        Ok(())
    }

    async fn load_at(&self, now: DateTime<Utc>) -> Result<Option<QueueSnapshot>, StorageError> {
        let Some(bytes) = self.storage.read(&self.key).await? else {
            return Ok(None);
        };
        let mut snapshot: QueueSnapshot = serde_json::from_slice(&bytes)?;

        if now.signed_duration_since(snapshot.saved_at) > self.stale_after {
            tracing::info!(
                "Discarding stale queue snapshot saved at {}",
                snapshot.saved_at
            );
            self.clear().await;
            return Ok(None);
        }

        if !snapshot.is_consistent() {
            tracing::warn!("Ignoring queue snapshot that lists an item more than once");
            return Ok(None);
        }
        let dropped = drop_invalid(&mut snapshot.queue)
            + drop_invalid(&mut snapshot.completed)
            + drop_invalid(&mut snapshot.failed);
        if dropped > 0 {
            tracing::warn!("Dropped {} invalid items from queue snapshot", dropped);
        }

        tracing::debug!("Loaded queue snapshot saved at {}", snapshot.saved_at);
        Ok(Some(snapshot))
    }
}

fn drop_invalid(items: &mut Vec<QueueItem>) -> usize {
    let before = items.len();
    items.retain(|item| match item.validate() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Dropping {} from snapshot: {}", item.key(), e);
            false
        }
    });
    before - items.len()
}
