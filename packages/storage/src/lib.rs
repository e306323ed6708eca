//! Slot storage for the translation queue.
//!
//! The queue keeps a single serialized snapshot between sessions. A slot is a
//! named blob in an `object_store` backend: the local filesystem for operator
//! sessions, or memory for tests. Writes replace the whole slot.

mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};

pub use snapshot::{SNAPSHOT_KEY, SnapshotStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where slots live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// One file per slot under `root`, optionally inside a `namespace` directory.
    Filesystem {
        root: PathBuf,
        namespace: Option<String>,
    },
    /// Process-local; lost on exit.
    Memory,
}

const DEFAULT_FS_ROOT: &str = "./data/translation_queue";

impl StorageConfig {
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        StorageConfig::Filesystem {
            root: root.into(),
            namespace: None,
        }
    }

    /// Keep slots of several sites apart under one root.
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        match self {
            StorageConfig::Filesystem { root, .. } => StorageConfig::Filesystem {
                root,
                namespace: trimmed(namespace.into()),
            },
            StorageConfig::Memory => StorageConfig::Memory,
        }
    }

    /// Read `STORAGE_BACKEND` (`filesystem` or `memory`, default filesystem),
    /// `STORAGE_FS_ROOT` (default `./data/translation_queue`) and the optional
    /// `STORAGE_PREFIX` namespace.
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = env_var("STORAGE_BACKEND");
        match backend.as_deref() {
            None | Some("filesystem") | Some("fs") => {
                let root = env_var("STORAGE_FS_ROOT").unwrap_or_else(|| DEFAULT_FS_ROOT.into());
                let config = Self::filesystem(root);
                Ok(match env_var("STORAGE_PREFIX") {
                    Some(namespace) => config.with_namespace(namespace),
                    None => config,
                })
            }
            Some("memory") | Some("mem") => Ok(StorageConfig::Memory),
            Some(other) => Err(StorageError::InvalidConfig(format!(
                "unsupported STORAGE_BACKEND={other} (expected filesystem|memory)"
            ))),
        }
    }
}

/// Handle to a slot backend. Clones share the same underlying store.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    namespace: Option<String>,
    label: &'static str,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.label)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Storage {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        match config {
            StorageConfig::Filesystem { root, namespace } => {
                std::fs::create_dir_all(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                tracing::debug!("Opened slot storage at {}", root.display());
                Ok(Self {
                    store: Arc::new(fs),
                    namespace,
                    label: "filesystem",
                })
            }
            StorageConfig::Memory => Ok(Self::memory()),
        }
    }

    pub fn memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            namespace: None,
            label: "memory",
        }
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?)
    }

    /// `filesystem` or `memory`.
    pub fn kind_str(&self) -> &'static str {
        self.label
    }

    fn slot_path(&self, slot: &str) -> Result<Path, StorageError> {
        let slot = slot.trim_matches('/');
        if slot.is_empty() {
            return Err(StorageError::InvalidConfig(
                "slot name must not be empty".to_string(),
            ));
        }
        Ok(match &self.namespace {
            Some(namespace) => Path::from(format!("{namespace}/{slot}")),
            None => Path::from(slot),
        })
    }

    /// Replace the contents of `slot`.
    pub async fn write(&self, slot: &str, contents: Bytes) -> Result<(), StorageError> {
        let path = self.slot_path(slot)?;
        self.store.put(&path, PutPayload::from(contents)).await?;
        Ok(())
    }

    /// Contents of `slot`, or `None` if it was never written or was removed.
    pub async fn read(&self, slot: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.slot_path(slot)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `slot`. Removing an empty slot succeeds.
    pub async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        let path = self.slot_path(slot)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn trimmed(value: String) -> Option<String> {
    let value = value.trim().trim_matches('/');
    (!value.is_empty()).then(|| value.to_string())
}
