//! Snapshot persistence for the analytics aggregate
//!
//! A snapshot is the whole aggregate as one pretty-printed JSON document. Each
//! save replaces the previous snapshot; there is no log to replay.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::models::AggregateState;
use crate::error::Result;

/// Durable home of the aggregate snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot. `Ok(None)` means no snapshot has been written yet.
    async fn load(&self) -> Result<Option<AggregateState>>;

    /// Replace the stored snapshot with `state`.
    async fn save(&self, state: &AggregateState) -> Result<()>;
}

/// Snapshot kept in a single JSON file.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<AggregateState>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_str(&contents)?;
        debug!("Loaded analytics snapshot from {}", self.path.display());
        Ok(Some(state))
    }

    async fn save(&self, state: &AggregateState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(
            "Saved analytics snapshot ({} events) to {}",
            state.total_requests,
            self.path.display()
        );
        Ok(())
    }
}

/// Snapshot kept in memory, for tests and runs that must not touch disk.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<AggregateState>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(state: AggregateState) -> Self {
        Self {
            snapshot: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Option<AggregateState> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<AggregateState>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, state: &AggregateState) -> Result<()> {
        *self.snapshot.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
