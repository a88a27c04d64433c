//! JSON-file-backed durable store.
//!
//! Entries live in memory (same DashMap layout as
//! [`MemoryStore`](super::MemoryStore)); the file is a single snapshot
//! document `{"flags": [...], "version": "..."}` in the sync wire shape.
//! Mutations mark the store dirty and stay buffered until [`flush`]
//! persists them with a temp-file-and-rename, so a crash mid-write leaves
//! the previous snapshot intact. `compact` rewrites the snapshot
//! unconditionally, with entries sorted by key.
//!
//! [`flush`]: FlagStore::flush

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::traits::{FlagStore, StorageError};
use crate::clock::Clock;
use crate::flag::FlagWithMeta;
use crate::version::VersionVector;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDoc {
    flags: Vec<FlagWithMeta>,
    version: VersionVector,
}

/// Durable store over a JSON snapshot file.
pub struct FileStore {
    path: PathBuf,
    data: DashMap<String, FlagWithMeta>,
    version: RwLock<VersionVector>,
    dirty: AtomicBool,
    clock: Clock,
}

impl FileStore {
    /// Open `path`, loading an existing snapshot if one is present.
    ///
    /// A missing file starts an empty store; an unparseable file is
    /// surfaced as [`StorageError::Corruption`] rather than silently
    /// discarded.
    pub async fn open(path: impl AsRef<Path>, node_id: &str) -> Result<Self, StorageError> {
        Self::open_with_clock(path, node_id, Clock::system()).await
    }

    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        node_id: &str,
        clock: Clock,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = DashMap::new();
        let mut version = VersionVector::first(node_id, "init", clock.now_ms());

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: SnapshotDoc =
                    serde_json::from_slice(&bytes).map_err(|e| StorageError::Corruption {
                        path: path.display().to_string(),
                        detail: e.to_string(),
                    })?;
                info!(path = %path.display(), entries = doc.flags.len(), "loaded flag snapshot");
                for entry in doc.flags {
                    data.insert(entry.key().to_string(), entry);
                }
                version = doc.version;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot yet, starting empty");
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        Ok(Self {
            path,
            data,
            version: RwLock::new(version),
            dirty: AtomicBool::new(false),
            clock,
        })
    }

    /// Whether there are buffered mutations not yet on disk.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Write the snapshot atomically: temp file in the same directory,
    /// then rename over the target.
    async fn persist(&self) -> Result<(), StorageError> {
        let mut flags: Vec<FlagWithMeta> = self.data.iter().map(|r| r.value().clone()).collect();
        flags.sort_by(|a, b| a.key().cmp(b.key()));
        let doc = SnapshotDoc {
            flags,
            version: self.version.read().clone(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "snapshot rename failed");
            return Err(StorageError::Io(e));
        }
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl FlagStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<FlagWithMeta>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, entry: FlagWithMeta) -> Result<(), StorageError> {
        self.data.insert(entry.key().to_string(), entry);
        self.mark_dirty();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let removed = self.data.remove(key).is_some();
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }

    async fn list(&self) -> Result<Vec<FlagWithMeta>, StorageError> {
        Ok(self.data.iter().map(|r| r.value().clone()).collect())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.data.iter().map(|r| r.key().clone()).collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.data.len())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        self.mark_dirty();
        Ok(())
    }

    async fn get_version(&self) -> Result<VersionVector, StorageError> {
        Ok(self.version.read().clone())
    }

    async fn set_version(&self, version: VersionVector) -> Result<(), StorageError> {
        *self.version.write() = version;
        self.mark_dirty();
        Ok(())
    }

    async fn compact(&self) -> Result<(), StorageError> {
        self.persist().await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        if self.is_dirty() {
            self.persist().await?;
        }
        Ok(())
    }

    fn clock(&self) -> Clock {
        self.clock.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::flag::{Flag, FlagMeta};

    fn test_entry(key: &str, version: u64) -> FlagWithMeta {
        let flag = Flag::boolean(key, true);
        let mut vv = VersionVector::first("n1", key, 10);
        vv.version = version;
        FlagWithMeta::new(flag, FlagMeta::new(vv, 10))
    }

    async fn open_store(dir: &tempfile::TempDir) -> FileStore {
        FileStore::open_with_clock(
            dir.path().join("flags.json"),
            "n1",
            ManualClock::new(1_000).clock(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn starts_empty_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn flush_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store.set(test_entry("a", 1)).await.unwrap();
        store.set(test_entry("b", 2)).await.unwrap();
        let version = store.get_version().await.unwrap().increment("update", 20);
        store.set_version(version.clone()).await.unwrap();
        assert!(store.is_dirty());
        store.flush().await.unwrap();
        assert!(!store.is_dirty());

        let reopened = open_store(&dir).await;
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(reopened.get("b").await.unwrap().unwrap().meta.version.version, 2);
        assert_eq!(reopened.get_version().await.unwrap(), version);
    }

    #[tokio::test]
    async fn unflushed_mutations_are_not_durable() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir).await;
            store.set(test_entry("kept", 1)).await.unwrap();
            store.flush().await.unwrap();
            store.set(test_entry("lost", 1)).await.unwrap();
            // Dropped without flush.
        }
        let reopened = open_store(&dir).await;
        assert!(reopened.get("kept").await.unwrap().is_some());
        assert!(reopened.get("lost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.set(test_entry("a", 1)).await.unwrap();
        store.set(test_entry("b", 1)).await.unwrap();
        store.flush().await.unwrap();

        assert!(store.delete("a").await.unwrap());
        store.flush().await.unwrap();

        let reopened = open_store(&dir).await;
        assert!(reopened.get("a").await.unwrap().is_none());
        assert!(reopened.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn compact_rewrites_even_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.set(test_entry("a", 1)).await.unwrap();
        store.flush().await.unwrap();

        // Clean store: flush is a no-op, compact still rewrites.
        store.compact().await.unwrap();
        let bytes = tokio::fs::read(dir.path().join("flags.json")).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["flags"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupted_snapshot_is_reported_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let result = FileStore::open(&path, "n1").await;
        assert!(matches!(result, Err(StorageError::Corruption { .. })));
    }

    #[tokio::test]
    async fn merge_contract_applies_to_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.set(test_entry("f", 2)).await.unwrap();

        let accepted = store
            .merge(vec![test_entry("f", 3), test_entry("g", 1)])
            .await
            .unwrap();
        assert_eq!(accepted, 2);
        assert!(store.is_dirty());

        store.flush().await.unwrap();
        let reopened = open_store(&dir).await;
        assert_eq!(reopened.get("f").await.unwrap().unwrap().meta.version.version, 3);
        assert!(reopened.get("g").await.unwrap().is_some());
    }
}
