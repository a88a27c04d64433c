use async_trait::async_trait;
use thiserror::Error;

use crate::clock::Clock;
use crate::flag::FlagWithMeta;
use crate::version::VersionVector;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("entry not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data corruption in '{path}': {detail}")]
    Corruption { path: String, detail: String },
}

/// Storage contract consumed by the engine.
///
/// Implementations must be atomic per operation. The engine holds entries
/// by value; a store never hands out references into its own map.
///
/// The merge methods are provided: they implement last-writer-wins
/// reconciliation on top of `get`/`set`/`get_version`/`set_version`, so
/// every backend honors the same contract. A remote entry is written iff
/// no local entry exists for its key OR the remote version orders strictly
/// after the local one; any accepted write bumps the store version with
/// the seed `"merge"`. Merging an already-applied batch accepts nothing,
/// which is what makes a cancelled-and-retried sync safe.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<FlagWithMeta>, StorageError>;

    /// Insert or overwrite; the entry's flag key is the storage key.
    async fn set(&self, entry: FlagWithMeta) -> Result<(), StorageError>;

    /// Remove `key`; `true` if it was present.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    async fn has(&self, key: &str) -> Result<bool, StorageError>;

    async fn list(&self) -> Result<Vec<FlagWithMeta>, StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    /// The store-level version vector, bumped on every mutation.
    async fn get_version(&self) -> Result<VersionVector, StorageError>;

    async fn set_version(&self, version: VersionVector) -> Result<(), StorageError>;

    /// Reorganize underlying storage. All accepted data is preserved;
    /// a no-op for memory backends.
    async fn compact(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Durably persist all prior mutations before returning; a no-op for
    /// memory backends.
    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// The clock this store stamps version timestamps with.
    fn clock(&self) -> Clock;

    /// Last-writer-wins merge; returns the keys of accepted entries.
    async fn merge_entries(
        &self,
        remote: Vec<FlagWithMeta>,
    ) -> Result<Vec<String>, StorageError> {
        let mut accepted = Vec::new();
        for entry in remote {
            let key = entry.key().to_string();
            let accept = match self.get(&key).await? {
                Some(local) => entry.meta.version.is_newer(&local.meta.version),
                None => true,
            };
            if accept {
                self.set(entry).await?;
                accepted.push(key);
            }
        }
        if !accepted.is_empty() {
            let now = self.clock().now_ms();
            let version = self.get_version().await?.increment("merge", now);
            self.set_version(version).await?;
        }
        Ok(accepted)
    }

    /// Last-writer-wins merge; returns the count of accepted entries.
    async fn merge(&self, remote: Vec<FlagWithMeta>) -> Result<u32, StorageError> {
        Ok(self.merge_entries(remote).await?.len() as u32)
    }
}
