use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{FlagStore, StorageError};
use crate::clock::Clock;
use crate::flag::FlagWithMeta;
use crate::version::VersionVector;

/// In-memory store. The default backend; every operation completes
/// without suspension.
pub struct MemoryStore {
    data: DashMap<String, FlagWithMeta>,
    version: RwLock<VersionVector>,
    clock: Clock,
}

impl MemoryStore {
    #[must_use]
    pub fn new(node_id: &str) -> Self {
        Self::with_clock(node_id, Clock::system())
    }

    #[must_use]
    pub fn with_clock(node_id: &str, clock: Clock) -> Self {
        let version = VersionVector::first(node_id, "init", clock.now_ms());
        Self {
            data: DashMap::new(),
            version: RwLock::new(version),
            clock,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<FlagWithMeta>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, entry: FlagWithMeta) -> Result<(), StorageError> {
        self.data.insert(entry.key().to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
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
        Ok(())
    }

    async fn get_version(&self) -> Result<VersionVector, StorageError> {
        Ok(self.version.read().clone())
    }

    async fn set_version(&self, version: VersionVector) -> Result<(), StorageError> {
        *self.version.write() = version;
        Ok(())
    }

    fn clock(&self) -> Clock {
        self.clock.clone()
    }
}
