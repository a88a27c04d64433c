// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flag engine façade.
//!
//! The [`FlagEngine`] composes the store, the cache, and the audit log
//! behind one API:
//! - mutations (`create_flag`, `update_flag`, `enable_flag`,
//!   `disable_flag`, `delete_flag`) write through to the store, refresh
//!   the cache, bump the store version vector, and append an audit record
//! - reads (`get_flag`, `evaluate`) go cache-first with store fallback
//! - sync (`merge_remote`, `apply_remote`) reconciles remote batches via
//!   the store's last-writer-wins contract
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync`. Each component guards its own state (store
//! map, cache map, audit ring); no lock is ever held across store I/O.
//!
//! # Example
//!
//! ```rust,no_run
//! use flag_engine::{Flag, FlagEngine, FlagEngineConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), flag_engine::FlagError> {
//! let engine = FlagEngine::new(FlagEngineConfig::default());
//! engine.create_flag(Flag::boolean("dark_mode", true)).await?;
//!
//! let result = engine.evaluate("dark_mode", None).await;
//! assert!(result.value.as_bool(false));
//! # Ok(())
//! # }
//! ```

mod api;

pub use api::EngineStats;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{Actor, AuditLog};
use crate::cache::FlagCache;
use crate::clock::Clock;
use crate::config::FlagEngineConfig;
use crate::error::FlagError;
use crate::flag::{Flag, FlagMeta, FlagState, FlagValue, FlagWithMeta};
use crate::metrics;
use crate::storage::{FlagStore, MemoryStore};
use crate::version::VersionVector;

/// The client façade over store + cache + audit.
pub struct FlagEngine {
    pub(super) config: FlagEngineConfig,
    pub(super) store: Arc<dyn FlagStore>,
    pub(super) cache: FlagCache,
    pub(super) audit: AuditLog,
    pub(super) clock: Clock,
}

impl FlagEngine {
    /// Engine over an in-memory store.
    #[must_use]
    pub fn new(config: FlagEngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new(&config.node_id));
        Self::with_store(config, store)
    }

    /// Engine over a caller-supplied store. The store's clock drives the
    /// cache and the audit log too, so injecting a test clock in the store
    /// controls all time in the engine.
    #[must_use]
    pub fn with_store(config: FlagEngineConfig, store: Arc<dyn FlagStore>) -> Self {
        let clock = store.clock();
        Self {
            cache: FlagCache::new(&config, clock.clone()),
            audit: AuditLog::new(&config, clock.clone()),
            config,
            store,
            clock,
        }
    }

    /// The audit log, for queries and export.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // --- Mutations ---

    /// Create a flag. Fails on an invalid definition or an existing key;
    /// the first audit record for the key is issued here.
    #[tracing::instrument(skip(self, flag), fields(key = %flag.key))]
    pub async fn create_flag(&self, mut flag: Flag) -> Result<FlagWithMeta, FlagError> {
        flag.validate()?;
        if flag.environment.is_empty() {
            flag.environment = self.config.environment.clone();
        }
        if self.store.has(&flag.key).await? {
            return Err(FlagError::Conflict {
                key: flag.key,
                detail: "flag already exists".into(),
            });
        }

        let now = self.clock.now_ms();
        let seed = mutation_seed(&flag.key, &flag.value);
        let meta = FlagMeta::new(VersionVector::first(&self.config.node_id, &seed, now), now);
        let entry = FlagWithMeta::new(flag, meta);

        self.store.set(entry.clone()).await?;
        self.write_through(&entry);
        self.bump_store_version(&seed).await?;
        self.audit
            .log_created(entry.key(), entry.flag.value.clone(), self.actor());
        metrics::record_mutation("create");
        info!(key = entry.key(), "flag created");
        Ok(entry)
    }

    /// Replace a flag's value. Returns `None` for an unknown key; the new
    /// value must keep the flag definition valid (matching type tag,
    /// variant membership).
    #[tracing::instrument(skip(self, value))]
    pub async fn update_flag(
        &self,
        key: &str,
        value: FlagValue,
    ) -> Result<Option<FlagWithMeta>, FlagError> {
        let Some(mut entry) = self.store.get(key).await? else {
            return Ok(None);
        };

        if value.kind_tag() != entry.flag.default_value.kind_tag() {
            return Err(FlagError::InvalidType {
                key: key.to_string(),
                detail: format!(
                    "update tag '{}' does not match flag tag '{}'",
                    value.kind_tag(),
                    entry.flag.default_value.kind_tag()
                ),
            });
        }

        let previous = entry.flag.value.clone();
        entry.flag.value = value.clone();
        entry.flag.validate()?;

        let now = self.clock.now_ms();
        let seed = mutation_seed(key, &value);
        let next = entry.meta.version.increment(&seed, now);
        entry.meta.touch(next, now);

        self.store.set(entry.clone()).await?;
        self.write_through(&entry);
        self.bump_store_version(&seed).await?;
        self.audit
            .log_updated(key, Some(previous), value, self.actor());
        metrics::record_mutation("update");
        Ok(Some(entry))
    }

    /// Enable a flag; `false` for an unknown key.
    pub async fn enable_flag(&self, key: &str) -> Result<bool, FlagError> {
        self.set_state(key, FlagState::Enabled).await
    }

    /// Disable a flag; `false` for an unknown key.
    pub async fn disable_flag(&self, key: &str) -> Result<bool, FlagError> {
        self.set_state(key, FlagState::Disabled).await
    }

    async fn set_state(&self, key: &str, state: FlagState) -> Result<bool, FlagError> {
        let Some(mut entry) = self.store.get(key).await? else {
            return Ok(false);
        };
        if entry.flag.state == state {
            return Ok(true);
        }

        let now = self.clock.now_ms();
        let seed = format!("{key}:{state:?}");
        entry.flag.state = state;
        let next = entry.meta.version.increment(&seed, now);
        entry.meta.touch(next, now);

        self.store.set(entry.clone()).await?;
        self.write_through(&entry);
        self.bump_store_version(&seed).await?;
        self.audit
            .log_updated(key, None, entry.flag.value.clone(), self.actor());
        metrics::record_mutation("update");
        debug!(key, ?state, "flag state changed");
        Ok(true)
    }

    /// Delete a flag; `false` for an unknown key.
    #[tracing::instrument(skip(self))]
    pub async fn delete_flag(&self, key: &str) -> Result<bool, FlagError> {
        let previous = self.store.get(key).await?.map(|e| e.flag.value);
        if !self.store.delete(key).await? {
            return Ok(false);
        }
        self.cache.remove(key);
        self.bump_store_version(&format!("{key}:delete")).await?;
        self.audit.log_deleted(key, previous, self.actor());
        metrics::record_mutation("delete");
        info!(key, "flag deleted");
        Ok(true)
    }

    // --- Reads ---

    /// Fetch a flag definition: cache first (fresh or stale), store
    /// fallback, populating the cache on a store hit. Persistent store
    /// failures surface as `None` for reads.
    pub async fn get_flag(&self, key: &str) -> Result<Option<FlagWithMeta>, FlagError> {
        if let Some((entry, _)) = self.cache.get(key) {
            return Ok(Some(entry));
        }
        match self.store.get(key).await {
            Ok(Some(entry)) => {
                self.write_through(&entry);
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(key, error = %e, "store read failed");
                Ok(None)
            }
        }
    }

    // --- Internal plumbing ---

    pub(super) fn actor(&self) -> Actor {
        Actor::system(self.config.node_id.as_str())
    }

    /// Copy an entry into the cache under its flag's expiry policy.
    pub(super) fn write_through(&self, entry: &FlagWithMeta) {
        self.cache.put(
            entry.key(),
            entry.clone(),
            entry.meta.expiry_policy,
            Some(entry.meta.updated_at),
        );
        metrics::set_cache_size(self.cache.len());
    }

    /// Every mutation strictly advances the store-level version.
    pub(super) async fn bump_store_version(&self, seed: &str) -> Result<(), FlagError> {
        let now = self.clock.now_ms();
        let version = self.store.get_version().await?.increment(seed, now);
        self.store.set_version(version).await?;
        Ok(())
    }
}

/// Seed for version-vector checksums: the mutated key and its new value.
fn mutation_seed(key: &str, value: &FlagValue) -> String {
    format!("{key}:{}", value.as_str_lossy())
}
