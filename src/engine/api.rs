// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Evaluation, sync, and maintenance API.
//!
//! This module contains the higher-level methods on [`FlagEngine`]:
//! - `evaluate()` and the typed convenience wrappers
//! - `merge_remote()` / `apply_remote()` - sync reconciliation
//! - `snapshot()` / `restore()` - export and import
//! - `purge_cache()` / `purge_audit()` / `stats()` - maintenance

use tracing::{debug, warn};

use crate::cache::{CacheStats, EntryState};
use crate::context::{reason, EvaluationContext, EvaluationResult};
use crate::error::FlagError;
use crate::evaluator;
use crate::flag::FlagWithMeta;
use crate::metrics;
use crate::sync::{RemoteFlagSet, SyncReport};
use crate::version::VersionVector;

use super::FlagEngine;

/// Snapshot of engine-wide counters for dashboards and health checks.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub store_entries: usize,
    pub audit_records: usize,
    pub version: VersionVector,
}

impl FlagEngine {
    // ═══════════════════════════════════════════════════════════════════════
    // Evaluation
    // ═══════════════════════════════════════════════════════════════════════

    /// Resolve a flag against a context. Never fails: a missing flag (or a
    /// failing store) yields a well-formed result with
    /// `reason = "flag_not_found"` and value `Bool(false)`.
    ///
    /// When `ctx` is `None`, an anonymous context stamped with the current
    /// time is used.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn evaluate(&self, key: &str, ctx: Option<EvaluationContext>) -> EvaluationResult {
        let ctx =
            ctx.unwrap_or_else(|| EvaluationContext::anonymous(self.clock.now_ms()));

        let (entry, cached, stale) = match self.cache.get(key) {
            Some((entry, state)) => (entry, true, state == EntryState::Stale),
            None => match self.store.get(key).await {
                Ok(Some(entry)) => {
                    self.write_through(&entry);
                    (entry, false, false)
                }
                Ok(None) => {
                    metrics::record_evaluation(reason::FLAG_NOT_FOUND, "store");
                    return EvaluationResult::not_found(key);
                }
                Err(e) => {
                    warn!(key, error = %e, "store read failed during evaluation");
                    metrics::record_evaluation(reason::FLAG_NOT_FOUND, "store");
                    return EvaluationResult::not_found(key);
                }
            },
        };

        let mut result = evaluator::evaluate(&entry.flag, &ctx);
        result.cached = cached;
        result.stale = stale;

        self.cache.note_evaluation(key);
        let _ = self
            .audit
            .log_evaluated(key, result.value.clone(), self.actor());
        metrics::record_evaluation(result.reason, if cached { "cache" } else { "store" });
        result
    }

    /// Boolean evaluation; `default` covers both a missing flag and a
    /// non-boolean value.
    pub async fn evaluate_bool(
        &self,
        key: &str,
        ctx: Option<EvaluationContext>,
        default: bool,
    ) -> bool {
        let result = self.evaluate(key, ctx).await;
        if result.reason == reason::FLAG_NOT_FOUND {
            return default;
        }
        result.value.as_bool(default)
    }

    /// String evaluation; `default` covers a missing flag, every other
    /// value coerces per [`FlagValue::as_str_lossy`](crate::FlagValue::as_str_lossy).
    pub async fn evaluate_string(
        &self,
        key: &str,
        ctx: Option<EvaluationContext>,
        default: &str,
    ) -> String {
        let result = self.evaluate(key, ctx).await;
        if result.reason == reason::FLAG_NOT_FOUND {
            return default.to_string();
        }
        result.value.as_str_lossy()
    }

    /// Rollout membership for a user id. Missing flag or missing rollout
    /// config both resolve to exclusion.
    pub async fn evaluate_rollout(&self, key: &str, user_id: &str) -> bool {
        let ctx = EvaluationContext::for_user(user_id, self.clock.now_ms());
        self.evaluate(key, Some(ctx)).await.value.as_bool(false)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Reconcile a remote batch: last-writer-wins per entry via the store
    /// merge contract, cache refresh and a `Synced` audit record for each
    /// accepted entry. Returns the accepted count.
    #[tracing::instrument(skip(self, remote), fields(batch = remote.len()))]
    pub async fn merge_remote(&self, remote: Vec<FlagWithMeta>) -> Result<u32, FlagError> {
        let accepted = self.store.merge_entries(remote).await?;
        for key in &accepted {
            match self.store.get(key).await? {
                Some(entry) => {
                    self.write_through(&entry);
                    self.audit
                        .log_synced(key, entry.flag.value.clone(), self.actor());
                }
                // Deleted between merge and refresh; drop the stale copy.
                None => {
                    self.cache.remove(key);
                }
            }
        }
        let count = accepted.len() as u32;
        metrics::record_sync_accepted(count);
        debug!(accepted = count, "remote merge applied");
        Ok(count)
    }

    /// [`merge_remote`](Self::merge_remote) plus store-version
    /// reconciliation against the peer's version vector.
    pub async fn apply_remote(&self, set: RemoteFlagSet) -> Result<SyncReport, FlagError> {
        let total = set.flags.len();
        let accepted = self.merge_remote(set.flags).await?;
        if accepted > 0 {
            let now = self.clock.now_ms();
            let local = self.store.get_version().await?;
            self.store
                .set_version(local.merge(&set.version, now))
                .await?;
        }
        Ok(SyncReport {
            accepted,
            total,
            version: self.store.get_version().await?,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Export / import
    // ═══════════════════════════════════════════════════════════════════════

    /// All entries (sorted by key) plus the store version.
    pub async fn snapshot(&self) -> Result<(Vec<FlagWithMeta>, VersionVector), FlagError> {
        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        Ok((entries, self.store.get_version().await?))
    }

    /// Replace the store contents with a snapshot. The cache is dropped
    /// wholesale; the store version advances past its previous value.
    pub async fn restore(&self, entries: Vec<FlagWithMeta>) -> Result<(), FlagError> {
        self.store.clear().await?;
        for entry in entries {
            self.store.set(entry).await?;
        }
        self.cache.clear();
        self.bump_store_version("restore").await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Maintenance
    // ═══════════════════════════════════════════════════════════════════════

    /// Drop cache entries past their stale window; returns the count.
    pub fn purge_cache(&self) -> u32 {
        let dropped = self.cache.purge_expired();
        metrics::set_cache_size(self.cache.len());
        dropped
    }

    /// Drop audit records past the retention window; returns the count.
    pub fn purge_audit(&self) -> usize {
        let dropped = self.audit.purge();
        metrics::set_audit_records(self.audit.len());
        dropped
    }

    pub async fn stats(&self) -> Result<EngineStats, FlagError> {
        Ok(EngineStats {
            cache: self.cache.stats(),
            store_entries: self.store.count().await?,
            audit_records: self.audit.len(),
            version: self.store.get_version().await?,
        })
    }
}
