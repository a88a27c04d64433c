//! Bounded TTL cache with stale-while-revalidate.
//!
//! The cache maps flag keys to [`CacheEntry`] copies of store entries, so
//! cache and store lifetimes stay independent. Each entry moves through
//! three states as the clock advances:
//!
//! ```text
//! put ──► Fresh ──(expires_at)──► Stale ──(stale_at)──► Expired (miss)
//! ```
//!
//! A stale entry is still returned - callers get an answer immediately and
//! refresh from the store in the background. Capacity is bounded: inserting
//! into a full cache evicts the least-recently-accessed tenth (approximate
//! LRU, exactness not required). One mutex guards entries and stats
//! together; no I/O happens under it.

pub mod policy;

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::config::FlagEngineConfig;
use crate::flag::{ExpiryPolicy, FlagWithMeta};
use crate::metrics;
use policy::{compute_expiry, select_victims, TtlConfig};

/// Lifecycle state of a cached entry at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

/// One cached value with its expiry and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub cached_at: i64,
    pub expires_at: i64,
    pub stale_at: i64,
    pub access_count: u64,
    pub last_accessed_at: i64,
    pub policy: ExpiryPolicy,
}

impl<T> CacheEntry<T> {
    fn new(value: T, policy: ExpiryPolicy, now_ms: i64, expires_at: i64, stale_at: i64) -> Self {
        Self {
            value,
            cached_at: now_ms,
            expires_at,
            stale_at,
            access_count: 0,
            last_accessed_at: now_ms,
            policy,
        }
    }

    /// State at `now_ms`: fresh before `expires_at`, stale before
    /// `stale_at`, expired after.
    #[must_use]
    pub fn state(&self, now_ms: i64) -> EntryState {
        if now_ms < self.expires_at {
            EntryState::Fresh
        } else if now_ms < self.stale_at {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    fn record_access(&mut self, now_ms: i64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now_ms;
    }
}

/// Counter snapshot returned by [`FlagCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    /// Fresh-hit ratio over all lookups; 0 when nothing was looked up.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry<FlagWithMeta>>,
    hits: u64,
    misses: u64,
    stale_hits: u64,
    evictions: u64,
}

/// The flag cache. `Send + Sync`; all operations take `&self`.
pub struct FlagCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: TtlConfig,
    clock: Clock,
}

impl FlagCache {
    #[must_use]
    pub fn new(config: &FlagEngineConfig, clock: Clock) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                stale_hits: 0,
                evictions: 0,
            }),
            max_size: config.cache_max_size,
            ttl: TtlConfig::from(config),
            clock,
        }
    }

    /// Insert or overwrite `key`, evicting first when at capacity.
    ///
    /// `last_changed_ms` (typically the flag's `updated_at`) feeds the
    /// adaptive policy; it is ignored by the other policies.
    pub fn put(
        &self,
        key: impl Into<String>,
        value: FlagWithMeta,
        policy: ExpiryPolicy,
        last_changed_ms: Option<i64>,
    ) {
        let key = key.into();
        let now = self.clock.now_ms();
        let (expires_at, stale_at) = compute_expiry(policy, self.ttl, now, last_changed_ms);

        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            self.evict_locked(&mut inner);
        }
        inner
            .entries
            .insert(key, CacheEntry::new(value, policy, now, expires_at, stale_at));
    }

    /// Look up `key`, accepting stale entries.
    ///
    /// Returns the value and whether it was fresh or stale; `None` on miss
    /// or expiry. Every hit bumps `access_count` and `last_accessed_at`;
    /// sliding entries are re-anchored to now.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<(FlagWithMeta, EntryState)> {
        self.lookup(key, true)
    }

    /// Look up `key`, treating stale entries as misses.
    #[must_use]
    pub fn get_fresh(&self, key: &str) -> Option<FlagWithMeta> {
        self.lookup(key, false).map(|(value, _)| value)
    }

    /// Look up `key`, reporting staleness as a flag.
    #[must_use]
    pub fn get_with_stale(&self, key: &str) -> Option<(FlagWithMeta, bool)> {
        self.get(key)
            .map(|(value, state)| (value, state == EntryState::Stale))
    }

    fn lookup(&self, key: &str, allow_stale: bool) -> Option<(FlagWithMeta, EntryState)> {
        let now = self.clock.now_ms();
        let ttl = self.ttl;
        let mut inner = self.inner.lock();

        enum Outcome {
            Miss,
            Drop,
            Hit(FlagWithMeta, EntryState),
        }

        let outcome = match inner.entries.get_mut(key) {
            None => Outcome::Miss,
            Some(entry) => match entry.state(now) {
                EntryState::Expired => Outcome::Drop,
                EntryState::Stale if !allow_stale => Outcome::Miss,
                EntryState::Stale => {
                    entry.record_access(now);
                    Outcome::Hit(entry.value.clone(), EntryState::Stale)
                }
                EntryState::Fresh => {
                    entry.record_access(now);
                    if entry.policy == ExpiryPolicy::Sliding {
                        let (expires_at, stale_at) =
                            compute_expiry(ExpiryPolicy::Sliding, ttl, now, None);
                        entry.expires_at = expires_at;
                        entry.stale_at = stale_at;
                    }
                    Outcome::Hit(entry.value.clone(), EntryState::Fresh)
                }
            },
        };

        match outcome {
            Outcome::Miss => {
                inner.misses += 1;
                None
            }
            Outcome::Drop => {
                inner.entries.remove(key);
                inner.misses += 1;
                None
            }
            Outcome::Hit(value, EntryState::Stale) => {
                inner.stale_hits += 1;
                Some((value, EntryState::Stale))
            }
            Outcome::Hit(value, state) => {
                inner.hits += 1;
                Some((value, state))
            }
        }
    }

    /// Record an evaluation on the cached copy's meta, if present.
    pub fn note_evaluation(&self, key: &str) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value.meta.note_evaluation(now);
        }
    }

    /// Remove `key`; `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Drop every entry past its stale window; returns the count dropped.
    pub fn purge_expired(&self) -> u32 {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.stale_at);
        (before - inner.entries.len()) as u32
    }

    /// Drop everything; stats are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            stale_hits: inner.stale_hits,
            evictions: inner.evictions,
            size: inner.entries.len(),
        }
    }

    /// Evict the least-recently-accessed tenth of the cache.
    fn evict_locked(&self, inner: &mut Inner) {
        let count = (self.max_size / 10).max(1);
        let candidates: Vec<(String, i64)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_accessed_at))
            .collect();
        let victims = select_victims(candidates, count);
        debug!(evicted = victims.len(), "cache eviction");
        for key in &victims {
            inner.entries.remove(key);
        }
        inner.evictions += victims.len() as u64;
        metrics::record_evictions(victims.len() as u64);
    }
}
