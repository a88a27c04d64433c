// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expiry computation and victim selection for the flag cache.
//!
//! Three policies govern when a cached entry goes stale:
//! - **Absolute**: TTL fixed at insert time
//! - **Sliding**: TTL re-anchored to `now` on every read
//! - **Adaptive**: TTL stretched for flags that have not changed recently -
//!   a flag untouched for N default-TTLs earns `(1 + stability)` times the
//!   default TTL, clamped to `[min_ttl, max_ttl]`, with stability capped
//!   at 10
//!
//! Every policy appends the same stale-while-revalidate window after the
//! expiry instant.

use crate::config::FlagEngineConfig;
use crate::flag::ExpiryPolicy;

/// Stability cap: a flag cannot earn more than 11x the default TTL.
const MAX_STABILITY: f64 = 10.0;

/// TTL knobs extracted from the engine config.
#[derive(Debug, Clone, Copy)]
pub struct TtlConfig {
    pub default_ttl_ms: i64,
    pub min_ttl_ms: i64,
    pub max_ttl_ms: i64,
    pub stale_ttl_ms: i64,
}

impl From<&FlagEngineConfig> for TtlConfig {
    fn from(config: &FlagEngineConfig) -> Self {
        Self {
            default_ttl_ms: config.default_ttl_ms,
            min_ttl_ms: config.min_ttl_ms,
            max_ttl_ms: config.max_ttl_ms,
            stale_ttl_ms: config.stale_ttl_ms,
        }
    }
}

/// The `(expires_at, stale_at)` pair for an entry inserted at `now_ms`.
///
/// `last_changed_ms` feeds the adaptive policy; when unknown, stability
/// defaults to 1 (one default-TTL of trust).
#[must_use]
pub fn compute_expiry(
    policy: ExpiryPolicy,
    ttl: TtlConfig,
    now_ms: i64,
    last_changed_ms: Option<i64>,
) -> (i64, i64) {
    let ttl_ms = match policy {
        ExpiryPolicy::Absolute | ExpiryPolicy::Sliding => ttl.default_ttl_ms,
        ExpiryPolicy::Adaptive => {
            let stability = match last_changed_ms {
                Some(changed) if ttl.default_ttl_ms > 0 => {
                    let age = (now_ms - changed) as f64 / ttl.default_ttl_ms as f64;
                    age.clamp(0.0, MAX_STABILITY)
                }
                _ => 1.0,
            };
            let scaled = ttl.default_ttl_ms as f64 * (1.0 + stability);
            (scaled as i64).clamp(ttl.min_ttl_ms, ttl.max_ttl_ms)
        }
    };
    let expires_at = now_ms + ttl_ms;
    (expires_at, expires_at + ttl.stale_ttl_ms)
}

/// Select up to `count` victims, least-recently-accessed first.
///
/// Approximate LRU: ties on `last_accessed_at` break arbitrarily. The
/// caller passes a scratch vec of `(key, last_accessed_at)` pairs.
#[must_use]
pub fn select_victims(mut entries: Vec<(String, i64)>, count: usize) -> Vec<String> {
    entries.sort_by_key(|(_, last_accessed)| *last_accessed);
    entries.into_iter().take(count).map(|(key, _)| key).collect()
}
