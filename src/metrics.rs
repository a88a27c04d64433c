//! Metrics instrumentation for the flag engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `flag_engine_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `reason`: evaluation outcome reason
//! - `source`: cache, store
//! - `operation`: create, update, delete, merge

use metrics::{counter, gauge};

/// Record one evaluation and where its definition came from.
pub fn record_evaluation(reason: &'static str, source: &'static str) {
    counter!(
        "flag_engine_evaluations_total",
        "reason" => reason,
        "source" => source
    )
    .increment(1);
}

/// Record a flag mutation.
pub fn record_mutation(operation: &'static str) {
    counter!(
        "flag_engine_mutations_total",
        "operation" => operation
    )
    .increment(1);
}

/// Record entries accepted by a sync merge.
pub fn record_sync_accepted(count: u32) {
    counter!("flag_engine_sync_accepted_total").increment(u64::from(count));
}

/// Record cache evictions.
pub fn record_evictions(count: u64) {
    counter!("flag_engine_cache_evictions_total").increment(count);
}

/// Set current cache entry count.
pub fn set_cache_size(size: usize) {
    gauge!("flag_engine_cache_entries").set(size as f64);
}

/// Set current audit ring size.
pub fn set_audit_records(count: usize) {
    gauge!("flag_engine_audit_records").set(count as f64);
}
