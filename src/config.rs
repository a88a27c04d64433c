//! Configuration for the flag engine.
//!
//! # Example
//!
//! ```
//! use flag_engine::FlagEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = FlagEngineConfig::default();
//! assert_eq!(config.cache_max_size, 1000);
//! assert_eq!(config.default_ttl_ms, 300_000); // 5 minutes
//!
//! // Full config
//! let config = FlagEngineConfig {
//!     node_id: "edge-eu-1".into(),
//!     environment: "production".into(),
//!     evaluation_logging: true,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the flag engine.
///
/// All fields have sensible defaults. For multi-node deployments you should
/// set a distinct `node_id` per node - it participates in version-vector
/// ordering and must not contain a colon.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagEngineConfig {
    /// Node identifier for version vectors and audit context.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Environment tag stamped on flags and audit records.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Max number of cached flags before eviction (default: 1000)
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    /// Cache TTL settings (milliseconds)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: i64,
    #[serde(default = "default_min_ttl_ms")]
    pub min_ttl_ms: i64,
    #[serde(default = "default_max_ttl_ms")]
    pub max_ttl_ms: i64,

    /// Stale-while-revalidate window after expiry (milliseconds)
    #[serde(default = "default_stale_ttl_ms")]
    pub stale_ttl_ms: i64,

    /// Audit log capacity (default: 100k records)
    #[serde(default = "default_audit_max_records")]
    pub audit_max_records: usize,

    /// Audit retention in days (default: 90)
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: u32,

    /// Whether evaluations are audited (default: off - high volume)
    #[serde(default)]
    pub evaluation_logging: bool,
}

fn default_node_id() -> String { "local".into() }
fn default_environment() -> String { "development".into() }
fn default_cache_max_size() -> usize { 1000 }
fn default_ttl_ms() -> i64 { 300_000 } // 5 minutes
fn default_min_ttl_ms() -> i64 { 1_000 }
fn default_max_ttl_ms() -> i64 { 86_400_000 } // 24 hours
fn default_stale_ttl_ms() -> i64 { 60_000 }
fn default_audit_max_records() -> usize { 100_000 }
fn default_audit_retention_days() -> u32 { 90 }

impl Default for FlagEngineConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            environment: default_environment(),
            cache_max_size: default_cache_max_size(),
            default_ttl_ms: default_ttl_ms(),
            min_ttl_ms: default_min_ttl_ms(),
            max_ttl_ms: default_max_ttl_ms(),
            stale_ttl_ms: default_stale_ttl_ms(),
            audit_max_records: default_audit_max_records(),
            audit_retention_days: default_audit_retention_days(),
            evaluation_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FlagEngineConfig::default();
        assert_eq!(config.cache_max_size, 1000);
        assert_eq!(config.default_ttl_ms, 300_000);
        assert_eq!(config.min_ttl_ms, 1_000);
        assert_eq!(config.max_ttl_ms, 86_400_000);
        assert_eq!(config.stale_ttl_ms, 60_000);
        assert_eq!(config.audit_max_records, 100_000);
        assert_eq!(config.audit_retention_days, 90);
        assert!(!config.evaluation_logging);
    }

    #[test]
    fn deserializes_from_partial_json() {
        let config: FlagEngineConfig =
            serde_json::from_str(r#"{"node_id":"n1","evaluation_logging":true}"#).unwrap();
        assert_eq!(config.node_id, "n1");
        assert!(config.evaluation_logging);
        assert_eq!(config.cache_max_size, 1000);
    }
}
