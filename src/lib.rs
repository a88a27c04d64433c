//! # Flag Engine
//!
//! A feature-flag evaluation runtime: deterministic typed flag resolution
//! with a bounded stale-while-revalidate cache, version-vector replication,
//! and a tamper-evident audit log. Usable embedded in a client application
//! or as the core of a flag service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FlagEngine (façade)                   │
//! │  • create/update/enable/disable/delete                      │
//! │  • evaluate + typed wrappers                                │
//! │  • merge_remote / snapshot / restore                        │
//! └─────────────────────────────────────────────────────────────┘
//!        │                  │                      │
//!        ▼                  ▼                      ▼
//! ┌──────────────┐  ┌────────────────┐  ┌───────────────────────┐
//! │  FlagCache   │  │   FlagStore    │  │       AuditLog        │
//! │  • TTL +     │  │  • Memory /    │  │  • checksummed ring   │
//! │    stale     │  │    JSON file   │  │  • retention + query  │
//! │    window    │  │  • version     │  │                       │
//! │  • approx-   │  │    vector      │  └───────────────────────┘
//! │    LRU bound │  │  • LWW merge   │
//! └──────────────┘  └────────────────┘
//!        ▲                  ▲
//!        └── pure Evaluator reads a definition from either side
//! ```
//!
//! Evaluation flow: cache lookup (fresh/stale/miss) → store fallback →
//! pure [`evaluator`] → optional audit record. Mutation flow: store write →
//! cache write-through → version bump → audit record. Sync flow: per-key
//! version comparison → store write + cache refresh + audit record for
//! accepted entries only.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flag_engine::{EvaluationContext, Flag, FlagEngine, FlagEngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flag_engine::FlagError> {
//!     let engine = FlagEngine::new(FlagEngineConfig::default());
//!
//!     engine.create_flag(Flag::boolean("dark_mode", true)).await?;
//!     engine
//!         .create_flag(Flag::rollout("beta_checkout", 25.0))
//!         .await?;
//!
//!     // Deterministic: the same user always lands in the same bucket.
//!     let on = engine.evaluate_rollout("beta_checkout", "user-42").await;
//!     println!("beta_checkout for user-42: {on}");
//!
//!     let ctx = EvaluationContext::for_user("user-42", 0);
//!     let result = engine.evaluate("dark_mode", Some(ctx)).await;
//!     println!("{} -> {:?} ({})", result.flag_key, result.value, result.reason);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Evaluation never fails**: illegal inputs resolve to the default
//!   value with an explanatory reason; a missing flag yields
//!   `"flag_not_found"` and `Bool(false)`
//! - **Deterministic bucketing**: rollout buckets come from a fixed djb2
//!   hash over `(seed, key, user_id)`; the vector corpus is pinned in the
//!   test suite
//! - **Monotone versions**: every mutation strictly advances the store's
//!   version vector; comparison is a total order
//! - **Bounded memory**: cache and audit ring are capacity-bounded with
//!   approximate-LRU eviction and oldest-10% drop respectively
//!
//! ## Modules
//!
//! - [`engine`]: The [`FlagEngine`] façade composing all components
//! - [`evaluator`]: Pure flag resolution (rules, rollouts)
//! - [`cache`]: Bounded TTL cache with stale-while-revalidate
//! - [`storage`]: Store trait + memory and JSON-file backends
//! - [`audit`]: Append-only checksummed audit log
//! - [`version`]: Version vectors for replication
//! - [`sync`]: Wire types for the merge/sync protocol

pub mod audit;
pub mod cache;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod flag;
pub mod metrics;
pub mod storage;
pub mod sync;
pub mod version;

pub use audit::{Actor, AuditEvent, AuditLog, AuditQuery, AuditRecord};
pub use cache::{CacheEntry, CacheStats, EntryState, FlagCache};
pub use clock::{Clock, ManualClock};
pub use config::FlagEngineConfig;
pub use context::{reason, EvaluationContext, EvaluationResult};
pub use engine::{EngineStats, FlagEngine};
pub use error::FlagError;
pub use flag::{
    ExpiryPolicy, Flag, FlagKind, FlagMeta, FlagState, FlagValue, FlagWithMeta, RuleOperator,
    TargetingRule,
};
pub use storage::{FileStore, FlagStore, MemoryStore, StorageError};
pub use sync::{RemoteFlagSet, SyncReport};
pub use version::VersionVector;
