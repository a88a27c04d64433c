//! Integration tests for the flag engine.
//!
//! End-to-end flows through the `FlagEngine` façade: evaluation, mutation,
//! caching behavior, sync reconciliation, audit trail, export/import. Time
//! is driven by a `ManualClock` injected through the store - no sleeps.

use std::sync::Arc;

use flag_engine::{
    reason, Actor, AuditEvent, AuditQuery, EvaluationContext, Flag, FlagEngine, FlagEngineConfig,
    FileStore, FlagKind, FlagMeta, FlagState, FlagStore, FlagValue, FlagWithMeta, ManualClock,
    MemoryStore, RemoteFlagSet, RuleOperator, TargetingRule, VersionVector,
};

fn engine_at(start_ms: i64) -> (FlagEngine, ManualClock, Arc<MemoryStore>) {
    engine_with_config(start_ms, FlagEngineConfig::default())
}

fn engine_with_config(
    start_ms: i64,
    config: FlagEngineConfig,
) -> (FlagEngine, ManualClock, Arc<MemoryStore>) {
    let clock = ManualClock::new(start_ms);
    let store = Arc::new(MemoryStore::with_clock(&config.node_id, clock.clock()));
    let engine = FlagEngine::with_store(config, Arc::clone(&store) as Arc<dyn FlagStore>);
    (engine, clock, store)
}

fn remote_entry(key: &str, value: FlagValue, version: u64, timestamp: i64) -> FlagWithMeta {
    let mut flag = Flag::boolean(key, true);
    flag.value = value.clone();
    flag.default_value = FlagValue::Bool(false);
    let mut vv = VersionVector::first("node-b", key, timestamp);
    vv.version = version;
    FlagWithMeta::new(flag, FlagMeta::new(vv, timestamp))
}

// =============================================================================
// Evaluation scenarios
// =============================================================================

#[tokio::test]
async fn boolean_flag_evaluates_to_its_value() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("dark_mode", true)).await.unwrap();

    let result = engine.evaluate("dark_mode", None).await;
    assert_eq!(result.value, FlagValue::Bool(true));
    assert_eq!(result.reason, reason::FALLTHROUGH);
}

#[tokio::test]
async fn disabled_flag_returns_default() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("dark_mode", true)).await.unwrap();
    assert!(engine.disable_flag("dark_mode").await.unwrap());

    let result = engine.evaluate("dark_mode", None).await;
    assert_eq!(result.value, FlagValue::Bool(false));
    assert_eq!(result.reason, reason::FLAG_DISABLED);

    assert!(engine.enable_flag("dark_mode").await.unwrap());
    let result = engine.evaluate("dark_mode", None).await;
    assert_eq!(result.reason, reason::FALLTHROUGH);
}

#[tokio::test]
async fn rollout_is_deterministic_across_repeated_calls() {
    let (engine, _clock, _store) = engine_at(0);
    engine
        .create_flag(Flag::rollout("beta", 50.0).with_hash_seed("beta"))
        .await
        .unwrap();

    let first = engine
        .evaluate("beta", Some(EvaluationContext::for_user("alice", 0)))
        .await;
    for _ in 0..1_000 {
        let again = engine
            .evaluate("beta", Some(EvaluationContext::for_user("alice", 0)))
            .await;
        assert_eq!(again.value, first.value);
        assert_eq!(again.reason, first.reason);
    }
    // bucket("beta","beta","alice") = 47 < 50: included.
    assert_eq!(first.reason, reason::ROLLOUT_INCLUDED);
    assert!(engine.evaluate_rollout("beta", "alice").await);
}

#[tokio::test]
async fn segment_flag_matches_rules_in_order() {
    let (engine, _clock, _store) = engine_at(0);
    let flag = Flag::segment(
        "checkout_flow",
        vec![TargetingRule::new("country", RuleOperator::Eq, "NL")],
        FlagValue::String("beta".into()),
        FlagValue::String("stable".into()),
    );
    engine.create_flag(flag).await.unwrap();

    let nl = EvaluationContext::anonymous(0).with_attribute("country", "NL");
    let result = engine.evaluate("checkout_flow", Some(nl)).await;
    assert_eq!(result.value, FlagValue::String("beta".into()));
    assert_eq!(result.reason, reason::RULE_MATCH);
    assert_eq!(result.rule_index, Some(0));

    let us = EvaluationContext::anonymous(0).with_attribute("country", "US");
    let result = engine.evaluate("checkout_flow", Some(us)).await;
    assert_eq!(result.value, FlagValue::String("stable".into()));
    assert_eq!(result.reason, reason::NO_RULE_MATCH);
}

#[tokio::test]
async fn missing_flag_never_throws() {
    let (engine, _clock, _store) = engine_at(0);

    let result = engine.evaluate("ghost", None).await;
    assert_eq!(result.reason, reason::FLAG_NOT_FOUND);
    assert_eq!(result.value, FlagValue::Bool(false));

    // Typed wrappers surface the caller's default instead.
    assert!(engine.evaluate_bool("ghost", None, true).await);
    assert_eq!(engine.evaluate_string("ghost", None, "fallback").await, "fallback");
    assert!(!engine.evaluate_rollout("ghost", "alice").await);
}

// =============================================================================
// Cache behavior through the façade
// =============================================================================

#[tokio::test]
async fn evaluation_is_cached_then_stale_then_refetched() {
    let config = FlagEngineConfig {
        default_ttl_ms: 100,
        stale_ttl_ms: 200,
        ..Default::default()
    };
    let (engine, clock, _store) = engine_with_config(0, config);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    // t=50: write-through copy is fresh.
    clock.set(50);
    let result = engine.evaluate("f", None).await;
    assert!(result.cached);
    assert!(!result.stale);

    // t=150: expired but inside the stale window - still served.
    clock.set(150);
    let result = engine.evaluate("f", None).await;
    assert!(result.cached);
    assert!(result.stale);

    // t=350: past the stale window - refetched from the store.
    clock.set(350);
    let result = engine.evaluate("f", None).await;
    assert!(!result.cached);
    assert_eq!(result.value, FlagValue::Bool(true));

    // The refetch repopulated the cache.
    let result = engine.evaluate("f", None).await;
    assert!(result.cached);
}

#[tokio::test]
async fn update_is_visible_immediately_through_the_cache() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    assert!(engine.evaluate_bool("f", None, false).await);

    engine.update_flag("f", FlagValue::Bool(false)).await.unwrap().unwrap();
    assert!(!engine.evaluate_bool("f", None, true).await);
}

#[tokio::test]
async fn purge_cache_reports_dropped_entries() {
    let config = FlagEngineConfig {
        default_ttl_ms: 100,
        stale_ttl_ms: 100,
        ..Default::default()
    };
    let (engine, clock, _store) = engine_with_config(0, config);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    clock.set(500);
    assert_eq!(engine.purge_cache(), 1);
    assert_eq!(engine.purge_cache(), 0);
}

// =============================================================================
// Mutation flow
// =============================================================================

#[tokio::test]
async fn create_rejects_duplicates_and_invalid_definitions() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    assert!(engine.create_flag(Flag::boolean("f", false)).await.is_err());

    let mismatched = Flag::new(
        "g",
        FlagKind::Boolean,
        FlagValue::Bool(true),
        FlagValue::String("oops".into()),
    );
    assert!(engine.create_flag(mismatched).await.is_err());
}

#[tokio::test]
async fn update_keeps_type_tag_and_unknown_key_is_none() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    assert!(engine
        .update_flag("f", FlagValue::String("nope".into()))
        .await
        .is_err());
    assert!(engine
        .update_flag("ghost", FlagValue::Bool(true))
        .await
        .unwrap()
        .is_none());

    let updated = engine.update_flag("f", FlagValue::Bool(false)).await.unwrap().unwrap();
    assert_eq!(updated.flag.value, FlagValue::Bool(false));
    assert_eq!(updated.meta.version.version, 2);
}

#[tokio::test]
async fn delete_removes_everywhere() {
    let (engine, _clock, store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    assert!(engine.delete_flag("f").await.unwrap());
    assert!(!engine.delete_flag("f").await.unwrap());
    assert!(engine.get_flag("f").await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(engine.evaluate("f", None).await.reason, reason::FLAG_NOT_FOUND);
}

#[tokio::test]
async fn every_mutation_strictly_advances_the_store_version() {
    let (engine, _clock, store) = engine_at(0);
    let mut last = store.get_version().await.unwrap();

    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    let version = store.get_version().await.unwrap();
    assert!(version.is_newer(&last));
    last = version;

    for step in 0..4 {
        match step {
            0 => {
                engine.update_flag("f", FlagValue::Bool(false)).await.unwrap().unwrap();
            }
            1 => {
                engine.disable_flag("f").await.unwrap();
            }
            2 => {
                engine.enable_flag("f").await.unwrap();
            }
            _ => {
                engine.delete_flag("f").await.unwrap();
            }
        }
        let version = store.get_version().await.unwrap();
        assert!(version.is_newer(&last), "step {step} did not advance the version");
        last = version;
    }
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn higher_remote_version_wins_despite_older_timestamp() {
    let (engine, _clock, store) = engine_at(0);

    // Local entry at version 2, timestamp 10.
    let mut local = remote_entry("f", FlagValue::Bool(false), 2, 10);
    local.meta.version.node_id = "node-a".into();
    store.set(local).await.unwrap();

    // Remote at version 3, timestamp 5: version is the primary key.
    let accepted = engine
        .merge_remote(vec![remote_entry("f", FlagValue::Bool(true), 3, 5)])
        .await
        .unwrap();
    assert_eq!(accepted, 1);

    let entry = engine.get_flag("f").await.unwrap().unwrap();
    assert_eq!(entry.meta.version.version, 3);
    assert_eq!(entry.flag.value, FlagValue::Bool(true));
}

#[tokio::test]
async fn merge_is_idempotent_and_audits_accepted_entries_only() {
    let (engine, _clock, _store) = engine_at(0);
    let batch = vec![
        remote_entry("a", FlagValue::Bool(true), 1, 10),
        remote_entry("b", FlagValue::Bool(true), 1, 10),
    ];

    assert_eq!(engine.merge_remote(batch.clone()).await.unwrap(), 2);
    assert_eq!(engine.merge_remote(batch).await.unwrap(), 0);

    let synced = engine.audit().query(&AuditQuery {
        event_types: Some(vec![AuditEvent::Synced]),
        ..Default::default()
    });
    assert_eq!(synced.len(), 2);
}

#[tokio::test]
async fn apply_remote_parses_wire_format_and_reconciles_versions() {
    let (engine, _clock, store) = engine_at(1_000);

    let set = RemoteFlagSet {
        flags: vec![remote_entry("f", FlagValue::Bool(true), 4, 900)],
        version: VersionVector {
            version: 9,
            timestamp: 900,
            node_id: "node-b".into(),
            checksum: "0000abcd".into(),
        },
    };
    // Through the wire shape, as the transport would deliver it.
    let parsed = RemoteFlagSet::from_json(&set.to_json().unwrap()).unwrap();

    let report = engine.apply_remote(parsed).await.unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(report.total, 1);

    // Store version jumped past the remote's 9.
    let version = store.get_version().await.unwrap();
    assert!(version.version > 9);
    assert_eq!(report.version, version);
}

#[tokio::test]
async fn engine_over_a_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.json");

    {
        let store = Arc::new(FileStore::open(&path, "disk-node").await.unwrap());
        let engine = FlagEngine::with_store(FlagEngineConfig::default(), Arc::clone(&store) as Arc<dyn FlagStore>);
        engine.create_flag(Flag::boolean("persisted", true)).await.unwrap();
        store.flush().await.unwrap();
    }

    let store = Arc::new(FileStore::open(&path, "disk-node").await.unwrap());
    let engine = FlagEngine::with_store(FlagEngineConfig::default(), store as Arc<dyn FlagStore>);
    assert!(engine.evaluate_bool("persisted", None, false).await);
    let result = engine.evaluate("persisted", None).await;
    assert_eq!(result.reason, reason::FALLTHROUGH);
}

// =============================================================================
// Audit trail
// =============================================================================

#[tokio::test]
async fn mutations_leave_an_ordered_verifiable_trail() {
    let (engine, clock, _store) = engine_at(1_000);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    clock.advance(10);
    engine.update_flag("f", FlagValue::Bool(false)).await.unwrap().unwrap();
    clock.advance(10);
    engine.delete_flag("f").await.unwrap();

    let trail = engine.audit().query(&AuditQuery {
        flag_key: Some("f".into()),
        ..Default::default()
    });
    assert_eq!(trail.len(), 3);
    // Newest first.
    assert_eq!(trail[0].event_type, AuditEvent::Deleted);
    assert_eq!(trail[1].event_type, AuditEvent::Updated);
    assert_eq!(trail[2].event_type, AuditEvent::Created);
    assert_eq!(trail[1].previous_value, Some(FlagValue::Bool(true)));

    for record in &trail {
        assert!(flag_engine::AuditLog::verify(record));
    }
}

#[tokio::test]
async fn evaluation_logging_is_off_by_default_and_opt_in() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    engine.evaluate("f", None).await;
    let evaluated = engine.audit().query(&AuditQuery {
        event_types: Some(vec![AuditEvent::Evaluated]),
        ..Default::default()
    });
    assert!(evaluated.is_empty());

    let config = FlagEngineConfig {
        evaluation_logging: true,
        ..Default::default()
    };
    let (logging, _clock, _store) = engine_with_config(0, config);
    logging.create_flag(Flag::boolean("f", true)).await.unwrap();
    logging.evaluate("f", None).await;
    let evaluated = logging.audit().query(&AuditQuery {
        event_types: Some(vec![AuditEvent::Evaluated]),
        ..Default::default()
    });
    assert_eq!(evaluated.len(), 1);
}

#[tokio::test]
async fn audit_export_reimports_verbatim() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    let exported = engine.audit().export();
    let json = serde_json::to_string(&exported).unwrap();
    let parsed: Vec<flag_engine::AuditRecord> = serde_json::from_str(&json).unwrap();

    let (other, _clock, _store) = engine_at(99);
    other.audit().import(parsed);
    assert_eq!(other.audit().export(), exported);
}

// =============================================================================
// Export / import / stats
// =============================================================================

#[tokio::test]
async fn snapshot_restore_preserves_the_entry_set() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("a", true)).await.unwrap();
    engine.create_flag(Flag::rollout("b", 30.0)).await.unwrap();

    let (entries, _version) = engine.snapshot().await.unwrap();
    assert_eq!(entries.len(), 2);

    let (other, _clock, _store) = engine_at(50);
    other.restore(entries.clone()).await.unwrap();
    let (restored, _) = other.snapshot().await.unwrap();
    assert_eq!(restored, entries);
    assert!(other.evaluate_bool("a", None, false).await);
}

#[tokio::test]
async fn stats_reflect_all_components() {
    let (engine, _clock, _store) = engine_at(0);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();
    engine.evaluate("f", None).await;
    engine.evaluate("ghost", None).await;

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.store_entries, 1);
    assert_eq!(stats.audit_records, 1);
    assert_eq!(stats.cache.hits, 1);
    assert!(stats.cache.misses >= 1);
    assert_eq!(stats.version.node_id, "local");
}

// =============================================================================
// Actor plumbing
// =============================================================================

#[tokio::test]
async fn engine_records_a_system_actor_with_node_id() {
    let config = FlagEngineConfig {
        node_id: "edge-eu-1".into(),
        environment: "production".into(),
        ..Default::default()
    };
    let (engine, _clock, _store) = engine_with_config(0, config);
    engine.create_flag(Flag::boolean("f", true)).await.unwrap();

    let trail = engine.audit().export();
    assert_eq!(trail[0].actor, Actor::system("edge-eu-1"));
    assert_eq!(trail[0].context.node_id, "edge-eu-1");
    assert_eq!(trail[0].context.environment, "production");

    // The flag inherited the engine environment.
    let entry = engine.get_flag("f").await.unwrap().unwrap();
    assert_eq!(entry.flag.environment, "production");
    assert_eq!(entry.flag.state, FlagState::Enabled);
}
