// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic flag-engine usage example.
//!
//! Demonstrates:
//! 1. Creating boolean, rollout, and segment flags
//! 2. Evaluating them against different contexts
//! 3. Mutating a flag and watching the version vector advance
//! 4. Syncing a remote batch with last-writer-wins reconciliation
//! 5. Querying the audit trail
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use flag_engine::{
    AuditQuery, EvaluationContext, Flag, FlagEngine, FlagEngineConfig, FlagValue, RuleOperator,
    TargetingRule,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n=== flag-engine: basic usage ===\n");

    // ─────────────────────────────────────────────────────────────────────
    // 1. Create an engine and some flags
    // ─────────────────────────────────────────────────────────────────────
    let engine = FlagEngine::new(FlagEngineConfig {
        node_id: "demo-node".into(),
        environment: "demo".into(),
        ..Default::default()
    });

    engine
        .create_flag(Flag::boolean("dark_mode", true).with_name("Dark mode"))
        .await?;
    engine
        .create_flag(Flag::rollout("beta_checkout", 25.0).with_description("25% rollout"))
        .await?;
    engine
        .create_flag(Flag::segment(
            "pricing_page",
            vec![TargetingRule::new("country", RuleOperator::In, "NL,DE,FR")],
            FlagValue::String("eu-layout".into()),
            FlagValue::String("default-layout".into()),
        ))
        .await?;

    // ─────────────────────────────────────────────────────────────────────
    // 2. Evaluate against different contexts
    // ─────────────────────────────────────────────────────────────────────
    let result = engine.evaluate("dark_mode", None).await;
    println!("dark_mode -> {:?} ({})", result.value, result.reason);

    for user in ["alice", "bob", "carol", "dave"] {
        let on = engine.evaluate_rollout("beta_checkout", user).await;
        println!("beta_checkout for {user}: {on}");
    }

    let ctx = EvaluationContext::for_user("alice", now_ms()).with_attribute("country", "NL");
    let layout = engine.evaluate_string("pricing_page", Some(ctx), "default-layout").await;
    println!("pricing_page for NL user: {layout}");

    // ─────────────────────────────────────────────────────────────────────
    // 3. Mutate and inspect versions
    // ─────────────────────────────────────────────────────────────────────
    let _ = engine.update_flag("dark_mode", FlagValue::Bool(false)).await?;
    let entry = engine.get_flag("dark_mode").await?.expect("just updated");
    println!("dark_mode version after update: {}", entry.meta.version);

    // ─────────────────────────────────────────────────────────────────────
    // 4. Sync a remote batch (idempotent last-writer-wins)
    // ─────────────────────────────────────────────────────────────────────
    let (snapshot, version) = engine.snapshot().await?;
    println!("snapshot: {} entries at {version}", snapshot.len());
    let accepted = engine.merge_remote(snapshot).await?;
    println!("re-merging our own snapshot accepts {accepted} entries (all older)");

    // ─────────────────────────────────────────────────────────────────────
    // 5. Audit trail
    // ─────────────────────────────────────────────────────────────────────
    let trail = engine.audit().query(&AuditQuery {
        flag_key: Some("dark_mode".into()),
        ..Default::default()
    });
    println!("\naudit trail for dark_mode (newest first):");
    for record in trail {
        println!("  {:?} at {} [{}]", record.event_type, record.timestamp, record.checksum);
    }

    let stats = engine.stats().await?;
    println!(
        "\nstats: {} flags, {} audit records, cache hit rate {:.0}%",
        stats.store_entries,
        stats.audit_records,
        stats.cache.hit_rate() * 100.0
    );

    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
