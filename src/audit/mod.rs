// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only audit log.
//!
//! Every mutation (and, when enabled, every evaluation) appends an
//! [`AuditRecord`] to a bounded in-memory ring. Records are immutable once
//! appended and individually tamper-evident: each carries a 32-bit checksum
//! over its own serialized fields (checksum excluded from its own input),
//! so consumers can re-validate with [`AuditLog::verify`]. Records are not
//! chained - this is error detection, not a signature scheme.
//!
//! Capacity is bounded: appending to a full log drops the oldest 10%.
//! Retention is bounded separately in days via [`AuditLog::purge`].
//!
//! Record ids sort by time: a 12-hex-char millisecond prefix plus a random
//! 12-hex-char suffix, so lexicographic id order is timestamp order up to
//! same-millisecond ties.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::checksum_hex;
use crate::clock::Clock;
use crate::config::FlagEngineConfig;
use crate::flag::FlagValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditEvent {
    Created,
    Updated,
    Deleted,
    Evaluated,
    Expired,
    Synced,
    ConflictResolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorKind {
    User,
    System,
    Api,
}

/// Who performed the recorded action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn system(id: impl Into<String>) -> Self {
        Self { kind: ActorKind::System, id: id.into(), ip: None }
    }

    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self { kind: ActorKind::User, id: id.into(), ip: None }
    }

    #[must_use]
    pub fn api(id: impl Into<String>) -> Self {
        Self { kind: ActorKind::Api, id: id.into(), ip: None }
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// Where the recorded action happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub node_id: String,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: i64,
    pub event_type: AuditEvent,
    pub flag_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<FlagValue>,
    pub actor: Actor,
    pub context: AuditContext,
    /// 8 lowercase hex chars over the serialized record with this field
    /// emptied.
    pub checksum: String,
}

/// Filter for [`AuditLog::query`]. All fields are optional and AND-ed.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub flag_key: Option<String>,
    pub event_types: Option<Vec<AuditEvent>>,
    pub actor_id: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    /// Resume after this record id (exclusive).
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(key) = &self.flag_key {
            if record.flag_key != *key {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&record.event_type) {
                return false;
            }
        }
        if let Some(actor) = &self.actor_id {
            if record.actor.id != *actor {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.timestamp > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
struct AuditConfig {
    max_records: usize,
    retention_days: u32,
    evaluation_logging: bool,
    node_id: String,
    environment: String,
}

/// The audit log. One mutex guards the ring; appends never do I/O.
pub struct AuditLog {
    records: Mutex<VecDeque<AuditRecord>>,
    config: AuditConfig,
    clock: Clock,
}

impl AuditLog {
    #[must_use]
    pub fn new(config: &FlagEngineConfig, clock: Clock) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            config: AuditConfig {
                max_records: config.audit_max_records,
                retention_days: config.audit_retention_days,
                evaluation_logging: config.evaluation_logging,
                node_id: config.node_id.clone(),
                environment: config.environment.clone(),
            },
            clock,
        }
    }

    // --- Event helpers ---

    pub fn log_created(&self, flag_key: &str, new_value: FlagValue, actor: Actor) -> AuditRecord {
        self.append(AuditEvent::Created, flag_key, None, Some(new_value), actor)
    }

    pub fn log_updated(
        &self,
        flag_key: &str,
        previous: Option<FlagValue>,
        new_value: FlagValue,
        actor: Actor,
    ) -> AuditRecord {
        self.append(AuditEvent::Updated, flag_key, previous, Some(new_value), actor)
    }

    pub fn log_deleted(
        &self,
        flag_key: &str,
        previous: Option<FlagValue>,
        actor: Actor,
    ) -> AuditRecord {
        self.append(AuditEvent::Deleted, flag_key, previous, None, actor)
    }

    /// No-op unless `evaluation_logging` is enabled - evaluation volume
    /// would otherwise dominate the ring.
    pub fn log_evaluated(
        &self,
        flag_key: &str,
        value: FlagValue,
        actor: Actor,
    ) -> Option<AuditRecord> {
        if !self.config.evaluation_logging {
            return None;
        }
        Some(self.append(AuditEvent::Evaluated, flag_key, None, Some(value), actor))
    }

    pub fn log_expired(&self, flag_key: &str, actor: Actor) -> AuditRecord {
        self.append(AuditEvent::Expired, flag_key, None, None, actor)
    }

    pub fn log_synced(&self, flag_key: &str, new_value: FlagValue, actor: Actor) -> AuditRecord {
        self.append(AuditEvent::Synced, flag_key, None, Some(new_value), actor)
    }

    pub fn log_conflict_resolved(
        &self,
        flag_key: &str,
        previous: Option<FlagValue>,
        new_value: FlagValue,
        actor: Actor,
    ) -> AuditRecord {
        self.append(
            AuditEvent::ConflictResolved,
            flag_key,
            previous,
            Some(new_value),
            actor,
        )
    }

    fn append(
        &self,
        event_type: AuditEvent,
        flag_key: &str,
        previous_value: Option<FlagValue>,
        new_value: Option<FlagValue>,
        actor: Actor,
    ) -> AuditRecord {
        let now = self.clock.now_ms();
        let mut record = AuditRecord {
            id: generate_id(now),
            timestamp: now,
            event_type,
            flag_key: flag_key.to_string(),
            previous_value,
            new_value,
            actor,
            context: AuditContext {
                node_id: self.config.node_id.clone(),
                environment: self.config.environment.clone(),
                user_agent: None,
                correlation_id: None,
            },
            checksum: String::new(),
        };
        record.checksum = checksum_of(&record);

        self.push(record.clone());
        record
    }

    /// Append a record verbatim, preserving its id and checksum. Used by
    /// re-import; capacity still applies.
    pub fn import(&self, records: Vec<AuditRecord>) {
        for record in records {
            self.push(record);
        }
    }

    fn push(&self, record: AuditRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.config.max_records {
            // Keep the newest 90%.
            let keep = self.config.max_records * 9 / 10;
            let dropped = records.len() - keep;
            records.drain(..dropped);
            debug!(dropped, "audit ring at capacity");
        }
        records.push_back(record);
    }

    /// Recompute a record's checksum and compare.
    #[must_use]
    pub fn verify(record: &AuditRecord) -> bool {
        checksum_of(record) == record.checksum
    }

    /// Filtered query, newest first, cursor-paginated by record id.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let records = self.records.lock();
        let mut matched: Vec<AuditRecord> = records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        let matched: Vec<AuditRecord> = match &query.cursor {
            Some(cursor) => matched
                .into_iter()
                .skip_while(|record| record.id != *cursor)
                .skip(1)
                .collect(),
            None => matched,
        };

        match query.limit {
            Some(limit) => matched.into_iter().take(limit).collect(),
            None => matched,
        }
    }

    /// Drop records older than the retention window; returns the count.
    pub fn purge(&self) -> usize {
        let cutoff = self.clock.now_ms() - i64::from(self.config.retention_days) * 86_400_000;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff);
        before - records.len()
    }

    /// All records in append order (for export).
    #[must_use]
    pub fn export(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Checksum over the serialized record with the checksum field emptied.
fn checksum_of(record: &AuditRecord) -> String {
    let mut probe = record.clone();
    probe.checksum.clear();
    let payload = serde_json::to_string(&probe).unwrap_or_default();
    checksum_hex(&payload)
}

/// `{unix_ms:012x}-{random:012x}`: sortable by id means sortable by time.
fn generate_id(now_ms: i64) -> String {
    let suffix = rand::random::<u64>() & 0xffff_ffff_ffff;
    format!("{:012x}-{:012x}", now_ms.max(0) as u64, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn log_with(max_records: usize, retention_days: u32, evaluation_logging: bool) -> (AuditLog, ManualClock) {
        let manual = ManualClock::new(1_000);
        let config = FlagEngineConfig {
            audit_max_records: max_records,
            audit_retention_days: retention_days,
            evaluation_logging,
            node_id: "n1".into(),
            environment: "test".into(),
            ..Default::default()
        };
        (AuditLog::new(&config, manual.clock()), manual)
    }

    #[test]
    fn append_sets_id_timestamp_and_checksum() {
        let (log, _clock) = log_with(100, 90, false);
        let record = log.log_created("f", FlagValue::Bool(true), Actor::system("n1"));

        assert_eq!(record.timestamp, 1_000);
        assert_eq!(record.event_type, AuditEvent::Created);
        assert_eq!(record.checksum.len(), 8);
        assert_eq!(record.id.len(), 25);
        assert!(AuditLog::verify(&record));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn tampering_breaks_verification() {
        let (log, _clock) = log_with(100, 90, false);
        let mut record = log.log_created("f", FlagValue::Bool(true), Actor::system("n1"));
        record.flag_key = "other".into();
        assert!(!AuditLog::verify(&record));
    }

    #[test]
    fn ids_sort_by_time() {
        let (log, clock) = log_with(100, 90, false);
        let mut ids = Vec::new();
        for i in 0..20 {
            clock.set(1_000 + i);
            ids.push(log.log_created("f", FlagValue::Int(i), Actor::system("n1")).id);
        }
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn capacity_drops_oldest_tenth() {
        let (log, clock) = log_with(10, 90, false);
        for i in 0..10 {
            clock.set(1_000 + i);
            log.log_created(&format!("f{i}"), FlagValue::Bool(true), Actor::system("n1"));
        }
        assert_eq!(log.len(), 10);

        // 11th append: oldest record (f0) goes, newest 9 stay + the new one.
        log.log_created("f10", FlagValue::Bool(true), Actor::system("n1"));
        assert_eq!(log.len(), 10);
        let keys: Vec<String> = log.export().into_iter().map(|r| r.flag_key).collect();
        assert!(!keys.contains(&"f0".to_string()));
        assert!(keys.contains(&"f1".to_string()));
        assert!(keys.contains(&"f10".to_string()));
    }

    #[test]
    fn evaluation_logging_is_gated() {
        let (off, _clock) = log_with(100, 90, false);
        assert!(off.log_evaluated("f", FlagValue::Bool(true), Actor::system("n1")).is_none());
        assert!(off.is_empty());

        let (on, _clock) = log_with(100, 90, true);
        assert!(on.log_evaluated("f", FlagValue::Bool(true), Actor::system("n1")).is_some());
        assert_eq!(on.len(), 1);
    }

    #[test]
    fn query_filters_by_key_type_actor_and_time() {
        let (log, clock) = log_with(100, 90, false);
        clock.set(1_000);
        log.log_created("a", FlagValue::Bool(true), Actor::system("sys"));
        clock.set(2_000);
        log.log_updated("a", Some(FlagValue::Bool(true)), FlagValue::Bool(false), Actor::user("alice"));
        clock.set(3_000);
        log.log_deleted("b", Some(FlagValue::Bool(false)), Actor::user("alice"));

        let by_key = log.query(&AuditQuery { flag_key: Some("a".into()), ..Default::default() });
        assert_eq!(by_key.len(), 2);
        // Newest first.
        assert_eq!(by_key[0].event_type, AuditEvent::Updated);

        let by_type = log.query(&AuditQuery {
            event_types: Some(vec![AuditEvent::Created, AuditEvent::Deleted]),
            ..Default::default()
        });
        assert_eq!(by_type.len(), 2);

        let by_actor = log.query(&AuditQuery { actor_id: Some("alice".into()), ..Default::default() });
        assert_eq!(by_actor.len(), 2);

        let by_window = log.query(&AuditQuery {
            start_time: Some(1_500),
            end_time: Some(2_500),
            ..Default::default()
        });
        assert_eq!(by_window.len(), 1);
        assert_eq!(by_window[0].flag_key, "a");
    }

    #[test]
    fn query_paginates_with_cursor() {
        let (log, clock) = log_with(100, 90, false);
        for i in 0..5 {
            clock.set(1_000 + i);
            log.log_created(&format!("f{i}"), FlagValue::Int(i), Actor::system("n1"));
        }

        let first_page = log.query(&AuditQuery { limit: Some(2), ..Default::default() });
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].flag_key, "f4");

        let second_page = log.query(&AuditQuery {
            cursor: Some(first_page[1].id.clone()),
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].flag_key, "f2");
        assert_eq!(second_page[1].flag_key, "f1");

        // Unknown cursor yields nothing rather than restarting the scan.
        let nowhere = log.query(&AuditQuery {
            cursor: Some("ffffffffffff-000000000000".into()),
            ..Default::default()
        });
        assert!(nowhere.is_empty());
    }

    #[test]
    fn expired_and_conflict_events_round_trip() {
        let (log, _clock) = log_with(100, 90, false);
        let expired = log.log_expired("f", Actor::system("n1"));
        assert_eq!(expired.event_type, AuditEvent::Expired);
        assert!(expired.new_value.is_none());

        let resolved = log.log_conflict_resolved(
            "f",
            Some(FlagValue::Bool(false)),
            FlagValue::Bool(true),
            Actor::system("n1"),
        );
        assert_eq!(resolved.event_type, AuditEvent::ConflictResolved);
        assert!(AuditLog::verify(&resolved));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn purge_enforces_retention() {
        let (log, clock) = log_with(100, 1, false);
        clock.set(0);
        log.log_created("old", FlagValue::Bool(true), Actor::system("n1"));
        clock.set(86_400_000 + 1_000);
        log.log_created("new", FlagValue::Bool(true), Actor::system("n1"));

        assert_eq!(log.purge(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.export()[0].flag_key, "new");
    }

    #[test]
    fn import_preserves_id_and_checksum_verbatim() {
        let (log, _clock) = log_with(100, 90, false);
        log.log_created("f", FlagValue::Bool(true), Actor::system("n1"));

        let exported = log.export();
        let json = serde_json::to_string(&exported).unwrap();
        let parsed: Vec<AuditRecord> = serde_json::from_str(&json).unwrap();

        let (other, _clock) = log_with(100, 90, false);
        other.import(parsed);
        let reimported = other.export();
        assert_eq!(reimported, exported);
        assert!(AuditLog::verify(&reimported[0]));
    }

    #[test]
    fn export_uses_camel_case_and_type_rename() {
        let (log, _clock) = log_with(100, 90, false);
        log.log_conflict_resolved(
            "f",
            Some(FlagValue::Int(1)),
            FlagValue::Int(2),
            Actor::api("sync").with_ip("10.0.0.1"),
        );
        let json = serde_json::to_string(&log.export()).unwrap();
        assert!(json.contains("\"eventType\":\"conflictResolved\""));
        assert!(json.contains("\"flagKey\""));
        assert!(json.contains("\"previousValue\""));
        assert!(json.contains("\"type\":\"api\""));
        assert!(json.contains("\"nodeId\":\"n1\""));
    }
}
