//! Version vectors for replicated flag definitions.
//!
//! A [`VersionVector`] is a monotone `(version, timestamp, node_id, checksum)`
//! tuple with a total order, used for last-writer-wins reconciliation during
//! sync. The checksum is the djb2 32-bit hash (see [`crate::checksum`]) of
//! whatever payload produced the increment, rendered as 8 lowercase hex
//! chars - an error-detection code, not a signature.
//!
//! On the wire a vector is the colon-delimited string
//! `"{version}:{timestamp}:{node_id}:{checksum}"`; `node_id` must not
//! contain a colon. Serde serializes through that string form.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::checksum::checksum_hex;
use crate::error::FlagError;

/// Monotone version tag for a flag set or a single flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionVector {
    pub version: u64,
    /// Epoch milliseconds of the mutation that produced this vector.
    pub timestamp: i64,
    pub node_id: String,
    /// 8 lowercase hex chars of the djb2 checksum of the mutation payload.
    pub checksum: String,
}

impl VersionVector {
    /// First version for a node: `version = 1`, checksum over `seed_value`.
    #[must_use]
    pub fn first(node_id: impl Into<String>, seed_value: &str, now_ms: i64) -> Self {
        Self {
            version: 1,
            timestamp: now_ms,
            node_id: node_id.into(),
            checksum: checksum_hex(seed_value),
        }
    }

    /// Next version on the same node. The version strictly grows; the
    /// checksum is recomputed over `seed_value`.
    #[must_use]
    pub fn increment(&self, seed_value: &str, now_ms: i64) -> Self {
        Self {
            version: self.version + 1,
            timestamp: now_ms,
            node_id: self.node_id.clone(),
            checksum: checksum_hex(seed_value),
        }
    }

    /// Total order: version, then timestamp, then `node_id`, then checksum.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.node_id.cmp(&other.node_id))
            .then_with(|| self.checksum.cmp(&other.checksum))
    }

    /// `true` iff `self` orders strictly after `other`.
    #[must_use]
    pub fn is_newer(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// Reconcile two replicas: the winner of [`compare`](Self::compare)
    /// contributes `node_id` and `checksum`, the version jumps past both
    /// inputs, and the timestamp is the merge instant.
    #[must_use]
    pub fn merge(&self, remote: &Self, now_ms: i64) -> Self {
        let winner = if self.is_newer(remote) { self } else { remote };
        Self {
            version: self.version.max(remote.version) + 1,
            timestamp: now_ms,
            node_id: winner.node_id.clone(),
            checksum: winner.checksum.clone(),
        }
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.version, self.timestamp, self.node_id, self.checksum
        )
    }
}

impl FromStr for VersionVector {
    type Err = FlagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(FlagError::Parse(format!(
                "version vector must have 4 colon-separated fields, got {}",
                parts.len()
            )));
        }
        let version = parts[0]
            .parse::<u64>()
            .map_err(|e| FlagError::Parse(format!("bad version: {e}")))?;
        let timestamp = parts[1]
            .parse::<i64>()
            .map_err(|e| FlagError::Parse(format!("bad timestamp: {e}")))?;
        Ok(Self {
            version,
            timestamp,
            node_id: parts[2].to_string(),
            checksum: parts[3].to_string(),
        })
    }
}

impl Serialize for VersionVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
