// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire types for the merge/sync protocol.
//!
//! The transport that fetches remote flag sets (HTTP, server-sent events)
//! is a host concern; this module only fixes the JSON shape it must
//! deliver:
//!
//! ```json
//! {
//!   "flags": [ { "flag": { ... }, "meta": { ... } } ],
//!   "version": "12:1722000000000:node-b:0a9cede7"
//! }
//! ```
//!
//! Reconciliation itself is the store's merge contract
//! ([`FlagStore::merge_entries`](crate::storage::FlagStore::merge_entries));
//! the engine applies it per entry, so a sync cancelled between entries
//! leaves every applied entry intact and every skipped entry untouched,
//! and re-running the same batch accepts nothing new.

use serde::{Deserialize, Serialize};

use crate::error::FlagError;
use crate::flag::FlagWithMeta;
use crate::version::VersionVector;

/// A batch of flag definitions from a peer, with the peer's version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFlagSet {
    pub flags: Vec<FlagWithMeta>,
    pub version: VersionVector,
}

impl RemoteFlagSet {
    pub fn from_json(json: &str) -> Result<Self, FlagError> {
        serde_json::from_str(json).map_err(|e| FlagError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, FlagError> {
        serde_json::to_string(self).map_err(|e| FlagError::Parse(e.to_string()))
    }
}

/// Outcome of applying one remote batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Entries written locally (absent before, or remote was newer).
    pub accepted: u32,
    /// Entries in the remote batch.
    pub total: usize,
    /// The store version after reconciliation.
    pub version: VersionVector,
}
