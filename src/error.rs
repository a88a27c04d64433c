//! Crate-level error type.
//!
//! Component-local failures stay local (the store has its own
//! [`StorageError`](crate::storage::StorageError)); this enum is what the
//! engine façade surfaces to callers. Note the deliberate gaps in coverage:
//! evaluation never fails (illegal inputs produce a default value and an
//! explanatory reason), and cache misses are a value, not an error.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flag not found: {0}")]
    NotFound(String),

    #[error("invalid flag definition for '{key}': {detail}")]
    InvalidType { key: String, detail: String },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("network error: {0}")]
    Network(String),

    #[error("entry expired: {0}")]
    Expired(String),

    #[error("conflict on '{key}': {detail}")]
    Conflict { key: String, detail: String },

    #[error("parse error: {0}")]
    Parse(String),
}
