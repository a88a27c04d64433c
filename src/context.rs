//! Evaluation context and result.
//!
//! An [`EvaluationContext`] is the user/session/attribute bundle the caller
//! supplies per evaluation. It is immutable during an evaluation and carries
//! its own timestamp - the evaluator reads no other clock. The engine holds
//! no current-user state; build a fresh context per call.

use std::collections::HashMap;

use serde::Serialize;

use crate::flag::FlagValue;

/// Resolution reasons carried on [`EvaluationResult::reason`].
pub mod reason {
    pub const FALLTHROUGH: &str = "fallthrough";
    pub const FLAG_DISABLED: &str = "flag_disabled";
    pub const FLAG_NOT_FOUND: &str = "flag_not_found";
    pub const ROLLOUT_INCLUDED: &str = "rollout_included";
    pub const ROLLOUT_EXCLUDED: &str = "rollout_excluded";
    pub const NO_USER_ID: &str = "no_user_id";
    pub const ROLLOUT_CONFIG_MISSING: &str = "rollout_config_missing";
    pub const RULE_MATCH: &str = "rule_match";
    pub const NO_RULE_MATCH: &str = "no_rule_match";
    pub const NO_RULES: &str = "no_rules";
}

/// Caller-supplied context for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Unordered string attributes with unique keys.
    pub attributes: HashMap<String, String>,
    /// Epoch milliseconds as seen by the caller.
    pub timestamp: i64,
}

impl EvaluationContext {
    /// An empty context stamped at `now_ms`.
    #[must_use]
    pub fn anonymous(now_ms: i64) -> Self {
        Self {
            timestamp: now_ms,
            ..Self::default()
        }
    }

    /// A context for a known user.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            user_id: Some(user_id.into()),
            timestamp: now_ms,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup used by rule matching.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Outcome of resolving one flag against one context.
///
/// Evaluation never fails: even a missing flag produces a well-formed
/// result with `reason = "flag_not_found"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub flag_key: String,
    pub value: FlagValue,
    /// One of the constants in [`reason`].
    pub reason: &'static str,
    /// Index of the matching segment rule, when `reason = "rule_match"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    /// Whether the flag definition came from the cache.
    pub cached: bool,
    /// Whether the cached definition was in its stale window.
    pub stale: bool,
}

impl EvaluationResult {
    #[must_use]
    pub fn new(flag_key: impl Into<String>, value: FlagValue, reason: &'static str) -> Self {
        Self {
            flag_key: flag_key.into(),
            value,
            reason,
            rule_index: None,
            cached: false,
            stale: false,
        }
    }

    /// Result for a flag the engine could not find anywhere.
    #[must_use]
    pub fn not_found(flag_key: impl Into<String>) -> Self {
        Self::new(flag_key, FlagValue::Bool(false), reason::FLAG_NOT_FOUND)
    }

    #[must_use]
    pub fn with_rule_index(mut self, index: usize) -> Self {
        self.rule_index = Some(index);
        self
    }

    #[must_use]
    pub fn from_cache(mut self, stale: bool) -> Self {
        self.cached = true;
        self.stale = stale;
        self
    }
}
