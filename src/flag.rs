//! Flag data model.
//!
//! The [`FlagWithMeta`] pair is the unit of storage and replication: the
//! [`Flag`] definition callers author, plus the [`FlagMeta`] bookkeeping the
//! engine owns (timestamps, version vector, expiry policy, evaluation
//! counters). The store owns entries; the cache holds copies, so their
//! lifetimes are independent.
//!
//! Wire encoding is JSON with lowerCamelCase field names. [`FlagValue`]
//! serializes as a tagged object: `{"kind":"bool","value":true}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlagError;
use crate::version::VersionVector;

/// Dynamically-typed flag value.
///
/// Coercions are explicit (see the `as_*` accessors) rather than relying on
/// host-language coercion:
/// - anything → string: booleans render as `"true"`/`"false"`, numbers in
///   decimal, JSON canonically serialized
/// - string → bool/int/float: no parsing, the caller's default is returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FlagValue {
    Bool(bool),
    String(String),
    Int(i64),
    Float(f64),
    Json(Value),
}

impl FlagValue {
    /// The wire tag for this variant (`"bool"`, `"string"`, ...).
    #[must_use]
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Json(_) => "json",
        }
    }

    /// Boolean view; non-boolean values yield `default`.
    #[must_use]
    pub fn as_bool(&self, default: bool) -> bool {
        match self {
            Self::Bool(b) => *b,
            _ => default,
        }
    }

    /// Integer view; floats truncate, everything else yields `default`.
    #[must_use]
    pub fn as_int(&self, default: i64) -> i64 {
        match self {
            Self::Int(i) => *i,
            Self::Float(f) => *f as i64,
            _ => default,
        }
    }

    /// Float view; ints widen, everything else yields `default`.
    #[must_use]
    pub fn as_float(&self, default: f64) -> f64 {
        match self {
            Self::Float(f) => *f,
            Self::Int(i) => *i as f64,
            _ => default,
        }
    }

    /// String view with total coercion.
    #[must_use]
    pub fn as_str_lossy(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// How a flag resolves during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagKind {
    /// Returns `value` as-is.
    Boolean,
    /// Returns `value`, which must be one of `variants`.
    Variant,
    /// Percentage rollout bucketed on the user id.
    Rollout,
    /// Rule-based attribute matching.
    Segment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagState {
    Enabled,
    Disabled,
    Archived,
}

/// Cache expiry policy carried on [`FlagMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryPolicy {
    /// TTL fixed at insert time.
    Absolute,
    /// TTL re-anchored on every read.
    Sliding,
    /// TTL stretched for flags that change infrequently.
    Adaptive,
}

/// Comparison operator for a targeting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleOperator {
    Eq,
    Neq,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
}

/// One attribute-matching rule of a segment flag.
///
/// Rules are OR-ed: the first matching rule wins. A missing attribute never
/// matches, regardless of operator; `negate` is applied after the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingRule {
    pub attribute: String,
    pub operator: RuleOperator,
    pub value: String,
    #[serde(default)]
    pub negate: bool,
}

impl TargetingRule {
    #[must_use]
    pub fn new(attribute: impl Into<String>, operator: RuleOperator, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
            negate: false,
        }
    }

    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// A flag definition as authored by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: FlagKind,
    pub state: FlagState,
    pub value: FlagValue,
    pub default_value: FlagValue,
    /// Allowed values for `Variant` flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<String>>,
    /// Inclusion percentage in `[0, 100]` for `Rollout` flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    /// Targeting rules for `Segment` flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<TargetingRule>>,
    /// Bucketing seed for `Rollout` flags; defaults to the flag key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_seed: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environment: String,
}

impl Flag {
    /// A new enabled flag with the given kind and values. Use the `with_*`
    /// builders for the optional fields, then let
    /// [`validate`](Self::validate) check the kind-specific invariants.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: FlagKind, value: FlagValue, default_value: FlagValue) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            description: String::new(),
            kind,
            state: FlagState::Enabled,
            value,
            default_value,
            variants: None,
            percentage: None,
            rules: None,
            hash_seed: None,
            tags: Vec::new(),
            environment: String::new(),
        }
    }

    /// Boolean flag that is on or off, defaulting to off.
    #[must_use]
    pub fn boolean(key: impl Into<String>, on: bool) -> Self {
        Self::new(key, FlagKind::Boolean, FlagValue::Bool(on), FlagValue::Bool(false))
    }

    /// Percentage rollout bucketed on the flag key.
    #[must_use]
    pub fn rollout(key: impl Into<String>, percentage: f64) -> Self {
        let mut flag = Self::new(key, FlagKind::Rollout, FlagValue::Bool(true), FlagValue::Bool(false));
        flag.percentage = Some(percentage);
        flag
    }

    /// Segment flag resolving to `value` when a rule matches.
    #[must_use]
    pub fn segment(
        key: impl Into<String>,
        rules: Vec<TargetingRule>,
        value: FlagValue,
        default_value: FlagValue,
    ) -> Self {
        let mut flag = Self::new(key, FlagKind::Segment, value, default_value);
        flag.rules = Some(rules);
        flag
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_variants(mut self, variants: Vec<String>) -> Self {
        self.variants = Some(variants);
        self
    }

    #[must_use]
    pub fn with_hash_seed(mut self, seed: impl Into<String>) -> Self {
        self.hash_seed = Some(seed.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Check the kind-specific invariants:
    /// - `default_value` must carry the same type tag as `value`
    /// - `Rollout` percentage, when present, must be in `[0, 100]`
    /// - `Variant` flags must list variants and `value` must be one of them
    pub fn validate(&self) -> Result<(), FlagError> {
        if self.value.kind_tag() != self.default_value.kind_tag() {
            return Err(FlagError::InvalidType {
                key: self.key.clone(),
                detail: format!(
                    "default_value tag '{}' does not match value tag '{}'",
                    self.default_value.kind_tag(),
                    self.value.kind_tag()
                ),
            });
        }
        match self.kind {
            FlagKind::Rollout => {
                if let Some(p) = self.percentage {
                    if !(0.0..=100.0).contains(&p) {
                        return Err(FlagError::InvalidType {
                            key: self.key.clone(),
                            detail: format!("rollout percentage {p} outside [0, 100]"),
                        });
                    }
                }
            }
            FlagKind::Variant => {
                let variants = self.variants.as_deref().unwrap_or(&[]);
                if variants.is_empty() {
                    return Err(FlagError::InvalidType {
                        key: self.key.clone(),
                        detail: "variant flag without variants".into(),
                    });
                }
                let value = self.value.as_str_lossy();
                if !variants.iter().any(|v| *v == value) {
                    return Err(FlagError::InvalidType {
                        key: self.key.clone(),
                        detail: format!("value '{value}' is not a declared variant"),
                    });
                }
            }
            FlagKind::Boolean | FlagKind::Segment => {}
        }
        Ok(())
    }
}

/// Engine-owned bookkeeping for a stored flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagMeta {
    pub created_at: i64,
    pub updated_at: i64,
    pub version: VersionVector,
    /// Advisory only - evaluation never consults it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub expiry_policy: ExpiryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_at: Option<i64>,
    #[serde(default)]
    pub evaluation_count: u64,
}

impl FlagMeta {
    #[must_use]
    pub fn new(version: VersionVector, now_ms: i64) -> Self {
        Self {
            created_at: now_ms,
            updated_at: now_ms,
            version,
            expires_at: None,
            expiry_policy: ExpiryPolicy::Absolute,
            last_evaluated_at: None,
            evaluation_count: 0,
        }
    }

    /// Explicitly set the advisory expiry instant.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    /// Stamp a mutation: bump `updated_at` and install the next version.
    pub fn touch(&mut self, version: VersionVector, now_ms: i64) {
        self.updated_at = now_ms;
        self.version = version;
    }

    /// Record one evaluation.
    pub fn note_evaluation(&mut self, now_ms: i64) {
        self.last_evaluated_at = Some(now_ms);
        self.evaluation_count = self.evaluation_count.saturating_add(1);
    }
}

/// The unit of storage and replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagWithMeta {
    pub flag: Flag,
    pub meta: FlagMeta,
}

impl FlagWithMeta {
    #[must_use]
    pub fn new(flag: Flag, meta: FlagMeta) -> Self {
        Self { flag, meta }
    }

    /// The flag key, which is also the storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.flag.key
    }
}
