//! Pure flag evaluation.
//!
//! [`evaluate`] resolves a [`Flag`] against an [`EvaluationContext`] with no
//! I/O, no mutable state, and no clock other than `ctx.timestamp`. Two calls
//! with identical arguments return identical results, which makes rollout
//! decisions reproducible across nodes and across releases.
//!
//! Evaluation never fails. Illegal or incomplete inputs resolve to the
//! flag's default value with an explanatory reason; an invalid regex in a
//! rule degrades to "rule does not match".

use regex::Regex;

use crate::checksum::rollout_bucket;
use crate::context::{reason, EvaluationContext, EvaluationResult};
use crate::flag::{Flag, FlagKind, FlagState, FlagValue, RuleOperator, TargetingRule};

/// Resolve `flag` against `ctx`.
#[must_use]
pub fn evaluate(flag: &Flag, ctx: &EvaluationContext) -> EvaluationResult {
    if matches!(flag.state, FlagState::Disabled | FlagState::Archived) {
        return EvaluationResult::new(&flag.key, flag.default_value.clone(), reason::FLAG_DISABLED);
    }

    match flag.kind {
        FlagKind::Boolean | FlagKind::Variant => {
            EvaluationResult::new(&flag.key, flag.value.clone(), reason::FALLTHROUGH)
        }
        FlagKind::Rollout => evaluate_rollout(flag, ctx),
        FlagKind::Segment => evaluate_segment(flag, ctx),
    }
}

fn evaluate_rollout(flag: &Flag, ctx: &EvaluationContext) -> EvaluationResult {
    let Some(user_id) = ctx.user_id.as_deref() else {
        return EvaluationResult::new(&flag.key, flag.default_value.clone(), reason::NO_USER_ID);
    };
    let Some(percentage) = flag.percentage else {
        return EvaluationResult::new(
            &flag.key,
            flag.default_value.clone(),
            reason::ROLLOUT_CONFIG_MISSING,
        );
    };

    // The seed defaults to the flag key, so renaming a flag re-buckets it.
    let seed = flag.hash_seed.as_deref().unwrap_or(&flag.key);
    let bucket = rollout_bucket(seed, &flag.key, user_id);
    let included = f64::from(bucket) < percentage;

    EvaluationResult::new(
        &flag.key,
        FlagValue::Bool(included),
        if included {
            reason::ROLLOUT_INCLUDED
        } else {
            reason::ROLLOUT_EXCLUDED
        },
    )
}

fn evaluate_segment(flag: &Flag, ctx: &EvaluationContext) -> EvaluationResult {
    let Some(rules) = flag.rules.as_deref() else {
        return EvaluationResult::new(&flag.key, flag.default_value.clone(), reason::NO_RULES);
    };

    // Rules are OR-ed in declared order; the first match wins.
    for (index, rule) in rules.iter().enumerate() {
        if rule_matches(rule, ctx) {
            return EvaluationResult::new(&flag.key, flag.value.clone(), reason::RULE_MATCH)
                .with_rule_index(index);
        }
    }

    EvaluationResult::new(&flag.key, flag.default_value.clone(), reason::NO_RULE_MATCH)
}

/// Evaluate one rule against the context attributes.
///
/// A missing attribute never matches, regardless of operator or negation
/// target; `negate` flips the operator outcome only when the attribute is
/// present.
#[must_use]
pub fn rule_matches(rule: &TargetingRule, ctx: &EvaluationContext) -> bool {
    let Some(attribute) = ctx.attribute(&rule.attribute) else {
        return false;
    };

    let outcome = match rule.operator {
        RuleOperator::Eq => attribute == rule.value,
        RuleOperator::Neq => attribute != rule.value,
        RuleOperator::Contains => attribute.contains(&rule.value),
        RuleOperator::StartsWith => attribute.starts_with(&rule.value),
        RuleOperator::EndsWith => attribute.ends_with(&rule.value),
        RuleOperator::In => csv_contains(&rule.value, attribute),
        RuleOperator::NotIn => !csv_contains(&rule.value, attribute),
        RuleOperator::Gt => numeric(attribute, &rule.value).is_some_and(|(a, b)| a > b),
        RuleOperator::Gte => numeric(attribute, &rule.value).is_some_and(|(a, b)| a >= b),
        RuleOperator::Lt => numeric(attribute, &rule.value).is_some_and(|(a, b)| a < b),
        RuleOperator::Lte => numeric(attribute, &rule.value).is_some_and(|(a, b)| a <= b),
        RuleOperator::Regex => match Regex::new(&rule.value) {
            Ok(re) => re.is_match(attribute),
            Err(_) => false,
        },
    };

    outcome != rule.negate
}

/// `In`/`NotIn` list membership: split on literal commas, trim each element.
fn csv_contains(list: &str, needle: &str) -> bool {
    list.split(',').any(|item| item.trim() == needle)
}

/// Parse both sides as IEEE-754 doubles; parse failure means no match.
fn numeric(attribute: &str, rule_value: &str) -> Option<(f64, f64)> {
    Some((attribute.parse().ok()?, rule_value.parse().ok()?))
}
