//! Match status types for diagnosing rule behavior.
//!
//! Status types mirror the rule structure ([`FeatureMatcher`], `matchAny`) but
//! capture evaluation results instead of inputs. Validation, dry-run and
//! image-compatibility tooling serialize them to JSON to show exactly which
//! sub-expressions succeeded or failed against a node.
//!
//! # Two Levels of Status
//!
//! - [`MatchFeatureStatus`] — Per feature matcher: matched elements, fired terms,
//!   and one [`MatchedExpression`] per evaluated expression.
//! - [`MatchStatus`] — Per rule: the `matchFeatures` status plus one status per
//!   evaluated `matchAny` branch.
//!
//! # Exhaustiveness
//!
//! With `fail_fast = false` every term and expression is evaluated and recorded.
//! With `fail_fast = true` recording stops where evaluation stops.

use crate::{FeatureMatcher, MatchExpression, MatchedFeatures};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a term an expression came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatcherType {
    /// An entry of `matchExpressions` (tests values / presence).
    MatchExpression,
    /// The term's `matchName` (tests key names).
    MatchName,
}

/// One evaluated expression and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedExpression {
    /// Feature the term targeted (`domain.name`).
    pub feature: String,
    /// Expression name; `None` for `matchName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The expression itself.
    pub expression: MatchExpression,
    /// Where the expression came from.
    pub matcher_type: MatcherType,
    /// Whether it succeeded.
    pub is_match: bool,
}

impl fmt::Display for MatchedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_match { "match" } else { "no match" };
        match &self.name {
            Some(name) => write!(f, "{}: {name} {} => {mark}", self.feature, self.expression),
            None => write!(f, "{}: name {} => {mark}", self.feature, self.expression),
        }
    }
}

/// Result of evaluating one [`FeatureMatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFeatureStatus {
    /// Whether every term matched.
    pub is_match: bool,
    /// Elements that satisfied the terms, for templating.
    #[serde(default)]
    pub matched_features: MatchedFeatures,
    /// The subset of terms (and expressions within them) that fired.
    #[serde(default)]
    pub matched_terms: FeatureMatcher,
    /// Every evaluated expression, in evaluation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<MatchedExpression>,
}

impl MatchFeatureStatus {
    /// Expressions that failed.
    pub fn failed(&self) -> impl Iterator<Item = &MatchedExpression> {
        self.expressions.iter().filter(|e| !e.is_match)
    }
}

/// Result of evaluating a whole rule's matchers.
///
/// # INV: `is_match` == rule outcome
///
/// `is_match` is `true` exactly when the rule produced output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatus {
    /// Whether the rule matched.
    pub is_match: bool,
    /// Status of `matchFeatures`, if it was evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_features: Option<MatchFeatureStatus>,
    /// Status of each evaluated `matchAny` branch, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<MatchFeatureStatus>,
}

impl MatchStatus {
    /// All expression outcomes, `matchAny` branches first.
    pub fn expressions(&self) -> impl Iterator<Item = &MatchedExpression> {
        self.match_any
            .iter()
            .chain(self.match_features.iter())
            .flat_map(|s| s.expressions.iter())
    }
}
