//! `RuleSet` — Ordered rule execution with back-references
//!
//! Rules run in document order over a private copy of the feature store. After
//! a rule matches, its output labels and vars are written as attributes of the
//! [`RULE_BACKREF_FEATURE`] feature, so later rules can match on earlier
//! results:
//!
//! ```yaml
//! - name: needs-avx-rule
//!   matchFeatures:
//!     - feature: rule.matched
//!       matchExpressions: { cpu-avx: { op: IsTrue } }
//! ```
//!
//! A failing rule is recorded in [`RuleSetOutput::failures`] and contributes
//! nothing; the remaining rules still run.

use crate::observe::{NoopObserver, Observer};
use crate::rule::{Rule, Taint};
use crate::{Features, RuleError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Attribute feature holding the labels and vars of rules matched so far.
pub const RULE_BACKREF_FEATURE: &str = "rule.matched";

/// An ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Rules in execution order.
    pub rules: Vec<Rule>,
}

/// A rule that errored during set execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    /// Name of the rule.
    pub rule: String,
    /// What went wrong.
    pub error: RuleError,
}

/// Merged output of a [`RuleSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetOutput {
    /// Merged labels, later rules winning.
    pub labels: BTreeMap<String, String>,
    /// Merged annotations, later rules winning.
    pub annotations: BTreeMap<String, String>,
    /// Merged extended resources, later rules winning.
    pub extended_resources: BTreeMap<String, String>,
    /// Merged vars, later rules winning.
    pub vars: BTreeMap<String, String>,
    /// Taints of every matching rule, in rule order.
    pub taints: Vec<Taint>,
    /// Names of the rules that matched, in rule order.
    pub matched: Vec<String>,
    /// Rules that errored.
    #[serde(skip)]
    pub failures: Vec<RuleFailure>,
}

impl RuleSetOutput {
    /// Returns `true` if no rule errored.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

impl RuleSet {
    /// Create a rule set.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate every rule, collecting one error per invalid rule.
    #[must_use]
    pub fn validate(&self) -> Vec<RuleFailure> {
        self.rules
            .iter()
            .filter_map(|rule| {
                rule.validate().err().map(|error| RuleFailure {
                    rule: rule.name.clone(),
                    error,
                })
            })
            .collect()
    }

    /// Execute with no observer.
    #[must_use]
    pub fn execute(&self, features: &Features, fail_fast: bool) -> RuleSetOutput {
        self.execute_with(features, fail_fast, &NoopObserver)
    }

    /// Execute every rule in order, reporting to `observer`.
    #[must_use]
    pub fn execute_with(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
    ) -> RuleSetOutput {
        let mut features = features.clone();
        let mut out = RuleSetOutput::default();

        for rule in &self.rules {
            let result = match rule.execute_with(&features, fail_fast, observer) {
                Ok(result) => result,
                Err(error) => {
                    out.failures.push(RuleFailure {
                        rule: rule.name.clone(),
                        error,
                    });
                    continue;
                }
            };
            if !result.is_match() {
                continue;
            }

            features.insert_attributes(
                RULE_BACKREF_FEATURE,
                result.labels.iter().chain(result.vars.iter()),
            );
            out.matched.push(rule.name.clone());
            out.labels.extend(result.labels);
            out.annotations.extend(result.annotations);
            out.extended_resources.extend(result.extended_resources);
            out.vars.extend(result.vars);
            out.taints.extend(result.taints);
        }

        out
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
