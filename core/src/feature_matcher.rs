//! `FeatureMatcher` — AND of per-feature terms
//!
//! A term names one feature (`domain.name`) and tests it with an expression set
//! (`matchExpressions`), a name expression (`matchName`), or both. A
//! [`FeatureMatcher`] ANDs its terms in document order; a `matchAny` list ORs
//! several feature matchers (see [`Rule`](crate::Rule)).
//!
//! # Evaluation modes
//!
//! - `fail_fast = true` — the first failing term ends evaluation with no match
//!   and no collected data.
//! - `fail_fast = false` — every term is evaluated so the returned
//!   [`MatchFeatureStatus`] is exhaustive; the overall result is still `false`
//!   if any term failed.
//!
//! Errors always abort, in both modes.

use crate::observe::Observer;
use crate::shape::{match_multi, match_names_multi};
use crate::trace::{MatchFeatureStatus, MatchedExpression, MatcherType};
use crate::{Features, MatchExpression, MatchExpressionSet, RuleError};
use serde::{Deserialize, Serialize};

/// One per-feature term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMatcherTerm {
    /// Target feature as `domain.name`.
    pub feature: String,
    /// Tests values / presence (AND).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<MatchExpressionSet>,
    /// Tests the names of keys, attributes and instance attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_name: Option<MatchExpression>,
}

impl FeatureMatcherTerm {
    /// A term with only `matchExpressions`.
    pub fn expressions(feature: impl Into<String>, set: MatchExpressionSet) -> Self {
        Self {
            feature: feature.into(),
            match_expressions: Some(set),
            match_name: None,
        }
    }

    /// A term with only `matchName`.
    pub fn name(feature: impl Into<String>, expr: MatchExpression) -> Self {
        Self {
            feature: feature.into(),
            match_expressions: None,
            match_name: Some(expr),
        }
    }

    /// Split `feature` into `(domain, name)` at the first `.`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidFeatureName`] if there is no `.` or either
    /// side is empty.
    pub fn split_feature(&self) -> Result<(&str, &str), RuleError> {
        match self.feature.split_once('.') {
            Some((d, n)) if !d.is_empty() && !n.is_empty() => Ok((d, n)),
            _ => Err(RuleError::InvalidFeatureName {
                feature: self.feature.clone(),
            }),
        }
    }

    /// Validate the feature name and every expression.
    ///
    /// # Errors
    ///
    /// Returns the first invalid feature name or expression.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.split_feature()?;
        if let Some(set) = &self.match_expressions {
            set.validate()?;
        }
        if let Some(expr) = &self.match_name {
            expr.validate()?;
        }
        Ok(())
    }
}

/// Ordered list of terms, ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMatcher(pub Vec<FeatureMatcherTerm>);

impl FeatureMatcher {
    /// Create a matcher from terms.
    #[must_use]
    pub fn new(terms: Vec<FeatureMatcherTerm>) -> Self {
        Self(terms)
    }

    /// Returns `true` if there are no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the terms.
    pub fn iter(&self) -> std::slice::Iter<'_, FeatureMatcherTerm> {
        self.0.iter()
    }

    /// Validate every term.
    ///
    /// # Errors
    ///
    /// Returns the first invalid term.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.0.iter().try_for_each(FeatureMatcherTerm::validate)
    }

    /// Evaluate all terms against `features`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid feature name or a failing expression,
    /// regardless of `fail_fast`.
    pub fn evaluate(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
    ) -> Result<MatchFeatureStatus, RuleError> {
        let mut status = MatchFeatureStatus {
            is_match: true,
            ..MatchFeatureStatus::default()
        };

        for term in &self.0 {
            let (domain, name) = term.split_feature()?;
            let view = features.view(&term.feature);

            if view.is_absent() {
                observer.term_evaluated(&term.feature, false);
                status.is_match = false;
                if fail_fast {
                    return Ok(MatchFeatureStatus::default());
                }
                continue;
            }

            let mut term_ok = true;
            let mut elements = Vec::new();
            let mut fired = FeatureMatcherTerm {
                feature: term.feature.clone(),
                ..FeatureMatcherTerm::default()
            };

            if let Some(set) = &term.match_expressions {
                let m = match_multi(set, view, fail_fast)?;
                let mut fired_set = MatchExpressionSet::new();
                for (expr_name, ok) in &m.outcomes {
                    let Some(expr) = set.get(expr_name) else {
                        continue;
                    };
                    status.expressions.push(MatchedExpression {
                        feature: term.feature.clone(),
                        name: Some(expr_name.clone()),
                        expression: expr.clone(),
                        matcher_type: MatcherType::MatchExpression,
                        is_match: *ok,
                    });
                    if *ok {
                        fired_set.insert(expr_name.clone(), expr.clone());
                    }
                }
                if !fired_set.is_empty() {
                    fired.match_expressions = Some(fired_set);
                }
                term_ok = m.is_match;
                elements.extend(m.elements);
            }

            if let Some(expr) = &term.match_name {
                if term_ok || !fail_fast {
                    let m = match_names_multi(expr, view)?;
                    status.expressions.push(MatchedExpression {
                        feature: term.feature.clone(),
                        name: None,
                        expression: expr.clone(),
                        matcher_type: MatcherType::MatchName,
                        is_match: m.is_match,
                    });
                    if m.is_match {
                        fired.match_name = Some(expr.clone());
                    }
                    term_ok = term_ok && m.is_match;
                    elements.extend(m.elements);
                }
            }

            observer.term_evaluated(&term.feature, term_ok);
            if !term_ok {
                status.is_match = false;
                if fail_fast {
                    return Ok(MatchFeatureStatus::default());
                }
            }

            status.matched_features.record(domain, name, elements);
            if fired.match_expressions.is_some() || fired.match_name.is_some() {
                status.matched_terms.0.push(fired);
            }
        }

        Ok(status)
    }
}

impl FromIterator<FeatureMatcherTerm> for FeatureMatcher {
    fn from_iter<T: IntoIterator<Item = FeatureMatcherTerm>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One OR-branch of `matchAny`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnyElem {
    /// The AND-matcher of this branch.
    pub match_features: FeatureMatcher,
}

impl MatchAnyElem {
    /// Wrap a feature matcher as a branch.
    #[must_use]
    pub fn new(match_features: FeatureMatcher) -> Self {
        Self { match_features }
    }
}
