//! `Rule` / `GroupRule` — Top-level executors
//!
//! A rule evaluates its `matchAny` branches (OR) and its `matchFeatures`
//! (AND). On success it expands its templates over the matched elements, lays
//! its static `labels` / `vars` over the expansion, and copies annotations,
//! extended resources and taints verbatim.
//!
//! ```text
//! matchAny ──any branch matched?──► matchFeatures ──matched?──► templates ──► static overrides
//!     │ no                               │ no
//!     └──────────► no-match output ◄─────┘
//! ```
//!
//! # INV: no partial output
//!
//! Any error aborts execution and is returned; nothing expanded before the
//! error is surfaced. A non-matching rule yields empty maps with
//! `match_status.is_match == false`.
//!
//! # Short-circuiting `matchAny`
//!
//! Every branch is evaluated unless `fail_fast` is set **and** the rule has no
//! template that needs per-branch data, in which case evaluation stops at the
//! first matching branch.

use crate::feature_matcher::{FeatureMatcher, MatchAnyElem};
use crate::observe::{NoopObserver, Observer, TemplateKind};
use crate::template::TemplateSource;
use crate::trace::MatchStatus;
use crate::{Features, MatchedFeatures, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Taints
// ═══════════════════════════════════════════════════════════════════════════════

/// Scheduling effect of a taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    /// Do not schedule new pods.
    NoSchedule,
    /// Avoid scheduling new pods.
    PreferNoSchedule,
    /// Evict running pods.
    NoExecute,
}

impl TaintEffect {
    /// Name as written in rule documents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoSchedule => "NoSchedule",
            Self::PreferNoSchedule => "PreferNoSchedule",
            Self::NoExecute => "NoExecute",
        }
    }
}

/// A node taint, copied verbatim from a matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    /// Taint key.
    pub key: String,
    /// Taint value, possibly empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Scheduling effect.
    pub effect: TaintEffect,
}

impl Taint {
    /// Create a taint.
    pub fn new(key: impl Into<String>, value: impl Into<String>, effect: TaintEffect) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            effect,
        }
    }
}

/// `key=value:Effect`, or `key:Effect` without a value.
impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}:{}", self.key, self.effect.as_str())
        } else {
            write!(f, "{}={}:{}", self.key, self.value, self.effect.as_str())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shared matcher evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// The matcher half of a rule, shared by [`Rule`] and [`GroupRule`].
struct Matchers<'a> {
    match_any: &'a [MatchAnyElem],
    match_features: &'a FeatureMatcher,
    has_templates: bool,
}

impl Matchers<'_> {
    /// Evaluate `matchAny` then `matchFeatures`, calling `on_match` with the
    /// matched data of every successful matcher.
    fn run(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
        mut on_match: impl FnMut(&MatchedFeatures) -> Result<(), RuleError>,
    ) -> Result<MatchStatus, RuleError> {
        let mut status = MatchStatus::default();

        if self.match_any.is_empty() && self.match_features.is_empty() {
            on_match(&MatchedFeatures::new())?;
            status.is_match = true;
            return Ok(status);
        }

        if !self.match_any.is_empty() {
            let mut any = false;
            for elem in self.match_any {
                let branch = elem.match_features.evaluate(features, fail_fast, observer)?;
                let matched = branch.is_match;
                if matched {
                    any = true;
                    on_match(&branch.matched_features)?;
                }
                status.match_any.push(branch);
                if matched && fail_fast && !self.has_templates {
                    break;
                }
            }
            if !any {
                return Ok(status);
            }
        }

        if !self.match_features.is_empty() {
            let m = self.match_features.evaluate(features, fail_fast, observer)?;
            let matched = m.is_match;
            if matched {
                on_match(&m.matched_features)?;
            }
            status.match_features = Some(m);
            if !matched {
                return Ok(status);
            }
        }

        status.is_match = true;
        Ok(status)
    }
}

fn expand_into(
    rule: &str,
    kind: TemplateKind,
    template: &TemplateSource,
    matched: &MatchedFeatures,
    out: &mut BTreeMap<String, String>,
    observer: &dyn Observer,
) -> Result<(), RuleError> {
    if template.is_empty() {
        return Ok(());
    }
    let expanded = template.expand(&matched.to_template_data())?;
    observer.template_expanded(rule, kind, &expanded);
    out.extend(expanded);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule
// ═══════════════════════════════════════════════════════════════════════════════

/// A labeling rule.
///
/// # Example
///
/// ```
/// use featrule::prelude::*;
///
/// let rule: Rule = serde_yaml::from_str(r#"
/// name: avx
/// labels: { cpu-avx: "true" }
/// matchFeatures:
///   - feature: cpu.cpuid
///     matchExpressions: [AVX]
/// "#).unwrap();
///
/// let features = Features::new().with_flags("cpu.cpuid", ["AVX"]);
/// let out = rule.execute(&features, true).unwrap();
/// assert_eq!(out.labels["cpu-avx"], "true");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Rule name, used in diagnostics and back-references.
    pub name: String,
    /// Static labels, applied after `labels_template`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Template producing `key=value` label lines.
    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub labels_template: TemplateSource,
    /// Static annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Static vars, applied after `vars_template`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    /// Template producing `key=value` var lines.
    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub vars_template: TemplateSource,
    /// Extended resources to advertise.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_resources: BTreeMap<String, String>,
    /// Taints to apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    /// AND matcher.
    #[serde(default, skip_serializing_if = "FeatureMatcher::is_empty")]
    pub match_features: FeatureMatcher,
    /// OR of AND matchers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<MatchAnyElem>,
}

/// What a rule produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutput {
    /// Output labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Output annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Output extended resources.
    #[serde(default)]
    pub extended_resources: BTreeMap<String, String>,
    /// Output vars.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Output taints.
    #[serde(default)]
    pub taints: Vec<Taint>,
    /// Diagnostics of the evaluation.
    #[serde(default)]
    pub match_status: MatchStatus,
}

impl RuleOutput {
    /// Returns `true` if the rule matched.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.match_status.is_match
    }
}

impl Rule {
    /// Create an empty rule that matches unconditionally.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Execute with no observer.
    ///
    /// # Errors
    ///
    /// Returns the first matcher or template error.
    pub fn execute(&self, features: &Features, fail_fast: bool) -> Result<RuleOutput, RuleError> {
        self.execute_with(features, fail_fast, &NoopObserver)
    }

    /// Execute, reporting to `observer`.
    ///
    /// # Errors
    ///
    /// Returns the first matcher or template error. The observer sees it via
    /// [`Observer::rule_failed`].
    pub fn execute_with(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
    ) -> Result<RuleOutput, RuleError> {
        self.run(features, fail_fast, observer)
            .inspect_err(|e| observer.rule_failed(&self.name, e))
    }

    fn run(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
    ) -> Result<RuleOutput, RuleError> {
        let mut labels = BTreeMap::new();
        let mut vars = BTreeMap::new();

        let matchers = Matchers {
            match_any: &self.match_any,
            match_features: &self.match_features,
            has_templates: !self.labels_template.is_empty() || !self.vars_template.is_empty(),
        };
        let status = matchers.run(features, fail_fast, observer, |matched| {
            expand_into(&self.name, TemplateKind::Labels, &self.labels_template, matched, &mut labels, observer)?;
            expand_into(&self.name, TemplateKind::Vars, &self.vars_template, matched, &mut vars, observer)
        })?;
        observer.rule_evaluated(&self.name, &status);

        if !status.is_match {
            return Ok(RuleOutput {
                match_status: status,
                ..RuleOutput::default()
            });
        }

        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(RuleOutput {
            labels,
            annotations: self.annotations.clone(),
            extended_resources: self.extended_resources.clone(),
            vars,
            taints: self.taints.clone(),
            match_status: status,
        })
    }

    /// Validate every expression and parse both templates.
    ///
    /// # Errors
    ///
    /// Returns the first invalid expression, feature name or template.
    pub fn validate(&self) -> Result<(), RuleError> {
        validate_matchers(&self.match_features, &self.match_any)?;
        self.labels_template.template()?;
        self.vars_template.template()?;
        Ok(())
    }
}

fn validate_matchers(match_features: &FeatureMatcher, match_any: &[MatchAnyElem]) -> Result<(), RuleError> {
    match_features.validate()?;
    match_any
        .iter()
        .try_for_each(|elem| elem.match_features.validate())
}

// ═══════════════════════════════════════════════════════════════════════════════
// GroupRule
// ═══════════════════════════════════════════════════════════════════════════════

/// A rule producing only vars and a match status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRule {
    /// Rule name.
    pub name: String,
    /// Static vars, applied after `vars_template`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    /// Template producing `key=value` var lines.
    #[serde(default, skip_serializing_if = "TemplateSource::is_empty")]
    pub vars_template: TemplateSource,
    /// AND matcher.
    #[serde(default, skip_serializing_if = "FeatureMatcher::is_empty")]
    pub match_features: FeatureMatcher,
    /// OR of AND matchers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_any: Vec<MatchAnyElem>,
}

/// What a group rule produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRuleOutput {
    /// Output vars.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Diagnostics of the evaluation.
    #[serde(default)]
    pub match_status: MatchStatus,
}

impl GroupRule {
    /// Execute with no observer.
    ///
    /// # Errors
    ///
    /// Returns the first matcher or template error.
    pub fn execute(&self, features: &Features, fail_fast: bool) -> Result<GroupRuleOutput, RuleError> {
        self.execute_with(features, fail_fast, &NoopObserver)
    }

    /// Execute, reporting to `observer`.
    ///
    /// # Errors
    ///
    /// Returns the first matcher or template error.
    pub fn execute_with(
        &self,
        features: &Features,
        fail_fast: bool,
        observer: &dyn Observer,
    ) -> Result<GroupRuleOutput, RuleError> {
        let mut vars = BTreeMap::new();
        let matchers = Matchers {
            match_any: &self.match_any,
            match_features: &self.match_features,
            has_templates: !self.vars_template.is_empty(),
        };
        let status = matchers
            .run(features, fail_fast, observer, |matched| {
                expand_into(&self.name, TemplateKind::Vars, &self.vars_template, matched, &mut vars, observer)
            })
            .inspect_err(|e| observer.rule_failed(&self.name, e))?;
        observer.rule_evaluated(&self.name, &status);

        if !status.is_match {
            return Ok(GroupRuleOutput {
                vars: BTreeMap::new(),
                match_status: status,
            });
        }
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(GroupRuleOutput {
            vars,
            match_status: status,
        })
    }

    /// Validate every expression and parse the template.
    ///
    /// # Errors
    ///
    /// Returns the first invalid expression, feature name or template.
    pub fn validate(&self) -> Result<(), RuleError> {
        validate_matchers(&self.match_features, &self.match_any)?;
        self.vars_template.template()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_matcher::FeatureMatcherTerm;
    use crate::{MatchExpression, MatchExpressionSet, MatchOp};
    use std::sync::Mutex;

    fn exists(feature: &str, key: &str) -> FeatureMatcher {
        FeatureMatcher::new(vec![FeatureMatcherTerm::expressions(
            feature,
            MatchExpressionSet::new().with(key, MatchExpression::op(MatchOp::Exists)),
        )])
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn scenario_a() -> Rule {
        Rule {
            labels: labels(&[("l1", "v1")]),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("a")
        }
    }

    #[test]
    fn static_labels_on_match() {
        let features = Features::new().with_flags("d.kf", ["k1"]);
        let out = scenario_a().execute(&features, true).unwrap();
        assert!(out.is_match());
        assert_eq!(out.labels, labels(&[("l1", "v1")]));
    }

    #[test]
    fn absent_feature_is_no_match_not_error() {
        let out = scenario_a().execute(&Features::new(), true).unwrap();
        assert!(!out.is_match());
        assert!(out.labels.is_empty());
    }

    #[test]
    fn vars_template_from_attributes() {
        let rule = Rule {
            vars_template: "{{range .d.feat}}{{.Name}}={{.Value}}\n{{end}}".into(),
            match_features: exists("d.feat", "a-1"),
            ..Rule::new("b")
        };
        let features = Features::new().with_attributes("d.feat", [("a-1", "v-1")]);
        let out = rule.execute(&features, true).unwrap();
        assert_eq!(out.vars, labels(&[("a-1", "v-1")]));
    }

    #[test]
    fn malformed_template_line_is_error() {
        let rule = Rule {
            labels_template: "justkey".into(),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("d")
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        assert!(matches!(
            rule.execute(&features, true),
            Err(RuleError::MissingTemplateValue { .. })
        ));
    }

    #[test]
    fn static_entries_override_template() {
        let rule = Rule {
            labels: labels(&[("k1", "static")]),
            labels_template: "{{range .d.kf}}{{.Name}}=tmpl\n{{end}}".into(),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("override")
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        let out = rule.execute(&features, true).unwrap();
        assert_eq!(out.labels, labels(&[("k1", "static")]));
    }

    #[test]
    fn unconditional_rule_matches() {
        let rule = Rule {
            labels: labels(&[("always", "true")]),
            taints: vec![Taint::new("t", "", TaintEffect::NoSchedule)],
            annotations: labels(&[("a", "b")]),
            ..Rule::new("always")
        };
        let out = rule.execute(&Features::new(), true).unwrap();
        assert!(out.is_match());
        assert_eq!(out.labels["always"], "true");
        assert_eq!(out.annotations["a"], "b");
        assert_eq!(out.taints.len(), 1);
    }

    #[test]
    fn match_any_ors_branches() {
        let rule = Rule {
            labels: labels(&[("any", "true")]),
            match_any: vec![
                MatchAnyElem::new(exists("d.kf", "nope")),
                MatchAnyElem::new(exists("d.kf", "k1")),
            ],
            ..Rule::new("any")
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        let out = rule.execute(&features, true).unwrap();
        assert!(out.is_match());
        assert_eq!(out.match_status.match_any.len(), 2);

        let out = rule.execute(&Features::new(), true).unwrap();
        assert!(!out.is_match());
        assert!(out.labels.is_empty());
    }

    #[test]
    fn match_any_stops_early_without_templates() {
        let rule = Rule {
            labels: labels(&[("any", "true")]),
            match_any: vec![
                MatchAnyElem::new(exists("d.kf", "k1")),
                MatchAnyElem::new(exists("d.kf", "k2")),
            ],
            ..Rule::new("early")
        };
        let features = Features::new().with_flags("d.kf", ["k1", "k2"]);
        let out = rule.execute(&features, true).unwrap();
        assert_eq!(out.match_status.match_any.len(), 1);
        let out = rule.execute(&features, false).unwrap();
        assert_eq!(out.match_status.match_any.len(), 2);
    }

    #[test]
    fn match_any_expands_every_matching_branch() {
        let rule = Rule {
            labels_template: "{{range .d.kf}}{{.Name}}=yes\n{{end}}".into(),
            match_any: vec![
                MatchAnyElem::new(exists("d.kf", "k1")),
                MatchAnyElem::new(exists("d.kf", "k2")),
            ],
            ..Rule::new("all-branches")
        };
        let features = Features::new().with_flags("d.kf", ["k1", "k2"]);
        let out = rule.execute(&features, true).unwrap();
        assert_eq!(out.labels, labels(&[("k1", "yes"), ("k2", "yes")]));
    }

    #[test]
    fn match_features_failure_discards_match_any_output() {
        let rule = Rule {
            labels_template: "{{range .d.kf}}{{.Name}}=yes\n{{end}}".into(),
            match_any: vec![MatchAnyElem::new(exists("d.kf", "k1"))],
            match_features: exists("d.kf", "missing"),
            ..Rule::new("and")
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        let out = rule.execute(&features, true).unwrap();
        assert!(!out.is_match());
        assert!(out.labels.is_empty());
    }

    #[test]
    fn missing_template_key_is_error() {
        let rule = Rule {
            labels_template: "{{range .d.typo}}{{.Name}}=x{{end}}".into(),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("typo")
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        assert!(matches!(
            rule.execute(&features, false),
            Err(RuleError::Template(_))
        ));
    }

    #[test]
    fn execution_is_idempotent() {
        let rule = Rule {
            labels_template: "{{range .d.kf}}{{.Name}}=1\n{{end}}".into(),
            labels: labels(&[("s", "t")]),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("idem")
        };
        let features = Features::new().with_flags("d.kf", ["k1", "k2"]);
        let a = rule.execute(&features, false).unwrap();
        let b = rule.execute(&features, false).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[derive(Default)]
    struct Recorder {
        failed: Mutex<Vec<String>>,
        evaluated: Mutex<Vec<(String, bool)>>,
    }

    impl Observer for Recorder {
        fn rule_evaluated(&self, rule: &str, status: &MatchStatus) {
            self.evaluated
                .lock()
                .unwrap()
                .push((rule.to_owned(), status.is_match));
        }

        fn rule_failed(&self, rule: &str, _error: &RuleError) {
            self.failed.lock().unwrap().push(rule.to_owned());
        }
    }

    #[test]
    fn observer_sees_results_and_failures() {
        let recorder = Recorder::default();
        let features = Features::new().with_flags("d.kf", ["k1"]);
        scenario_a().execute_with(&features, true, &recorder).unwrap();

        let bad = Rule {
            labels_template: "nokey".into(),
            match_features: exists("d.kf", "k1"),
            ..Rule::new("bad")
        };
        assert!(bad.execute_with(&features, true, &recorder).is_err());

        assert_eq!(recorder.evaluated.lock().unwrap().as_slice(), &[("a".to_string(), true)]);
        assert_eq!(recorder.failed.lock().unwrap().as_slice(), &["bad".to_string()]);
    }

    #[test]
    fn group_rule_vars_only() {
        let rule = GroupRule {
            name: "g".into(),
            vars: labels(&[("static", "1")]),
            vars_template: "{{range .d.kf}}{{.Name}}=found\n{{end}}".into(),
            match_features: exists("d.kf", "k1"),
            match_any: Vec::new(),
        };
        let features = Features::new().with_flags("d.kf", ["k1"]);
        let out = rule.execute(&features, false).unwrap();
        assert!(out.match_status.is_match);
        assert_eq!(out.vars, labels(&[("k1", "found"), ("static", "1")]));

        let out = rule.execute(&Features::new(), false).unwrap();
        assert!(!out.match_status.is_match);
        assert!(out.vars.is_empty());
    }

    #[test]
    fn validate_catches_bad_parts() {
        let mut rule = scenario_a();
        assert!(rule.validate().is_ok());

        rule.labels_template = "{{range .x}}".into();
        assert!(rule.validate().is_err());

        let bad_expr = Rule {
            match_features: FeatureMatcher::new(vec![FeatureMatcherTerm::expressions(
                "d.kf",
                MatchExpressionSet::new().with("k", MatchExpression::new(MatchOp::Gt, ["x"])),
            )]),
            ..Rule::new("bad")
        };
        assert!(bad_expr.validate().is_err());
    }

    #[test]
    fn deserialize_full_rule() {
        let yaml = r#"
name: gpu
labels: { gpu: "true" }
labelsTemplate: |
  {{range .pci.device}}vendor-{{.vendor}}=true
  {{end}}
annotations: { note: x }
extendedResources: { example.com/gpu: "1" }
taints:
  - key: gpu
    effect: NoSchedule
matchAny:
  - matchFeatures:
      - feature: pci.device
        matchExpressions:
          vendor: { op: In, value: ["10de"] }
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.validate().is_ok());
        assert_eq!(rule.taints[0].to_string(), "gpu:NoSchedule");

        let features = Features::new().with_instances(
            "pci.device",
            [crate::InstanceFeature::new([("vendor", "10de")])],
        );
        let out = rule.execute(&features, true).unwrap();
        assert_eq!(out.labels, labels(&[("gpu", "true"), ("vendor-10de", "true")]));
        assert_eq!(out.extended_resources["example.com/gpu"], "1");
    }

    #[test]
    fn taint_display_with_value() {
        let t = Taint::new("k", "v", TaintEffect::PreferNoSchedule);
        assert_eq!(t.to_string(), "k=v:PreferNoSchedule");
    }

    #[test]
    fn rules_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Rule>();
        assert_send_sync::<GroupRule>();
        assert_send_sync::<RuleOutput>();
    }
}
