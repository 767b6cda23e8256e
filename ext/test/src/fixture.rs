//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs them against the featrule engine.
//!
//! ```yaml
//! name: cpu flags
//! description: presence checks on a flag feature
//! features:
//!   flags:
//!     cpu.cpuid: { elements: { AVX: {} } }
//! cases:
//!   - name: avx present
//!     rule:
//!       name: avx
//!       labels: { avx: "true" }
//!       matchFeatures: [{ feature: cpu.cpuid, matchExpressions: [AVX] }]
//!     expect:
//!       match: true
//!       labels: { avx: "true" }
//! ```
//!
//! A case holds either one `rule` or an ordered list of `rules` (run as a
//! [`RuleSet`]). Only the expectations that are present are checked.

use featrule::prelude::*;
use featrule::RuleDocument;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A complete test fixture
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Features,
    pub cases: Vec<TestCase>,
}

/// Test case
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub rule: Option<RuleDocument>,
    #[serde(default)]
    pub rules: Vec<RuleDocument>,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    #[serde(default)]
    pub expect: Expectation,
}

fn default_fail_fast() -> bool {
    true
}

/// What a case expects. Absent fields are not checked.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    #[serde(rename = "match")]
    pub is_match: Option<bool>,
    #[serde(default)]
    pub error: bool,
    pub labels: Option<BTreeMap<String, String>>,
    pub vars: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub extended_resources: Option<BTreeMap<String, String>>,
    pub taints: Option<Vec<Taint>>,
    /// Rule-set cases: names of the rules that matched.
    pub matched: Option<Vec<String>>,
    /// Number of `matchAny` branches that were evaluated.
    pub branches_evaluated: Option<usize>,
    /// Number of failed expressions recorded in diagnostics.
    pub failed_expressions: Option<usize>,
}

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub mismatches: Vec<String>,
}

/// Outcome normalized across single rules and rule sets.
#[derive(Debug, Default)]
struct Actual {
    is_match: bool,
    error: Option<String>,
    labels: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    extended_resources: BTreeMap<String, String>,
    taints: Vec<Taint>,
    matched: Vec<String>,
    status: Option<MatchStatus>,
}

impl Actual {
    fn from_rule(result: Result<RuleOutput, RuleError>) -> Self {
        match result {
            Ok(out) => Self {
                is_match: out.is_match(),
                labels: out.labels,
                vars: out.vars,
                annotations: out.annotations,
                extended_resources: out.extended_resources,
                taints: out.taints,
                status: Some(out.match_status),
                ..Self::default()
            },
            Err(e) => Self {
                error: Some(e.to_string()),
                ..Self::default()
            },
        }
    }

    fn from_set(out: featrule::RuleSetOutput) -> Self {
        Self {
            is_match: !out.matched.is_empty(),
            error: out
                .failures
                .first()
                .map(|f| format!("{}: {}", f.rule, f.error)),
            labels: out.labels,
            vars: out.vars,
            annotations: out.annotations,
            extended_resources: out.extended_resources,
            taints: out.taints,
            matched: out.matched,
            status: None,
        }
    }
}

fn check<T: PartialEq + std::fmt::Debug>(
    mismatches: &mut Vec<String>,
    what: &str,
    expected: Option<&T>,
    actual: &T,
) {
    if let Some(expected) = expected {
        if expected != actual {
            mismatches.push(format!("{what}: expected {expected:?}, got {actual:?}"));
        }
    }
}

impl TestCase {
    fn execute(&self, features: &Features) -> Actual {
        match &self.rule {
            Some(doc) => Actual::from_rule(doc.clone().into_rule().execute(features, self.fail_fast)),
            None => {
                let set: RuleSet = self.rules.iter().cloned().map(RuleDocument::into_rule).collect();
                Actual::from_set(set.execute(features, self.fail_fast))
            }
        }
    }

    /// Run this case against `features`.
    pub fn run(&self, features: &Features) -> CaseResult {
        let actual = self.execute(features);
        let expect = &self.expect;
        let mut mismatches = Vec::new();

        match (&actual.error, expect.error) {
            (Some(e), false) => mismatches.push(format!("unexpected error: {e}")),
            (None, true) => mismatches.push("expected an error".to_string()),
            _ => {}
        }
        if actual.error.is_none() {
            check(&mut mismatches, "match", expect.is_match.as_ref(), &actual.is_match);
            check(&mut mismatches, "labels", expect.labels.as_ref(), &actual.labels);
            check(&mut mismatches, "vars", expect.vars.as_ref(), &actual.vars);
            check(&mut mismatches, "annotations", expect.annotations.as_ref(), &actual.annotations);
            check(
                &mut mismatches,
                "extendedResources",
                expect.extended_resources.as_ref(),
                &actual.extended_resources,
            );
            check(&mut mismatches, "taints", expect.taints.as_ref(), &actual.taints);
            check(&mut mismatches, "matched", expect.matched.as_ref(), &actual.matched);
            if let Some(status) = &actual.status {
                check(
                    &mut mismatches,
                    "branchesEvaluated",
                    expect.branches_evaluated.as_ref(),
                    &status.match_any.len(),
                );
                let failed = status.expressions().filter(|e| !e.is_match).count();
                check(
                    &mut mismatches,
                    "failedExpressions",
                    expect.failed_expressions.as_ref(),
                    &failed,
                );
            }
        }

        CaseResult {
            case_name: self.name.clone(),
            passed: mismatches.is_empty(),
            mismatches,
        }
    }
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Run all test cases and return results
    pub fn run(&self) -> Vec<CaseResult> {
        self.cases.iter().map(|case| case.run(&self.features)).collect()
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        for result in self.run() {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed:\n  {}",
                self.name,
                result.case_name,
                result.mismatches.join("\n  ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
name: inline
features:
  flags:
    cpu.cpuid: { elements: { AVX: {} } }
cases:
  - name: hit
    rule:
      name: avx
      labels: { avx: "true" }
      matchFeatures: [{ feature: cpu.cpuid, matchExpressions: [AVX] }]
    expect: { match: true, labels: { avx: "true" } }
  - name: wrong expectation
    rule:
      name: avx
      matchFeatures: [{ feature: cpu.cpuid, matchExpressions: [AVX] }]
    expect: { match: false }
"#;

    #[test]
    fn runner_reports_mismatches() {
        let fixture = Fixture::from_yaml(FIXTURE).unwrap();
        let results = fixture.run();
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].mismatches.len(), 1);
    }

    #[test]
    fn multi_document() {
        let yaml = format!("{FIXTURE}\n---\n{FIXTURE}");
        assert_eq!(Fixture::from_yaml_multi(&yaml).unwrap().len(), 2);
    }
}
