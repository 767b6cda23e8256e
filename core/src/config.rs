//! Decoding rule and feature documents.
//!
//! # Rule documents
//!
//! A file holds one or more YAML documents (or one JSON document), each being
//! one of:
//!
//! | Shape | Example |
//! |-------|---------|
//! | [`NodeFeatureRule`] object | `apiVersion: ...`, `kind: NodeFeatureRule`, `spec: { rules: [...] }` |
//! | bare spec | `rules: [...]` |
//! | bare rule list | `[ { name: ..., ... } ]` |
//!
//! Each rule entry decodes to a [`RuleDocument`]: the legacy shape when it
//! carries a `matchOn` key, the modern [`Rule`] otherwise. The choice is made
//! once, here.
//!
//! # Feature documents
//!
//! Either a bare [`Features`] store or a `NodeFeature` object whose
//! `spec.features` holds it.

use crate::feature_matcher::{FeatureMatcher, FeatureMatcherTerm, MatchAnyElem};
use crate::rule::Rule;
use crate::rule_set::RuleSet;
use crate::{Features, MatchExpressionSet, RuleError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The pre-`matchFeatures` rule shape.
///
/// Each `matchOn` element is one AND-branch mapping feature names to expression
/// sets; the list is OR-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRule {
    /// Rule name; also the key of the label it produces.
    pub name: String,
    /// Extra static labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Value of the `name` label.
    #[serde(default = "default_legacy_value")]
    pub value: String,
    /// OR-list of AND-branches.
    pub match_on: Vec<BTreeMap<String, MatchExpressionSet>>,
}

fn default_legacy_value() -> String {
    "true".to_owned()
}

impl LegacyRule {
    /// Convert into a [`Rule`] with one `matchAny` branch per `matchOn` entry.
    #[must_use]
    pub fn into_rule(self) -> Rule {
        let match_any = self
            .match_on
            .into_iter()
            .map(|branch| {
                MatchAnyElem::new(
                    branch
                        .into_iter()
                        .map(|(feature, set)| FeatureMatcherTerm::expressions(feature, set))
                        .collect::<FeatureMatcher>(),
                )
            })
            .collect();
        let mut labels = self.labels;
        labels.insert(self.name.clone(), self.value);
        Rule {
            name: self.name,
            labels,
            match_any,
            ..Rule::default()
        }
    }
}

/// One rule entry, resolved to its shape at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RuleDocument {
    /// `matchFeatures` / `matchAny` rule.
    Modern(Rule),
    /// `matchOn` rule.
    Legacy(LegacyRule),
}

impl RuleDocument {
    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Modern(r) => &r.name,
            Self::Legacy(r) => &r.name,
        }
    }

    /// Convert to an executable [`Rule`].
    #[must_use]
    pub fn into_rule(self) -> Rule {
        match self {
            Self::Modern(r) => r,
            Self::Legacy(r) => r.into_rule(),
        }
    }
}

impl<'de> Deserialize<'de> for RuleDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("matchOn").is_some() {
            LegacyRule::deserialize(value)
                .map(Self::Legacy)
                .map_err(D::Error::custom)
        } else {
            Rule::deserialize(value)
                .map(Self::Modern)
                .map_err(D::Error::custom)
        }
    }
}

/// Object metadata; only the name is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
}

/// `spec` of a [`NodeFeatureRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFeatureRuleSpec {
    /// Rules in execution order.
    #[serde(default)]
    pub rules: Vec<RuleDocument>,
}

/// A `NodeFeatureRule` custom resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeatureRule {
    /// API group/version.
    #[serde(default)]
    pub api_version: String,
    /// Resource kind.
    #[serde(default)]
    pub kind: String,
    /// Metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The rules.
    pub spec: NodeFeatureRuleSpec,
}

fn decode_err(e: impl std::fmt::Display) -> RuleError {
    RuleError::Decode(e.to_string())
}

fn rules_from_value(doc: serde_json::Value, out: &mut Vec<Rule>) -> Result<(), RuleError> {
    let docs = if doc.is_null() {
        return Ok(());
    } else if doc.is_array() {
        Vec::<RuleDocument>::deserialize(doc).map_err(decode_err)?
    } else if doc.get("spec").is_some() {
        NodeFeatureRule::deserialize(doc).map_err(decode_err)?.spec.rules
    } else {
        NodeFeatureRuleSpec::deserialize(doc).map_err(decode_err)?.rules
    };
    out.extend(docs.into_iter().map(RuleDocument::into_rule));
    Ok(())
}

fn yaml_documents(s: &str) -> Result<Vec<serde_json::Value>, RuleError> {
    serde_yaml::Deserializer::from_str(s)
        .map(|doc| serde_json::Value::deserialize(doc).map_err(decode_err))
        .collect()
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn read(path: &Path) -> Result<String, RuleError> {
    std::fs::read_to_string(path).map_err(|e| RuleError::Decode(format!("{}: {e}", path.display())))
}

impl RuleSet {
    /// Decode rules from (possibly multi-document) YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for malformed documents or unknown operators.
    pub fn from_yaml_str(s: &str) -> Result<Self, RuleError> {
        let mut rules = Vec::new();
        for doc in yaml_documents(s)? {
            rules_from_value(doc, &mut rules)?;
        }
        Ok(Self::new(rules))
    }

    /// Decode rules from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for malformed input.
    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        let doc: serde_json::Value = serde_json::from_str(s).map_err(decode_err)?;
        let mut rules = Vec::new();
        rules_from_value(doc, &mut rules)?;
        Ok(Self::new(rules))
    }

    /// Load rules from a file; `.json` is JSON, anything else YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for unreadable or malformed files.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let text = read(path)?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }
}

fn features_from_value(mut doc: serde_json::Value) -> Result<Features, RuleError> {
    if let Some(features) = doc.get_mut("spec").and_then(|s| s.get_mut("features")) {
        doc = features.take();
    }
    if doc.is_null() {
        return Ok(Features::new());
    }
    Features::deserialize(doc).map_err(decode_err)
}

impl Features {
    /// Decode a feature store from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for malformed input.
    pub fn from_yaml_str(s: &str) -> Result<Self, RuleError> {
        let doc: serde_json::Value = serde_yaml::from_str(s).map_err(decode_err)?;
        features_from_value(doc)
    }

    /// Decode a feature store from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for malformed input.
    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        let doc: serde_json::Value = serde_json::from_str(s).map_err(decode_err)?;
        features_from_value(doc)
    }

    /// Load a feature store from a file; `.json` is JSON, anything else YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Decode`] for unreadable or malformed files.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let text = read(path)?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_node_feature_rule() {
        let yaml = r#"
apiVersion: nfd.k8s-sigs.io/v1alpha1
kind: NodeFeatureRule
metadata:
  name: my-rules
spec:
  rules:
    - name: avx
      labels: { avx: "true" }
      matchFeatures:
        - feature: cpu.cpuid
          matchExpressions: [AVX]
"#;
        let set = RuleSet::from_yaml_str(yaml).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules[0].name, "avx");
    }

    #[test]
    fn multi_document_yaml() {
        let yaml = "rules: [{ name: a }]\n---\nrules: [{ name: b }]\n---\n- name: c\n";
        let set = RuleSet::from_yaml_str(yaml).unwrap();
        let names: Vec<_> = set.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn legacy_rule_is_chosen_by_match_on() {
        let yaml = r#"
name: legacy
matchOn:
  - cpu.cpuid: [AVX]
  - cpu.cpuid: [AVX512F]
    kernel.version: { major: { op: Gt, value: ["5"] } }
"#;
        let doc: RuleDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(doc, RuleDocument::Legacy(_)));
        assert_eq!(doc.name(), "legacy");

        let rule = doc.into_rule();
        assert_eq!(rule.match_any.len(), 2);
        assert_eq!(rule.match_any[1].match_features.len(), 2);
        assert_eq!(rule.labels["legacy"], "true");

        let features = Features::new().with_flags("cpu.cpuid", ["AVX"]);
        assert!(rule.execute(&features, true).unwrap().is_match());
    }

    #[test]
    fn legacy_value_and_labels() {
        let yaml = r#"
name: legacy
value: "on"
labels: { extra: x }
matchOn: [{ cpu.cpuid: [AVX] }]
"#;
        let rule = serde_yaml::from_str::<RuleDocument>(yaml).unwrap().into_rule();
        assert_eq!(rule.labels["legacy"], "on");
        assert_eq!(rule.labels["extra"], "x");
    }

    #[test]
    fn modern_rule_without_match_on() {
        let doc: RuleDocument = serde_yaml::from_str("name: m\nlabels: { a: b }").unwrap();
        assert!(matches!(doc, RuleDocument::Modern(_)));
    }

    #[test]
    fn unknown_operator_is_decode_error() {
        let yaml = r#"
rules:
  - name: bad
    matchFeatures:
      - feature: cpu.cpuid
        matchExpressions: { AVX: { op: Between } }
"#;
        let err = RuleSet::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, RuleError::Decode(ref m) if m.contains("Between")));
    }

    #[test]
    fn rules_from_json() {
        let json = r#"{"rules": [{"name": "j", "labels": {"a": "b"}}]}"#;
        let set = RuleSet::from_json_str(json).unwrap();
        assert_eq!(set.rules[0].labels["a"], "b");
    }

    #[test]
    fn features_from_node_feature_object() {
        let yaml = r#"
apiVersion: nfd.k8s-sigs.io/v1alpha1
kind: NodeFeature
spec:
  features:
    flags:
      cpu.cpuid: { elements: { AVX: {} } }
    attributes:
      kernel.version: { elements: { major: "6" } }
"#;
        let features = Features::from_yaml_str(yaml).unwrap();
        assert!(features.flags["cpu.cpuid"].contains("AVX"));
        assert_eq!(features.attributes["kernel.version"].elements["major"], "6");
    }

    #[test]
    fn features_from_json() {
        let json = r#"{"instances": {"pci.device": {"elements": [{"attributes": {"vendor": "8086"}}]}}}"#;
        let features = Features::from_json_str(json).unwrap();
        assert_eq!(features.instances["pci.device"].elements.len(), 1);
    }

    #[test]
    fn missing_file_is_decode_error() {
        assert!(matches!(
            RuleSet::from_path("/nonexistent/rules.yaml"),
            Err(RuleError::Decode(_))
        ));
    }
}
