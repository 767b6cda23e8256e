//! featrule-test: Test helpers and conformance fixtures
//!
//! Provides a realistic sample node and an [`Observer`] that records every
//! event, for tests that need to see what the engine reported.
//!
//! # Example
//!
//! ```
//! use featrule_test::prelude::*;
//!
//! let recorder = RecordingObserver::new();
//! let rule = Rule {
//!     labels: [("avx".to_string(), "true".to_string())].into(),
//!     match_features: FeatureMatcher::new(vec![FeatureMatcherTerm::expressions(
//!         "cpu.cpuid",
//!         MatchExpressionSet::from_shorthand(["AVX"]),
//!     )]),
//!     ..Rule::new("avx")
//! };
//!
//! let out = rule.execute_with(&sample_node(), true, &recorder).unwrap();
//! assert!(out.is_match());
//! assert_eq!(recorder.matched_rules(), vec!["avx".to_string()]);
//! ```

use featrule::prelude::*;
use featrule::TemplateKind;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

#[cfg(feature = "fixtures")]
pub mod fixture;

/// A node with CPU flags, kernel attributes, a multi-type feature and two PCI
/// devices.
#[must_use]
pub fn sample_node() -> Features {
    Features::new()
        .with_flags("cpu.cpuid", ["AVX", "AVX2", "SSE4"])
        .with_attributes(
            "kernel.version",
            [("major", "6"), ("minor", "8"), ("full", "6.8.0-generic")],
        )
        .with_flags("kernel.loadedmodule", ["kvm", "vfio"])
        .with_attributes("kernel.loadedmodule", [("nvidia", "550")])
        .with_instances(
            "pci.device",
            [
                InstanceFeature::new([("vendor", "8086"), ("class", "0200"), ("device", "1572")]),
                InstanceFeature::new([("vendor", "10de"), ("class", "0300"), ("device", "2330")]),
            ],
        )
}

/// One recorded engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A feature term finished.
    Term {
        /// `domain.name`
        feature: String,
        /// Outcome.
        is_match: bool,
    },
    /// A rule finished without error.
    Rule {
        /// Rule name.
        rule: String,
        /// Outcome.
        is_match: bool,
    },
    /// A template was expanded.
    Template {
        /// Rule name.
        rule: String,
        /// Which template.
        kind: TemplateKind,
        /// Expanded pairs.
        output: BTreeMap<String, String>,
    },
    /// A rule errored.
    Failed {
        /// Rule name.
        rule: String,
        /// Rendered error.
        error: String,
    },
}

/// Records every event in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Snapshot of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of rules that finished with a match.
    #[must_use]
    pub fn matched_rules(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Rule {
                    rule,
                    is_match: true,
                } => Some(rule),
                _ => None,
            })
            .collect()
    }

    /// Names of rules that errored.
    #[must_use]
    pub fn failed_rules(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Failed { rule, .. } => Some(rule),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn term_evaluated(&self, feature: &str, is_match: bool) {
        self.push(Event::Term {
            feature: feature.to_owned(),
            is_match,
        });
    }

    fn rule_evaluated(&self, rule: &str, status: &MatchStatus) {
        self.push(Event::Rule {
            rule: rule.to_owned(),
            is_match: status.is_match,
        });
    }

    fn template_expanded(&self, rule: &str, kind: TemplateKind, output: &BTreeMap<String, String>) {
        self.push(Event::Template {
            rule: rule.to_owned(),
            kind,
            output: output.clone(),
        });
    }

    fn rule_failed(&self, rule: &str, error: &RuleError) {
        self.push(Event::Failed {
            rule: rule.to_owned(),
            error: error.to_string(),
        });
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{sample_node, Event, RecordingObserver};
    pub use featrule::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(feature: &str, items: &[&str]) -> FeatureMatcherTerm {
        FeatureMatcherTerm::expressions(feature, MatchExpressionSet::from_shorthand(items))
    }

    #[test]
    fn sample_node_is_multi_type() {
        let node = sample_node();
        let view = node.view("kernel.loadedmodule");
        assert!(view.keys.is_some());
        assert!(view.values.is_some());
        assert!(view.instances.is_none());
    }

    #[test]
    fn records_terms_and_rules_in_order() {
        let recorder = RecordingObserver::new();
        let rule = Rule {
            labels: [("x".to_string(), "y".to_string())].into(),
            match_features: FeatureMatcher::new(vec![
                term("cpu.cpuid", &["AVX"]),
                term("kernel.version", &["major=6"]),
            ]),
            ..Rule::new("r")
        };
        rule.execute_with(&sample_node(), true, &recorder).unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                Event::Term {
                    feature: "cpu.cpuid".into(),
                    is_match: true
                },
                Event::Term {
                    feature: "kernel.version".into(),
                    is_match: true
                },
                Event::Rule {
                    rule: "r".into(),
                    is_match: true
                },
            ]
        );
    }

    #[test]
    fn records_template_output() {
        let recorder = RecordingObserver::new();
        let rule = Rule {
            vars_template: "{{range .pci.device}}dev-{{.device}}={{.vendor}}\n{{end}}".into(),
            match_features: FeatureMatcher::new(vec![term("pci.device", &["class=0300"])]),
            ..Rule::new("gpu")
        };
        let out = rule.execute_with(&sample_node(), true, &recorder).unwrap();
        assert_eq!(out.vars["dev-2330"], "10de");

        let templates: Vec<_> = recorder
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Template { .. }))
            .collect();
        assert_eq!(templates.len(), 1);
    }

    #[test]
    fn records_failures() {
        let recorder = RecordingObserver::new();
        let rule = Rule {
            labels_template: "{{.nope.nope}}".into(),
            match_features: FeatureMatcher::new(vec![term("cpu.cpuid", &["AVX"])]),
            ..Rule::new("broken")
        };
        assert!(rule.execute_with(&sample_node(), true, &recorder).is_err());
        assert_eq!(recorder.failed_rules(), vec!["broken".to_string()]);
        assert!(recorder.matched_rules().is_empty());
    }
}
