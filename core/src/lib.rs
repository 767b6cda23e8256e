//! featrule - Node feature rule engine
//!
//! Evaluates declarative rules against discovered node features and turns the
//! result into labels, annotations, taints, extended resources and vars.
//!
//! # Architecture
//!
//! Evaluation flows bottom-up, output construction top-down:
//!
//! - [`MatchExpression`] — One typed predicate over a presence flag and value
//! - [`MatchExpressionSet`] — AND of named expressions
//! - [`match_keys`] / [`match_values`] / [`match_instances`] — One set against one feature shape
//! - [`match_multi`] / [`match_names_multi`] — One set against a multi-type feature
//! - [`FeatureMatcher`] — AND of per-feature terms; `matchAny` ORs several of them
//! - [`Rule`] / [`GroupRule`] — Matchers plus static and templated output
//! - [`RuleSet`] — Ordered rules with `rule.matched` back-references
//!
//! # Key Design Insights
//!
//! 1. **Pure evaluation**: every matcher and executor reads immutable inputs and
//!    returns fresh output. Repeated evaluation yields identical, sorted output.
//!
//! 2. **Two modes, one engine**: `fail_fast = true` short-circuits for
//!    production labeling; `fail_fast = false` records every expression in the
//!    [`MatchStatus`] for diagnostics. Errors abort in both modes.
//!
//! 3. **Observability is a port**: [`Observer`] receives events but cannot change
//!    control flow. [`TracingObserver`] forwards to `tracing`.
//!
//! # Example
//!
//! ```
//! use featrule::prelude::*;
//!
//! let rule = Rule {
//!     labels_template: "{{range .cpu.cpuid}}cpu-{{.Name}}=true\n{{end}}".into(),
//!     match_features: FeatureMatcher::new(vec![FeatureMatcherTerm::expressions(
//!         "cpu.cpuid",
//!         MatchExpressionSet::new()
//!             .with("AVX", MatchExpression::op(MatchOp::Exists))
//!             .with("AVX2", MatchExpression::op(MatchOp::Exists)),
//!     )]),
//!     ..Rule::new("cpu-features")
//! };
//!
//! let features = Features::new().with_flags("cpu.cpuid", ["AVX", "AVX2", "SSE4"]);
//! let out = rule.execute(&features, true).unwrap();
//! assert_eq!(out.labels.len(), 2);
//! assert_eq!(out.labels["cpu-AVX2"], "true");
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod config;
mod expression;
mod feature_matcher;
mod features;
mod matched;
mod observe;
mod rule;
mod rule_set;
mod shape;
pub mod template;
mod trace;
mod version;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Feature store
pub use features::{
    AttributeFeatureSet, FeatureView, Features, FlagFeatureSet, InstanceFeature,
    InstanceFeatureSet, Nil,
};

// Expressions and matchers
pub use expression::{MatchExpression, MatchExpressionSet, MatchOp, ValueType};
pub use feature_matcher::{FeatureMatcher, FeatureMatcherTerm, MatchAnyElem};
pub use matched::{MatchedElement, MatchedFeatures, NAME_KEY, VALUE_KEY};
pub use shape::{
    match_instances, match_keys, match_multi, match_names_multi, match_values, SetMatch,
};

// Rules
pub use config::{LegacyRule, NodeFeatureRule, NodeFeatureRuleSpec, ObjectMeta, RuleDocument};
pub use rule::{GroupRule, GroupRuleOutput, Rule, RuleOutput, Taint, TaintEffect};
pub use rule_set::{RuleFailure, RuleSet, RuleSetOutput, RULE_BACKREF_FEATURE};
pub use template::{TemplateError, TemplateSource};

// Diagnostics
#[cfg(feature = "logging")]
pub use observe::TracingObserver;
pub use observe::{NoopObserver, Observer, TemplateKind};
pub use trace::{MatchFeatureStatus, MatchStatus, MatchedExpression, MatcherType};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use featrule::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Feature store
        Features,
        InstanceFeature,
        // Matchers
        FeatureMatcher,
        FeatureMatcherTerm,
        MatchAnyElem,
        MatchExpression,
        MatchExpressionSet,
        MatchOp,
        // Rules
        GroupRule,
        Rule,
        RuleOutput,
        RuleSet,
        Taint,
        TaintEffect,
        // Diagnostics
        MatchStatus,
        Observer,
        // Errors
        RuleError,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from rule validation and execution.
///
/// Every fallible operation returns this type. Execution aborts on the first
/// error in both evaluation modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Operator name is not one of the fourteen known operators.
    #[error("invalid match operator \"{op}\"")]
    InvalidOp {
        /// The unknown operator.
        op: String,
    },
    /// Wrong number of operands for the operator.
    #[error("invalid number of values for {op}: expected {expected}, got {got}")]
    InvalidArity {
        /// The operator.
        op: MatchOp,
        /// Human-readable expected count.
        expected: String,
        /// Actual count.
        got: usize,
    },
    /// An operand or input is not an integer.
    #[error("not a number: \"{value}\"")]
    InvalidNumber {
        /// The offending literal.
        value: String,
    },
    /// An operand or input is not a version.
    #[error("not a version: \"{value}\"")]
    InvalidVersion {
        /// The offending literal.
        value: String,
    },
    /// Interval bounds are not strictly ascending.
    #[error("invalid {op} bounds: \"{lower}\" must be less than \"{upper}\"")]
    InvalidBounds {
        /// The interval operator.
        op: MatchOp,
        /// Lower bound literal.
        lower: String,
        /// Upper bound literal.
        upper: String,
    },
    /// Interval bounds declare different version flavors.
    #[error("interval bounds have different flavors: \"{lower}\" and \"{upper}\"")]
    FlavorMismatch {
        /// Lower bound literal.
        lower: String,
        /// Upper bound literal.
        upper: String,
    },
    /// A regular expression does not compile.
    #[error("invalid pattern \"{pattern}\": {message}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// The compiler's message.
        message: String,
    },
    /// A term's feature is not `domain.name`.
    #[error("invalid feature name \"{feature}\" (format must be '<domain>.<name>')")]
    InvalidFeatureName {
        /// The offending name.
        feature: String,
    },
    /// Template parse or execution failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Expanded template output has a line without `=`.
    #[error("missing value in expanded template line \"{line}\", (format must be '<key>=<value>')")]
    MissingTemplateValue {
        /// The offending line.
        line: String,
    },
    /// A rule or feature document could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_literal() {
        let e = RuleError::InvalidNumber { value: "3a".into() };
        assert_eq!(e.to_string(), "not a number: \"3a\"");

        let e = RuleError::InvalidArity {
            op: MatchOp::Gt,
            expected: "exactly 1".into(),
            got: 0,
        };
        assert_eq!(
            e.to_string(),
            "invalid number of values for Gt: expected exactly 1, got 0"
        );

        let e = RuleError::MissingTemplateValue {
            line: "justkey".into(),
        };
        assert!(e.to_string().contains("'<key>=<value>'"));
    }

    #[test]
    fn template_errors_convert() {
        let e: RuleError = TemplateError::MissingKey { key: "x".into() }.into();
        assert_eq!(e.to_string(), "map has no entry for key \"x\"");
    }

    #[test]
    fn public_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Features>();
        assert_send_sync::<RuleSet>();
        assert_send_sync::<RuleError>();
        assert_send_sync::<MatchStatus>();
    }
}
