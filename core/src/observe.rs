//! `Observer` — Injected observability port
//!
//! The engine reports what it did through an [`Observer`] instead of logging
//! directly. Every method returns `()` and receives borrowed, immutable data, so
//! an observer can never change a match result or an output map.
//!
//! - [`NoopObserver`] — the default used by `execute()`
//! - [`TracingObserver`] — emits `tracing` events (feature = `"logging"`)

use crate::{MatchStatus, RuleError};
use std::collections::BTreeMap;

/// Which template produced an expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// `labelsTemplate`
    Labels,
    /// `varsTemplate`
    Vars,
}

impl TemplateKind {
    /// Field name as written in rule documents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Labels => "labelsTemplate",
            Self::Vars => "varsTemplate",
        }
    }
}

/// Receives evaluation events. All methods default to no-ops.
///
/// # Thread Safety
///
/// Observers are shared across concurrent evaluations and must be `Send + Sync`.
pub trait Observer: Send + Sync {
    /// A feature matcher term finished evaluating.
    fn term_evaluated(&self, _feature: &str, _is_match: bool) {}

    /// A rule finished evaluating without error.
    fn rule_evaluated(&self, _rule: &str, _status: &MatchStatus) {}

    /// A template was expanded into key/value pairs.
    fn template_expanded(
        &self,
        _rule: &str,
        _kind: TemplateKind,
        _output: &BTreeMap<String, String>,
    ) {
    }

    /// A rule aborted with an error.
    fn rule_failed(&self, _rule: &str, _error: &RuleError) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Forwards events to `tracing`.
///
/// Match results are `debug`, per-term detail is `trace`, rule errors are `warn`.
#[cfg(feature = "logging")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[cfg(feature = "logging")]
impl Observer for TracingObserver {
    fn term_evaluated(&self, feature: &str, is_match: bool) {
        tracing::trace!(feature, is_match, "feature term evaluated");
    }

    fn rule_evaluated(&self, rule: &str, status: &MatchStatus) {
        if status.is_match {
            tracing::debug!(rule, "rule matched");
        } else {
            let failed = status
                .expressions()
                .filter(|e| !e.is_match)
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            tracing::debug!(rule, ?failed, "rule did not match");
        }
    }

    fn template_expanded(&self, rule: &str, kind: TemplateKind, output: &BTreeMap<String, String>) {
        tracing::trace!(rule, template = kind.as_str(), ?output, "template expanded");
    }

    fn rule_failed(&self, rule: &str, error: &RuleError) {
        tracing::warn!(rule, %error, "rule execution failed");
    }
}
