//! Shape matchers — Apply a [`MatchExpressionSet`] to one facet of a feature
//!
//! A feature comes in three shapes (flag keys, attribute values, instances). Each
//! shape has its own matcher; [`match_multi`] reconciles features present in more
//! than one shape.
//!
//! | Function | Shape | Empty set | No data |
//! |----------|-------|-----------|---------|
//! | [`match_keys`] | flag keys | match | per-expression |
//! | [`match_values`] | attributes | match | per-expression |
//! | [`match_instances`] | instances | per-instance | **no match** |
//!
//! # INV: deterministic output
//!
//! Matched elements are stable-sorted by `Name`. Instances carry no `Name` and
//! stay in discovery order.

use crate::features::{FeatureView, InstanceFeature, Nil};
use crate::matched::{sort_by_name, MatchedElement};
use crate::{MatchExpression, MatchExpressionSet, MatchOp, RuleError};
use std::collections::BTreeMap;

/// Result of applying an expression set to feature data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetMatch {
    /// Overall AND result.
    pub is_match: bool,
    /// Elements that satisfied an expression.
    pub elements: Vec<MatchedElement>,
    /// Per-name outcome of every expression that was evaluated, in name order.
    pub outcomes: Vec<(String, bool)>,
}

impl SetMatch {
    fn no_match() -> Self {
        Self::default()
    }

    /// Names whose expression succeeded.
    pub fn fired(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(n, _)| n.as_str())
    }
}

fn element_for(name: &str, value: Option<&str>) -> MatchedElement {
    match value {
        Some(v) => MatchedElement::name_value(name, v),
        None => MatchedElement::name(name),
    }
}

/// AND over `set` against a key-presence set.
///
/// Any failing name short-circuits to no match with no elements.
///
/// # Errors
///
/// Propagates expression evaluation errors.
pub fn match_keys(
    set: &MatchExpressionSet,
    keys: Option<&BTreeMap<String, Nil>>,
) -> Result<SetMatch, RuleError> {
    let mut result = SetMatch {
        is_match: true,
        ..SetMatch::default()
    };
    for (name, expr) in set.iter() {
        let present = keys.is_some_and(|k| k.contains_key(name));
        let ok = expr.evaluate(present, None)?;
        result.outcomes.push((name.to_owned(), ok));
        if !ok {
            return Ok(SetMatch {
                outcomes: result.outcomes,
                ..SetMatch::no_match()
            });
        }
        result.elements.push(MatchedElement::name(name));
    }
    sort_by_name(&mut result.elements);
    Ok(result)
}

/// AND over `set` against a key/value map.
///
/// With `fail_fast` the first failing name aborts with no elements. Otherwise
/// every name is evaluated and matched elements are kept for diagnostics, while
/// the overall result is still `false`.
///
/// # Errors
///
/// Propagates expression evaluation errors.
pub fn match_values(
    set: &MatchExpressionSet,
    values: Option<&BTreeMap<String, String>>,
    fail_fast: bool,
) -> Result<SetMatch, RuleError> {
    let mut result = SetMatch {
        is_match: true,
        ..SetMatch::default()
    };
    for (name, expr) in set.iter() {
        let value = values.and_then(|v| v.get(name)).map(String::as_str);
        let ok = expr.evaluate(value.is_some(), value)?;
        result.outcomes.push((name.to_owned(), ok));
        if ok {
            result.elements.push(element_for(name, value));
        } else {
            result.is_match = false;
            if fail_fast {
                return Ok(SetMatch {
                    outcomes: result.outcomes,
                    ..SetMatch::no_match()
                });
            }
        }
    }
    sort_by_name(&mut result.elements);
    Ok(result)
}

/// Apply [`match_values`] to each instance independently.
///
/// Matches if at least one instance fully matches; every matching instance is
/// returned. Zero instances never match, even for an empty set.
///
/// # Errors
///
/// Propagates expression evaluation errors.
pub fn match_instances(
    set: &MatchExpressionSet,
    instances: &[InstanceFeature],
    fail_fast: bool,
) -> Result<SetMatch, RuleError> {
    let mut fired: BTreeMap<String, bool> = set.iter().map(|(n, _)| (n.to_owned(), false)).collect();
    let mut elements = Vec::new();
    for instance in instances {
        let m = match_values(set, Some(&instance.attributes), fail_fast)?;
        for (name, ok) in &m.outcomes {
            if *ok {
                fired.insert(name.clone(), true);
            }
        }
        if m.is_match {
            elements.push(MatchedElement::instance(&instance.attributes));
        }
    }
    sort_by_name(&mut elements);
    Ok(SetMatch {
        is_match: !elements.is_empty(),
        elements,
        outcomes: if instances.is_empty() {
            Vec::new()
        } else {
            fired.into_iter().collect()
        },
    })
}

/// Match a set against every facet of a multi-type feature.
///
/// Keys and values form a union: a name is satisfied if it matches in either
/// facet, and elements are recorded from each facet that matched. The one
/// exception is `DoesNotExist`, which requires the name to be absent from
/// **both** keys and values.
///
/// Instances are an independent facet, matched with [`match_instances`] and
/// OR-ed into the final result: matching instances alone are sufficient.
///
/// # Errors
///
/// Propagates expression evaluation errors.
pub fn match_multi(
    set: &MatchExpressionSet,
    view: FeatureView<'_>,
    fail_fast: bool,
) -> Result<SetMatch, RuleError> {
    let mut result = SetMatch::default();
    let mut outcomes: BTreeMap<String, bool> = BTreeMap::new();

    if view.keys.is_some() || view.values.is_some() {
        result.is_match = true;
        for (name, expr) in set.iter() {
            let in_keys = view.keys.is_some_and(|k| k.contains_key(name));
            let value = view.values.and_then(|v| v.get(name)).map(String::as_str);

            let (ok, elements) = match_union(name, expr, in_keys, value)?;
            outcomes.insert(name.to_owned(), ok);
            if ok {
                result.elements.extend(elements);
            } else {
                result.is_match = false;
                if fail_fast {
                    result.elements.clear();
                    break;
                }
            }
        }
        sort_by_name(&mut result.elements);
    }

    if let Some(instances) = view.instances {
        let inst = match_instances(set, instances, fail_fast)?;
        result.is_match = result.is_match || inst.is_match;
        result.elements.extend(inst.elements);
        for (name, ok) in inst.outcomes {
            *outcomes.entry(name).or_insert(false) |= ok;
        }
    }

    result.outcomes = outcomes.into_iter().collect();
    Ok(result)
}

/// Evaluate one named expression against the key and value facets together.
fn match_union(
    name: &str,
    expr: &MatchExpression,
    in_keys: bool,
    value: Option<&str>,
) -> Result<(bool, Vec<MatchedElement>), RuleError> {
    if expr.op == MatchOp::DoesNotExist {
        // Joint absence, not either-facet.
        let ok = !in_keys && value.is_none();
        let elements = if ok { vec![MatchedElement::name(name)] } else { Vec::new() };
        return Ok((ok, elements));
    }

    let key_ok = expr.evaluate(in_keys, None)?;
    let value_ok = expr.evaluate(value.is_some(), value)?;

    let mut elements = Vec::new();
    if key_ok && in_keys {
        elements.push(MatchedElement::name(name));
    }
    if value_ok {
        if let Some(v) = value {
            elements.push(MatchedElement::name_value(name, v));
        }
    }
    if (key_ok || value_ok) && elements.is_empty() {
        // Satisfied without the name being present (e.g. `Any`).
        elements.push(MatchedElement::name(name));
    }
    Ok((key_ok || value_ok, elements))
}

/// Match a single expression against the *names* in every facet.
///
/// Each key name, attribute name, and instance attribute name is fed to the
/// expression as a present value. Returns the union of matching keys,
/// attributes, and instances (an instance matches if any attribute name does).
///
/// # Errors
///
/// Propagates expression evaluation errors.
pub fn match_names_multi(
    expr: &MatchExpression,
    view: FeatureView<'_>,
) -> Result<SetMatch, RuleError> {
    let mut elements = Vec::new();

    if let Some(keys) = view.keys {
        for name in keys.keys() {
            if expr.evaluate(true, Some(name))? {
                elements.push(MatchedElement::name(name.as_str()));
            }
        }
    }
    if let Some(values) = view.values {
        for (name, value) in values {
            if expr.evaluate(true, Some(name))? {
                elements.push(MatchedElement::name_value(name.as_str(), value.as_str()));
            }
        }
    }
    sort_by_name(&mut elements);

    if let Some(instances) = view.instances {
        for instance in instances {
            let mut hit = false;
            for name in instance.attributes.keys() {
                if expr.evaluate(true, Some(name))? {
                    hit = true;
                    break;
                }
            }
            if hit {
                elements.push(MatchedElement::instance(&instance.attributes));
            }
        }
    }

    Ok(SetMatch {
        is_match: !elements.is_empty(),
        elements,
        outcomes: Vec::new(),
    })
}
