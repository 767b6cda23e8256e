//! `MatchedElement` — What a matcher hands to templates and diagnostics
//!
//! Every matcher returns the elements that satisfied it. An element is a small
//! string map in one of three shapes:
//!
//! - `{"Name": n}` — a matched flag key (or a name matched by absence)
//! - `{"Name": n, "Value": v}` — a matched attribute
//! - the raw attribute map of a matched instance
//!
//! Elements are grouped per rule evaluation as `domain → feature → [element]`
//! ([`MatchedFeatures`]), which is exactly the data templates range over.

use crate::template::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key holding the element name.
pub const NAME_KEY: &str = "Name";
/// Key holding the element value.
pub const VALUE_KEY: &str = "Value";

/// One matched key, attribute, or instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchedElement(BTreeMap<String, String>);

impl MatchedElement {
    /// A matched flag key.
    pub fn name(name: impl Into<String>) -> Self {
        Self(BTreeMap::from([(NAME_KEY.to_owned(), name.into())]))
    }

    /// A matched attribute.
    pub fn name_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(BTreeMap::from([
            (NAME_KEY.to_owned(), name.into()),
            (VALUE_KEY.to_owned(), value.into()),
        ]))
    }

    /// A matched instance (its full attribute map).
    #[must_use]
    pub fn instance(attributes: &BTreeMap<String, String>) -> Self {
        Self(attributes.clone())
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The `Name` field, or `""` for instances without one. Used as sort key.
    #[must_use]
    pub fn sort_key(&self) -> &str {
        self.get(NAME_KEY).unwrap_or("")
    }

    /// The underlying map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                .collect(),
        )
    }
}

/// Stable sort by `Name`.
pub(crate) fn sort_by_name(elements: &mut [MatchedElement]) {
    elements.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
}

/// Matched elements grouped as `domain → feature → [element]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchedFeatures(BTreeMap<String, BTreeMap<String, Vec<MatchedElement>>>);

impl MatchedFeatures {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append elements under `domain.feature`.
    ///
    /// The feature entry is created even when `elements` is empty, so templates
    /// can reference a feature whose term matched without yielding elements.
    pub fn record(&mut self, domain: &str, feature: &str, elements: Vec<MatchedElement>) {
        self.0
            .entry(domain.to_owned())
            .or_default()
            .entry(feature.to_owned())
            .or_default()
            .extend(elements);
    }

    /// Elements recorded under `domain.feature`.
    #[must_use]
    pub fn get(&self, domain: &str, feature: &str) -> Option<&[MatchedElement]> {
        self.0
            .get(domain)
            .and_then(|d| d.get(feature))
            .map(Vec::as_slice)
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(domain, feature, elements)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[MatchedElement])> {
        self.0.iter().flat_map(|(d, features)| {
            features
                .iter()
                .map(move |(f, elems)| (d.as_str(), f.as_str(), elems.as_slice()))
        })
    }

    /// Convert to the template data root.
    #[must_use]
    pub fn to_template_data(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(domain, features)| {
                    let features = features
                        .iter()
                        .map(|(name, elems)| {
                            (
                                name.clone(),
                                Value::List(elems.iter().map(MatchedElement::to_value).collect()),
                            )
                        })
                        .collect();
                    (domain.clone(), Value::Map(features))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_shapes() {
        let e = MatchedElement::name_value("a", "1");
        assert_eq!(e.get(NAME_KEY), Some("a"));
        assert_eq!(e.get(VALUE_KEY), Some("1"));
        let i = MatchedElement::instance(&BTreeMap::from([("vendor".into(), "8086".into())]));
        assert_eq!(i.sort_key(), "");
        assert_eq!(i.get("vendor"), Some("8086"));
    }

    #[test]
    fn sort_is_stable_for_unnamed() {
        let mut elems = vec![
            MatchedElement::instance(&BTreeMap::from([("i".into(), "2".into())])),
            MatchedElement::instance(&BTreeMap::from([("i".into(), "1".into())])),
        ];
        sort_by_name(&mut elems);
        assert_eq!(elems[0].get("i"), Some("2"));
    }

    #[test]
    fn record_appends_and_creates_empty_entries() {
        let mut m = MatchedFeatures::new();
        m.record("d", "f", vec![MatchedElement::name("a")]);
        m.record("d", "f", vec![MatchedElement::name("b")]);
        m.record("d", "empty", Vec::new());
        assert_eq!(m.get("d", "f").map(<[MatchedElement]>::len), Some(2));
        assert_eq!(m.get("d", "empty").map(<[MatchedElement]>::len), Some(0));
        assert_eq!(m.iter().count(), 2);
    }

    #[test]
    fn serializes_as_nested_maps() {
        let mut m = MatchedFeatures::new();
        m.record("d", "f", vec![MatchedElement::name_value("k", "v")]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"d": {"f": [{"Name": "k", "Value": "v"}]}})
        );
    }
}
