//! `Features` — The discovered feature store rules are evaluated against
//!
//! Three independent mappings, each keyed by `"<domain>.<name>"`:
//!
//! - **flags** — presence-only key sets
//! - **attributes** — key/value maps
//! - **instances** — ordered lists of independent attribute maps
//!
//! The same name may appear in more than one mapping. Matchers treat that as one
//! logical feature with several facets (see [`match_multi`](crate::match_multi)).
//!
//! The serialized shape follows the `NodeFeature` CRD:
//!
//! ```yaml
//! flags:
//!   kernel.loadedmodule: { elements: { kvm: {} } }
//! attributes:
//!   kernel.version: { elements: { major: "6", minor: "1" } }
//! instances:
//!   pci.device: { elements: [ { attributes: { vendor: "8086" } } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Placeholder value for flag elements (`{}` on the wire).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nil {}

/// A presence-only feature: a set of key names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagFeatureSet {
    /// Present keys. Values are always [`Nil`].
    #[serde(default)]
    pub elements: BTreeMap<String, Nil>,
}

impl FlagFeatureSet {
    /// Build a flag set from key names.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: keys.into_iter().map(|k| (k.into(), Nil {})).collect(),
        }
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.elements.contains_key(key)
    }

    /// Iterate over present keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }
}

/// A key/value feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFeatureSet {
    /// Attribute values by key.
    #[serde(default)]
    pub elements: BTreeMap<String, String>,
}

impl AttributeFeatureSet {
    /// Build an attribute set from key/value pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            elements: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One occurrence of an instance feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFeature {
    /// Attributes of this instance.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl InstanceFeature {
    /// Build an instance from key/value pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A feature that may occur many times per node (e.g. one per PCI device).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFeatureSet {
    /// Instances in discovery order.
    #[serde(default)]
    pub elements: Vec<InstanceFeature>,
}

/// The three facets a single feature name resolved to.
///
/// `None` means the name is absent from that mapping, which is different from
/// present-but-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureView<'a> {
    /// Flag facet.
    pub keys: Option<&'a BTreeMap<String, Nil>>,
    /// Attribute facet.
    pub values: Option<&'a BTreeMap<String, String>>,
    /// Instance facet.
    pub instances: Option<&'a [InstanceFeature]>,
}

impl FeatureView<'_> {
    /// Returns `true` if the name was found in none of the mappings.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.keys.is_none() && self.values.is_none() && self.instances.is_none()
    }
}

/// The feature store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// Presence-only features.
    #[serde(default)]
    pub flags: BTreeMap<String, FlagFeatureSet>,
    /// Key/value features.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeFeatureSet>,
    /// Repeated attribute-set features.
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceFeatureSet>,
}

impl Features {
    /// Create an empty feature store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag feature (builder pattern).
    #[must_use]
    pub fn with_flags<I, S>(mut self, name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.insert(name.into(), FlagFeatureSet::new(keys));
        self
    }

    /// Add an attribute feature (builder pattern).
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), AttributeFeatureSet::new(pairs));
        self
    }

    /// Add an instance feature (builder pattern).
    #[must_use]
    pub fn with_instances<I>(mut self, name: impl Into<String>, instances: I) -> Self
    where
        I: IntoIterator<Item = InstanceFeature>,
    {
        self.instances.insert(
            name.into(),
            InstanceFeatureSet {
                elements: instances.into_iter().collect(),
            },
        );
        self
    }

    /// Merge key/value pairs into an attribute feature, creating it if needed.
    ///
    /// Existing keys are overwritten.
    pub fn insert_attributes<'a, I>(&mut self, name: &str, pairs: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let set = self.attributes.entry(name.to_owned()).or_default();
        for (k, v) in pairs {
            set.elements.insert(k.clone(), v.clone());
        }
    }

    /// Resolve `name` against all three mappings.
    ///
    /// Each mapping is searched on its own: exact name first, then an ASCII
    /// case-insensitive match.
    #[must_use]
    pub fn view(&self, name: &str) -> FeatureView<'_> {
        FeatureView {
            keys: lookup(&self.flags, name).map(|f| &f.elements),
            values: lookup(&self.attributes, name).map(|a| &a.elements),
            instances: lookup(&self.instances, name).map(|i| i.elements.as_slice()),
        }
    }

    /// All feature names across the three mappings, sorted and deduplicated.
    #[must_use]
    pub fn names(&self) -> BTreeSet<&str> {
        self.flags
            .keys()
            .chain(self.attributes.keys())
            .chain(self.instances.keys())
            .map(String::as_str)
            .collect()
    }
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}
