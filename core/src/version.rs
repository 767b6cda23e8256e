//! Version parsing for `type: version` comparisons.
//!
//! Accepts dotted numeric versions (`6`, `2.1`, `5.15.0`), an optional leading
//! `v`, and a kernel-style flavor suffix after the first `-`
//! (`5.15.0-91-generic` has version `5.15.0` and flavor `91-generic`).
//!
//! Components compare numerically; missing trailing components count as zero,
//! so `2` == `2.0` == `2.0.0`. In a comparison bound the flavor is a regex
//! that the input's flavor must match.

use crate::RuleError;
use regex::Regex;
use std::cmp::Ordering;

/// A parsed `<version>[-<flavor>]` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Version {
    components: Vec<u64>,
    flavor: Option<String>,
}

impl Version {
    pub(crate) fn parse(input: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::InvalidVersion {
            value: input.to_owned(),
        };
        let trimmed = input.strip_prefix('v').unwrap_or(input);
        let (numeric, flavor) = match trimmed.split_once('-') {
            Some((n, f)) if !f.is_empty() => (n, Some(f.to_owned())),
            Some(_) => return Err(invalid()),
            None => (trimmed, None),
        };
        if numeric.is_empty() {
            return Err(invalid());
        }
        let components = numeric
            .split('.')
            .map(|c| c.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components, flavor })
    }

    pub(crate) fn flavor(&self) -> Option<&str> {
        self.flavor.as_deref()
    }

    /// Compare numeric components only.
    pub(crate) fn cmp_numeric(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// A comparison bound. Its flavor is a pattern, compiled once at parse time.
#[derive(Debug, Clone)]
pub(crate) struct VersionBound {
    version: Version,
    flavor: Option<Regex>,
}

impl VersionBound {
    pub(crate) fn parse(input: &str) -> Result<Self, RuleError> {
        let version = Version::parse(input)?;
        let flavor = version
            .flavor()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    message: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self { version, flavor })
    }

    pub(crate) fn version(&self) -> &Version {
        &self.version
    }

    /// Whether `input`'s flavor satisfies this bound.
    ///
    /// A bound without a flavor accepts any input. Otherwise the input must
    /// carry a flavor the pattern matches (unanchored, like `InRegexp`).
    pub(crate) fn accepts(&self, input: &Version) -> bool {
        match (&self.flavor, input.flavor()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(re), Some(flavor)) => re.is_match(flavor),
        }
    }
}
