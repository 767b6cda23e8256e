//! `MatchExpression` — One typed predicate over a single value
//!
//! An expression is an operator plus an ordered list of operand strings.
//! [`evaluate()`](MatchExpression::evaluate) receives a `valid` flag (is the key
//! present at all?) and the value, if the key carries one.
//!
//! # Operators
//!
//! | Op | Operands | True when |
//! |----|----------|-----------|
//! | `Any` | 0 | always |
//! | `Exists` / `DoesNotExist` | 0 | key present / absent |
//! | `In` / `NotIn` | ≥1 | value equals one / none of the operands |
//! | `InRegexp` | ≥1 | any pattern matches the value |
//! | `Gt` `Ge` `Lt` `Le` | 1 | integer (or version) comparison |
//! | `GtLt` / `GeLe` | 2 | open / closed interval membership |
//! | `IsTrue` / `IsFalse` | 0 | value is `"true"` / `"false"` |
//!
//! # INV: absent → false
//!
//! Apart from `Any`, `Exists` and `DoesNotExist`, every operator returns `false`
//! for an absent key without looking at the value.

use crate::version::{Version, VersionBound};
use crate::RuleError;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The operator of a [`MatchExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOp {
    /// Always matches.
    Any,
    /// Value equals one of the operands.
    In,
    /// Value equals none of the operands.
    NotIn,
    /// Value matches one of the regex operands.
    InRegexp,
    /// Key is present.
    Exists,
    /// Key is absent.
    DoesNotExist,
    /// Value is greater than the operand.
    Gt,
    /// Value is greater than or equal to the operand.
    Ge,
    /// Value is less than the operand.
    Lt,
    /// Value is less than or equal to the operand.
    Le,
    /// Value lies strictly between the two operands.
    GtLt,
    /// Value lies between the two operands, inclusive.
    GeLe,
    /// Value is the literal `"true"`.
    IsTrue,
    /// Value is the literal `"false"`.
    IsFalse,
}

impl MatchOp {
    /// All operators, in declaration order.
    pub const ALL: [MatchOp; 14] = [
        Self::Any,
        Self::In,
        Self::NotIn,
        Self::InRegexp,
        Self::Exists,
        Self::DoesNotExist,
        Self::Gt,
        Self::Ge,
        Self::Lt,
        Self::Le,
        Self::GtLt,
        Self::GeLe,
        Self::IsTrue,
        Self::IsFalse,
    ];

    /// The wire spelling of this operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::InRegexp => "InRegexp",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
            Self::Gt => "Gt",
            Self::Ge => "Ge",
            Self::Lt => "Lt",
            Self::Le => "Le",
            Self::GtLt => "GtLt",
            Self::GeLe => "GeLe",
            Self::IsTrue => "IsTrue",
            Self::IsFalse => "IsFalse",
        }
    }

    /// Required operand count: `(min, max)`, `max == None` meaning unbounded.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Any | Self::Exists | Self::DoesNotExist | Self::IsTrue | Self::IsFalse => {
                (0, Some(0))
            }
            Self::Gt | Self::Ge | Self::Lt | Self::Le => (1, Some(1)),
            Self::GtLt | Self::GeLe => (2, Some(2)),
            Self::In | Self::NotIn | Self::InRegexp => (1, None),
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchOp {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| RuleError::InvalidOp { op: s.to_owned() })
    }
}

/// How comparison operands are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Dotted version numbers with an optional `-<flavor>` suffix.
    #[serde(rename = "version")]
    Version,
}

/// A single operator-plus-operand predicate.
///
/// Regex operands and comparison bounds (including version flavor patterns)
/// are parsed on first use and cached inside the expression, so a shared rule
/// compiles each pattern once.
#[derive(Clone, Serialize, Deserialize)]
pub struct MatchExpression {
    /// The operator.
    pub op: MatchOp,
    /// Operands, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
    /// Operand interpretation for comparison operators.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(skip)]
    regexes: OnceCell<Vec<Regex>>,
    #[serde(skip)]
    bounds: OnceCell<Vec<Bound>>,
}

impl MatchExpression {
    /// Create an expression from an operator and its operands.
    pub fn new<I, S>(op: MatchOp, value: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op,
            value: value.into_iter().map(Into::into).collect(),
            value_type: None,
            regexes: OnceCell::new(),
            bounds: OnceCell::new(),
        }
    }

    /// Create an operand-less expression (`Exists`, `Any`, ...).
    #[must_use]
    pub fn op(op: MatchOp) -> Self {
        Self::new(op, Vec::<String>::new())
    }

    /// Mark comparison operands as versions (builder pattern).
    #[must_use]
    pub fn versioned(mut self) -> Self {
        self.value_type = Some(ValueType::Version);
        self
    }

    fn is_version(&self) -> bool {
        self.value_type == Some(ValueType::Version)
    }

    /// Check operator-specific arity and operand types.
    ///
    /// # Errors
    ///
    /// - [`RuleError::InvalidArity`] — wrong number of operands
    /// - [`RuleError::InvalidNumber`] / [`RuleError::InvalidVersion`] — unparseable bound
    /// - [`RuleError::InvalidBounds`] — interval bounds not strictly ascending
    /// - [`RuleError::FlavorMismatch`] — interval bounds declare different flavors
    /// - [`RuleError::InvalidPattern`] — `InRegexp` operand does not compile
    pub fn validate(&self) -> Result<(), RuleError> {
        self.check_arity()?;
        match self.op {
            MatchOp::Gt
            | MatchOp::Ge
            | MatchOp::Lt
            | MatchOp::Le
            | MatchOp::GtLt
            | MatchOp::GeLe => {
                self.bounds()?;
            }
            MatchOp::InRegexp => {
                self.regexes()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn check_arity(&self) -> Result<(), RuleError> {
        let (min, max) = self.op.arity();
        let got = self.value.len();
        if got < min || max.is_some_and(|max| got > max) {
            let expected = match max {
                Some(max) if max == min => format!("exactly {min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(RuleError::InvalidArity {
                op: self.op,
                expected,
                got,
            });
        }
        Ok(())
    }

    fn regexes(&self) -> Result<&[Regex], RuleError> {
        self.regexes
            .get_or_try_init(|| {
                self.value
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|e| RuleError::InvalidPattern {
                            pattern: p.clone(),
                            message: e.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .map(Vec::as_slice)
    }

    /// Parsed comparison bounds. Interval bounds are checked for flavor
    /// agreement and strict ordering.
    fn bounds(&self) -> Result<&[Bound], RuleError> {
        self.bounds
            .get_or_try_init(|| {
                let bounds = self
                    .value
                    .iter()
                    .map(|v| Bound::parse(v, self.is_version()))
                    .collect::<Result<Vec<_>, _>>()?;
                if let [lower, upper] = bounds.as_slice() {
                    self.check_interval(lower, upper)?;
                }
                Ok(bounds)
            })
            .map(Vec::as_slice)
    }

    fn check_interval(&self, lower: &Bound, upper: &Bound) -> Result<(), RuleError> {
        if let (Bound::Version(l), Bound::Version(u)) = (lower, upper) {
            if l.version().flavor() != u.version().flavor() {
                return Err(RuleError::FlavorMismatch {
                    lower: self.value[0].clone(),
                    upper: self.value[1].clone(),
                });
            }
        }
        if lower.cmp(upper).is_ge() {
            return Err(RuleError::InvalidBounds {
                op: self.op,
                lower: self.value[0].clone(),
                upper: self.value[1].clone(),
            });
        }
        Ok(())
    }

    /// Evaluate this expression.
    ///
    /// `valid` says whether the key is present. `value` is `None` for
    /// presence-only keys; value-inspecting operators are `false` for them.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is ill-formed (see [`validate()`](Self::validate))
    /// or if a comparison input is not a valid integer / version.
    pub fn evaluate(&self, valid: bool, value: Option<&str>) -> Result<bool, RuleError> {
        self.check_arity()?;
        match self.op {
            MatchOp::Any => return Ok(true),
            MatchOp::Exists => return Ok(valid),
            MatchOp::DoesNotExist => return Ok(!valid),
            _ => {}
        }
        // INV: absent → false
        if !valid {
            return Ok(false);
        }
        let Some(value) = value else {
            return Ok(false);
        };

        match self.op {
            MatchOp::In => Ok(self.value.iter().any(|v| v == value)),
            MatchOp::NotIn => Ok(!self.value.iter().any(|v| v == value)),
            MatchOp::InRegexp => Ok(self.regexes()?.iter().any(|re| re.is_match(value))),
            MatchOp::IsTrue => Ok(value == "true"),
            MatchOp::IsFalse => Ok(value == "false"),
            MatchOp::Gt | MatchOp::Ge | MatchOp::Lt | MatchOp::Le => {
                let bounds = self.bounds()?;
                let input = Operand::parse(value, self.is_version())?;
                let Some(ord) = bounds[0].compare(&input) else {
                    return Ok(false);
                };
                Ok(match self.op {
                    MatchOp::Gt => ord.is_gt(),
                    MatchOp::Ge => ord.is_ge(),
                    MatchOp::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                })
            }
            MatchOp::GtLt | MatchOp::GeLe => {
                let bounds = self.bounds()?;
                let input = Operand::parse(value, self.is_version())?;
                let (Some(lo), Some(hi)) = (bounds[0].compare(&input), bounds[1].compare(&input))
                else {
                    return Ok(false);
                };
                Ok(if self.op == MatchOp::GtLt {
                    lo.is_gt() && hi.is_lt()
                } else {
                    lo.is_ge() && hi.is_le()
                })
            }
            // Handled above; `valid` is known to be true here.
            MatchOp::Any | MatchOp::Exists => Ok(true),
            MatchOp::DoesNotExist => Ok(false),
        }
    }
}

fn parse_int(s: &str) -> Result<i64, RuleError> {
    s.parse::<i64>().map_err(|_| RuleError::InvalidNumber {
        value: s.to_owned(),
    })
}

/// A parsed comparison input.
enum Operand {
    Int(i64),
    Version(Version),
}

impl Operand {
    fn parse(s: &str, version: bool) -> Result<Self, RuleError> {
        if version {
            Version::parse(s).map(Self::Version)
        } else {
            parse_int(s).map(Self::Int)
        }
    }
}

/// A parsed comparison bound.
#[derive(Clone)]
enum Bound {
    Int(i64),
    Version(VersionBound),
}

impl Bound {
    fn parse(s: &str, version: bool) -> Result<Self, RuleError> {
        if version {
            VersionBound::parse(s).map(Self::Version)
        } else {
            parse_int(s).map(Self::Int)
        }
    }

    /// Order `input` relative to this bound, or `None` if its flavor is rejected.
    fn compare(&self, input: &Operand) -> Option<Ordering> {
        match (self, input) {
            (Self::Int(bound), Operand::Int(i)) => Some(i.cmp(bound)),
            (Self::Version(bound), Operand::Version(v)) => bound
                .accepts(v)
                .then(|| v.cmp_numeric(bound.version())),
            // Both sides are always parsed with the same `version` flag.
            _ => None,
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Version(a), Self::Version(b)) => a.version().cmp_numeric(b.version()),
            (Self::Int(_), Self::Version(_)) => Ordering::Less,
            (Self::Version(_), Self::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialEq for MatchExpression {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.value == other.value && self.value_type == other.value_type
    }
}

impl Eq for MatchExpression {}

impl fmt::Debug for MatchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchExpression")
            .field("op", &self.op)
            .field("value", &self.value)
            .field("value_type", &self.value_type)
            .finish()
    }
}

impl fmt::Display for MatchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.value.is_empty() {
            write!(f, "[{}]", self.value.join(", "))?;
        }
        if self.is_version() {
            f.write_str(" (version)")?;
        }
        Ok(())
    }
}

/// AND-combination of named expressions, always iterated in name order.
///
/// Decodes from either of two interchangeable encodings:
///
/// ```yaml
/// # shorthand: bare name = Exists, name=value = In[value]
/// matchExpressions: ["foo", "bar=baz"]
///
/// # explicit map form
/// matchExpressions:
///   foo: { op: Exists }
///   bar: { op: In, value: ["baz"] }
/// ```
///
/// Always serializes as the map form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchExpressionSet(BTreeMap<String, MatchExpression>);

impl MatchExpressionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named expression (builder pattern).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, expr: MatchExpression) -> Self {
        self.0.insert(name.into(), expr);
        self
    }

    /// Insert a named expression, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, expr: MatchExpression) {
        self.0.insert(name.into(), expr);
    }

    /// Look up an expression by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MatchExpression> {
        self.0.get(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatchExpression)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of expressions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set is empty (matches vacuously for keys/values).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every expression, reporting the first failure with its name.
    ///
    /// # Errors
    ///
    /// Returns the first [`MatchExpression::validate`] error.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.0.values().try_for_each(MatchExpression::validate)
    }

    /// Parse the shorthand string form: `name` or `name=value`.
    #[must_use]
    pub fn from_shorthand<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in items {
            let item = item.as_ref();
            match item.split_once('=') {
                Some((name, value)) => set.insert(name, MatchExpression::new(MatchOp::In, [value])),
                None => set.insert(item, MatchExpression::op(MatchOp::Exists)),
            }
        }
        set
    }
}

impl FromIterator<(String, MatchExpression)> for MatchExpressionSet {
    fn from_iter<T: IntoIterator<Item = (String, MatchExpression)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for MatchExpressionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MatchExpressionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        // Dispatch on shape first so operator errors keep their message.
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_array() {
            Vec::<String>::deserialize(value)
                .map(Self::from_shorthand)
                .map_err(D::Error::custom)
        } else {
            BTreeMap::<String, MatchExpression>::deserialize(value)
                .map(Self)
                .map_err(D::Error::custom)
        }
    }
}
