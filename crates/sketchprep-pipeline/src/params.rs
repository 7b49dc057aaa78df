//! Parameter values, parameter sets and parameter schemas.
//!
//! A [`ParamSet`] is the caller-owned record of one algorithm instance's
//! settings. Values are loosely typed ([`ParamValue`]) so that a form or a
//! JSON document can supply them directly; kernels read them through the
//! typed accessors on [`ParamSet`], which report malformed values as
//! [`PipelineError::KernelExecution`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// A single parameter value: a number or an option string.
///
/// JSON booleans deserialize to the option strings `"true"` and `"false"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "JsonValue")]
pub enum ParamValue {
    /// A numeric value.
    Number(f64),
    /// An option name (or a number typed as text).
    Text(String),
}

/// Wire form of a [`ParamValue`].
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl From<JsonValue> for ParamValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Number(n) => Self::Number(n),
            JsonValue::Flag(b) => Self::from(b),
            JsonValue::Text(s) => Self::Text(s),
        }
    }
}

impl ParamValue {
    /// The numeric value, parsing text if needed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// The option string, if this is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64's Display already drops a trailing ".0".
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Text(if v { "true" } else { "false" }.to_owned())
    }
}

/// A named set of parameter values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a value.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_owned(), value.into());
    }

    /// Look up a raw value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Copy every entry of `overrides` over this set.
    pub fn merge(&mut self, overrides: &Self) {
        for (k, v) in &overrides.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn require(&self, algorithm: &str, name: &str) -> Result<&ParamValue, PipelineError> {
        self.get(name)
            .ok_or_else(|| PipelineError::kernel(algorithm, format!("missing parameter {name}")))
    }

    /// A numeric parameter.
    ///
    /// # Errors
    ///
    /// [`PipelineError::KernelExecution`] if the value is missing or is
    /// text that does not parse as a number.
    pub fn number(&self, algorithm: &str, name: &str) -> Result<f64, PipelineError> {
        let value = self.require(algorithm, name)?;
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                PipelineError::kernel(algorithm, format!("{name} is not a number: {value}"))
            })
    }

    /// A non-negative integer parameter (fractions truncate, negatives
    /// become 0).
    ///
    /// # Errors
    ///
    /// Same as [`ParamSet::number`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn size(&self, algorithm: &str, name: &str) -> Result<u32, PipelineError> {
        let v = self.number(algorithm, name)?;
        Ok(v.clamp(0.0, f64::from(u32::MAX)) as u32)
    }

    /// A window size forced to be odd and at least 1.
    ///
    /// # Errors
    ///
    /// Same as [`ParamSet::number`].
    pub fn odd_size(&self, algorithm: &str, name: &str) -> Result<u32, PipelineError> {
        Ok(odd(self.size(algorithm, name)?))
    }

    /// A boolean stored as `"true"`/`"false"` (or a non-zero number).
    ///
    /// # Errors
    ///
    /// [`PipelineError::KernelExecution`] for any other text.
    pub fn flag(&self, algorithm: &str, name: &str) -> Result<bool, PipelineError> {
        match self.require(algorithm, name)? {
            ParamValue::Number(n) => Ok(*n != 0.0),
            ParamValue::Text(s) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(PipelineError::kernel(
                    algorithm,
                    format!("{name} must be true or false, got {other}"),
                )),
            },
        }
    }

    /// An option parameter parsed into its enum.
    ///
    /// # Errors
    ///
    /// [`PipelineError::KernelExecution`] if the value is not one of
    /// `T::OPTIONS`.
    pub fn choice<T: Choice>(&self, algorithm: &str, name: &str) -> Result<T, PipelineError> {
        let value = self.require(algorithm, name)?;
        value.as_str().and_then(T::from_name).ok_or_else(|| {
            PipelineError::kernel(algorithm, format!("{name} has unknown option {value}"))
        })
    }
}

impl<'a> FromIterator<(&'a str, ParamValue)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (&'a str, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }
}

/// Round an even window size up to the next odd value; 0 becomes 1.
#[must_use]
pub const fn odd(size: u32) -> u32 {
    if size == 0 {
        1
    } else if size % 2 == 0 {
        size.saturating_add(1)
    } else {
        size
    }
}

/// A closed set of named options.
pub trait Choice: Sized + Copy + PartialEq + 'static {
    /// Every option with its wire name, in display order.
    const OPTIONS: &'static [(&'static str, Self)];

    /// Look up an option by wire name.
    #[must_use]
    fn from_name(name: &str) -> Option<Self> {
        Self::OPTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// The wire name of this option.
    #[must_use]
    fn name(self) -> &'static str {
        Self::OPTIONS
            .iter()
            .find(|(_, v)| *v == self)
            .map_or("", |(n, _)| n)
    }

    /// All wire names, in order.
    #[must_use]
    fn names() -> Vec<&'static str> {
        Self::OPTIONS.iter().map(|(n, _)| *n).collect()
    }
}

/// Shape of a parameter's admissible values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    /// A number in `min..=max`, adjusted in `step` increments by UIs.
    Numeric {
        /// Smallest admissible value.
        min: f64,
        /// Largest admissible value.
        max: f64,
        /// UI increment.
        step: f64,
    },
    /// One of a fixed list of option names.
    Choice {
        /// Admissible option names.
        options: Vec<&'static str>,
    },
}

/// Schema entry for one parameter of an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Wire name (camelCase).
    pub name: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Admissible values.
    #[serde(flatten)]
    pub kind: ParamKind,
    /// Value used when an instance does not override it.
    pub default: ParamValue,
    /// Representative values swept by the preview engine, in order.
    pub preview_values: Vec<ParamValue>,
}

impl ParamSpec {
    /// A numeric parameter.
    #[must_use]
    pub fn numeric(
        name: &'static str,
        label: &'static str,
        (min, max, step): (f64, f64, f64),
        default: f64,
        preview: &[f64],
    ) -> Self {
        Self {
            name,
            label,
            kind: ParamKind::Numeric { min, max, step },
            default: ParamValue::Number(default),
            preview_values: preview.iter().map(|&v| ParamValue::Number(v)).collect(),
        }
    }

    /// An option parameter backed by a [`Choice`] enum.
    #[must_use]
    pub fn choice<T: Choice>(
        name: &'static str,
        label: &'static str,
        default: T,
        preview: &[T],
    ) -> Self {
        Self::options(
            name,
            label,
            T::names(),
            default.name(),
            &preview.iter().map(|v| v.name()).collect::<Vec<_>>(),
        )
    }

    /// An option parameter from plain strings.
    #[must_use]
    pub fn options(
        name: &'static str,
        label: &'static str,
        options: Vec<&'static str>,
        default: &str,
        preview: &[&str],
    ) -> Self {
        Self {
            name,
            label,
            kind: ParamKind::Choice { options },
            default: ParamValue::from(default),
            preview_values: preview.iter().map(|&v| ParamValue::from(v)).collect(),
        }
    }

    /// A `"true"`/`"false"` parameter.
    #[must_use]
    pub fn flag(name: &'static str, label: &'static str, default: bool) -> Self {
        let d = if default { "true" } else { "false" };
        Self::options(name, label, vec!["true", "false"], d, &["true", "false"])
    }

    /// Check a value against this schema entry.
    ///
    /// # Errors
    ///
    /// A human-readable reason when the value is the wrong kind, outside
    /// the numeric range, or not one of the options.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match &self.kind {
            ParamKind::Numeric { min, max, .. } => {
                let v = value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("expected a number, got {value}"))?;
                if v < *min || v > *max {
                    return Err(format!("{v} is outside {min}..={max}"));
                }
                Ok(())
            }
            ParamKind::Choice { options } => match value.as_str() {
                Some(s) if options.contains(&s) => Ok(()),
                _ => Err(format!("{value} is not one of {}", options.join(", "))),
            },
        }
    }
}
