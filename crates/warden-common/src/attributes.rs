//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute bag attached to principals, resources, request contexts and policy conditions.
///
/// Ordered so that any encoding of the map (cache keys, audit details) is deterministic.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Closed set of comparable primitive values an attribute may hold.
///
/// Equality is variant-strict: `Integer(1)` never equals `Float(1.0)` and a string
/// `"true"` never equals `Bool(true)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// UTF-8 text.
    String(String),
    /// Signed integer.
    Integer(i64),
    /// IEEE-754 double. `NaN` never matches anything, itself included.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// UTC instant.
    Timestamp(DateTime<Utc>),
}

impl AttributeValue {
    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Float(_) => "float",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Timestamp(_) => "timestamp",
        }
    }

    /// Borrow the inner text when this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(value) => write!(f, "{value}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Float(value) => write!(f, "{value}"),
            AttributeValue::Bool(value) => write!(f, "{value}"),
            AttributeValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(value)
    }
}

/// Returns true when every entry of `required` is present in `actual` with an equal value.
///
/// An empty `required` map is satisfied by anything.
pub fn contains_all(actual: &AttributeMap, required: &AttributeMap) -> bool {
    required
        .iter()
        .all(|(key, expected)| actual.get(key).is_some_and(|value| value == expected))
}
