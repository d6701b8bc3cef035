//! Field types and literal values.
//!
//! [`FieldValue`] is the backend-neutral literal that flows through every
//! selector, predicate and patch. [`FieldType`] is the declared type of a
//! registered field and owns the coercion rules used when a literal is
//! compared against, or written into, that field.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SelectorError;

/// The declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

impl FieldType {
    /// Reconciles a literal with this field type.
    ///
    /// Integers widen to floats when the float holds them exactly. Null is
    /// accepted everywhere so that a comparison against an absent value can
    /// be expressed. NaN, infinities and anything that would need a
    /// narrowing conversion are rejected.
    pub fn coerce(&self, field: &str, value: FieldValue) -> Result<FieldValue, SelectorError> {
        match (self, value) {
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldType::Text, v @ FieldValue::Text(_)) => Ok(v),
            (FieldType::Integer, v @ FieldValue::Integer(_)) => Ok(v),
            (FieldType::Float, v @ FieldValue::Float(_)) => {
                v.ensure_finite(field)?;
                Ok(v)
            }
            (FieldType::Float, FieldValue::Integer(i)) => {
                let widened = i as f64;
                if widened as i128 != i as i128 {
                    return Err(SelectorError::TypeMismatch {
                        field: field.to_string(),
                        expected: "float".to_string(),
                        actual: format!("integer {} beyond float precision", i),
                    });
                }
                Ok(FieldValue::Float(widened))
            }
            (FieldType::Boolean, v @ FieldValue::Bool(_)) => Ok(v),
            (FieldType::Timestamp, v @ FieldValue::Timestamp(_)) => Ok(v),
            (expected, other) => Err(SelectorError::TypeMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                actual: other.kind_name().to_string(),
            }),
        }
    }
}

/// A literal value of an entity field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Absent value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// UTC timestamp value.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Returns true if this is [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the kind of this value as a lowercase name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    /// Returns the text content if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this value into a concrete Rust type.
    pub fn take<T: FromFieldValue>(self, field: &str) -> Result<T, SelectorError> {
        T::from_field_value(field, self)
    }

    /// Equality used by in-process predicate evaluation.
    ///
    /// Null equals null, and integers compare exactly against floats.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Float(b))
            | (FieldValue::Float(b), FieldValue::Integer(a)) => {
                compare_integer_float(*a, *b) == Ordering::Equal
            }
            (a, b) => a == b,
        }
    }

    /// Rejects NaN and infinite floats.
    pub fn ensure_finite(&self, field: &str) -> Result<(), SelectorError> {
        match self {
            FieldValue::Float(f) if !f.is_finite() => Err(SelectorError::NotFinite {
                field: field.to_string(),
                value: f.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Total ordering used for sorting.
    ///
    /// Nulls sort first. Values of different kinds order by kind, matching
    /// SQLite's storage class ordering for the kinds that map onto it.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Null, _) => Ordering::Less,
            (_, FieldValue::Null) => Ordering::Greater,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.total_cmp(b),
            (FieldValue::Integer(a), FieldValue::Float(b)) => compare_integer_float(*a, *b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => compare_integer_float(*b, *a).reverse(),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    /// Case-insensitive (ASCII) substring test used by search-term filters.
    ///
    /// Non-text values never match.
    pub fn contains_text(&self, term: &str) -> bool {
        match self {
            FieldValue::Text(s) => s
                .to_ascii_lowercase()
                .contains(&term.to_ascii_lowercase()),
            _ => false,
        }
    }

    /// Converts this value to JSON.
    ///
    /// Non-finite floats have no JSON form and render as null; use
    /// [`FieldValue::to_json_checked`] where that must be an error.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        }
    }

    /// Converts this value to JSON, rejecting non-finite floats.
    pub fn to_json_checked(&self, field: &str) -> Result<Value, SelectorError> {
        self.ensure_finite(field)?;
        Ok(self.to_json())
    }

    /// Reads a JSON value as a literal of the given field type.
    pub fn from_json(field: &str, field_type: FieldType, value: &Value) -> Result<Self, SelectorError> {
        let mismatch = || SelectorError::TypeMismatch {
            field: field.to_string(),
            expected: field_type.to_string(),
            actual: json_kind(value).to_string(),
        };

        match (field_type, value) {
            (_, Value::Null) => Ok(FieldValue::Null),
            (FieldType::Text, Value::String(s)) => Ok(FieldValue::Text(s.clone())),
            (FieldType::Integer, Value::Number(n)) => {
                n.as_i64().map(FieldValue::Integer).ok_or_else(mismatch)
            }
            (FieldType::Float, Value::Number(n)) => {
                n.as_f64().map(FieldValue::Float).ok_or_else(mismatch)
            }
            (FieldType::Boolean, Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
            (FieldType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| FieldValue::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) | FieldValue::Integer(_) | FieldValue::Float(_) => 1,
            FieldValue::Text(_) | FieldValue::Timestamp(_) => 2,
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the
/// integer. NaN sorts after every integer.
fn compare_integer_float(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        return Ordering::Less;
    }
    let floor = b.floor();
    if floor >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    if floor < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    match a.cmp(&(floor as i64)) {
        Ordering::Equal if b > floor => Ordering::Less,
        ordering => ordering,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        v.to_json()
    }
}

/// Conversion from a [`FieldValue`] into a concrete field type.
///
/// Used by entity setters. Non-optional targets reject null.
pub trait FromFieldValue: Sized {
    /// Converts `value`, naming `field` in any error.
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError>;
}

fn mismatch(field: &str, expected: FieldType, value: &FieldValue) -> SelectorError {
    if value.is_null() {
        SelectorError::NotNullable {
            field: field.to_string(),
        }
    } else {
        SelectorError::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: value.kind_name().to_string(),
        }
    }
}

impl FromFieldValue for String {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Text(s) => Ok(s),
            other => Err(mismatch(field, FieldType::Text, &other)),
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Integer(i) => Ok(i),
            other => Err(mismatch(field, FieldType::Integer, &other)),
        }
    }
}

impl FromFieldValue for i32 {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Integer(i) => i32::try_from(i).map_err(|_| SelectorError::TypeMismatch {
                field: field.to_string(),
                expected: "32-bit integer".to_string(),
                actual: format!("integer {}", i),
            }),
            other => Err(mismatch(field, FieldType::Integer, &other)),
        }
    }
}

impl FromFieldValue for f64 {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Float(f) => Ok(f),
            FieldValue::Integer(i) => Ok(i as f64),
            other => Err(mismatch(field, FieldType::Float, &other)),
        }
    }
}

impl FromFieldValue for bool {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Bool(b) => Ok(b),
            other => Err(mismatch(field, FieldType::Boolean, &other)),
        }
    }
}

impl FromFieldValue for DateTime<Utc> {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Timestamp(ts) => Ok(ts),
            other => Err(mismatch(field, FieldType::Timestamp, &other)),
        }
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field_value(field: &str, value: FieldValue) -> Result<Self, SelectorError> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field_value(field, other).map(Some),
        }
    }
}
