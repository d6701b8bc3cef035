//! Operation outcomes and per-field failures.
//!
//! An [`Outcome`] is the user-facing result of a store operation: a payload
//! plus an ordered list of [`Failure`]s. It is valid exactly when the list is
//! empty. Operational faults never appear here; they are
//! [`StorageError`](crate::error::StorageError)s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArgumentError;

/// A single validation failure on one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// The property the failure refers to. May be a dotted path.
    pub property_name: String,

    /// Human-readable description of the failure.
    pub error_message: String,

    /// The value that was rejected.
    #[serde(default)]
    pub attempted_value: Value,
}

impl Failure {
    /// Creates a new failure.
    pub fn new(
        property_name: impl Into<String>,
        error_message: impl Into<String>,
        attempted_value: impl Into<Value>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            error_message: error_message.into(),
            attempted_value: attempted_value.into(),
        }
    }

    /// Renders the attempted value for log output. Null renders as empty.
    fn attempted_for_log(&self) -> String {
        match &self.attempted_value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The outcome of a store operation.
///
/// `item` carries the payload: the persisted entity on success, or the
/// entity the failures refer to otherwise. `index` is set only when the
/// outcome is one element of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome<T = ()> {
    item: T,
    failures: Vec<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl<T> Outcome<T> {
    /// A valid outcome carrying `item`.
    pub fn success(item: T) -> Self {
        Self {
            item,
            failures: Vec::new(),
            index: None,
        }
    }

    /// An outcome carrying `item` and the given failures.
    pub fn with_failures(item: T, failures: Vec<Failure>) -> Self {
        Self {
            item,
            failures,
            index: None,
        }
    }

    /// Sets the batch position this outcome belongs to.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// True when there are no failures.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failures, in insertion order.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// The batch position, if any.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The payload.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Consumes the outcome, returning the payload.
    pub fn into_item(self) -> T {
        self.item
    }

    /// Consumes the outcome, returning payload and failures.
    pub fn into_parts(self) -> (T, Vec<Failure>) {
        (self.item, self.failures)
    }

    /// Appends a failure.
    pub fn push(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Appends failures, preserving their order.
    pub fn extend(&mut self, failures: impl IntoIterator<Item = Failure>) {
        self.failures.extend(failures);
    }

    /// Replaces the payload, keeping failures and index.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            item: f(self.item),
            failures: self.failures,
            index: self.index,
        }
    }

    /// Drops the payload.
    pub fn discard_item(self) -> Outcome {
        self.map(|_| ())
    }

    /// One line per failure: `"{property}: {message} - Attempted value: {value}"`.
    ///
    /// Returns an empty string when there are no failures.
    pub fn format_failures_for_log(&self) -> String {
        self.failures
            .iter()
            .map(|f| {
                format!(
                    "{}: {} - Attempted value: {}",
                    f.property_name,
                    f.error_message,
                    f.attempted_for_log()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rewrites every property name to camelCase, segment by segment.
    ///
    /// `"Address.ZipCode"` becomes `"address.zipCode"`.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::Empty`] if any property name is empty.
    pub fn to_camel_cased_properties(self) -> Result<Self, ArgumentError> {
        let failures = self
            .failures
            .into_iter()
            .map(|f| {
                Ok(Failure {
                    property_name: to_camel_case(&f.property_name)?,
                    ..f
                })
            })
            .collect::<Result<Vec<_>, ArgumentError>>()?;
        Ok(Self {
            item: self.item,
            failures,
            index: self.index,
        })
    }
}

impl Outcome {
    /// A valid outcome with no payload.
    pub fn empty() -> Self {
        Self::success(())
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::empty()
    }
}

fn to_camel_case(name: &str) -> Result<String, ArgumentError> {
    if name.is_empty() {
        return Err(ArgumentError::Empty {
            name: "property_name".to_string(),
        });
    }

    let segments: Vec<String> = name
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    Ok(segments.join("."))
}
