//! Query documents for the document store.
//!
//! Predicates and search terms are translated into [`DocumentFilter`]s,
//! which evaluate directly against stored JSON objects. A filter also
//! renders as an operator document (`{"email": {"$eq": "a@x.com"}}`) for
//! logging.

use serde_json::{Map, Value, json};

use crate::schema::{Entity, FieldSelector, FieldType, FieldValue, Predicate};

/// A filter over JSON documents.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    /// Matches every document.
    All,
    /// The field equals the value. A null value matches absent fields.
    Eq {
        field: &'static str,
        field_type: FieldType,
        value: FieldValue,
    },
    /// The field equals any of the values.
    In {
        field: &'static str,
        field_type: FieldType,
        values: Vec<FieldValue>,
    },
    /// Any of the fields contains the term, ignoring ASCII case.
    Contains {
        fields: Vec<&'static str>,
        term: String,
    },
}

impl DocumentFilter {
    /// Translates a predicate.
    pub fn from_predicate<E: Entity>(predicate: &Predicate<E>) -> Self {
        match predicate {
            Predicate::Equals { field, value } => DocumentFilter::Eq {
                field: field.name(),
                field_type: field.field_type(),
                value: value.clone(),
            },
            Predicate::OneOf { field, values } => DocumentFilter::In {
                field: field.name(),
                field_type: field.field_type(),
                values: values.clone(),
            },
        }
    }

    /// Translates a search term over the given fields.
    ///
    /// A blank term matches everything. A term over no searchable fields
    /// matches nothing.
    pub fn search_term<E: Entity>(term: &str, fields: &[FieldSelector<E>]) -> Self {
        let term = term.trim();
        if term.is_empty() {
            return DocumentFilter::All;
        }
        DocumentFilter::Contains {
            fields: fields.iter().map(|f| f.name()).collect(),
            term: term.to_string(),
        }
    }

    /// Evaluates the filter against a stored document.
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        match self {
            DocumentFilter::All => true,
            DocumentFilter::Eq {
                field,
                field_type,
                value,
            } => read(document, field, *field_type).matches(value),
            DocumentFilter::In {
                field,
                field_type,
                values,
            } => {
                let stored = read(document, field, *field_type);
                values.iter().any(|v| stored.matches(v))
            }
            DocumentFilter::Contains { fields, term } => fields.iter().any(|field| {
                document
                    .get(*field)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.to_ascii_lowercase().contains(&term.to_ascii_lowercase()))
            }),
        }
    }

    /// Operator-document rendering of the filter.
    pub fn to_json(&self) -> Value {
        match self {
            DocumentFilter::All => json!({}),
            DocumentFilter::Eq { field, value, .. } => json!({ *field: { "$eq": value.to_json() } }),
            DocumentFilter::In { field, values, .. } => {
                let values: Vec<Value> = values.iter().map(FieldValue::to_json).collect();
                json!({ *field: { "$in": values } })
            }
            DocumentFilter::Contains { fields, term } => {
                let clauses: Vec<Value> = fields
                    .iter()
                    .map(|f| json!({ *f: { "$contains": term } }))
                    .collect();
                json!({ "$or": clauses })
            }
        }
    }
}

/// Reads a field of a document as a literal of its type.
///
/// Absent fields and values that do not parse as the field type read as null.
fn read(document: &Map<String, Value>, field: &str, field_type: FieldType) -> FieldValue {
    document
        .get(field)
        .and_then(|raw| FieldValue::from_json(field, field_type, raw).ok())
        .unwrap_or(FieldValue::Null)
}
