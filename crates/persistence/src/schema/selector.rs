//! Field selectors and predicates.
//!
//! A [`FieldSelector`] is a resolved, copyable handle to exactly one
//! registered field. Backends never see selector expressions; they only see
//! the field name, type and the [`Predicate`] built from a selector.

use std::fmt;

use crate::error::SelectorError;

use super::entity::{Entity, EntitySchema, FieldDescriptor};
use super::value::{FieldType, FieldValue};

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `field` or `root.field` into its root and field parts.
fn parse_member_access(expression: &str) -> Option<(Option<&str>, &str)> {
    let segments: Vec<&str> = expression.trim().split('.').collect();
    if !segments.iter().all(|s| is_identifier(s)) {
        return None;
    }
    match segments.as_slice() {
        [field] => Some((None, *field)),
        [root, field] => Some((Some(*root), *field)),
        _ => None,
    }
}

impl<E: Entity> EntitySchema<E> {
    /// Resolves a selector expression to a field of this entity.
    ///
    /// The expression must be a direct member access, either `field` or
    /// `root.field` where `root` is [`binding`](Self::binding). Field names
    /// match exactly first, then case-insensitively.
    ///
    /// # Errors
    ///
    /// - [`SelectorError::UnsupportedShape`] for calls, arithmetic, multi-hop
    ///   paths or a root that is not this entity's binding.
    /// - [`SelectorError::UnknownField`] if the name is not registered.
    pub fn select(&'static self, expression: &str) -> Result<FieldSelector<E>, SelectorError> {
        let unsupported = || SelectorError::UnsupportedShape {
            expression: expression.to_string(),
        };

        let (root, field) = parse_member_access(expression).ok_or_else(unsupported)?;
        if let Some(root) = root {
            if root != self.binding() && !root.eq_ignore_ascii_case(self.name()) {
                return Err(unsupported());
            }
        }

        let index = self
            .index_of(field)
            .ok_or_else(|| SelectorError::UnknownField {
                entity: self.name().to_string(),
                field: field.to_string(),
            })?;

        Ok(FieldSelector::new(self, index))
    }
}

/// A resolved reference to one field of `E`.
pub struct FieldSelector<E: 'static> {
    schema: &'static EntitySchema<E>,
    index: usize,
}

impl<E: Entity> FieldSelector<E> {
    pub(crate) fn new(schema: &'static EntitySchema<E>, index: usize) -> Self {
        Self { schema, index }
    }

    pub(crate) fn descriptor(&self) -> &'static FieldDescriptor<E> {
        self.schema.descriptor(self.index)
    }

    /// The field name.
    pub fn name(&self) -> &'static str {
        self.descriptor().name()
    }

    /// The field's declared type.
    pub fn field_type(&self) -> FieldType {
        self.descriptor().field_type()
    }

    /// Whether the field accepts null.
    pub fn is_nullable(&self) -> bool {
        self.descriptor().is_nullable()
    }

    /// The root entity parameter predicates on this field are expressed over.
    pub fn binding(&self) -> &'static str {
        self.schema.binding()
    }

    /// The schema this selector belongs to.
    pub fn schema(&self) -> &'static EntitySchema<E> {
        self.schema
    }

    /// Whether this selector is the entity's identity field.
    pub fn is_identity(&self) -> bool {
        self.schema.id().index == self.index
    }

    /// Reads the selected field from an entity.
    pub fn get(&self, entity: &E) -> FieldValue {
        self.descriptor().get(entity)
    }

    /// Coerces a literal to this field's type.
    pub fn coerce(&self, value: impl Into<FieldValue>) -> Result<FieldValue, SelectorError> {
        self.field_type().coerce(self.name(), value.into())
    }

    /// Builds an equality predicate against a literal.
    ///
    /// Integer literals against float fields are widened. Any other kind
    /// mismatch is rejected rather than truncated.
    pub fn eq(&self, value: impl Into<FieldValue>) -> Result<Predicate<E>, SelectorError> {
        Ok(Predicate::Equals {
            field: *self,
            value: self.coerce(value)?,
        })
    }

    /// Builds a membership predicate against a set of literals.
    pub fn one_of<I, V>(&self, values: I) -> Result<Predicate<E>, SelectorError>
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let values = values
            .into_iter()
            .map(|v| self.coerce(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Predicate::OneOf {
            field: *self,
            values,
        })
    }
}

impl<E: 'static> Clone for FieldSelector<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: 'static> Copy for FieldSelector<E> {}

impl<E: 'static> PartialEq for FieldSelector<E> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema) && self.index == other.index
    }
}

impl<E: 'static> Eq for FieldSelector<E> {}

impl<E: Entity> fmt::Debug for FieldSelector<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldSelector({}.{})", self.binding(), self.name())
    }
}

impl<E: Entity> fmt::Display for FieldSelector<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.binding(), self.name())
    }
}

/// A backend-neutral condition on one field.
pub enum Predicate<E: 'static> {
    /// The field equals the value.
    Equals {
        field: FieldSelector<E>,
        value: FieldValue,
    },
    /// The field equals any of the values. Never matches when empty.
    OneOf {
        field: FieldSelector<E>,
        values: Vec<FieldValue>,
    },
}

impl<E: Entity> Predicate<E> {
    /// The field the predicate is expressed over.
    pub fn field(&self) -> FieldSelector<E> {
        match self {
            Predicate::Equals { field, .. } | Predicate::OneOf { field, .. } => *field,
        }
    }

    /// The root entity parameter.
    pub fn binding(&self) -> &'static str {
        self.field().binding()
    }

    /// Evaluates the predicate against an entity.
    pub fn matches(&self, entity: &E) -> bool {
        match self {
            Predicate::Equals { field, value } => field.get(entity).matches(value),
            Predicate::OneOf { field, values } => {
                let actual = field.get(entity);
                values.iter().any(|v| actual.matches(v))
            }
        }
    }
}

impl<E: 'static> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Equals { field, value } => Predicate::Equals {
                field: *field,
                value: value.clone(),
            },
            Predicate::OneOf { field, values } => Predicate::OneOf {
                field: *field,
                values: values.clone(),
            },
        }
    }
}

impl<E: Entity> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals { field, value } => write!(f, "{} == {:?}", field, value),
            Predicate::OneOf { field, values } => write!(f, "{} in {:?}", field, values),
        }
    }
}
