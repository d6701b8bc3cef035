//! Entity schemas and the field selector resolver.
//!
//! Entities register their fields once, with a getter and setter per field.
//! A selector expression such as `"email"` or `"user.email"` resolves to a
//! [`FieldSelector`], which yields the field's name and type and builds
//! equality and membership [`Predicate`]s. Everything above this module
//! works in terms of selectors and predicates only.

mod entity;
mod selector;
mod value;

pub use entity::{Entity, EntitySchema, EntitySchemaBuilder, FieldDescriptor, Getter, Setter};
pub use selector::{FieldSelector, Predicate};
pub use value::{FieldType, FieldValue, FromFieldValue};

#[cfg(test)]
pub(crate) use entity::tests as tests_support;
