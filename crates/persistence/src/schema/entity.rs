//! Entity registration.
//!
//! Each entity type registers its fields once, in an [`EntitySchema`] built
//! at first use. A field registration carries a getter and a setter function
//! so that backends and the store service can read, compare and patch a
//! single field without any per-call reflection.

use std::fmt;

use crate::error::SelectorError;

use super::selector::FieldSelector;
use super::value::{FieldType, FieldValue};

/// Reads a field value out of an entity.
pub type Getter<E> = fn(&E) -> FieldValue;

/// Writes a field value into an entity.
pub type Setter<E> = fn(&mut E, FieldValue) -> Result<(), SelectorError>;

/// A record type with a stable identity field.
///
/// # Example
///
/// ```
/// use std::sync::OnceLock;
/// use strata_persistence::schema::{Entity, EntitySchema, FieldDescriptor, FieldType};
///
/// #[derive(Debug, Clone, Default)]
/// struct Tag {
///     id: String,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     const NAME: &'static str = "Tag";
///
///     fn schema() -> &'static EntitySchema<Self> {
///         static SCHEMA: OnceLock<EntitySchema<Tag>> = OnceLock::new();
///         SCHEMA.get_or_init(|| {
///             EntitySchema::builder(Self::NAME, Tag::default)
///                 .field(FieldDescriptor::new(
///                     "id",
///                     FieldType::Text,
///                     |t| t.id.clone().into(),
///                     |t, v| { t.id = v.take("id")?; Ok(()) },
///                 ))
///                 .field(
///                     FieldDescriptor::new(
///                         "label",
///                         FieldType::Text,
///                         |t: &Tag| t.label.clone().into(),
///                         |t, v| { t.label = v.take("label")?; Ok(()) },
///                     )
///                     .searchable(),
///                 )
///                 .identity("id")
///                 .build()
///                 .expect("Tag schema is valid")
///         })
///     }
/// }
///
/// let label = Tag::field("tag.label").unwrap();
/// assert_eq!(label.name(), "label");
/// ```
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Stable entity name, used for table and collection names and in errors.
    const NAME: &'static str;

    /// The registered schema for this entity type.
    fn schema() -> &'static EntitySchema<Self>;

    /// Resolves a selector expression against this entity's schema.
    fn field(expression: &str) -> Result<FieldSelector<Self>, SelectorError> {
        Self::schema().select(expression)
    }

    /// Selector for the identity field.
    fn id_selector() -> FieldSelector<Self> {
        Self::schema().id()
    }
}

/// Registration of one entity field.
pub struct FieldDescriptor<E> {
    name: &'static str,
    field_type: FieldType,
    nullable: bool,
    searchable: bool,
    getter: Getter<E>,
    setter: Setter<E>,
}

impl<E> FieldDescriptor<E> {
    /// Registers a non-nullable, non-searchable field.
    pub fn new(
        name: &'static str,
        field_type: FieldType,
        getter: Getter<E>,
        setter: Setter<E>,
    ) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
            searchable: false,
            getter,
            setter,
        }
    }

    /// Marks the field as accepting null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Includes the field in search-term matching.
    ///
    /// Only text fields may be searchable; [`EntitySchemaBuilder::build`]
    /// rejects anything else.
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared field type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the field accepts null.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the field takes part in search-term matching.
    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    /// Reads this field from an entity.
    pub fn get(&self, entity: &E) -> FieldValue {
        (self.getter)(entity)
    }

    /// Writes a value into this field after coercing it to the field type.
    pub fn set(&self, entity: &mut E, value: FieldValue) -> Result<(), SelectorError> {
        let value = self.field_type.coerce(self.name, value)?;
        if value.is_null() && !self.nullable {
            return Err(SelectorError::NotNullable {
                field: self.name.to_string(),
            });
        }
        (self.setter)(entity, value)
    }
}

impl<E> fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("searchable", &self.searchable)
            .finish_non_exhaustive()
    }
}

/// The field table of one entity type.
pub struct EntitySchema<E> {
    name: &'static str,
    binding: String,
    blank: fn() -> E,
    fields: Vec<FieldDescriptor<E>>,
    id_index: usize,
}

impl<E: Entity> EntitySchema<E> {
    /// Starts a schema for the entity `name`.
    ///
    /// `blank` produces the starting value that hydration writes fields into.
    pub fn builder(name: &'static str, blank: fn() -> E) -> EntitySchemaBuilder<E> {
        EntitySchemaBuilder {
            name,
            blank,
            fields: Vec::new(),
            identity: None,
        }
    }

    /// Entity name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The root parameter name selector expressions may be qualified with.
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// All registered fields in registration order.
    pub fn fields(&self) -> &[FieldDescriptor<E>] {
        &self.fields
    }

    /// Selectors for the fields that take part in search-term matching.
    pub fn searchable_fields(&'static self) -> Vec<FieldSelector<E>> {
        (0..self.fields.len())
            .filter(|i| self.fields[*i].searchable)
            .map(|i| FieldSelector::new(self, i))
            .collect()
    }

    /// Selector for the identity field.
    pub fn id(&'static self) -> FieldSelector<E> {
        FieldSelector::new(self, self.id_index)
    }

    /// Iterates selectors for every registered field.
    pub fn selectors(&'static self) -> impl Iterator<Item = FieldSelector<E>> {
        (0..self.fields.len()).map(move |i| FieldSelector::new(self, i))
    }

    /// Looks up a field by exact name, falling back to a case-insensitive match.
    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name.eq_ignore_ascii_case(name))
            })
    }

    pub(crate) fn descriptor(&self, index: usize) -> &FieldDescriptor<E> {
        &self.fields[index]
    }

    /// Reads every field of an entity, in registration order.
    ///
    /// Fails on a NaN or infinite float, which no backend stores faithfully.
    pub fn values(&self, entity: &E) -> Result<Vec<(&'static str, FieldValue)>, SelectorError> {
        self.fields
            .iter()
            .map(|f| {
                let value = f.get(entity);
                value.ensure_finite(f.name)?;
                Ok((f.name, value))
            })
            .collect()
    }

    /// Builds an entity from named field values.
    ///
    /// Fields that are not supplied keep the value produced by the blank
    /// constructor. Unknown names are rejected.
    pub fn hydrate<'a, I>(&self, values: I) -> Result<E, SelectorError>
    where
        I: IntoIterator<Item = (&'a str, FieldValue)>,
    {
        let mut entity = (self.blank)();
        for (name, value) in values {
            let index = self
                .index_of(name)
                .ok_or_else(|| SelectorError::UnknownField {
                    entity: self.name.to_string(),
                    field: name.to_string(),
                })?;
            self.fields[index].set(&mut entity, value)?;
        }
        Ok(entity)
    }

    /// Returns a copy of `entity` with exactly one field replaced.
    pub fn with(
        &self,
        entity: &E,
        field: &FieldSelector<E>,
        value: FieldValue,
    ) -> Result<E, SelectorError> {
        let mut copy = entity.clone();
        field.descriptor().set(&mut copy, value)?;
        Ok(copy)
    }

    /// Converts an entity into a JSON object keyed by field name.
    pub fn to_document(
        &self,
        entity: &E,
    ) -> Result<serde_json::Map<String, serde_json::Value>, SelectorError> {
        self.fields
            .iter()
            .map(|f| Ok((f.name.to_string(), f.get(entity).to_json_checked(f.name)?)))
            .collect()
    }

    /// Builds an entity from a JSON object keyed by field name.
    ///
    /// Keys that are not registered fields are ignored.
    pub fn from_document(
        &self,
        document: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<E, SelectorError> {
        let mut entity = (self.blank)();
        for field in &self.fields {
            if let Some(raw) = document.get(field.name) {
                let value = FieldValue::from_json(field.name, field.field_type, raw)?;
                field.set(&mut entity, value)?;
            }
        }
        Ok(entity)
    }
}

impl<E> fmt::Debug for EntitySchema<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("id_index", &self.id_index)
            .finish()
    }
}

/// Builder for [`EntitySchema`].
pub struct EntitySchemaBuilder<E> {
    name: &'static str,
    blank: fn() -> E,
    fields: Vec<FieldDescriptor<E>>,
    identity: Option<&'static str>,
}

impl<E: Entity> EntitySchemaBuilder<E> {
    /// Registers a field.
    pub fn field(mut self, descriptor: FieldDescriptor<E>) -> Self {
        self.fields.push(descriptor);
        self
    }

    /// Names the identity field.
    pub fn identity(mut self, name: &'static str) -> Self {
        self.identity = Some(name);
        self
    }

    /// Validates the registrations and builds the schema.
    ///
    /// Fails if a field name is registered twice, if a non-text field is
    /// marked searchable, or if the identity field is missing or
    /// unregistered.
    pub fn build(self) -> Result<EntitySchema<E>, SelectorError> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.searchable && field.field_type != FieldType::Text {
                return Err(SelectorError::UnsupportedShape {
                    expression: format!(
                        "{}.{} is {} and cannot be searchable",
                        self.name, field.name, field.field_type
                    ),
                });
            }
            if self.fields[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(field.name))
            {
                return Err(SelectorError::UnsupportedShape {
                    expression: format!("{}.{} registered twice", self.name, field.name),
                });
            }
        }

        let identity = self.identity.ok_or_else(|| SelectorError::UnknownField {
            entity: self.name.to_string(),
            field: "<identity>".to_string(),
        })?;
        let id_index = self
            .fields
            .iter()
            .position(|f| f.name == identity)
            .ok_or_else(|| SelectorError::UnknownField {
                entity: self.name.to_string(),
                field: identity.to_string(),
            })?;

        Ok(EntitySchema {
            name: self.name,
            binding: self.name.to_ascii_lowercase(),
            blank: self.blank,
            fields: self.fields,
            id_index,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::OnceLock;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Widget {
        pub id: i64,
        pub label: String,
        pub weight: f64,
        pub note: Option<String>,
    }

    impl Entity for Widget {
        const NAME: &'static str = "Widget";

        fn schema() -> &'static EntitySchema<Self> {
            static SCHEMA: OnceLock<EntitySchema<Widget>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntitySchema::builder(Self::NAME, Widget::default)
                    .field(FieldDescriptor::new(
                        "id",
                        FieldType::Integer,
                        |w| w.id.into(),
                        |w, v| {
                            w.id = v.take("id")?;
                            Ok(())
                        },
                    ))
                    .field(
                        FieldDescriptor::new(
                            "label",
                            FieldType::Text,
                            |w: &Widget| w.label.clone().into(),
                            |w, v| {
                                w.label = v.take("label")?;
                                Ok(())
                            },
                        )
                        .searchable(),
                    )
                    .field(FieldDescriptor::new(
                        "weight",
                        FieldType::Float,
                        |w| w.weight.into(),
                        |w, v| {
                            w.weight = v.take("weight")?;
                            Ok(())
                        },
                    ))
                    .field(
                        FieldDescriptor::new(
                            "note",
                            FieldType::Text,
                            |w: &Widget| w.note.clone().into(),
                            |w, v| {
                                w.note = v.take("note")?;
                                Ok(())
                            },
                        )
                        .nullable(),
                    )
                    .identity("id")
                    .build()
                    .expect("widget schema")
            })
        }
    }

    #[test]
    fn test_schema_registration() {
        let schema = Widget::schema();
        assert_eq!(schema.name(), "Widget");
        assert_eq!(schema.binding(), "widget");
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(schema.id().name(), "id");
        assert_eq!(schema.searchable_fields().len(), 1);
    }

    #[test]
    fn test_hydrate_and_values() {
        let schema = Widget::schema();
        let widget = schema
            .hydrate(vec![
                ("id", FieldValue::Integer(7)),
                ("label", FieldValue::from("bolt")),
                ("weight", FieldValue::Integer(2)),
            ])
            .unwrap();
        assert_eq!(widget.id, 7);
        assert_eq!(widget.weight, 2.0);
        assert_eq!(widget.note, None);

        let values = schema.values(&widget).unwrap();
        assert_eq!(values[1], ("label", FieldValue::from("bolt")));
    }

    #[test]
    fn test_hydrate_rejects_unknown_field() {
        let err = Widget::schema()
            .hydrate(vec![("colour", FieldValue::from("red"))])
            .unwrap_err();
        assert!(matches!(err, SelectorError::UnknownField { .. }));
    }

    #[test]
    fn test_with_replaces_one_field() {
        let original = Widget {
            id: 1,
            label: "nut".to_string(),
            weight: 0.5,
            note: None,
        };
        let label = Widget::field("label").unwrap();
        let copy = Widget::schema()
            .with(&original, &label, FieldValue::from("washer"))
            .unwrap();
        assert_eq!(copy.label, "washer");
        assert_eq!(copy.id, original.id);
        assert_eq!(original.label, "nut");
    }

    #[test]
    fn test_set_null_on_required_field_fails() {
        let mut widget = Widget::default();
        let label = Widget::field("label").unwrap();
        let err = label
            .descriptor()
            .set(&mut widget, FieldValue::Null)
            .unwrap_err();
        assert!(matches!(err, SelectorError::NotNullable { .. }));
    }

    #[test]
    fn test_document_round_trip() {
        let widget = Widget {
            id: 3,
            label: "gear".to_string(),
            weight: 1.25,
            note: Some("spare".to_string()),
        };
        let schema = Widget::schema();
        let doc = schema.to_document(&widget).unwrap();
        assert_eq!(doc["label"], "gear");
        assert_eq!(schema.from_document(&doc).unwrap(), widget);
    }

    #[test]
    fn test_build_requires_identity() {
        let err = EntitySchema::<Widget>::builder("Widget", Widget::default)
            .field(FieldDescriptor::new(
                "label",
                FieldType::Text,
                |w| w.label.clone().into(),
                |w, v| {
                    w.label = v.take("label")?;
                    Ok(())
                },
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, SelectorError::UnknownField { .. }));
    }

    #[test]
    fn test_build_rejects_searchable_non_text() {
        let err = EntitySchema::<Widget>::builder("Widget", Widget::default)
            .field(FieldDescriptor::new(
                "id",
                FieldType::Integer,
                |w| w.id.into(),
                |w, v| {
                    w.id = v.take("id")?;
                    Ok(())
                },
            ))
            .field(
                FieldDescriptor::new(
                    "weight",
                    FieldType::Float,
                    |w: &Widget| w.weight.into(),
                    |w, v| {
                        w.weight = v.take("weight")?;
                        Ok(())
                    },
                )
                .searchable(),
            )
            .identity("id")
            .build()
            .unwrap_err();
        assert!(matches!(err, SelectorError::UnsupportedShape { .. }));
        assert!(err.to_string().contains("Widget.weight"));
    }
}
