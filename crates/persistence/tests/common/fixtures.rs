//! Test fixtures for persistence layer testing.
//!
//! Two entities cover both identity kinds: [`User`] has an integer identity
//! assigned by the backend, [`Tag`] has a text identity. [`Bin`] has no
//! searchable fields.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};

use strata_persistence::schema::{Entity, EntitySchema, FieldDescriptor, FieldType, FieldValue};
use strata_persistence::validation::RuleValidator;

/// A user account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub age: Option<i64>,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: 0,
            email: String::new(),
            name: String::new(),
            age: None,
            active: true,
            joined_at: epoch(),
        }
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

impl Entity for User {
    const NAME: &'static str = "User";

    fn schema() -> &'static EntitySchema<Self> {
        static SCHEMA: OnceLock<EntitySchema<User>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::builder(Self::NAME, User::default)
                .field(FieldDescriptor::new(
                    "id",
                    FieldType::Integer,
                    |u| u.id.into(),
                    |u, v| {
                        u.id = v.take("id")?;
                        Ok(())
                    },
                ))
                .field(
                    FieldDescriptor::new(
                        "email",
                        FieldType::Text,
                        |u: &User| u.email.clone().into(),
                        |u, v| {
                            u.email = v.take("email")?;
                            Ok(())
                        },
                    )
                    .searchable(),
                )
                .field(
                    FieldDescriptor::new(
                        "name",
                        FieldType::Text,
                        |u: &User| u.name.clone().into(),
                        |u, v| {
                            u.name = v.take("name")?;
                            Ok(())
                        },
                    )
                    .searchable(),
                )
                .field(
                    FieldDescriptor::new(
                        "age",
                        FieldType::Integer,
                        |u: &User| u.age.into(),
                        |u, v| {
                            u.age = v.take("age")?;
                            Ok(())
                        },
                    )
                    .nullable(),
                )
                .field(FieldDescriptor::new(
                    "active",
                    FieldType::Boolean,
                    |u| u.active.into(),
                    |u, v| {
                        u.active = v.take("active")?;
                        Ok(())
                    },
                ))
                .field(FieldDescriptor::new(
                    "joinedAt",
                    FieldType::Timestamp,
                    |u| u.joined_at.into(),
                    |u, v| {
                        u.joined_at = v.take("joinedAt")?;
                        Ok(())
                    },
                ))
                .identity("id")
                .build()
                .expect("User schema is valid")
        })
    }
}

impl User {
    /// A new, unsaved user.
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn joined(mut self, day: u32) -> Self {
        self.joined_at = Utc
            .with_ymd_and_hms(2024, 1, day, 9, 30, 0)
            .single()
            .expect("valid fixture date");
        self
    }
}

/// A label with a caller-chosen or generated text identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub code: String,
    pub label: String,
}

impl Entity for Tag {
    const NAME: &'static str = "Tag";

    fn schema() -> &'static EntitySchema<Self> {
        static SCHEMA: OnceLock<EntitySchema<Tag>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::builder(Self::NAME, Tag::default)
                .field(FieldDescriptor::new(
                    "code",
                    FieldType::Text,
                    |t| t.code.clone().into(),
                    |t, v| {
                        t.code = v.take("code")?;
                        Ok(())
                    },
                ))
                .field(
                    FieldDescriptor::new(
                        "label",
                        FieldType::Text,
                        |t: &Tag| t.label.clone().into(),
                        |t, v| {
                            t.label = v.take("label")?;
                            Ok(())
                        },
                    )
                    .searchable(),
                )
                .identity("code")
                .build()
                .expect("Tag schema is valid")
        })
    }
}

impl Tag {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
        }
    }
}

/// A storage bin counted by quantity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bin {
    pub id: i64,
    pub qty: i64,
    pub weight: f64,
}

impl Bin {
    pub fn new(qty: i64, weight: f64) -> Self {
        Self { id: 0, qty, weight }
    }
}

impl Entity for Bin {
    const NAME: &'static str = "Bin";

    fn schema() -> &'static EntitySchema<Self> {
        static SCHEMA: OnceLock<EntitySchema<Bin>> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::builder(Self::NAME, Bin::default)
                .field(FieldDescriptor::new(
                    "id",
                    FieldType::Integer,
                    |b| b.id.into(),
                    |b, v| {
                        b.id = v.take("id")?;
                        Ok(())
                    },
                ))
                .field(FieldDescriptor::new(
                    "qty",
                    FieldType::Integer,
                    |b| b.qty.into(),
                    |b, v| {
                        b.qty = v.take("qty")?;
                        Ok(())
                    },
                ))
                .field(FieldDescriptor::new(
                    "weight",
                    FieldType::Float,
                    |b| b.weight.into(),
                    |b, v| {
                        b.weight = v.take("weight")?;
                        Ok(())
                    },
                ))
                .identity("id")
                .build()
                .expect("Bin schema is valid")
        })
    }
}

/// Email must be present and well-formed, name at most 50 characters,
/// age between 0 and 150.
pub fn user_validator() -> RuleValidator<User> {
    let email = User::field("email").expect("email field");
    RuleValidator::new()
        .not_empty(email)
        .email(email)
        .max_length(User::field("name").expect("name field"), 50)
        .range(User::field("age").expect("age field"), 0.0, 150.0)
}

/// Twelve users with distinct names and ages 20..=31.
pub fn twelve_users() -> Vec<User> {
    (0..12)
        .map(|i| {
            User::new(&format!("user{:02}@example.com", i), &format!("User {:02}", i))
                .with_age(20 + i)
                .joined(1 + i as u32)
        })
        .collect()
}

/// Shorthand for a null identity.
pub fn unassigned() -> FieldValue {
    FieldValue::Null
}
