//! Validation boundary.
//!
//! The store service consumes a [`Validator`] for whole-entity validation
//! and for re-validating a single field after a patch. Rule syntax is up to
//! the implementation; [`RuleValidator`] is a table of per-field rules.

use async_trait::async_trait;

use crate::schema::{Entity, FieldSelector};
use crate::types::Outcome;

mod rules;

pub use rules::{Check, RuleValidator};

/// Validates entities of type `E`.
#[async_trait]
pub trait Validator<E: Entity>: Send + Sync {
    /// Runs every rule against the entity.
    async fn validate(&self, entity: &E) -> Outcome;

    /// Runs only the rules that target `field`.
    async fn validate_field(&self, entity: &E, field: FieldSelector<E>) -> Outcome;
}

/// A validator with no rules. Every entity is valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl<E: Entity> Validator<E> for AcceptAll {
    async fn validate(&self, _entity: &E) -> Outcome {
        Outcome::empty()
    }

    async fn validate_field(&self, _entity: &E, _field: FieldSelector<E>) -> Outcome {
        Outcome::empty()
    }
}
