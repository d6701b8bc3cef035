//! Business-rule extension points for the store service.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::schema::{Entity, FieldSelector, FieldValue};
use crate::types::{Failure, Outcome};

/// Checks that run after validation and before a write.
///
/// Both methods default to adding nothing. Failures returned here are
/// appended after the validator's and the duplicate check's failures.
///
/// # Example
///
/// ```ignore
/// struct NormalizeEmail;
///
/// #[async_trait]
/// impl StoreHooks<User> for NormalizeEmail {
///     async fn patch_additional_checks(
///         &self,
///         _current: &User,
///         field: FieldSelector<User>,
///         value: FieldValue,
///     ) -> StorageResult<Outcome<FieldValue>> {
///         match (field.name(), value) {
///             ("email", FieldValue::Text(s)) => Ok(Outcome::success(s.to_lowercase().into())),
///             (_, value) => Ok(Outcome::success(value)),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait StoreHooks<E: Entity>: Send + Sync {
    /// Extra checks on an entity about to be added, such as cross-entity
    /// references.
    async fn add_additional_checks(&self, entity: &E) -> StorageResult<Vec<Failure>> {
        let _ = entity;
        Ok(Vec::new())
    }

    /// Extra checks on a patch. The returned item is the value that will be
    /// validated and written, so the hook may normalise it.
    async fn patch_additional_checks(
        &self,
        current: &E,
        field: FieldSelector<E>,
        value: FieldValue,
    ) -> StorageResult<Outcome<FieldValue>> {
        let _ = (current, field);
        Ok(Outcome::success(value))
    }
}

/// Hooks that add no checks and pass patch values through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdditionalChecks;

impl<E: Entity> StoreHooks<E> for NoAdditionalChecks {}
