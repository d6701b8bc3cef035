//! The store service.

use std::collections::HashSet;
use std::marker::PhantomData;

use crate::core::{DataContext, ensure_patchable, needs_identity, not_found};
use crate::error::{SelectorError, StorageResult};
use crate::schema::{Entity, FieldSelector, FieldValue};
use crate::types::{Failure, Outcome, SearchParameters, SearchResult};
use crate::validation::Validator;

use super::hooks::{NoAdditionalChecks, StoreHooks};

/// Validation-aware orchestration over a data context.
///
/// # Example
///
/// ```ignore
/// use strata_persistence::backends::memory::MemoryBackend;
/// use strata_persistence::service::StoreService;
/// use strata_persistence::validation::RuleValidator;
///
/// let backend = MemoryBackend::new();
/// let validator = RuleValidator::new().email(User::field("email")?);
/// let service = StoreService::new(backend.context::<User>(), validator);
///
/// let outcome = service.add(User::id_selector(), FieldValue::Null, user).await?;
/// if !outcome.is_valid() {
///     eprintln!("{}", outcome.format_failures_for_log());
/// }
/// ```
pub struct StoreService<E, C, V, H = NoAdditionalChecks> {
    context: C,
    validator: V,
    hooks: H,
    _entity: PhantomData<fn() -> E>,
}

impl<E, C, V> StoreService<E, C, V, NoAdditionalChecks>
where
    E: Entity,
    C: DataContext<E>,
    V: Validator<E>,
{
    /// Creates a service with no additional checks.
    pub fn new(context: C, validator: V) -> Self {
        Self::with_hooks(context, validator, NoAdditionalChecks)
    }
}

impl<E, C, V, H> StoreService<E, C, V, H>
where
    E: Entity,
    C: DataContext<E>,
    V: Validator<E>,
    H: StoreHooks<E>,
{
    /// Creates a service with business-rule hooks.
    pub fn with_hooks(context: C, validator: V, hooks: H) -> Self {
        Self {
            context,
            validator,
            hooks,
            _entity: PhantomData,
        }
    }

    /// The underlying data context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// The validator.
    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Validates and adds an entity.
    ///
    /// Failures are collected in order: validation, then the duplicate check
    /// on `id_field == id`, then the add hook. When any exist the backend is
    /// not touched and the outcome carries the submitted entity.
    ///
    /// The duplicate check and the insert are separate calls, so a concurrent
    /// add can still slip in between; backend constraints decide that case.
    pub async fn add(
        &self,
        id_field: FieldSelector<E>,
        id: FieldValue,
        entity: E,
    ) -> StorageResult<Outcome<E>> {
        let mut failures = self.validator.validate(&entity).await.into_parts().1;

        if self.key_is_assigned(id_field, &id) && self.context.exists_by(id_field, id.clone()).await? {
            failures.push(already_exists::<E>(&id));
        }

        failures.extend(self.hooks.add_additional_checks(&entity).await?);

        if !failures.is_empty() {
            let outcome = Outcome::with_failures(entity, failures);
            tracing::warn!(
                entity = E::NAME,
                id = %id,
                "Rejected add:\n{}",
                outcome.format_failures_for_log()
            );
            return Ok(outcome);
        }

        let created = self.context.add(id_field, id, entity).await?;
        tracing::debug!(entity = E::NAME, backend = self.context.backend_name(), "Added entity");
        Ok(Outcome::success(created))
    }

    /// Validates and adds a batch.
    ///
    /// Each entity gets an outcome carrying its input position. An entity is
    /// rejected by validation, by a key that already exists in the backend,
    /// by a key repeated earlier in the batch, or by the add hook. If any
    /// entity is rejected nothing is written and every outcome is returned.
    /// Otherwise the batch is handed to the data context, whose
    /// [`BulkPolicy`](crate::core::BulkPolicy) applies.
    pub async fn add_bulk(
        &self,
        id_field: FieldSelector<E>,
        entities: Vec<E>,
    ) -> StorageResult<Vec<Outcome<E>>> {
        let mut outcomes = Vec::with_capacity(entities.len());
        let mut seen = HashSet::new();

        for (index, entity) in entities.into_iter().enumerate() {
            let mut failures = self.validator.validate(&entity).await.into_parts().1;

            let key = id_field.get(&entity);
            if self.key_is_assigned(id_field, &key) {
                if !seen.insert(key.to_string()) {
                    failures.push(Failure::new(
                        id_field.name(),
                        format!("{} appears more than once in the batch", E::NAME),
                        key.clone(),
                    ));
                } else if self.context.exists_by(id_field, key.clone()).await? {
                    failures.push(already_exists::<E>(&key));
                }
            }

            failures.extend(self.hooks.add_additional_checks(&entity).await?);
            outcomes.push(Outcome::with_failures(entity, failures).at_index(index));
        }

        if outcomes.iter().any(|o| !o.is_valid()) {
            let rejected = outcomes.iter().filter(|o| !o.is_valid()).count();
            tracing::warn!(
                entity = E::NAME,
                rejected,
                total = outcomes.len(),
                "Rejected bulk add"
            );
            return Ok(outcomes);
        }

        let entities = outcomes.into_iter().map(Outcome::into_item).collect();
        let created = self.context.add_bulk(id_field, entities).await?;
        Ok(created
            .into_iter()
            .enumerate()
            .map(|(index, entity)| Outcome::success(entity).at_index(index))
            .collect())
    }

    /// Patches one field after re-validating only that field.
    ///
    /// The patch hook may rewrite the value and add failures. The field is
    /// then validated on a copy of the current entity with the value applied.
    /// Field failures come first, hook failures second. When any exist the
    /// outcome carries the unpatched entity and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`](crate::error::ResourceError) when
    /// no entity has `id_field == id`, and a selector error when `field` is
    /// the identity or the value has the wrong type. A null on a
    /// non-nullable field is reported as a failure on that field.
    pub async fn patch(
        &self,
        id_field: FieldSelector<E>,
        id: FieldValue,
        field: FieldSelector<E>,
        value: FieldValue,
    ) -> StorageResult<Outcome<E>> {
        ensure_patchable(field)?;

        let current = self
            .context
            .get_by(id_field, id.clone())
            .await?
            .ok_or_else(|| not_found::<E>(&id))?;

        let (value, hook_failures) = self
            .hooks
            .patch_additional_checks(&current, field, value)
            .await?
            .into_parts();

        let mut failures = match E::schema().with(&current, &field, value.clone()) {
            Ok(updated) => self.validator.validate_field(&updated, field).await.into_parts().1,
            Err(SelectorError::NotNullable { .. }) => vec![Failure::new(
                field.name(),
                format!("'{}' must not be empty.", field.name()),
                value.to_json(),
            )],
            Err(e) => return Err(e.into()),
        };
        failures.extend(hook_failures);

        if !failures.is_empty() {
            let outcome = Outcome::with_failures(current, failures);
            tracing::warn!(
                entity = E::NAME,
                id = %id,
                field = field.name(),
                "Rejected patch:\n{}",
                outcome.format_failures_for_log()
            );
            return Ok(outcome);
        }

        let patched = self.context.patch(id_field, id, field, value).await?;
        Ok(Outcome::success(patched))
    }

    /// Validates and replaces a whole entity.
    ///
    /// Failures leave the backend untouched and carry the submitted entity.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`](crate::error::ResourceError) when
    /// no entity has `id_field == id`.
    pub async fn update(
        &self,
        id_field: FieldSelector<E>,
        id: FieldValue,
        entity: E,
    ) -> StorageResult<Outcome<E>> {
        let validation = self.validator.validate(&entity).await;
        if !validation.is_valid() {
            let outcome = Outcome::with_failures(entity, validation.into_parts().1);
            tracing::warn!(
                entity = E::NAME,
                id = %id,
                "Rejected update:\n{}",
                outcome.format_failures_for_log()
            );
            return Ok(outcome);
        }

        let updated = self.context.update(id_field, id, entity).await?;
        Ok(Outcome::success(updated))
    }

    /// Deletes the entity with `id_field == id`.
    ///
    /// A missing entity is not a failure.
    pub async fn delete(&self, id_field: FieldSelector<E>, id: FieldValue) -> StorageResult<Outcome> {
        self.context.delete(id_field, id).await?;
        Ok(Outcome::empty())
    }

    /// One page of search results.
    pub async fn search(&self, params: &SearchParameters<E>) -> StorageResult<SearchResult<E>> {
        self.context.search(params).await
    }

    /// Total number of stored entities.
    pub async fn count(&self) -> StorageResult<u64> {
        self.context.count().await
    }

    /// The entity with `field == value`, if any.
    pub async fn get_by(&self, field: FieldSelector<E>, value: FieldValue) -> StorageResult<Option<E>> {
        self.context.get_by(field, value).await
    }

    /// All entities whose `field` equals any of `values`.
    pub async fn get_by_multiple_values(
        &self,
        field: FieldSelector<E>,
        values: Vec<FieldValue>,
    ) -> StorageResult<SearchResult<E>> {
        self.context.get_by_multiple_values(field, values).await
    }

    /// Keys left for the backend to assign are not checked for duplicates.
    fn key_is_assigned(&self, id_field: FieldSelector<E>, key: &FieldValue) -> bool {
        if id_field.is_identity() {
            !needs_identity(key)
        } else {
            !key.is_null()
        }
    }
}

fn already_exists<E: Entity>(id: &FieldValue) -> Failure {
    Failure::new("id", format!("{} already exists", E::NAME), id.clone())
}
