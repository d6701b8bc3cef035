//! Data context traits.
//!
//! A data context is the backend adapter for one entity type. It translates
//! selectors and predicates into backend calls and never applies business
//! validation. Each call is an independently committed unit of work.
//!
//! Backends implement a few primitives ([`ReadDataContext::count_matching`],
//! [`ReadDataContext::find_matching`], [`ReadDataContext::search`] and the
//! write operations). The selector-driven lookups are provided on top of
//! them so that every backend shares the same rules: `get_by` refuses to
//! pick one of several matches, and `get_by_multiple_values` with no values
//! returns an empty result without touching the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, SelectorError, StorageResult};
use crate::schema::{Entity, FieldSelector, FieldType, FieldValue, Predicate};
use crate::types::{SearchParameters, SearchResult};

/// How a backend treats a bulk insertion in which some entities fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkPolicy {
    /// Either every entity is inserted or none is.
    AllOrNothing,
    /// Every entity is attempted independently; failures are reported after
    /// all attempts and successful inserts are kept.
    BestEffort,
}

impl std::fmt::Display for BulkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkPolicy::AllOrNothing => write!(f, "all-or-nothing"),
            BulkPolicy::BestEffort => write!(f, "best-effort"),
        }
    }
}

/// Read operations over one entity type.
#[async_trait]
pub trait ReadDataContext<E: Entity>: Send + Sync {
    /// Returns a human-readable name for the backend.
    fn backend_name(&self) -> &'static str;

    /// Total number of stored entities.
    async fn count(&self) -> StorageResult<u64>;

    /// Number of entities matching a predicate.
    async fn count_matching(&self, predicate: &Predicate<E>) -> StorageResult<u64>;

    /// Entities matching a predicate, up to `limit` when given.
    async fn find_matching(
        &self,
        predicate: &Predicate<E>,
        limit: Option<u64>,
    ) -> StorageResult<Vec<E>>;

    /// One page of entities passing the search-term filter, sorted by the
    /// sort field, with the total computed over the unpaged filtered set.
    async fn search(&self, params: &SearchParameters<E>) -> StorageResult<SearchResult<E>>;

    /// Whether any entity matches a predicate.
    async fn exists_matching(&self, predicate: &Predicate<E>) -> StorageResult<bool> {
        Ok(self.count_matching(predicate).await? > 0)
    }

    /// Whether any entity has `field == value`.
    async fn exists_by(&self, field: FieldSelector<E>, value: FieldValue) -> StorageResult<bool> {
        let predicate = field.eq(value)?;
        self.exists_matching(&predicate).await
    }

    /// The entity with `field == value`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MultipleMatches`] if more than one entity
    /// matches.
    async fn get_by(&self, field: FieldSelector<E>, value: FieldValue) -> StorageResult<Option<E>> {
        let predicate = field.eq(value)?;
        let mut matches = self.find_matching(&predicate, Some(2)).await?;
        if matches.len() > 1 {
            let count = self.count_matching(&predicate).await?;
            return Err(ResourceError::MultipleMatches {
                entity: E::NAME.to_string(),
                field: field.name().to_string(),
                count: usize::try_from(count).unwrap_or(usize::MAX),
            }
            .into());
        }
        Ok(matches.pop())
    }

    /// All entities whose `field` equals any of `values`.
    ///
    /// No values yields an empty result without a backend call.
    async fn get_by_multiple_values(
        &self,
        field: FieldSelector<E>,
        values: Vec<FieldValue>,
    ) -> StorageResult<SearchResult<E>> {
        if values.is_empty() {
            return Ok(SearchResult::empty());
        }
        let predicate = field.one_of(values)?;
        let items = self.find_matching(&predicate, None).await?;
        Ok(SearchResult::from_parts(items.len() as u64, items))
    }
}

/// Write operations over one entity type.
#[async_trait]
pub trait WriteDataContext<E: Entity>: ReadDataContext<E> {
    /// The bulk insertion policy of this backend.
    fn bulk_policy(&self) -> BulkPolicy;

    /// Inserts an entity.
    ///
    /// A non-null `id` is written into `id_field` first. A null identity is
    /// assigned by the backend. Returns the stored entity as read back.
    async fn add(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E>;

    /// Inserts a batch, following [`bulk_policy`](Self::bulk_policy).
    async fn add_bulk(&self, id_field: FieldSelector<E>, entities: Vec<E>) -> StorageResult<Vec<E>>;

    /// Deletes the entity with `id_field == id`. Missing entities are a no-op.
    async fn delete(&self, id_field: FieldSelector<E>, id: FieldValue) -> StorageResult<()>;

    /// Sets exactly one field of the entity with `id_field == id`.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if no entity matches.
    /// - [`SelectorError::ImmutableIdentity`] if `field` is the identity.
    async fn patch(
        &self,
        id_field: FieldSelector<E>,
        id: FieldValue,
        field: FieldSelector<E>,
        value: FieldValue,
    ) -> StorageResult<E>;

    /// Replaces every non-identity field of the entity with `id_field == id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] if no entity matches.
    async fn update(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E>;
}

/// A full read-write data context.
pub trait DataContext<E: Entity>: WriteDataContext<E> {}

impl<E: Entity, T: WriteDataContext<E> + ?Sized> DataContext<E> for T {}

/// Writes a non-null key into the entity before insertion.
pub(crate) fn apply_key<E: Entity>(
    id_field: FieldSelector<E>,
    id: FieldValue,
    entity: E,
) -> StorageResult<E> {
    if id.is_null() {
        return Ok(entity);
    }
    Ok(E::schema().with(&entity, &id_field, id)?)
}

/// Fills a missing text identity with a UUID v4.
///
/// Integer identities are left to the backend's sequence.
pub(crate) fn assign_text_identity<E: Entity>(entity: E) -> StorageResult<E> {
    let id = E::id_selector();
    if id.field_type() == FieldType::Text && needs_identity(&id.get(&entity)) {
        let generated = FieldValue::Text(uuid::Uuid::new_v4().to_string());
        return Ok(E::schema().with(&entity, &id, generated)?);
    }
    Ok(entity)
}

/// Whether an identity value counts as unassigned.
pub(crate) fn needs_identity(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(s) => s.is_empty(),
        FieldValue::Integer(i) => *i <= 0,
        _ => false,
    }
}

/// Rejects patches on the identity field.
pub(crate) fn ensure_patchable<E: Entity>(field: FieldSelector<E>) -> StorageResult<()> {
    if field.is_identity() {
        return Err(SelectorError::ImmutableIdentity {
            field: field.name().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Copies the stored identity onto a replacement entity.
pub(crate) fn carry_identity<E: Entity>(stored: &E, replacement: E) -> StorageResult<E> {
    let id = E::id_selector();
    Ok(E::schema().with(&replacement, &id, id.get(stored))?)
}

pub(crate) fn not_found<E: Entity>(id: &FieldValue) -> ResourceError {
    ResourceError::NotFound {
        entity: E::NAME.to_string(),
        id: id.to_string(),
    }
}
