//! In-memory data context.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{
    BulkPolicy, ReadDataContext, WriteDataContext, apply_key, assign_text_identity,
    carry_identity, ensure_patchable, needs_identity, not_found,
};
use crate::error::{ResourceError, StorageResult};
use crate::schema::{Entity, FieldSelector, FieldType, FieldValue, Predicate};
use crate::types::{SearchParameters, SearchResult};

use super::backend::{Table, TableState};
use super::query::Query;

/// Data context over the in-memory table of one entity type.
pub struct MemoryDataContext<E> {
    table: Arc<Table<E>>,
}

impl<E> Clone for MemoryDataContext<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<E: Entity> std::fmt::Debug for MemoryDataContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDataContext")
            .field("entity", &E::NAME)
            .field("rows", &self.table.read().rows.len())
            .finish()
    }
}

fn by_identity<E: Entity>(a: &E, b: &E) -> std::cmp::Ordering {
    let id = E::id_selector();
    id.get(a).compare(&id.get(b))
}

impl<E: Entity> MemoryDataContext<E> {
    pub(crate) fn new(table: Arc<Table<E>>) -> Self {
        Self { table }
    }

    /// Assigns a missing identity and advances the sequence.
    ///
    /// Entities holding a non-finite float are rejected before the sequence
    /// moves.
    fn prepare(state: &mut TableState<E>, entity: E) -> StorageResult<E> {
        let identity = E::id_selector();
        E::schema().values(&entity)?;
        let mut entity = assign_text_identity(entity)?;
        if identity.field_type() == FieldType::Integer {
            match identity.get(&entity) {
                current if needs_identity(&current) => {
                    let id = FieldValue::Integer(state.next_identity());
                    entity = E::schema().with(&entity, &identity, id)?;
                }
                FieldValue::Integer(id) => state.observe_identity(id),
                _ => {}
            }
        }
        Ok(entity)
    }

    fn already_exists(id: &FieldValue) -> ResourceError {
        ResourceError::AlreadyExists {
            entity: E::NAME.to_string(),
            id: id.to_string(),
        }
    }

    /// Position of the single row with `field == value`.
    fn locate(rows: &[E], field: FieldSelector<E>, value: &FieldValue) -> StorageResult<usize> {
        let positions = Query::new()
            .filter(|e: &E| field.get(e).matches(value))
            .positions(rows);
        match positions.as_slice() {
            [] => Err(not_found::<E>(value).into()),
            [single] => Ok(*single),
            many => Err(ResourceError::MultipleMatches {
                entity: E::NAME.to_string(),
                field: field.name().to_string(),
                count: many.len(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl<E: Entity> ReadDataContext<E> for MemoryDataContext<E> {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.table.read().rows.len() as u64)
    }

    async fn count_matching(&self, predicate: &Predicate<E>) -> StorageResult<u64> {
        let state = self.table.read();
        let query = Query::new().filter(|e: &E| predicate.matches(e));
        Ok(query.count(&state.rows) as u64)
    }

    async fn exists_matching(&self, predicate: &Predicate<E>) -> StorageResult<bool> {
        let state = self.table.read();
        Ok(Query::new().filter(|e: &E| predicate.matches(e)).any(&state.rows))
    }

    async fn find_matching(
        &self,
        predicate: &Predicate<E>,
        limit: Option<u64>,
    ) -> StorageResult<Vec<E>> {
        let state = self.table.read();
        let mut query = Query::new()
            .filter(|e: &E| predicate.matches(e))
            .order_by(by_identity::<E>);
        if let Some(limit) = limit {
            query = query.take(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(query.run(&state.rows))
    }

    async fn search(&self, params: &SearchParameters<E>) -> StorageResult<SearchResult<E>> {
        let state = self.table.read();
        let filtered = Query::new().filter(|e: &E| params.matches_term(e));
        let total = filtered.count(&state.rows) as u64;

        let items = filtered
            .order_by(|a: &E, b: &E| params.compare(a, b))
            .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(params.limit()).unwrap_or(usize::MAX))
            .run(&state.rows);

        tracing::debug!(
            entity = E::NAME,
            total,
            returned = items.len(),
            page = params.current_page(),
            "Search completed"
        );
        Ok(SearchResult::from_parts(total, items))
    }
}

#[async_trait]
impl<E: Entity> WriteDataContext<E> for MemoryDataContext<E> {
    fn bulk_policy(&self) -> BulkPolicy {
        BulkPolicy::AllOrNothing
    }

    async fn add(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let entity = apply_key(id_field, id, entity)?;
        let identity = E::id_selector();

        let mut state = self.table.write();
        let current = identity.get(&entity);
        if !needs_identity(&current) {
            let taken = Query::new()
                .filter(|e: &E| identity.get(e).matches(&current))
                .any(&state.rows);
            if taken {
                return Err(Self::already_exists(&current).into());
            }
        }

        let entity = Self::prepare(&mut state, entity)?;
        state.rows.push(entity.clone());
        tracing::debug!(entity = E::NAME, id = %identity.get(&entity), "Inserted entity");
        Ok(entity)
    }

    async fn add_bulk(&self, _id_field: FieldSelector<E>, entities: Vec<E>) -> StorageResult<Vec<E>> {
        let identity = E::id_selector();
        let mut state = self.table.write();
        let sequence = state.sequence();

        // Keys are checked after identities are assigned, so a generated id
        // colliding with an explicit one later in the batch is caught too.
        let mut taken: HashSet<String> = state
            .rows
            .iter()
            .map(|e| identity.get(e).to_string())
            .collect();
        let mut prepared = Vec::with_capacity(entities.len());
        for entity in entities {
            let entity = match Self::prepare(&mut state, entity) {
                Ok(entity) => entity,
                Err(e) => {
                    state.rewind_sequence(sequence);
                    return Err(e);
                }
            };
            let key = identity.get(&entity);
            if !taken.insert(key.to_string()) {
                state.rewind_sequence(sequence);
                tracing::debug!(entity = E::NAME, id = %key, "Bulk insert rejected");
                return Err(Self::already_exists(&key).into());
            }
            prepared.push(entity);
        }
        state.rows.extend(prepared.iter().cloned());

        tracing::debug!(entity = E::NAME, inserted = prepared.len(), "Bulk insert committed");
        Ok(prepared)
    }

    async fn delete(&self, id_field: FieldSelector<E>, id: FieldValue) -> StorageResult<()> {
        let id = id_field.coerce(id)?;
        let mut state = self.table.write();
        let before = state.rows.len();
        state.rows.retain(|e| !id_field.get(e).matches(&id));
        tracing::debug!(entity = E::NAME, deleted = before - state.rows.len(), "Delete executed");
        Ok(())
    }

    async fn patch(
        &self,
        id_field: FieldSelector<E>,
        id: FieldValue,
        field: FieldSelector<E>,
        value: FieldValue,
    ) -> StorageResult<E> {
        ensure_patchable(field)?;
        let id = id_field.coerce(id)?;
        let mut state = self.table.write();
        let position = Self::locate(&state.rows, id_field, &id)?;
        let patched = E::schema().with(&state.rows[position], &field, value)?;
        state.rows[position] = patched.clone();
        Ok(patched)
    }

    async fn update(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let id = id_field.coerce(id)?;
        let mut state = self.table.write();
        let position = Self::locate(&state.rows, id_field, &id)?;
        let replacement = carry_identity(&state.rows[position], entity)?;
        E::schema().values(&replacement)?;
        state.rows[position] = replacement.clone();
        Ok(replacement)
    }
}
