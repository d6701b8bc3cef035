//! Document store data context.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::{
    BulkPolicy, ReadDataContext, WriteDataContext, apply_key, assign_text_identity,
    carry_identity, ensure_patchable, needs_identity, not_found,
};
use crate::error::{BulkError, ResourceError, StorageError, StorageResult};
use crate::schema::{Entity, FieldSelector, FieldType, FieldValue, Predicate};
use crate::types::{SearchParameters, SearchResult};

use super::filter::DocumentFilter;
use super::store::{Collection, Document, DocumentStore};

/// Data context over the collection of one entity type.
pub struct DocumentDataContext<E> {
    store: DocumentStore,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for DocumentDataContext<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for DocumentDataContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDataContext")
            .field("collection", &E::NAME)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> DocumentDataContext<E> {
    pub(crate) fn new(store: DocumentStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Documents passing `filter`, as entities.
    fn query(&self, filter: &DocumentFilter) -> StorageResult<Vec<E>> {
        tracing::debug!(collection = E::NAME, filter = %filter.to_json(), "Executing find");
        let schema = E::schema();
        self.store.read(E::NAME, |documents| {
            documents
                .iter()
                .filter(|doc| filter.matches(doc))
                .map(|doc| schema.from_document(doc).map_err(StorageError::from))
                .collect()
        })
    }

    fn count_where(&self, filter: &DocumentFilter) -> u64 {
        tracing::debug!(collection = E::NAME, filter = %filter.to_json(), "Executing count");
        self.store.read(E::NAME, |documents| {
            documents.iter().filter(|doc| filter.matches(doc)).count() as u64
        })
    }

    /// Inserts one entity as a document and reads it back.
    fn insert_one(&self, entity: E) -> StorageResult<E> {
        let schema = E::schema();
        let identity = schema.id();
        let entity = assign_text_identity(entity)?;
        schema.values(&entity)?;

        let stored = self.store.write(E::NAME, |collection| {
            let current = identity.get(&entity);
            let entity = match (identity.field_type(), &current) {
                (FieldType::Integer, id) if needs_identity(id) => {
                    let id = FieldValue::Integer(collection.next_identity());
                    schema.with(&entity, &identity, id)?
                }
                _ => {
                    let taken = DocumentFilter::Eq {
                        field: identity.name(),
                        field_type: identity.field_type(),
                        value: current.clone(),
                    };
                    if collection.documents.iter().any(|doc| taken.matches(doc)) {
                        return Err(ResourceError::AlreadyExists {
                            entity: E::NAME.to_string(),
                            id: current.to_string(),
                        }
                        .into());
                    }
                    if let FieldValue::Integer(id) = &current {
                        collection.observe_identity(*id);
                    }
                    entity
                }
            };
            let document = schema.to_document(&entity)?;
            collection.documents.push(document.clone());
            Ok(document)
        })?;

        Ok(schema.from_document(&stored)?)
    }

    /// Position of the single document with `field == value`.
    fn locate(collection: &Collection, field: FieldSelector<E>, value: &FieldValue) -> StorageResult<usize> {
        let filter = DocumentFilter::Eq {
            field: field.name(),
            field_type: field.field_type(),
            value: value.clone(),
        };
        let positions: Vec<usize> = collection
            .documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(i, _)| i)
            .collect();
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

/// RFC 6901 pointer to a top-level member.
fn pointer(field: &str) -> String {
    format!("/{}", field.replace('~', "~0").replace('/', "~1"))
}

/// Applies a single `replace` operation to a document.
fn replace_member(document: &Document, field: &str, value: Value) -> StorageResult<Document> {
    let patch: json_patch::Patch = serde_json::from_value(json!([
        { "op": "replace", "path": pointer(field), "value": value }
    ]))?;
    let mut patched = Value::Object(document.clone());
    json_patch::patch(&mut patched, &patch)?;
    match patched {
        Value::Object(map) => Ok(map),
        _ => Err(StorageError::Backend(crate::error::BackendError::SerializationError {
            message: format!("patch of {} did not produce an object", field),
        })),
    }
}

#[async_trait]
impl<E: Entity> ReadDataContext<E> for DocumentDataContext<E> {
    fn backend_name(&self) -> &'static str {
        "document"
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.count_where(&DocumentFilter::All))
    }

    async fn count_matching(&self, predicate: &Predicate<E>) -> StorageResult<u64> {
        Ok(self.count_where(&DocumentFilter::from_predicate(predicate)))
    }

    async fn find_matching(
        &self,
        predicate: &Predicate<E>,
        limit: Option<u64>,
    ) -> StorageResult<Vec<E>> {
        let identity = E::id_selector();
        let mut found = self.query(&DocumentFilter::from_predicate(predicate))?;
        found.sort_by(|a, b| identity.get(a).compare(&identity.get(b)));
        if let Some(limit) = limit {
            found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(found)
    }

    async fn search(&self, params: &SearchParameters<E>) -> StorageResult<SearchResult<E>> {
        let fields = E::schema().searchable_fields();
        let filter = DocumentFilter::search_term(params.search_term(), &fields);
        let mut matched = self.query(&filter)?;
        let total = matched.len() as u64;

        matched.sort_by(|a, b| params.compare(a, b));
        let items: Vec<E> = matched
            .into_iter()
            .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(params.limit()).unwrap_or(usize::MAX))
            .collect();

        tracing::debug!(
            collection = E::NAME,
            total,
            returned = items.len(),
            page = params.current_page(),
            "Search completed"
        );
        Ok(SearchResult::from_parts(total, items))
    }
}

#[async_trait]
impl<E: Entity> WriteDataContext<E> for DocumentDataContext<E> {
    fn bulk_policy(&self) -> BulkPolicy {
        BulkPolicy::BestEffort
    }

    async fn add(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let entity = apply_key(id_field, id, entity)?;
        self.insert_one(entity)
    }

    async fn add_bulk(&self, _id_field: FieldSelector<E>, entities: Vec<E>) -> StorageResult<Vec<E>> {
        let total = entities.len();
        let mut created = Vec::with_capacity(total);
        let mut errors = Vec::new();

        for (index, entity) in entities.into_iter().enumerate() {
            match self.insert_one(entity) {
                Ok(stored) => created.push(stored),
                Err(e) => errors.push(format!("[{}] {}", index, e)),
            }
        }

        if !errors.is_empty() {
            tracing::warn!(
                collection = E::NAME,
                inserted = created.len(),
                failed = errors.len(),
                "Bulk insert partially failed"
            );
            return Err(BulkError::PartialFailure {
                inserted: created.len(),
                failed: errors.len(),
                message: errors.join("; "),
            }
            .into());
        }

        tracing::debug!(collection = E::NAME, inserted = total, "Bulk insert completed");
        Ok(created)
    }

    async fn delete(&self, id_field: FieldSelector<E>, id: FieldValue) -> StorageResult<()> {
        let filter = DocumentFilter::from_predicate(&id_field.eq(id)?);
        let deleted = self.store.write(E::NAME, |collection| {
            let before = collection.documents.len();
            collection.documents.retain(|doc| !filter.matches(doc));
            Ok(before - collection.documents.len())
        })?;
        tracing::debug!(collection = E::NAME, filter = %filter.to_json(), deleted, "Delete executed");
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
        let schema = E::schema();

        let document = self.store.write(E::NAME, |collection| {
            let position = Self::locate(collection, id_field, &id)?;
            let current = schema.from_document(&collection.documents[position])?;
            // Reject values the field cannot hold before touching the document.
            let checked = schema.with(&current, &field, value)?;
            let patched = replace_member(
                &collection.documents[position],
                field.name(),
                field.get(&checked).to_json_checked(field.name())?,
            )?;
            collection.documents[position] = patched.clone();
            Ok(patched)
        })?;

        Ok(schema.from_document(&document)?)
    }

    async fn update(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let id = id_field.coerce(id)?;
        let schema = E::schema();

        let document = self.store.write(E::NAME, |collection| {
            let position = Self::locate(collection, id_field, &id)?;
            let current = schema.from_document(&collection.documents[position])?;
            let replacement = schema.to_document(&carry_identity(&current, entity)?)?;
            collection.documents[position] = replacement.clone();
            Ok(replacement)
        })?;

        Ok(schema.from_document(&document)?)
    }
}
