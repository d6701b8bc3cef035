//! SQLite data context.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, params_from_iter};

use crate::core::{
    BulkPolicy, ReadDataContext, WriteDataContext, apply_key, assign_text_identity,
    carry_identity, ensure_patchable, needs_identity, not_found,
};
use crate::error::{BackendError, ResourceError, SelectorError, StorageError, StorageResult};
use crate::schema::{Entity, FieldSelector, FieldType, FieldValue, Predicate};
use crate::types::{SearchParameters, SearchResult};

use super::SqliteBackend;
use super::query_builder::{QueryBuilder, SqlFragment};

/// Data context for one entity type stored in a SQLite table.
///
/// Obtained from [`SqliteBackend::context`], which creates the table.
pub struct SqliteDataContext<E> {
    backend: SqliteBackend,
    builder: QueryBuilder,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteDataContext<E> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            builder: self.builder.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for SqliteDataContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDataContext")
            .field("table", &self.builder.table())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> SqliteDataContext<E> {
    pub(crate) fn new(backend: SqliteBackend) -> Self {
        Self {
            backend,
            builder: QueryBuilder::for_entity::<E>(),
            _entity: PhantomData,
        }
    }

    /// The backend this context writes to.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    fn query_entities(&self, conn: &Connection, fragment: &SqlFragment) -> StorageResult<Vec<E>> {
        tracing::debug!(entity = E::NAME, sql = %fragment.sql, "Executing query");
        let schema = E::schema();
        let mut stmt = conn.prepare(&fragment.sql)?;
        let rows = stmt
            .query_map(params_from_iter(fragment.params.iter()), |row| {
                schema
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(i, _)| row.get::<_, SqlValue>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| -> StorageResult<E> {
                let values = schema
                    .fields()
                    .iter()
                    .zip(row)
                    .map(|(field, raw)| {
                        from_sql(field.name(), field.field_type(), raw).map(|v| (field.name(), v))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(schema.hydrate(values)?)
            })
            .collect()
    }

    fn query_count(&self, conn: &Connection, fragment: &SqlFragment) -> StorageResult<u64> {
        tracing::debug!(entity = E::NAME, sql = %fragment.sql, "Executing count");
        let count: i64 = conn.query_row(
            &fragment.sql,
            params_from_iter(fragment.params.iter()),
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn execute(&self, conn: &Connection, fragment: &SqlFragment) -> StorageResult<usize> {
        tracing::debug!(entity = E::NAME, sql = %fragment.sql, "Executing statement");
        conn.execute(&fragment.sql, params_from_iter(fragment.params.iter()))
            .map_err(|e| self.write_error(e, None))
    }

    fn find_one(
        &self,
        conn: &Connection,
        field: FieldSelector<E>,
        value: FieldValue,
    ) -> StorageResult<Option<E>> {
        let predicate = field.eq(value)?;
        let fragment = self.builder.select(self.builder.predicate(&predicate), Some(2));
        let mut found = self.query_entities(conn, &fragment)?;
        if found.len() > 1 {
            let count = self.query_count(conn, &self.builder.count(self.builder.predicate(&predicate)))?;
            return Err(ResourceError::MultipleMatches {
                entity: E::NAME.to_string(),
                field: field.name().to_string(),
                count: usize::try_from(count).unwrap_or(usize::MAX),
            }
            .into());
        }
        Ok(found.pop())
    }

    /// Inserts one entity and reads it back.
    fn insert(&self, conn: &Connection, entity: E) -> StorageResult<E> {
        let schema = E::schema();
        let identity = schema.id();
        let current = identity.get(&entity);
        let generated = identity.field_type() == FieldType::Integer && needs_identity(&current);

        let values = schema.values(&entity)?;
        let fragment = self
            .builder
            .insert(&values, generated.then(|| identity.name()));
        tracing::debug!(entity = E::NAME, sql = %fragment.sql, "Executing insert");
        conn.execute(&fragment.sql, params_from_iter(fragment.params.iter()))
            .map_err(|e| self.write_error(e, Some(&current)))?;

        let id = if generated {
            FieldValue::Integer(conn.last_insert_rowid())
        } else {
            current
        };
        self.find_one(conn, identity, id.clone())?
            .ok_or_else(|| not_found::<E>(&id).into())
    }

    /// Rewrites the row of `stored` with the fields of `entity`, then reads it back.
    fn rewrite(&self, conn: &Connection, stored: &E, entity: E) -> StorageResult<E> {
        let schema = E::schema();
        let identity = schema.id();
        let id = identity.get(stored);
        let fragment = self.builder.update(&schema.values(&entity)?, &id);
        self.execute(conn, &fragment)?;
        self.find_one(conn, identity, id.clone())?
            .ok_or_else(|| not_found::<E>(&id).into())
    }

    fn write_error(&self, err: rusqlite::Error, id: Option<&FieldValue>) -> StorageError {
        if let (rusqlite::Error::SqliteFailure(failure, _), Some(id)) = (&err, id) {
            let duplicate = matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            );
            if failure.code == ErrorCode::ConstraintViolation && duplicate {
                return ResourceError::AlreadyExists {
                    entity: E::NAME.to_string(),
                    id: id.to_string(),
                }
                .into();
            }
        }
        StorageError::Backend(BackendError::QueryError {
            message: format!("{} write failed: {}", E::NAME, err),
        })
    }
}

/// Converts a stored column value to a literal of the field's type.
fn from_sql(field: &str, field_type: FieldType, raw: SqlValue) -> Result<FieldValue, SelectorError> {
    let mismatch = |actual: &str| SelectorError::TypeMismatch {
        field: field.to_string(),
        expected: field_type.to_string(),
        actual: actual.to_string(),
    };
    match (field_type, raw) {
        (_, SqlValue::Null) => Ok(FieldValue::Null),
        (FieldType::Integer, SqlValue::Integer(i)) => Ok(FieldValue::Integer(i)),
        (FieldType::Boolean, SqlValue::Integer(i)) => Ok(FieldValue::Bool(i != 0)),
        (FieldType::Float, SqlValue::Real(f)) => Ok(FieldValue::Float(f)),
        (FieldType::Float, SqlValue::Integer(i)) => Ok(FieldValue::Float(i as f64)),
        (FieldType::Text, SqlValue::Text(s)) => Ok(FieldValue::Text(s)),
        (FieldType::Timestamp, SqlValue::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| FieldValue::Timestamp(dt.with_timezone(&Utc)))
            .map_err(|_| mismatch("text")),
        (_, SqlValue::Integer(_)) => Err(mismatch("integer")),
        (_, SqlValue::Real(_)) => Err(mismatch("real")),
        (_, SqlValue::Text(_)) => Err(mismatch("text")),
        (_, SqlValue::Blob(_)) => Err(mismatch("blob")),
    }
}

#[async_trait]
impl<E: Entity> ReadDataContext<E> for SqliteDataContext<E> {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn count(&self) -> StorageResult<u64> {
        let conn = self.backend.get_connection()?;
        self.query_count(&conn, &self.builder.count(SqlFragment::default()))
    }

    async fn count_matching(&self, predicate: &Predicate<E>) -> StorageResult<u64> {
        let conn = self.backend.get_connection()?;
        self.query_count(&conn, &self.builder.count(self.builder.predicate(predicate)))
    }

    async fn exists_matching(&self, predicate: &Predicate<E>) -> StorageResult<bool> {
        let conn = self.backend.get_connection()?;
        let fragment = self.builder.exists(self.builder.predicate(predicate));
        Ok(self.query_count(&conn, &fragment)? > 0)
    }

    async fn find_matching(
        &self,
        predicate: &Predicate<E>,
        limit: Option<u64>,
    ) -> StorageResult<Vec<E>> {
        let conn = self.backend.get_connection()?;
        let fragment = self.builder.select(self.builder.predicate(predicate), limit);
        self.query_entities(&conn, &fragment)
    }

    async fn search(&self, params: &SearchParameters<E>) -> StorageResult<SearchResult<E>> {
        let conn = self.backend.get_connection()?;
        let fields = E::schema().searchable_fields();
        let condition = self.builder.search_term(params.search_term(), &fields);

        let total = self.query_count(&conn, &self.builder.count(condition.clone()))?;
        let items = self.query_entities(&conn, &self.builder.search_page(condition, params))?;

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
impl<E: Entity> WriteDataContext<E> for SqliteDataContext<E> {
    fn bulk_policy(&self) -> BulkPolicy {
        BulkPolicy::AllOrNothing
    }

    async fn add(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let entity = assign_text_identity(apply_key(id_field, id, entity)?)?;
        let conn = self.backend.get_connection()?;
        self.insert(&conn, entity)
    }

    async fn add_bulk(&self, _id_field: FieldSelector<E>, entities: Vec<E>) -> StorageResult<Vec<E>> {
        let mut conn = self.backend.get_connection()?;
        let tx = conn.transaction()?;

        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            let entity = assign_text_identity(entity)?;
            // Dropping the transaction on error rolls back every insert.
            created.push(self.insert(&tx, entity)?);
        }

        tx.commit()?;
        tracing::debug!(entity = E::NAME, inserted = created.len(), "Bulk insert committed");
        Ok(created)
    }

    async fn delete(&self, id_field: FieldSelector<E>, id: FieldValue) -> StorageResult<()> {
        let conn = self.backend.get_connection()?;
        let predicate = id_field.eq(id)?;
        let deleted = self.execute(&conn, &self.builder.delete(self.builder.predicate(&predicate)))?;
        tracing::debug!(entity = E::NAME, deleted, "Delete executed");
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
        let conn = self.backend.get_connection()?;
        let stored = self
            .find_one(&conn, id_field, id.clone())?
            .ok_or_else(|| not_found::<E>(&id))?;
        let patched = E::schema().with(&stored, &field, value)?;
        self.rewrite(&conn, &stored, patched)
    }

    async fn update(&self, id_field: FieldSelector<E>, id: FieldValue, entity: E) -> StorageResult<E> {
        let conn = self.backend.get_connection()?;
        let stored = self
            .find_one(&conn, id_field, id.clone())?
            .ok_or_else(|| not_found::<E>(&id))?;
        let replacement = carry_identity(&stored, entity)?;
        self.rewrite(&conn, &stored, replacement)
    }
}
