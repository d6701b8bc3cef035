//! SQLite table definitions.
//!
//! Each registered entity gets one table named after the entity, with one
//! column per field. Integer identities are declared `INTEGER PRIMARY KEY`
//! so that SQLite assigns them from the rowid.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::{Entity, FieldType};

use super::query_builder::quote_ident;

/// Initialize the bookkeeping table that records registered entities.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS strata_entities (
            name TEXT PRIMARY KEY NOT NULL,
            columns TEXT NOT NULL,
            registered_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| internal(format!("Failed to create strata_entities table: {}", e)))?;
    Ok(())
}

/// Creates the table for `E` if it does not exist and records it.
pub fn ensure_table<E: Entity>(conn: &Connection) -> StorageResult<()> {
    initialize_schema(conn)?;

    let sql = create_table_sql::<E>();
    tracing::debug!(entity = E::NAME, sql = %sql, "Ensuring entity table");
    conn.execute(&sql, [])
        .map_err(|e| internal(format!("Failed to create table for {}: {}", E::NAME, e)))?;

    let columns = E::schema()
        .fields()
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(",");
    conn.execute(
        "INSERT INTO strata_entities (name, columns, registered_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET columns = excluded.columns",
        rusqlite::params![E::NAME, columns, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| internal(format!("Failed to record entity {}: {}", E::NAME, e)))?;

    Ok(())
}

/// Names of the entities that have tables in this database.
pub fn registered_entities(conn: &Connection) -> StorageResult<Vec<String>> {
    initialize_schema(conn)?;
    let mut stmt = conn.prepare("SELECT name FROM strata_entities ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// `CREATE TABLE IF NOT EXISTS` statement for `E`.
pub fn create_table_sql<E: Entity>() -> String {
    let schema = E::schema();
    let id = schema.id().name();
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| {
            let name = quote_ident(field.name());
            let affinity = column_type(field.field_type());
            if field.name() == id {
                match field.field_type() {
                    FieldType::Integer => format!("{} INTEGER PRIMARY KEY", name),
                    _ => format!("{} {} PRIMARY KEY NOT NULL", name, affinity),
                }
            } else if field.is_nullable() {
                format!("{} {}", name, affinity)
            } else {
                format!("{} {} NOT NULL", name, affinity)
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(schema.name()),
        columns.join(", ")
    )
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text | FieldType::Timestamp => "TEXT",
        FieldType::Integer | FieldType::Boolean => "INTEGER",
        FieldType::Float => "REAL",
    }
}

fn internal(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}
