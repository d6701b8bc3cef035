//! SQLite backend implementation.
//!
//! Each entity type is stored in its own table with one column per field.
//! Supports both in-memory databases (for tests) and file-based databases.
//!
//! # Features
//!
//! - In-memory and file-based modes
//! - Integer identities assigned from the rowid, text identities from UUID v4
//! - Predicates, search terms and pagination translated to parameterized SQL
//! - All-or-nothing bulk insertion inside one transaction
//!
//! # Example
//!
//! ```ignore
//! use strata_persistence::backends::sqlite::SqliteBackend;
//! use strata_persistence::core::WriteDataContext;
//!
//! let backend = SqliteBackend::in_memory()?;
//! let users = backend.context::<User>()?;
//! let created = users.add(User::id_selector(), FieldValue::Null, user).await?;
//! ```
//!
//! # Schema
//!
//! Besides the entity tables, one bookkeeping table records what was
//! registered:
//!
//! ```sql
//! CREATE TABLE strata_entities (
//!     name TEXT PRIMARY KEY NOT NULL,
//!     columns TEXT NOT NULL,
//!     registered_at TEXT NOT NULL
//! );
//! ```

mod backend;
mod context;
mod query_builder;
mod schema;

pub use backend::{SqliteBackend, SqliteBackendConfig, SqliteConnection};
pub use context::SqliteDataContext;
pub use query_builder::{QueryBuilder, SqlFragment, SqlParam};
pub use schema::create_table_sql;
