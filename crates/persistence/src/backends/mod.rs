//! Database backend implementations.
//!
//! Each backend adapts the selector-based data context contract to one
//! query mechanism and is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Query mechanism | Bulk policy |
//! |---------|---------|-----------------|-------------|
//! | SQLite | `sqlite` | Dynamic SQL text with bound parameters | all-or-nothing |
//! | Memory | `memory` | Composed filter/order/skip/take queries | all-or-nothing |
//! | Document | `document` | Document filters and JSON Patch | best-effort |
//!
//! # Example
//!
//! ```ignore
//! use strata_persistence::backends::sqlite::SqliteBackend;
//!
//! // Create an in-memory SQLite backend
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Or use a file-based database
//! let backend = SqliteBackend::open("./data/strata.db")?;
//! let users = backend.context::<User>()?;
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "document")]
pub mod document;
