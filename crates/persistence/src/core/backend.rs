//! Backend abstraction for storage drivers.
//!
//! This module defines the [`Backend`] trait, which every adapter implements
//! to describe itself and to hand out scoped connections. Data contexts are
//! built on top of a backend and never outlive it.

use std::fmt::Debug;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Identifies the type of storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory), queried with dynamic SQL.
    #[default]
    Sqlite,
    /// In-process entity set queried through composed query expressions.
    Memory,
    /// Embedded JSON document store.
    Document,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Document => write!(f, "document"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "memory" => Ok(BackendKind::Memory),
            "document" => Ok(BackendKind::Document),
            other => Err(BackendError::Unavailable {
                backend_name: other.to_string(),
                message: "unknown backend kind".to_string(),
            }),
        }
    }
}

/// Capabilities that a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCapability {
    /// Add, read and delete.
    Crud,
    /// Single-field patch.
    Patch,
    /// Whole-record update.
    Update,
    /// Membership lookups over a set of values.
    MultiValueLookup,
    /// Sorting results.
    Sorting,
    /// Offset-based pagination.
    OffsetPagination,
    /// Search-term filtering over searchable fields.
    TermSearch,
    /// Bulk insertion.
    BulkInsert,
    /// Bulk insertion that commits all entities or none.
    AtomicBulkInsert,
    /// ACID transactions.
    Transactions,
    /// Data survives process restart.
    Durable,
}

impl std::fmt::Display for BackendCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendCapability::Crud => "crud",
            BackendCapability::Patch => "patch",
            BackendCapability::Update => "update",
            BackendCapability::MultiValueLookup => "multi-value-lookup",
            BackendCapability::Sorting => "sorting",
            BackendCapability::OffsetPagination => "offset-pagination",
            BackendCapability::TermSearch => "term-search",
            BackendCapability::BulkInsert => "bulk-insert",
            BackendCapability::AtomicBulkInsert => "atomic-bulk-insert",
            BackendCapability::Transactions => "transactions",
            BackendCapability::Durable => "durable",
        };
        write!(f, "{}", name)
    }
}

/// A storage backend that data contexts execute against.
///
/// # Example
///
/// ```ignore
/// use strata_persistence::core::{Backend, BackendCapability};
///
/// if backend.supports(BackendCapability::AtomicBulkInsert) {
///     // a failed bulk add leaves nothing behind
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// The scoped resource handed out for one unit of work.
    type Connection: Send;

    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Checks if this backend supports the given capability.
    fn supports(&self, capability: BackendCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Returns all capabilities supported by this backend.
    fn capabilities(&self) -> Vec<BackendCapability>;

    /// Acquires a connection for one unit of work.
    async fn acquire(&self) -> Result<Self::Connection, BackendError>;

    /// Returns the connection.
    async fn release(&self, conn: Self::Connection);

    /// Checks if the backend is healthy and accepting work.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Prepares storage for use.
    async fn initialize(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Sqlite.to_string(), "sqlite");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Document.to_string(), "document");
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!(" memory ".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("cassandra".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"document\"").unwrap();
        assert_eq!(kind, BackendKind::Document);
        assert_eq!(serde_json::to_string(&BackendKind::Memory).unwrap(), "\"memory\"");
    }

    #[test]
    fn test_backend_capability_display() {
        assert_eq!(BackendCapability::Crud.to_string(), "crud");
        assert_eq!(
            BackendCapability::AtomicBulkInsert.to_string(),
            "atomic-bulk-insert"
        );
        assert_eq!(
            BackendCapability::MultiValueLookup.to_string(),
            "multi-value-lookup"
        );
    }
}
