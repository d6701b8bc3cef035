//! Error types for the persistence layer.
//!
//! Only operational faults live here. Validation outcomes that an end user
//! should see travel inside [`Outcome`](crate::types::Outcome) and never
//! become a [`StorageError`].
//!
//! The hierarchy separates entity state errors, selector (programming)
//! errors, argument errors, bulk errors and backend faults.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Entity state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Malformed selectors or literals that do not fit a field
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Invalid arguments passed to a constructor or operation
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// Bulk insertion errors
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to entity state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// No entity matches the given identity.
    #[error("entity not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    /// An entity with the given identity already exists.
    #[error("entity already exists: {entity}/{id}")]
    AlreadyExists { entity: String, id: String },

    /// A single-entity lookup matched more than one entity.
    #[error("lookup of {entity} by {field} matched {count} entities, expected at most 1")]
    MultipleMatches {
        entity: String,
        field: String,
        count: usize,
    },
}

/// Errors raised while resolving a selector or building a predicate.
///
/// These indicate programming errors, never user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector expression is not a single direct field access.
    #[error("unsupported selector shape: '{expression}'")]
    UnsupportedShape { expression: String },

    /// The selector names a field the entity does not register.
    #[error("entity {entity} has no field '{field}'")]
    UnknownField { entity: String, field: String },

    /// A literal cannot be reconciled with the field's declared type.
    #[error("type mismatch on field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A null was assigned to a field that does not accept it.
    #[error("field '{field}' is not nullable")]
    NotNullable { field: String },

    /// A patch targeted the identity field.
    #[error("field '{field}' is the identity and cannot be changed")]
    ImmutableIdentity { field: String },

    /// A float literal is NaN or infinite.
    #[error("field '{field}' cannot hold the non-finite value {value}")]
    NotFinite { field: String, value: String },
}

/// Errors for invalid arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// A value that must be non-negative was negative.
    #[error("{name} cannot be less than zero (got {value})")]
    Negative { name: String, value: i64 },

    /// A value that must be non-empty was empty.
    #[error("{name} cannot be empty")]
    Empty { name: String },
}

/// Errors related to bulk insertion.
#[derive(Error, Debug)]
pub enum BulkError {
    /// The backend does not implement bulk insertion.
    #[error("bulk insertion not supported by {backend}")]
    NotSupported { backend: String },

    /// A best-effort bulk insertion completed with some failed entries.
    #[error("bulk insertion partially failed: {inserted} inserted, {failed} failed: {message}")]
    PartialFailure {
        inserted: usize,
        failed: usize,
        message: String,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Returns true if this error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }
}

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "document")]
impl From<json_patch::PatchError> for StorageError {
    fn from(err: json_patch::PatchError) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "document".to_string(),
            message: format!("failed to apply patch: {}", err),
            source: None,
        })
    }
}
