//! Strata Persistence Layer
//!
//! This crate provides a storage-agnostic data-access layer. Application code
//! creates, reads, patches, deletes and searches entities through a single
//! selector-based contract ("select a field, compare it to a value"), and
//! each backend compiles that contract down to its own query mechanism.
//!
//! # Features
//!
//! - **Selectors**: typed handles to one registered field, resolved from
//!   `field` or `entity.field` expressions
//! - **Multiple Backends**: dynamic SQL (SQLite), composed in-process queries
//!   (memory) and a JSON document store with JSON Patch
//! - **Validated writes**: a store service that reports validation and
//!   business-rule failures as data instead of errors
//! - **Paged search**: term filtering, sorting and offset pagination with
//!   identical semantics on every backend
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! strata-persistence = { version = "0.1", default-features = false, features = ["sqlite"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `memory` (default) - process-local tables
//! - `document` (default) - embedded JSON document store
//!
//! # Architecture
//!
//! - [`schema`] - Entity registration, field values, selectors and predicates
//! - [`types`] - Outcomes, failures and search types
//! - [`core`] - Data context and backend traits
//! - [`validation`] - The validator boundary and a rule-based validator
//! - [`service`] - The validated store service
//! - [`backends`] - Backend implementations
//! - [`config`] - Configuration
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_persistence::backends::memory::MemoryBackend;
//! use strata_persistence::schema::{Entity, FieldValue};
//! use strata_persistence::service::StoreService;
//! use strata_persistence::types::SearchParameters;
//! use strata_persistence::validation::RuleValidator;
//!
//! let backend = MemoryBackend::new();
//! let validator = RuleValidator::new()
//!     .not_empty(User::field("email")?)
//!     .email(User::field("email")?);
//! let users = StoreService::new(backend.context::<User>()?, validator);
//!
//! let outcome = users.add(User::id_selector(), FieldValue::Null, user).await?;
//! if !outcome.is_valid() {
//!     tracing::warn!("{}", outcome.format_failures_for_log());
//! }
//!
//! let page = users
//!     .search(&SearchParameters::new("smith", User::field("email")?, false, 20, 0))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod schema;
pub mod service;
pub mod types;
pub mod validation;

// Re-export commonly used types at the crate root
pub use config::PersistenceConfig;
pub use core::{
    Backend, BackendCapability, BackendKind, BulkPolicy, DataContext, ReadDataContext,
    WriteDataContext,
};
pub use error::{StorageError, StorageResult};
pub use schema::{Entity, EntitySchema, FieldDescriptor, FieldSelector, FieldType, FieldValue, Predicate};
pub use service::{StoreHooks, StoreService};
pub use types::{Failure, Outcome, SearchParameters, SearchRequest, SearchResult};
pub use validation::{RuleValidator, Validator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
