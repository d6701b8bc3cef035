//! Document store backend.
//!
//! Entities are stored as JSON objects in one collection per entity type.
//! Lookups are expressed as [`DocumentFilter`]s evaluated against stored
//! documents, and patches are applied to the stored document as a JSON
//! Patch `replace` operation.
//!
//! Bulk insertion is best-effort: each document is inserted on its own and
//! failures are reported together once every document has been attempted.

mod context;
mod filter;
mod store;

pub use context::DocumentDataContext;
pub use filter::DocumentFilter;
pub use store::DocumentStore;
