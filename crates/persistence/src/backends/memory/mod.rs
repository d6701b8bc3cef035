//! In-memory backend.
//!
//! Entities live in process memory, one table per entity type, guarded by a
//! read-write lock. Every operation is expressed as a composed [`Query`]
//! (filter, order, skip, take) run over the table under that lock, so each
//! call is atomic with respect to other calls.
//!
//! Integer identities come from a per-table sequence that starts at 1 and
//! stays ahead of any explicitly supplied identity.

mod backend;
mod context;
mod query;

pub use backend::MemoryBackend;
pub use context::MemoryDataContext;
pub use query::Query;
