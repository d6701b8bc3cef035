//! Data context traits and backend abstractions.
//!
//! - [`Backend`] - storage driver descriptor and connection scope
//! - [`ReadDataContext`] - count, lookups by field and paged search
//! - [`WriteDataContext`] - add, bulk add, delete, patch and update
//! - [`DataContext`] - both, implemented for every write context
//!
//! # Trait Hierarchy
//!
//! ```text
//! ReadDataContext<E>
//!     └── WriteDataContext<E>
//!             └── DataContext<E> (blanket)
//! ```
//!
//! # Example: Looking up by field
//!
//! ```ignore
//! use strata_persistence::core::ReadDataContext;
//! use strata_persistence::schema::Entity;
//!
//! async fn find_by_email<C: ReadDataContext<User>>(ctx: &C, email: &str) -> StorageResult<Option<User>> {
//!     ctx.get_by(User::field("email")?, email.into()).await
//! }
//! ```

mod backend;
mod context;

pub use backend::{Backend, BackendCapability, BackendKind};
pub use context::{BulkPolicy, DataContext, ReadDataContext, WriteDataContext};

pub(crate) use context::{
    apply_key, assign_text_identity, carry_identity, ensure_patchable, needs_identity, not_found,
};
