//! Validated store service.
//!
//! [`StoreService`] wraps a data context and a validator. It decides
//! validity before any write: validation failures, duplicate identities and
//! failures added by [`StoreHooks`] come back inside an
//! [`Outcome`](crate::types::Outcome) and the backend is left untouched.
//! Only operational faults are returned as errors.

mod hooks;
mod store;

pub use hooks::{NoAdditionalChecks, StoreHooks};
pub use store::StoreService;
