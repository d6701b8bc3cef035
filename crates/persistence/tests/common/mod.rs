//! Test infrastructure for the persistence layer.
//!
//! Fixtures, assertion helpers and the per-backend test macro shared by the
//! integration tests. Not every test binary uses every helper.

#![allow(dead_code)]

#[macro_use]
pub mod harness;

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
pub use harness::*;
