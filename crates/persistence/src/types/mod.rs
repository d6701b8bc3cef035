//! Value types shared by every backend and the store service.
//!
//! - [`Outcome`] and [`Failure`] - the user-facing result model
//! - [`SearchParameters`], [`SearchRequest`] - paging, sorting and filtering
//! - [`SearchResult`] - one page of matches plus the unpaged total

mod outcome;
mod search;

pub use outcome::{Failure, Outcome};
pub use search::{MIN_PAGE_SIZE, SearchParameters, SearchRequest, SearchResult};
