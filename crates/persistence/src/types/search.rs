//! Search request and result envelopes.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArgumentError, SelectorError};
use crate::schema::{Entity, FieldSelector};

/// Smallest page size a search may request.
pub const MIN_PAGE_SIZE: u64 = 10;

/// Typed paging, sorting and filtering parameters for a search.
///
/// Page size is clamped to at least [`MIN_PAGE_SIZE`] and the current page to
/// at least 0 when the parameters are built. The floor is not configurable.
///
/// # Example
///
/// ```ignore
/// let params = SearchParameters::new("smith", User::field("email")?, false, 3, -1);
/// assert_eq!(params.page_size(), 10);
/// assert_eq!(params.current_page(), 0);
/// ```
pub struct SearchParameters<E: 'static> {
    search_term: String,
    sort_field: FieldSelector<E>,
    is_descending: bool,
    page_size: u64,
    current_page: u64,
}

impl<E: Entity> SearchParameters<E> {
    /// Builds search parameters, clamping page size and page index.
    pub fn new(
        search_term: impl Into<String>,
        sort_field: FieldSelector<E>,
        is_descending: bool,
        page_size: i64,
        current_page: i64,
    ) -> Self {
        Self {
            search_term: search_term.into(),
            sort_field,
            is_descending,
            page_size: u64::try_from(page_size)
                .unwrap_or(0)
                .max(MIN_PAGE_SIZE),
            current_page: u64::try_from(current_page).unwrap_or(0),
        }
    }

    /// First page of [`MIN_PAGE_SIZE`] items sorted ascending by identity.
    pub fn first_page() -> Self {
        Self::new("", E::id_selector(), false, MIN_PAGE_SIZE as i64, 0)
    }

    /// The term to filter searchable fields by. Empty matches everything.
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// The field to sort by.
    pub fn sort_field(&self) -> FieldSelector<E> {
        self.sort_field
    }

    /// True for descending order.
    pub fn is_descending(&self) -> bool {
        self.is_descending
    }

    /// The number of items per page.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// The zero-based page index.
    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    /// Number of matching items to skip: `page_size * current_page`.
    pub fn offset(&self) -> u64 {
        self.page_size.saturating_mul(self.current_page)
    }

    /// Number of items to take.
    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// Whether an entity passes the search-term filter.
    ///
    /// An empty term matches everything. Otherwise any searchable field must
    /// contain the term, ignoring ASCII case, so an entity without searchable
    /// fields matches nothing.
    pub fn matches_term(&self, entity: &E) -> bool {
        let term = self.search_term.trim();
        if term.is_empty() {
            return true;
        }
        E::schema()
            .searchable_fields()
            .iter()
            .any(|field| field.get(entity).contains_text(term))
    }

    /// Orders two entities by the sort field and direction.
    ///
    /// Ties break on ascending identity so that pages never overlap.
    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        let ordering = self.sort_field.get(a).compare(&self.sort_field.get(b));
        let ordering = if self.is_descending {
            ordering.reverse()
        } else {
            ordering
        };
        let id = E::id_selector();
        ordering.then_with(|| id.get(a).compare(&id.get(b)))
    }
}

impl<E: 'static> Clone for SearchParameters<E> {
    fn clone(&self) -> Self {
        Self {
            search_term: self.search_term.clone(),
            sort_field: self.sort_field,
            is_descending: self.is_descending,
            page_size: self.page_size,
            current_page: self.current_page,
        }
    }
}

impl<E: Entity> fmt::Debug for SearchParameters<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchParameters")
            .field("search_term", &self.search_term)
            .field("sort_field", &self.sort_field)
            .field("is_descending", &self.is_descending)
            .field("page_size", &self.page_size)
            .field("current_page", &self.current_page)
            .finish()
    }
}

fn default_page_size() -> i64 {
    MIN_PAGE_SIZE as i64
}

/// Untyped search request, as received from a caller.
///
/// The sort term is a selector expression resolved against the entity when
/// the request is turned into [`SearchParameters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// The term to search for.
    #[serde(default)]
    pub search_term: String,

    /// The selector expression of the field to sort by.
    #[serde(default)]
    pub sort_term: String,

    /// True for descending order.
    #[serde(default)]
    pub is_descending: bool,

    /// Requested page size.
    #[serde(default = "default_page_size")]
    pub page_size: i64,

    /// Requested zero-based page index.
    #[serde(default)]
    pub current_page: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            sort_term: String::new(),
            is_descending: false,
            page_size: default_page_size(),
            current_page: 0,
        }
    }
}

impl SearchRequest {
    /// Creates a request for the first page.
    pub fn new(search_term: impl Into<String>, sort_term: impl Into<String>) -> Self {
        Self {
            search_term: search_term.into(),
            sort_term: sort_term.into(),
            ..Self::default()
        }
    }

    /// Sets the sort direction.
    pub fn descending(mut self, is_descending: bool) -> Self {
        self.is_descending = is_descending;
        self
    }

    /// Sets the page size and page index.
    pub fn page(mut self, page_size: i64, current_page: i64) -> Self {
        self.page_size = page_size;
        self.current_page = current_page;
        self
    }

    /// Resolves the sort term and builds typed parameters.
    ///
    /// An empty sort term sorts by the identity field.
    pub fn into_parameters<E: Entity>(self) -> Result<SearchParameters<E>, SelectorError> {
        let sort_field = if self.sort_term.trim().is_empty() {
            E::id_selector()
        } else {
            E::field(&self.sort_term)?
        };
        Ok(SearchParameters::new(
            self.search_term,
            sort_field,
            self.is_descending,
            self.page_size,
            self.current_page,
        ))
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult<T> {
    total_count: u64,
    items: Vec<T>,
}

impl<T> SearchResult<T> {
    /// Creates a result from a signed total.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::Negative`] if `total_count` is below zero.
    pub fn new(total_count: i64, items: Vec<T>) -> Result<Self, ArgumentError> {
        let total_count = u64::try_from(total_count).map_err(|_| ArgumentError::Negative {
            name: "total_count".to_string(),
            value: total_count,
        })?;
        Ok(Self { total_count, items })
    }

    /// Creates a result from an unsigned total.
    pub fn from_parts(total_count: u64, items: Vec<T>) -> Self {
        Self { total_count, items }
    }

    /// An empty result with a zero total.
    pub fn empty() -> Self {
        Self {
            total_count: 0,
            items: Vec::new(),
        }
    }

    /// Total number of matches, regardless of paging.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// The items on this page.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the result, returning the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// True when the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
