//! Composable in-process queries.
//!
//! A [`Query`] is built from filter, order, skip and take steps and then run
//! over a slice of entities. Every data context operation of the memory
//! backend is expressed as one of these.

use std::cmp::Ordering;

type Filter<'a, E> = Box<dyn Fn(&E) -> bool + 'a>;
type Order<'a, E> = Box<dyn Fn(&E, &E) -> Ordering + 'a>;

/// A query over entities held in memory.
pub struct Query<'a, E> {
    filters: Vec<Filter<'a, E>>,
    order: Option<Order<'a, E>>,
    skip: usize,
    take: Option<usize>,
}

impl<E> Default for Query<'_, E> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
            skip: 0,
            take: None,
        }
    }
}

impl<'a, E: Clone> Query<'a, E> {
    /// An unfiltered, unordered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps entities for which `f` holds. Filters are ANDed.
    pub fn filter(mut self, f: impl Fn(&E) -> bool + 'a) -> Self {
        self.filters.push(Box::new(f));
        self
    }

    /// Sorts matches with `cmp`. The sort is stable.
    pub fn order_by(mut self, cmp: impl Fn(&E, &E) -> Ordering + 'a) -> Self {
        self.order = Some(Box::new(cmp));
        self
    }

    /// Skips the first `n` matches after ordering.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Returns at most `n` matches.
    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    fn accepts(&self, entity: &E) -> bool {
        self.filters.iter().all(|f| f(entity))
    }

    /// Number of entities passing the filters, ignoring skip and take.
    pub fn count(&self, rows: &[E]) -> usize {
        rows.iter().filter(|e| self.accepts(e)).count()
    }

    /// Whether any entity passes the filters.
    pub fn any(&self, rows: &[E]) -> bool {
        rows.iter().any(|e| self.accepts(e))
    }

    /// Positions of the entities passing the filters, in storage order.
    pub fn positions(&self, rows: &[E]) -> Vec<usize> {
        rows.iter()
            .enumerate()
            .filter(|(_, e)| self.accepts(e))
            .map(|(i, _)| i)
            .collect()
    }

    /// Runs the query and clones out the results.
    pub fn run(&self, rows: &[E]) -> Vec<E> {
        let mut matched: Vec<&E> = rows.iter().filter(|e| self.accepts(e)).collect();
        if let Some(order) = &self.order {
            matched.sort_by(|a, b| order(a, b));
        }
        matched
            .into_iter()
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
