//! Assertion helpers for outcomes and storage errors.

use strata_persistence::error::{ResourceError, SelectorError, StorageError};
use strata_persistence::types::Outcome;

/// Asserts that an outcome has no failures.
pub fn assert_valid<T>(outcome: &Outcome<T>) {
    assert!(
        outcome.is_valid(),
        "Expected a valid outcome, got failures:\n{}",
        outcome.format_failures_for_log()
    );
}

/// Asserts the property names of an outcome's failures, in order.
pub fn assert_failure_properties<T>(outcome: &Outcome<T>, expected: &[&str]) {
    let actual: Vec<&str> = outcome
        .failures()
        .iter()
        .map(|f| f.property_name.as_str())
        .collect();
    assert_eq!(
        actual, expected,
        "Failure properties mismatch:\n{}",
        outcome.format_failures_for_log()
    );
}

/// Asserts that an error reports a missing entity.
pub fn assert_not_found(err: &StorageError) {
    assert!(
        matches!(err, StorageError::Resource(ResourceError::NotFound { .. })),
        "Expected NotFound, got {:?}",
        err
    );
}

/// Asserts that an error reports an ambiguous single-entity lookup.
pub fn assert_multiple_matches(err: &StorageError, expected_count: usize) {
    match err {
        StorageError::Resource(ResourceError::MultipleMatches { count, .. }) => {
            assert_eq!(*count, expected_count, "MultipleMatches count mismatch")
        }
        other => panic!("Expected MultipleMatches, got {:?}", other),
    }
}

/// Asserts that an error is a selector error.
pub fn assert_selector_error(err: &StorageError) -> &SelectorError {
    match err {
        StorageError::Selector(e) => e,
        other => panic!("Expected a selector error, got {:?}", other),
    }
}
