//! Store service tests.
//!
//! Most tests run on the memory backend; the write-path tests that depend on
//! backend behavior are stamped out for every backend.

#[macro_use]
mod common;

use async_trait::async_trait;
use serde_json::json;

use common::*;
use strata_persistence::backends::memory::MemoryBackend;
use strata_persistence::backends::memory::MemoryDataContext;
use strata_persistence::core::{DataContext, ReadDataContext, WriteDataContext};
use strata_persistence::error::{SelectorError, StorageResult};
use strata_persistence::schema::{Entity, FieldSelector, FieldValue};
use strata_persistence::service::{NoAdditionalChecks, StoreHooks, StoreService};
use strata_persistence::types::{Failure, Outcome, SearchParameters};
use strata_persistence::validation::{AcceptAll, RuleValidator};

type UserService<H> = StoreService<User, MemoryDataContext<User>, RuleValidator<User>, H>;

fn memory_service() -> UserService<NoAdditionalChecks> {
    let ctx = MemoryBackend::new()
        .context::<User>()
        .expect("Failed to create memory context");
    StoreService::new(ctx, user_validator())
}

/// Rejects the name "Reserved" and lowercases patched emails.
struct ReservedNames;

#[async_trait]
impl StoreHooks<User> for ReservedNames {
    async fn add_additional_checks(&self, entity: &User) -> StorageResult<Vec<Failure>> {
        if entity.name == "Reserved" {
            return Ok(vec![Failure::new("name", "Name is reserved", entity.name.clone())]);
        }
        Ok(Vec::new())
    }

    async fn patch_additional_checks(
        &self,
        _current: &User,
        field: FieldSelector<User>,
        value: FieldValue,
    ) -> StorageResult<Outcome<FieldValue>> {
        match (field.name(), value) {
            ("email", FieldValue::Text(email)) => {
                Ok(Outcome::success(FieldValue::Text(email.to_lowercase())))
            }
            ("name", FieldValue::Text(name)) if name == "Reserved" => {
                let failure = Failure::new("name", "Name is reserved", name.clone());
                Ok(Outcome::with_failures(FieldValue::Text(name), vec![failure]))
            }
            (_, value) => Ok(Outcome::success(value)),
        }
    }
}

fn hooked_service() -> UserService<ReservedNames> {
    let ctx = MemoryBackend::new()
        .context::<User>()
        .expect("Failed to create memory context");
    StoreService::with_hooks(ctx, user_validator(), ReservedNames)
}

// ============================================================================
// Add
// ============================================================================

#[tokio::test]
async fn test_add_valid_entity() {
    let service = memory_service();

    let outcome = service
        .add(User::id_selector(), unassigned(), User::new("ann@example.com", "Ann"))
        .await
        .expect("Failed to add");

    assert_valid(&outcome);
    assert_eq!(outcome.item().id, 1);
    assert_eq!(service.count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_add_reports_validation_failures_without_writing() {
    let service = memory_service();

    let outcome = service
        .add(
            User::id_selector(),
            unassigned(),
            User::new("not-an-email", "Ann").with_age(200),
        )
        .await
        .expect("Failed to add");

    assert_failure_properties(&outcome, &["email", "age"]);
    assert_eq!(outcome.item().email, "not-an-email", "the submitted entity is returned");
    assert_eq!(service.count().await.expect("count"), 0);
}

#[tokio::test]
async fn test_add_reports_duplicate_identity() {
    let service = memory_service();
    service
        .add(User::id_selector(), FieldValue::Integer(5), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add");

    let outcome = service
        .add(User::id_selector(), FieldValue::Integer(5), User::new("b@example.com", "Ben"))
        .await
        .expect("Failed to add");

    assert_failure_properties(&outcome, &["id"]);
    let failure = &outcome.failures()[0];
    assert_eq!(failure.error_message, "User already exists");
    assert_eq!(failure.attempted_value, json!(5));
    assert_eq!(service.count().await.expect("count"), 1);
}

#[tokio::test]
async fn test_add_orders_validation_then_duplicate_then_hook() {
    let service = hooked_service();
    service
        .add(User::id_selector(), FieldValue::Integer(1), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add");

    let outcome = service
        .add(
            User::id_selector(),
            FieldValue::Integer(1),
            User::new("broken", "Reserved"),
        )
        .await
        .expect("Failed to add");

    assert_failure_properties(&outcome, &["email", "id", "name"]);
    assert_eq!(outcome.failures()[2].error_message, "Name is reserved");
}

#[tokio::test]
async fn test_add_skips_duplicate_check_for_unassigned_identity() {
    let service = memory_service();
    for _ in 0..2 {
        let outcome = service
            .add(User::id_selector(), unassigned(), User::new("same@example.com", "Same"))
            .await
            .expect("Failed to add");
        assert_valid(&outcome);
    }
    assert_eq!(service.count().await.expect("count"), 2);
}

async fn add_through_service<C: DataContext<User>>(ctx: C) {
    let service = StoreService::new(ctx, user_validator());

    let rejected = service
        .add(User::id_selector(), unassigned(), User::new("", "Nobody"))
        .await
        .expect("Failed to add");
    assert_failure_properties(&rejected, &["email", "email"]);

    let accepted = service
        .add(User::id_selector(), unassigned(), User::new("ok@example.com", "Okay"))
        .await
        .expect("Failed to add");
    assert_valid(&accepted);

    let duplicate = service
        .add(User::id_selector(), accepted.item().id.into(), User::new("ok@example.com", "Okay"))
        .await
        .expect("Failed to add");
    assert_failure_properties(&duplicate, &["id"]);
    assert_eq!(service.count().await.expect("count"), 1);
}
backend_test!(add_through_service, User, add_through_service);

async fn add_keyed_on_email_rejects_duplicate<C: DataContext<User>>(ctx: C) {
    let service = StoreService::new(ctx, user_validator());
    let email = User::field("email").expect("email field");

    let first = service
        .add(email, "a@x.com".into(), User::new("a@x.com", "Ann"))
        .await
        .expect("Failed to add");
    assert_valid(&first);
    assert_eq!(first.item().email, "a@x.com");

    let second = service
        .add(email, "a@x.com".into(), User::new("a@x.com", "Ben"))
        .await
        .expect("Failed to add");
    assert!(!second.is_valid());
    assert_failure_properties(&second, &["id"]);
    assert!(second.failures()[0].error_message.contains("already exists"));
    assert_eq!(service.count().await.expect("count"), 1);
}
backend_test!(add_keyed_on_email_rejects_duplicate, User, add_keyed_on_email_rejects_duplicate);

async fn patch_field_without_rules<C: DataContext<User>>(ctx: C) {
    let service = StoreService::new(ctx, user_validator());
    let created = service
        .add(
            User::id_selector(),
            unassigned(),
            User {
                active: false,
                ..User::new("a@x.com", "Ann").with_age(30)
            },
        )
        .await
        .expect("Failed to add")
        .into_item();

    let outcome = service
        .patch(
            User::id_selector(),
            created.id.into(),
            User::field("active").expect("active field"),
            true.into(),
        )
        .await
        .expect("Failed to patch");
    assert_valid(&outcome);
    assert!(outcome.item().active);

    let stored = service
        .get_by(User::id_selector(), created.id.into())
        .await
        .expect("lookup")
        .expect("User should exist");
    assert_eq!(stored, User { active: true, ..created });
}
backend_test!(patch_field_without_rules, User, patch_field_without_rules);

// ============================================================================
// Bulk add
// ============================================================================

#[tokio::test]
async fn test_add_bulk_writes_valid_batch() {
    let service = memory_service();

    let outcomes = service
        .add_bulk(User::id_selector(), twelve_users())
        .await
        .expect("Failed to bulk add");

    assert_eq!(outcomes.len(), 12);
    for (position, outcome) in outcomes.iter().enumerate() {
        assert_valid(outcome);
        assert_eq!(outcome.index(), Some(position));
    }
    assert_eq!(service.count().await.expect("count"), 12);
}

#[tokio::test]
async fn test_add_bulk_rejects_whole_batch_on_any_failure() {
    let service = memory_service();
    let mut batch = twelve_users();
    batch[4].email = "broken".to_string();
    batch[9].age = Some(-1);

    let outcomes = service
        .add_bulk(User::id_selector(), batch)
        .await
        .expect("Failed to bulk add");

    assert_eq!(outcomes.len(), 12);
    let rejected: Vec<usize> = outcomes
        .iter()
        .filter(|o| !o.is_valid())
        .filter_map(|o| o.index())
        .collect();
    assert_eq!(rejected, vec![4, 9]);
    assert_failure_properties(&outcomes[4], &["email"]);
    assert_failure_properties(&outcomes[9], &["age"]);
    assert_eq!(service.count().await.expect("count"), 0);
}

#[tokio::test]
async fn test_add_bulk_flags_repeated_and_existing_keys() {
    let service = memory_service();
    service
        .add(User::id_selector(), FieldValue::Integer(3), User::new("c@example.com", "Cat"))
        .await
        .expect("Failed to add");

    let batch = vec![
        User {
            id: 10,
            ..User::new("a@example.com", "Ann")
        },
        User {
            id: 10,
            ..User::new("b@example.com", "Ben")
        },
        User {
            id: 3,
            ..User::new("d@example.com", "Dan")
        },
    ];
    let outcomes = service
        .add_bulk(User::id_selector(), batch)
        .await
        .expect("Failed to bulk add");

    assert_valid(&outcomes[0]);
    assert_failure_properties(&outcomes[1], &["id"]);
    assert!(outcomes[1].failures()[0].error_message.contains("more than once"));
    assert_failure_properties(&outcomes[2], &["id"]);
    assert_eq!(outcomes[2].failures()[0].error_message, "User already exists");
    assert_eq!(service.count().await.expect("count"), 1);
}

// ============================================================================
// Patch
// ============================================================================

#[tokio::test]
async fn test_patch_applies_valid_value() {
    let service = memory_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let outcome = service
        .patch(
            User::id_selector(),
            created.id.into(),
            User::field("age").expect("age field"),
            FieldValue::Integer(41),
        )
        .await
        .expect("Failed to patch");

    assert_valid(&outcome);
    assert_eq!(outcome.item().age, Some(41));
    let stored = service
        .get_by(User::id_selector(), created.id.into())
        .await
        .expect("lookup")
        .expect("User should exist");
    assert_eq!(stored.age, Some(41));
}

#[tokio::test]
async fn test_patch_revalidates_only_the_patched_field() {
    let service = memory_service();
    let ctx = service.context().clone();
    let legacy = ctx
        .add(
            User::id_selector(),
            unassigned(),
            User::new("legacy-without-at", "Legacy"),
        )
        .await
        .expect("Failed to add through the context");

    let outcome = service
        .patch(
            User::id_selector(),
            legacy.id.into(),
            User::field("name").expect("name field"),
            "Renamed".into(),
        )
        .await
        .expect("Failed to patch");
    assert_valid(&outcome);
    assert_eq!(outcome.item().email, "legacy-without-at");
}

#[tokio::test]
async fn test_patch_rejects_invalid_value_without_writing() {
    let service = memory_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let outcome = service
        .patch(
            User::id_selector(),
            created.id.into(),
            User::field("email").expect("email field"),
            "broken".into(),
        )
        .await
        .expect("Failed to patch");

    assert_failure_properties(&outcome, &["email"]);
    assert_eq!(outcome.item().email, "a@example.com", "the unpatched entity is returned");
    let stored = service
        .get_by(User::id_selector(), created.id.into())
        .await
        .expect("lookup")
        .expect("User should exist");
    assert_eq!(stored.email, "a@example.com");
}

#[tokio::test]
async fn test_patch_null_on_required_field_is_a_failure() {
    let service = memory_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();
    let name = User::field("name").expect("name field");

    let outcome = service
        .patch(User::id_selector(), created.id.into(), name, FieldValue::Null)
        .await
        .expect("A null name is reported, not raised");
    assert_failure_properties(&outcome, &["name"]);
    assert_eq!(outcome.failures()[0].error_message, "'name' must not be empty.");
    assert_eq!(outcome.failures()[0].attempted_value, json!(null));
    let stored = service
        .get_by(User::id_selector(), created.id.into())
        .await
        .expect("lookup")
        .expect("User should exist");
    assert_eq!(stored.name, "Ann");

    let err = service
        .patch(User::id_selector(), created.id.into(), name, FieldValue::Integer(5))
        .await
        .expect_err("A value of the wrong type is still an error");
    assert!(matches!(
        assert_selector_error(&err),
        SelectorError::TypeMismatch { .. }
    ));
}

#[tokio::test]
async fn test_patch_hook_rewrites_value() {
    let service = hooked_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let outcome = service
        .patch(
            User::id_selector(),
            created.id.into(),
            User::field("email").expect("email field"),
            "Ann.Smith@Example.COM".into(),
        )
        .await
        .expect("Failed to patch");

    assert_valid(&outcome);
    assert_eq!(outcome.item().email, "ann.smith@example.com");
}

#[tokio::test]
async fn test_patch_orders_field_failures_before_hook_failures() {
    let service = hooked_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let validator = user_validator().must(
        User::field("name").expect("name field"),
        "Name must start lowercase",
        |value| {
            value
                .as_text()
                .and_then(|s| s.chars().next())
                .map_or(true, |c| !c.is_uppercase())
        },
    );
    let strict = StoreService::with_hooks(service.context().clone(), validator, ReservedNames);

    let outcome = strict
        .patch(
            User::id_selector(),
            created.id.into(),
            User::field("name").expect("name field"),
            "Reserved".into(),
        )
        .await
        .expect("Failed to patch");

    assert_failure_properties(&outcome, &["name", "name"]);
    assert_eq!(outcome.failures()[0].error_message, "Name must start lowercase");
    assert_eq!(outcome.failures()[1].error_message, "Name is reserved");
}

#[tokio::test]
async fn test_patch_missing_entity_is_an_error() {
    let service = memory_service();

    let err = service
        .patch(
            User::id_selector(),
            FieldValue::Integer(77),
            User::field("name").expect("name field"),
            "Ghost".into(),
        )
        .await
        .expect_err("Patching a missing entity should fail");
    assert_not_found(&err);
}

#[tokio::test]
async fn test_patch_identity_is_an_error() {
    let service = memory_service();

    let err = service
        .patch(
            User::id_selector(),
            FieldValue::Integer(1),
            User::id_selector(),
            FieldValue::Integer(2),
        )
        .await
        .expect_err("Patching the identity should fail");
    assert!(matches!(
        assert_selector_error(&err),
        SelectorError::ImmutableIdentity { .. }
    ));
}

// ============================================================================
// Update and delete
// ============================================================================

#[tokio::test]
async fn test_update_validates_before_writing() {
    let service = memory_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let rejected = service
        .update(
            User::id_selector(),
            created.id.into(),
            User::new("broken", "Ann"),
        )
        .await
        .expect("Failed to update");
    assert_failure_properties(&rejected, &["email"]);

    let accepted = service
        .update(
            User::id_selector(),
            created.id.into(),
            User::new("new@example.com", "Ann B").with_age(29),
        )
        .await
        .expect("Failed to update");
    assert_valid(&accepted);
    assert_eq!(accepted.item().id, created.id);
    assert_eq!(accepted.item().email, "new@example.com");
}

#[tokio::test]
async fn test_update_missing_entity_is_an_error() {
    let service = memory_service();
    let err = service
        .update(User::id_selector(), FieldValue::Integer(9), User::new("a@example.com", "Ann"))
        .await
        .expect_err("Updating a missing entity should fail");
    assert_not_found(&err);
}

#[tokio::test]
async fn test_delete_returns_empty_outcome() {
    let service = memory_service();
    let created = service
        .add(User::id_selector(), unassigned(), User::new("a@example.com", "Ann"))
        .await
        .expect("Failed to add")
        .into_item();

    let outcome = service
        .delete(User::id_selector(), created.id.into())
        .await
        .expect("Failed to delete");
    assert_valid(&outcome);
    assert_eq!(service.count().await.expect("count"), 0);

    let again = service
        .delete(User::id_selector(), created.id.into())
        .await
        .expect("Deleting a missing entity is not an error");
    assert_valid(&again);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_reads_pass_through() {
    let ctx = MemoryBackend::new()
        .context::<User>()
        .expect("Failed to create memory context");
    let service = StoreService::new(ctx, AcceptAll);
    service
        .add_bulk(User::id_selector(), twelve_users())
        .await
        .expect("Failed to bulk add");

    let page = service
        .search(&SearchParameters::new("user0", User::id_selector(), true, 10, 0))
        .await
        .expect("search");
    assert_eq!(page.total_count(), 10);
    assert_eq!(page.items()[0].name, "User 09");

    let found = service
        .get_by_multiple_values(
            User::field("email").expect("email field"),
            vec!["user01@example.com".into(), "user11@example.com".into()],
        )
        .await
        .expect("lookup");
    assert_eq!(found.total_count(), 2);
    assert_eq!(service.context().count().await.expect("count"), 12);
}

// ============================================================================
// Outcome formatting
// ============================================================================

#[tokio::test]
async fn test_failures_format_for_log() {
    let service = memory_service();
    let outcome = service
        .add(User::id_selector(), unassigned(), User::new("nope", "Ann"))
        .await
        .expect("Failed to add");

    assert_eq!(
        outcome.format_failures_for_log(),
        "email: 'email' is not a valid email address. - Attempted value: nope"
    );
}

#[test]
fn test_failures_camel_case_properties() {
    let outcome = Outcome::with_failures(
        (),
        vec![
            Failure::new("Address.ZipCode", "Required", json!(null)),
            Failure::new("Email", "Invalid", json!("x")),
        ],
    )
    .to_camel_cased_properties()
    .expect("non-empty property names");

    assert_failure_properties(&outcome, &["address.zipCode", "email"]);
}
