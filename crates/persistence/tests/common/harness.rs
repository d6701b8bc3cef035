//! Test harness for running one test body against every backend.
//!
//! A test body is a generic async function over any data context:
//!
//! ```ignore
//! async fn adds_user<C: DataContext<User>>(ctx: C) {
//!     // ...
//! }
//!
//! backend_test!(adds_user, User, adds_user);
//! ```
//!
//! The [`backend_test!`] macro stamps out one `#[tokio::test]` per enabled
//! backend feature, named `sqlite_<name>`, `memory_<name>` and
//! `document_<name>`.

use strata_persistence::core::WriteDataContext;
use strata_persistence::schema::{Entity, FieldValue};

/// Stamps a generic test body out for every backend.
macro_rules! backend_test {
    ($test_name:ident, $entity:ty, $test_fn:path) => {
        paste::paste! {
            #[cfg(feature = "sqlite")]
            #[tokio::test]
            async fn [<sqlite_ $test_name>]() {
                use strata_persistence::backends::sqlite::SqliteBackend;

                let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
                let ctx = backend
                    .context::<$entity>()
                    .expect("Failed to create SQLite context");
                $test_fn(ctx).await;
            }

            #[cfg(feature = "memory")]
            #[tokio::test]
            async fn [<memory_ $test_name>]() {
                use strata_persistence::backends::memory::MemoryBackend;

                let backend = MemoryBackend::new();
                let ctx = backend
                    .context::<$entity>()
                    .expect("Failed to create memory context");
                $test_fn(ctx).await;
            }

            #[cfg(feature = "document")]
            #[tokio::test]
            async fn [<document_ $test_name>]() {
                use strata_persistence::backends::document::DocumentStore;

                let store = DocumentStore::in_memory();
                let ctx = store
                    .context::<$entity>()
                    .expect("Failed to create document context");
                $test_fn(ctx).await;
            }
        }
    };
}

/// Inserts every entity one by one with a null identity and returns them as stored.
pub async fn seed<E, C>(ctx: &C, entities: Vec<E>) -> Vec<E>
where
    E: Entity,
    C: WriteDataContext<E>,
{
    let mut stored = Vec::with_capacity(entities.len());
    for entity in entities {
        let created = ctx
            .add(E::id_selector(), FieldValue::Null, entity)
            .await
            .expect("Failed to seed entity");
        stored.push(created);
    }
    stored
}
