//! In-memory backend.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::Entity;

use super::context::MemoryDataContext;

type AnyTable = Arc<dyn Any + Send + Sync>;

/// Rows of one entity type and its identity sequence.
#[derive(Debug)]
pub(crate) struct TableState<E> {
    pub(crate) rows: Vec<E>,
    next_id: i64,
}

impl<E> TableState<E> {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }

    /// Takes the next integer identity.
    pub(crate) fn next_identity(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Current position of the identity sequence.
    pub(crate) fn sequence(&self) -> i64 {
        self.next_id
    }

    /// Rewinds the sequence after an aborted batch.
    pub(crate) fn rewind_sequence(&mut self, next_id: i64) {
        self.next_id = next_id;
    }

    /// Keeps the sequence ahead of an explicitly supplied identity.
    pub(crate) fn observe_identity(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
    }
}

pub(crate) type Table<E> = RwLock<TableState<E>>;

/// Process-local storage, one table per entity type.
///
/// Cloning is cheap and shares the tables. Nothing survives the process.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<TypeId, AnyTable>>>,
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("tables", &self.tables.read().len())
            .finish()
    }
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A data context for `E`, creating its table if needed.
    pub fn context<E: Entity>(&self) -> StorageResult<MemoryDataContext<E>> {
        Ok(MemoryDataContext::new(self.table::<E>()?))
    }

    /// Number of entity types with a table.
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Drops every table.
    pub fn clear(&self) {
        self.tables.write().clear();
        tracing::debug!("Cleared in-memory tables");
    }

    fn table<E: Entity>(&self) -> StorageResult<Arc<Table<E>>> {
        let any = {
            let mut tables = self.tables.write();
            tables
                .entry(TypeId::of::<E>())
                .or_insert_with(|| {
                    tracing::debug!(entity = E::NAME, "Created in-memory table");
                    Arc::new(RwLock::new(TableState::<E>::new())) as AnyTable
                })
                .clone()
        };
        any.downcast::<Table<E>>().map_err(|_| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "memory".to_string(),
                message: format!("table registered for {} holds another type", E::NAME),
                source: None,
            })
        })
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Connection = ();

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        vec![
            BackendCapability::Crud,
            BackendCapability::Patch,
            BackendCapability::Update,
            BackendCapability::MultiValueLookup,
            BackendCapability::Sorting,
            BackendCapability::OffsetPagination,
            BackendCapability::TermSearch,
            BackendCapability::BulkInsert,
            BackendCapability::AtomicBulkInsert,
        ]
    }

    async fn acquire(&self) -> Result<Self::Connection, BackendError> {
        Ok(())
    }

    async fn release(&self, _conn: Self::Connection) {}

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
