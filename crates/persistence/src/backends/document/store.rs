//! Embedded JSON document store.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DocumentConfig;
use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::Entity;

use super::context::DocumentDataContext;

pub(crate) type Document = Map<String, Value>;

/// The documents of one collection and its identity sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Collection {
    pub(crate) documents: Vec<Document>,
    #[serde(default = "first_identity")]
    next_id: i64,
}

fn first_identity() -> i64 {
    1
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            next_id: first_identity(),
        }
    }
}

impl Collection {
    pub(crate) fn next_identity(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn observe_identity(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    collections: BTreeMap<String, Collection>,
}

/// A JSON document store, one collection per entity type.
///
/// Documents are JSON objects keyed by field name. A store opened from a
/// file rewrites that file after every successful write; an in-memory store
/// keeps nothing beyond the process.
#[derive(Clone)]
pub struct DocumentStore {
    state: Arc<RwLock<StoreState>>,
    path: Option<PathBuf>,
}

impl Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .field("collections", &self.state.read().collections.len())
            .finish()
    }
}

impl DocumentStore {
    /// Creates a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            path: None,
        }
    }

    /// Opens a store persisted to `path`, loading it if the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                internal(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str::<StoreState>(&raw)?
        } else {
            StoreState::default()
        };

        tracing::info!(
            path = %path.display(),
            collections = state.collections.len(),
            "Opened document store"
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            path: Some(path),
        })
    }

    /// Opens the store a configuration describes.
    pub fn from_config(config: &DocumentConfig) -> StorageResult<Self> {
        match &config.path {
            Some(path) => Self::open(path),
            None => Ok(Self::in_memory()),
        }
    }

    /// A data context for `E`, creating its collection if needed.
    pub fn context<E: Entity>(&self) -> StorageResult<DocumentDataContext<E>> {
        self.write(E::NAME, |_| Ok(()))?;
        Ok(DocumentDataContext::new(self.clone()))
    }

    /// Names of the collections in the store.
    pub fn collection_names(&self) -> Vec<String> {
        self.state.read().collections.keys().cloned().collect()
    }

    /// Whether writes are persisted to a file.
    pub fn is_durable(&self) -> bool {
        self.path.is_some()
    }

    /// Runs `f` over one collection under the read lock.
    pub(crate) fn read<R>(&self, collection: &str, f: impl FnOnce(&[Document]) -> R) -> R {
        let state = self.state.read();
        match state.collections.get(collection) {
            Some(c) => f(&c.documents),
            None => f(&[]),
        }
    }

    /// Runs `f` over one collection under the write lock, then persists.
    ///
    /// Nothing is persisted when `f` fails.
    pub(crate) fn write<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut state = self.state.write();
        let result = f(state.collections.entry(collection.to_string()).or_default())?;
        self.persist(&state)?;
        Ok(result)
    }

    fn persist(&self, state: &StoreState) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string(state)?;
        std::fs::write(path, raw)
            .map_err(|e| internal(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Persisted document store");
        Ok(())
    }
}

fn internal(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "document".to_string(),
        message,
        source: None,
    })
}

#[async_trait]
impl Backend for DocumentStore {
    type Connection = ();

    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn name(&self) -> &'static str {
        "document"
    }

    fn capabilities(&self) -> Vec<BackendCapability> {
        let mut capabilities = vec![
            BackendCapability::Crud,
            BackendCapability::Patch,
            BackendCapability::Update,
            BackendCapability::MultiValueLookup,
            BackendCapability::Sorting,
            BackendCapability::OffsetPagination,
            BackendCapability::TermSearch,
            BackendCapability::BulkInsert,
        ];
        if self.is_durable() {
            capabilities.push(BackendCapability::Durable);
        }
        capabilities
    }

    async fn acquire(&self) -> Result<Self::Connection, BackendError> {
        Ok(())
    }

    async fn release(&self, _conn: Self::Connection) {}

    async fn health_check(&self) -> Result<(), BackendError> {
        match &self.path {
            Some(path) => {
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
                if dir.is_some_and(|d| !d.is_dir()) {
                    return Err(BackendError::Unavailable {
                        backend_name: "document".to_string(),
                        message: format!("directory of {} does not exist", path.display()),
                    });
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        let state = self.state.read();
        self.persist(&state).map_err(|e| BackendError::Internal {
            backend_name: "document".to_string(),
            message: format!("Failed to initialize store: {}", e),
            source: None,
        })
    }
}
