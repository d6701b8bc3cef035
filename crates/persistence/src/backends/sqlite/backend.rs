//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::core::{Backend, BackendCapability, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::schema::Entity;

use super::context::SqliteDataContext;
use super::schema;

const MEMORY_PATH: &str = ":memory:";

/// SQLite backend for entity storage.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Database file path, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_path() -> String {
    MEMORY_PATH.to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackendConfig {
    /// Returns true if the configured path is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(MEMORY_PATH, SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend from a configuration, using its `path`.
    pub fn from_config(config: SqliteBackendConfig) -> StorageResult<Self> {
        let path = config.path.clone();
        Self::with_config(path, config)
    }

    /// Creates a backend with custom configuration.
    ///
    /// An in-memory database lives in a single connection, so the pool is
    /// capped at one connection that is never recycled.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        mut config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();
        let is_memory = path_str == MEMORY_PATH;
        config.path = path_str;

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let pragmas = ConnectionPragmas::from_config(&config, is_memory);
        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        }
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            pragmas.apply(conn)
        });

        let mut builder = Pool::builder().connection_timeout(Duration::from_millis(
            config.connection_timeout_ms,
        ));
        builder = if is_memory {
            builder
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            builder
                .max_size(config.max_connections)
                .min_idle(Some(config.min_connections.min(config.max_connections)))
        };

        let pool = builder
            .build(manager)
            .map_err(|e| connection_failed(&config.path, e))?;

        tracing::info!(
            path = %config.path,
            max_connections = if is_memory { 1 } else { config.max_connections },
            "Created SQLite connection pool"
        );

        let backend = Self {
            pool,
            config,
            is_memory,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)?;
        tracing::info!(path = %self.config.path, "Initialized SQLite schema");
        Ok(())
    }

    /// Creates the table for `E` if needed.
    pub fn register<E: Entity>(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::ensure_table::<E>(&conn)
    }

    /// Names of the entities with tables in this database.
    pub fn registered_entities(&self) -> StorageResult<Vec<String>> {
        let conn = self.get_connection()?;
        schema::registered_entities(&conn)
    }

    /// A data context for `E`, creating its table if needed.
    pub fn context<E: Entity>(&self) -> StorageResult<SqliteDataContext<E>> {
        self.register::<E>()?;
        Ok(SqliteDataContext::new(self.clone()))
    }

    /// A pooled connection. Waiting past the connection timeout means the
    /// pool is exhausted.
    pub(crate) fn get_connection(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }
}

fn connection_failed(path: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(BackendError::ConnectionFailed {
        backend_name: "sqlite".to_string(),
        message: format!("{}: {}", path, err),
    })
}

/// Per-connection settings applied when the pool opens a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConnectionPragmas {
    foreign_keys: bool,
    wal: bool,
}

impl ConnectionPragmas {
    fn from_config(config: &SqliteBackendConfig, is_memory: bool) -> Self {
        Self {
            foreign_keys: config.enable_foreign_keys,
            wal: config.enable_wal && !is_memory,
        }
    }

    fn apply(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        if self.foreign_keys {
            conn.pragma_update(None, "foreign_keys", "ON")?;
        }
        if self.wal {
            // journal_mode answers with the resulting mode
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }
        Ok(())
    }
}

/// Connection wrapper for SQLite.
pub struct SqliteConnection(pub(crate) PooledConnection<SqliteConnectionManager>);

impl Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish()
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    type Connection = SqliteConnection;

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
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
            BackendCapability::AtomicBulkInsert,
            BackendCapability::Transactions,
        ];
        if !self.is_memory {
            capabilities.push(BackendCapability::Durable);
        }
        capabilities
    }

    async fn acquire(&self) -> Result<Self::Connection, BackendError> {
        self.pool
            .get()
            .map(SqliteConnection)
            .map_err(|_| BackendError::PoolExhausted {
                backend_name: "sqlite".to_string(),
            })
    }

    async fn release(&self, conn: Self::Connection) {
        drop(conn);
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let conn = self.acquire().await?;
        let answer: i64 = conn.0.query_row("SELECT 1", [], |row| row.get(0)).map_err(|e| {
            BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: format!("health check on {} failed: {}", self.config.path, e),
            }
        })?;
        if answer != 1 {
            return Err(BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: format!("health check returned {}", answer),
            });
        }
        Ok(())
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        match self.init_schema() {
            Ok(()) => Ok(()),
            Err(StorageError::Backend(e)) => Err(e),
            Err(other) => Err(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: other.to_string(),
                source: None,
            }),
        }
    }
}
