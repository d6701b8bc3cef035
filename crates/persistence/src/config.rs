//! Persistence configuration.
//!
//! Configuration is plain serde data. Every field has a default, so an empty
//! JSON object is a valid configuration (an in-memory SQLite database).
//!
//! # Example
//!
//! ```ignore
//! use strata_persistence::config::PersistenceConfig;
//!
//! let config = PersistenceConfig::from_json_str(r#"{
//!     "backend": "sqlite",
//!     "sqlite": { "path": "./data/strata.db", "max_connections": 4 },
//!     "search": { "default_page_size": 25 }
//! }"#)?
//! .with_env_overrides()?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::BackendKind;
use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::{MIN_PAGE_SIZE, SearchRequest};

#[cfg(feature = "sqlite")]
use crate::backends::sqlite::SqliteBackendConfig;

/// Environment variable selecting the backend kind.
pub const ENV_BACKEND: &str = "STRATA_BACKEND";

/// Environment variable overriding the SQLite database path.
pub const ENV_SQLITE_PATH: &str = "STRATA_SQLITE_PATH";

/// Environment variable overriding the document store file.
pub const ENV_DOCUMENT_PATH: &str = "STRATA_DOCUMENT_PATH";

/// Top-level persistence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: BackendKind,

    /// SQLite backend settings.
    #[cfg(feature = "sqlite")]
    #[serde(default)]
    pub sqlite: SqliteBackendConfig,

    /// Document store settings.
    #[serde(default)]
    pub document: DocumentConfig,

    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            #[cfg(feature = "sqlite")]
            sqlite: SqliteBackendConfig::default(),
            document: DocumentConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// File the store is persisted to. In memory only when absent.
    #[serde(default)]
    pub path: Option<String>,
}

/// Search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when a request does not name one.
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
}

fn default_page_size() -> i64 {
    MIN_PAGE_SIZE as i64
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

impl SearchConfig {
    /// A first-page request using the configured page size.
    ///
    /// The page size is still clamped when the request is converted into
    /// search parameters.
    pub fn request(&self, search_term: impl Into<String>, sort_term: impl Into<String>) -> SearchRequest {
        SearchRequest::new(search_term, sort_term).page(self.default_page_size, 0)
    }
}

impl PersistenceConfig {
    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "config".to_string(),
                message: format!("Failed to read {}: {}", path.display(), e),
                source: Some(Box::new(e)),
            })
        })?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), backend = %config.backend, "Loaded persistence config");
        Ok(config)
    }

    /// Applies `STRATA_BACKEND`, `STRATA_SQLITE_PATH` and
    /// `STRATA_DOCUMENT_PATH` from the process environment.
    pub fn with_env_overrides(self) -> StorageResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup(ENV_BACKEND) {
            self.backend = kind.parse()?;
            tracing::debug!(backend = %self.backend, "Backend overridden from environment");
        }
        #[cfg(feature = "sqlite")]
        if let Some(path) = lookup(ENV_SQLITE_PATH) {
            self.sqlite.path = path;
        }
        if let Some(path) = lookup(ENV_DOCUMENT_PATH) {
            self.document.path = Some(path);
        }
        Ok(self)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.search.default_page_size < MIN_PAGE_SIZE as i64 {
            errors.push(format!(
                "Default page size cannot be less than {}",
                MIN_PAGE_SIZE
            ));
        }

        #[cfg(feature = "sqlite")]
        {
            if self.sqlite.max_connections == 0 {
                errors.push("SQLite max connections cannot be 0".to_string());
            }
            if self.sqlite.min_connections > self.sqlite.max_connections {
                errors.push("SQLite min connections cannot exceed max connections".to_string());
            }
            if self.sqlite.path.trim().is_empty() {
                errors.push("SQLite path cannot be empty".to_string());
            }
        }

        if self.document.path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            errors.push("Document store path cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PersistenceConfig::default();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.search.default_page_size, 10);
        assert!(config.document.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = PersistenceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PersistenceConfig::default());
    }

    #[test]
    fn test_from_json_str() {
        let config = PersistenceConfig::from_json_str(
            r#"{"backend": "document", "document": {"path": "/tmp/s.json"}, "search": {"default_page_size": 25}}"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Document);
        assert_eq!(config.document.path.as_deref(), Some("/tmp/s.json"));
        assert_eq!(config.search.default_page_size, 25);
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = PersistenceConfig::from_json_str("{\"backend\": 3}").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Backend(BackendError::SerializationError { .. })
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.json");
        std::fs::write(&path, r#"{"backend": "memory"}"#).unwrap();
        let config = PersistenceConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);

        assert!(PersistenceConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = PersistenceConfig::default()
            .with_overrides(|name| match name {
                ENV_BACKEND => Some("Memory".to_string()),
                ENV_DOCUMENT_PATH => Some("docs.json".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.document.path.as_deref(), Some("docs.json"));

        let err = PersistenceConfig::default()
            .with_overrides(|name| (name == ENV_BACKEND).then(|| "oracle".to_string()))
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(BackendError::Unavailable { .. })));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_path_override() {
        let config = PersistenceConfig::default()
            .with_overrides(|name| (name == ENV_SQLITE_PATH).then(|| "strata.db".to_string()))
            .unwrap();
        assert_eq!(config.sqlite.path, "strata.db");
        assert!(!config.sqlite.is_memory());
    }

    #[test]
    fn test_validate_rejects_small_page_size() {
        let mut config = PersistenceConfig::default();
        config.search.default_page_size = 5;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_search_request_uses_default_page_size() {
        let search = SearchConfig {
            default_page_size: 50,
        };
        let request = search.request("bolt", "label");
        assert_eq!(request.page_size, 50);
        assert_eq!(request.current_page, 0);
    }
}
