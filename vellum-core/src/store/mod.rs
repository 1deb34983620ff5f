//! Persisted client-state storage.
//!
//! This module provides:
//! - [`StateStore`] - Trait for persisted client state backends
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`FileStore`] - Single-file JSON implementation
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select a backend based on availability
//!
//! # Storage Key Convention
//!
//! Keys follow the pattern: `vellum/{area}/{name}`, e.g.
//! `vellum/session/access_token` or `vellum/draft/data/{session_id}`.

use async_trait::async_trait;
use thiserror::Error;

mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use file::FileStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// Error type for state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over persisted client-state backends.
///
/// Values are plain strings; callers serialize structured records (user
/// profile, draft blobs) to JSON themselves. Sensitive values should be
/// wrapped in [`crate::session::Secret`] as soon as they are read.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Retrieve a value by key. `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError>;

    /// Store a value at the given key, overwriting any existing value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError>;

    /// Delete a key. `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StateStoreError>;

    /// List all keys matching a prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateStoreError>;

    /// Check if a key exists without retrieving the value.
    async fn exists(&self, key: &str) -> Result<bool, StateStoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Create a state store with automatic backend selection.
///
/// - With `prefer_keyring` and the `keyring-store` feature, tries the OS
///   keyring first and falls back with a warning.
/// - Otherwise opens a [`FileStore`] under the given directory (the default
///   data dir when `None`), falling back to [`MemoryStore`] when the file
///   cannot be opened.
pub fn create_store(
    data_dir: Option<std::path::PathBuf>,
    prefer_keyring: bool,
) -> Box<dyn StateStore> {
    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringStore::try_new("vellum") {
            Ok(store) => {
                tracing::info!("using OS keyring for persisted client state");
                return Box::new(store);
            }
            Err(e) => {
                tracing::warn!("keyring unavailable ({e}), falling back to file store");
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            "keyring storage requested but the keyring-store feature is not enabled, \
             using the file store"
        );
    }

    let dir = data_dir.unwrap_or_else(crate::config::default_data_dir);
    match FileStore::open(dir.join("state.json")) {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::warn!(
                "failed to open state file ({e}), falling back to memory store; \
                 state will not persist across restarts"
            );
            Box::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_store_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(Some(dir.path().to_path_buf()), false);

        store.set("vellum/test/key", "value").await.unwrap();
        assert_eq!(
            store.get("vellum/test/key").await.unwrap().as_deref(),
            Some("value")
        );
    }
}
