//! Single-file JSON state storage implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{StateStore, StateStoreError};

/// State store backed by one JSON object file on disk.
///
/// The whole map is kept in memory and rewritten on every mutation; the
/// volumes involved (a session record, a handful of draft blobs) make that
/// a non-issue. A corrupt file is logged and treated as empty rather than
/// failing initialization.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open a file store at the given path, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateStoreError::BackendError {
                message: format!("failed to create state directory {parent:?}: {e}"),
            })?;
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "state file is corrupt ({e}), starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StateStoreError::BackendError {
                    message: format!("failed to read state file {path:?}: {e}"),
                });
            }
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<(), StateStoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents).map_err(|e| StateStoreError::BackendError {
            message: format!("failed to write state file {:?}: {e}", self.path),
        })
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("keys_count", &self.data.lock().len())
            .finish()
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        let mut data = self.data.lock();
        data.insert(key.to_string(), value.to_string());
        self.flush(&data)
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        let mut data = self.data.lock();
        if data.remove(key).is_some() {
            self.flush(&data)?;
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateStoreError> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("vellum/session/access_token", "tok").await.unwrap();
        drop(store);

        // A fresh handle reads what the first one wrote.
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened
                .get("vellum/session/access_token")
                .await
                .unwrap()
                .as_deref(),
            Some("tok")
        );
    }

    #[tokio::test]
    async fn test_file_store_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("key", "value").await.unwrap();
        store.delete("key").await.unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.get("anything").await.unwrap().is_none());

        // And the store is usable afterwards.
        store.set("key", "value").await.unwrap();
        assert!(store.exists("key").await.unwrap());
    }
}
