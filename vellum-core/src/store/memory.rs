//! In-memory state storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{StateStore, StateStoreError};

/// In-memory state store for testing and development.
///
/// Not persistent; data is lost when the process exits.
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys_count", &self.data.read().len())
            .finish()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateStoreError> {
        Ok(self
            .data
            .read()
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
    async fn test_memory_store_set_get() {
        let store = MemoryStore::new();

        store.set("test-key", "test-value").await.unwrap();
        let retrieved = store.get("test-key").await.unwrap();

        assert_eq!(retrieved.as_deref(), Some("test-value"));
    }

    #[tokio::test]
    async fn test_memory_store_get_nonexistent() {
        let store = MemoryStore::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = MemoryStore::new();

        store.set("test-key", "test-value").await.unwrap();
        store.delete("test-key").await.unwrap();
        store.delete("test-key").await.unwrap();

        assert!(store.get("test-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_keys() {
        let store = MemoryStore::new();

        store.set("vellum/session/access_token", "t").await.unwrap();
        store.set("vellum/session/expires_at", "0").await.unwrap();
        store.set("vellum/draft/data/abc", "{}").await.unwrap();

        let session_keys = store.list_keys("vellum/session/").await.unwrap();
        assert_eq!(session_keys.len(), 2);

        let all_keys = store.list_keys("vellum/").await.unwrap();
        assert_eq!(all_keys.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_store_exists() {
        let store = MemoryStore::new();

        assert!(!store.exists("test-key").await.unwrap());
        store.set("test-key", "v").await.unwrap();
        assert!(store.exists("test-key").await.unwrap());
    }
}
