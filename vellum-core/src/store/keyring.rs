//! OS keyring-backed state storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{StateStore, StateStoreError};

/// OS keyring-backed state store.
///
/// Uses the platform's native keyring service (Keychain, Secret Service,
/// Credential Manager). Intended for the credential slice of the persisted
/// state; keyrings cannot enumerate entries, so [`list_keys`] is
/// unsupported and the draft bookkeeping should live in a [`super::FileStore`].
///
/// [`list_keys`]: StateStore::list_keys
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this
    /// platform.
    pub fn try_new(service_name: &str) -> Result<Self, StateStoreError> {
        let test_key = format!("{service_name}/__test__");
        match Entry::new(&test_key, "availability_check") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StateStoreError::KeyringUnavailable {
                message: format!("keyring backend not available: {e}"),
            }),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StateStoreError> {
        let service = format!("{}/{}", self.service_name, key);
        Entry::new(&service, "vellum").map_err(|e| StateStoreError::BackendError {
            message: format!("failed to create keyring entry: {e}"),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl StateStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StateStoreError::BackendError {
                message: format!("keyring error for key {key}: {e}"),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| StateStoreError::BackendError {
                message: format!("failed to set keyring value: {e}"),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StateStoreError::BackendError {
                message: format!("failed to delete keyring entry: {e}"),
            }),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StateStoreError> {
        // Platform keyrings have no native enumeration.
        Err(StateStoreError::BackendError {
            message: format!("list_keys not supported by keyring backend (requested prefix: {prefix})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_store_creation() {
        match KeyringStore::try_new("vellum-test") {
            Ok(store) => assert_eq!(store.service_name, "vellum-test"),
            // Expected on platforms without keyring support.
            Err(StateStoreError::KeyringUnavailable { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
