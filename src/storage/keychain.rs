use super::SecureStorage;
use crate::error::ErrorContext;
use crate::{Error, Result};
use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

pub const DEFAULT_SERVICE: &str = "resilient-api";

/// Platform credential store (Keychain, Credential Manager, kernel keyutils).
///
/// Every storage key maps to one keyring entry under a fixed service name.
/// Keyring calls block, so they run on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let owned_key = key.to_string();
        let joined = tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &owned_key)?;
            op(entry)
        })
        .await
        .map_err(|e| {
            Error::storage_with_context(
                format!("keyring task failed: {}", e),
                ErrorContext::new()
                    .with_source("keyring_storage")
                    .with_field_path(key),
            )
        })?;
        joined.map_err(|e| {
            Error::storage_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_source("keyring_storage")
                    .with_field_path(key),
            )
        })
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!(service = %self.service, key, "reading keyring entry");
        self.blocking(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!(service = %self.service, key, "writing keyring entry");
        let value = value.to_string();
        self.blocking(key, move |entry| entry.set_password(&value))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(service = %self.service, key, "deleting keyring entry");
        self.blocking(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
