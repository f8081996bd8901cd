//! Secure key/value storage for session material.
//!
//! All operations are async and fallible. Callers in the session layer treat
//! failures as "no data" and log them; only the trait methods themselves
//! surface [`crate::Error::Storage`].

mod keychain;
mod memory;

use crate::Result;
use async_trait::async_trait;

pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;

#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
