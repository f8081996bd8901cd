use super::types::{AuthTokens, AuthenticatedUser};
use crate::clock::Clock;
use crate::storage::SecureStorage;
use serde::de::DeserializeOwned;
use tracing::warn;

pub const TOKENS_KEY: &str = "auth_tokens";
pub const USER_KEY: &str = "auth_user";

/// Read and decode a JSON value from storage. Storage or decode failures are
/// logged and read as "nothing stored".
pub(crate) async fn load_json<T: DeserializeOwned>(
    storage: &dyn SecureStorage,
    key: &str,
) -> Option<T> {
    let raw = match storage.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key, error = %e, "failed to read from secure storage");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "discarding undecodable stored value");
            None
        }
    }
}

pub(crate) async fn load_tokens(storage: &dyn SecureStorage) -> Option<AuthTokens> {
    load_json(storage, TOKENS_KEY).await
}

pub(crate) async fn load_user(storage: &dyn SecureStorage) -> Option<AuthenticatedUser> {
    load_json(storage, USER_KEY).await
}

/// Persisted access token, read straight from storage.
///
/// An expired token is still returned (with a warning); the server's 401 then
/// drives the refresh path. Returns `None` when nothing is stored or storage
/// fails.
pub async fn get_auth_token(storage: &dyn SecureStorage, clock: &dyn Clock) -> Option<String> {
    let tokens = load_tokens(storage).await?;
    let now = clock.now_ms();
    if tokens.is_expired(now) {
        warn!(
            expired_for_ms = now - tokens.expires_at,
            "stored access token has expired"
        );
    }
    Some(tokens.access_token)
}
