use super::types::{AuthResponse, RefreshResponse};
use crate::transport::Transport;
use crate::types::{ApiRequest, Method};
use crate::{Error, ErrorKind, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Credential exchange with the identity service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse>;

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse>;
}

/// JSON-over-HTTP backend.
///
/// Requests go straight to the transport, bypassing the client pipeline, so a
/// 401 from these endpoints never triggers a refresh.
pub struct HttpAuthBackend {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl HttpAuthBackend {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let req = ApiRequest::new(Method::Post, format!("{}{}", self.base_url, path))
            .with_header("Content-Type", "application/json")
            .with_body(body);
        let resp = self.transport.send(&req).await.map_err(into_auth_error)?;
        resp.json()
    }
}

/// Client errors from the identity service become [`Error::Auth`] with the
/// server's message; everything else passes through.
fn into_auth_error(err: Error) -> Error {
    let status = match err.status() {
        Some(status) if err.kind() == ErrorKind::Http && (400..500).contains(&status) => status,
        _ => return err,
    };
    Error::Auth {
        message: err.user_message(),
        status: Some(status),
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.post(LOGIN_PATH, json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse> {
        self.post(
            REGISTER_PATH,
            json!({ "email": email, "password": password, "name": name }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        self.post(REFRESH_PATH, json!({ "refreshToken": refresh_token }))
            .await
    }
}
