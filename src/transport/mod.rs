//! Transport abstraction: one HTTP exchange per call.
//!
//! A transport returns `Ok(ApiResponse)` for 2xx responses. Any other status is
//! returned as [`crate::Error::Http`] carrying the status, the raw body and the
//! parsed `Retry-After`; failures that never produced a status are
//! [`crate::Error::Network`].

pub mod http;

use crate::types::{ApiRequest, ApiResponse};
use crate::Result;
use async_trait::async_trait;

pub use http::HttpTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse>;

    fn name(&self) -> &'static str {
        "transport"
    }
}
