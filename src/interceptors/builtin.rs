//! Built-in interceptors: correlation id, client id, request signing and breadcrumbs.

use super::{RequestInterceptor, ResponseInterceptor};
use crate::clock::{Clock, SystemClock};
use crate::types::{ApiRequest, ApiResponse};
use crate::Error;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";
pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

/// Attaches a fresh UUID v4 correlation id to every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationId;

impl RequestInterceptor for CorrelationId {
    fn on_request(&self, mut req: ApiRequest) -> ApiRequest {
        req.set_header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string());
        req
    }
}

/// Attaches the configured client identifier.
#[derive(Debug, Clone)]
pub struct ClientId(pub String);

impl RequestInterceptor for ClientId {
    fn on_request(&self, mut req: ApiRequest) -> ApiRequest {
        req.set_header(CLIENT_ID_HEADER, self.0.clone());
        req
    }
}

/// HMAC-SHA256 request signing over `method + url + body + timestamp`.
pub struct RequestSigner {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl RequestSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            clock,
        }
    }

    /// Base64 signature for a request at `timestamp` (epoch ms).
    pub fn sign(&self, req: &ApiRequest, timestamp: i64) -> String {
        let payload = format!(
            "{}{}{}{}",
            req.method.as_str(),
            req.url,
            req.body_string(),
            timestamp
        );
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(payload.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl RequestInterceptor for RequestSigner {
    fn on_request(&self, mut req: ApiRequest) -> ApiRequest {
        let timestamp = self.clock.now_ms();
        let signature = self.sign(&req, timestamp);
        req.set_header(TIMESTAMP_HEADER, timestamp.to_string());
        req.set_header(SIGNATURE_HEADER, signature);
        req
    }
}

/// Logs method, url and status of every exchange as a breadcrumb.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadcrumbLogger;

impl ResponseInterceptor for BreadcrumbLogger {
    fn on_response(&self, resp: ApiResponse, req: &ApiRequest) -> ApiResponse {
        crate::breadcrumb!(
            "http",
            "response received",
            method = req.method.as_str(),
            url = req.url.as_str(),
            status = resp.status
        );
        resp
    }

    fn on_error(&self, err: &Error, req: &ApiRequest) {
        crate::breadcrumb!(
            "http",
            "request failed",
            method = req.method.as_str(),
            url = req.url.as_str(),
            status = err.status(),
            error = %err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::Method;

    #[test]
    fn test_correlation_id_is_fresh_per_request() {
        let a = CorrelationId.on_request(ApiRequest::new(Method::Get, "/x"));
        let b = CorrelationId.on_request(ApiRequest::new(Method::Get, "/x"));
        let ida = a.header(CORRELATION_ID_HEADER).unwrap();
        let idb = b.header(CORRELATION_ID_HEADER).unwrap();
        assert_ne!(ida, idb);
        assert!(Uuid::parse_str(ida).is_ok());
    }

    #[test]
    fn test_client_id() {
        let req = ClientId("mobile/1.0".into()).on_request(ApiRequest::new(Method::Get, "/x"));
        assert_eq!(req.header("x-client-id"), Some("mobile/1.0"));
    }

    #[test]
    fn test_signature_is_deterministic_for_fixed_time() {
        let clock = ManualClock::new(1_700_000_000_000);
        let signer = RequestSigner::with_clock("secret", Arc::new(clock.clone()));
        let req = ApiRequest::new(Method::Post, "https://api.example.com/orders")
            .with_body(serde_json::json!({"qty": 2}));

        let a = signer.on_request(req.clone());
        let b = signer.on_request(req.clone());
        assert_eq!(a.header(SIGNATURE_HEADER), b.header(SIGNATURE_HEADER));
        assert_eq!(a.header(TIMESTAMP_HEADER), Some("1700000000000"));

        clock.advance(std::time::Duration::from_millis(1));
        let c = signer.on_request(req);
        assert_ne!(a.header(SIGNATURE_HEADER), c.header(SIGNATURE_HEADER));
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let req = ApiRequest::new(Method::Post, "/o").with_body(serde_json::json!(1));
        let s1 = RequestSigner::new("one").sign(&req, 5);
        let s2 = RequestSigner::new("two").sign(&req, 5);
        assert_ne!(s1, s2);
        let other = req.clone().with_body(serde_json::json!(2));
        assert_ne!(s1, RequestSigner::new("one").sign(&other, 5));
    }

    #[test]
    fn test_breadcrumb_passes_response_through() {
        let req = ApiRequest::new(Method::Get, "/x");
        let resp = BreadcrumbLogger.on_response(ApiResponse::ok(serde_json::json!({"a": 1})), &req);
        assert_eq!(resp.status, 200);
        BreadcrumbLogger.on_error(&Error::http(500, "boom"), &req);
    }
}
