use super::Transport;
use crate::config::ClientConfig;
use crate::types::{ApiRequest, ApiResponse, Method};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::debug;

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // Pool knobs stay env-only to keep the config surface small.
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(
                env::var("APP_API_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("APP_API_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("APP_API_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| Error::network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    /// Only the `Retry-After: <seconds>` form is supported.
    pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
        let raw = Self::header_first(headers, &["retry-after"])?;
        let secs: u64 = raw.parse().ok()?;
        Some(secs.saturating_mul(1000))
    }

    fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
        headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect()
    }

    fn parse_body(raw: &str) -> serde_json::Value {
        if raw.trim().is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let mut builder = match req.method {
            Method::Get => self.client.get(&req.url),
            Method::Post => self.client.post(&req.url),
            Method::Put => self.client.put(&req.url),
            Method::Patch => self.client.patch(&req.url),
            Method::Delete => self.client.delete(&req.url),
        };
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let start = std::time::Instant::now();
        let resp = builder.send().await.map_err(Error::from)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(Error::from)?;

        debug!(
            method = req.method.as_str(),
            url = req.url.as_str(),
            http_status = status,
            duration_ms = start.elapsed().as_millis() as u64,
            "http exchange completed"
        );

        if !(200..300).contains(&status) {
            return Err(Error::Http {
                status,
                message: text,
                retry_after_ms: Self::retry_after_ms(&headers),
            });
        }

        Ok(ApiResponse {
            status,
            headers: Self::collect_headers(&headers),
            body: Self::parse_body(&text),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
