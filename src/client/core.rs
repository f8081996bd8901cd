use crate::auth::SessionManager;
use crate::client::signals::SignalsSnapshot;
use crate::config::ClientConfig;
use crate::interceptors::InterceptorPipeline;
use crate::resilience::{dedup_key, CircuitBreaker, Deduplicator, RateLimitTracker, RetryConfig};
use crate::session_timeout::SessionTimeout;
use crate::transport::Transport;
use crate::types::{ApiResponse, Method, RequestOptions};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Resilient API client.
///
/// Cheap to clone; clones share the same breaker, rate-limit window, dedup
/// registry, interceptors and session.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) interceptors: Arc<InterceptorPipeline>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) rate_limit: Arc<RateLimitTracker>,
    pub(crate) dedup: Arc<Deduplicator<ApiResponse>>,
    pub(crate) retry: RetryConfig,
    pub(crate) session: SessionManager,
    pub(crate) session_timeout: Option<SessionTimeout>,
}

impl ApiClient {
    /// Create a new builder.
    pub fn builder(config: ClientConfig) -> crate::client::ApiClientBuilder {
        crate::client::ApiClientBuilder::new(config)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::Get, path, RequestOptions::new()).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::Post, path, RequestOptions::new().body(body))
            .await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::Put, path, RequestOptions::new().body(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.request(Method::Patch, path, RequestOptions::new().body(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(Method::Delete, path, RequestOptions::new())
            .await
    }

    /// Issue a request through the full pipeline.
    ///
    /// Identical requests (same method, URL and body) issued while one is in
    /// flight share its outcome unless `options.skip_dedup` is set.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let url = self.resolve_url(path);
        if let Some(timeout) = &self.session_timeout {
            timeout.extend();
        }

        if options.skip_dedup {
            return self.execute(method, url, options).await;
        }

        let key = dedup_key(method.as_str(), &url, options.body.as_ref());
        let this = self.clone();
        self.dedup
            .deduplicate(&key, move || async move {
                this.execute(method, url, options).await
            })
            .await
    }

    /// Absolute URLs pass through; anything else is joined onto `base_url`.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Restore the persisted session and start the proactive refresh task.
    ///
    /// Idle monitoring starts on its own once a session is established.
    pub async fn initialize(&self) {
        let status = self.session.initialize().await;
        self.session.start_auto_refresh();
        debug!(status = ?status, "api client initialized");
    }

    pub fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            inflight: self.dedup.inflight_count(),
            circuit_breaker: self.breaker.snapshot(),
            rate_limit: self.rate_limit.state(),
            session: self.session.status(),
            idle_remaining_secs: self
                .session_timeout
                .as_ref()
                .map(|t| t.remaining_seconds()),
        }
    }

    /// Stop background tasks. In-flight calls still complete for their callers.
    pub fn shutdown(&self) {
        self.session.stop_auto_refresh();
        if let Some(timeout) = &self.session_timeout {
            timeout.monitor().stop_monitoring();
        }
        self.dedup.clear();
        debug!("api client shut down");
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_timeout(&self) -> Option<&SessionTimeout> {
        self.session_timeout.as_ref()
    }

    pub fn interceptors(&self) -> &InterceptorPipeline {
        &self.interceptors
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limit(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limit
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }
}
