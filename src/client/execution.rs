//! Request execution: one logical call through breaker, retry and auth replay.

use crate::auth::backend::{LOGIN_PATH, REFRESH_PATH, REGISTER_PATH};
use crate::resilience::{with_retry, RetryConfig};
use crate::types::{ApiRequest, ApiResponse, Method, RequestOptions};
use crate::Result;
use tracing::{debug, info};

use super::core::ApiClient;

fn is_auth_endpoint(url: &str) -> bool {
    [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH]
        .iter()
        .any(|path| url.contains(path))
}

impl ApiClient {
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: String,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let retry = match &options.retry {
            Some(overrides) => self.retry.merged(overrides),
            None => self.retry.clone(),
        };

        let mut base = ApiRequest::new(method, url).with_header("Accept", "application/json");
        if let Some(body) = options.body {
            base = base
                .with_header("Content-Type", "application/json")
                .with_body(body);
        }
        for (name, value) in options.headers {
            base.set_header(name, value);
        }

        let authorize = !options.skip_auth;
        match self.send_once(&base, &retry, authorize).await {
            Err(err)
                if authorize && err.is_unauthorized() && !is_auth_endpoint(&base.url) =>
            {
                info!(url = base.url.as_str(), "received 401, refreshing session");
                if self.session.refresh_session().await {
                    debug!(url = base.url.as_str(), "replaying request after refresh");
                    self.send_once(&base, &retry, true).await
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }

    /// Interceptors, breaker and retry around the transport, for one pass.
    async fn send_once(
        &self,
        base: &ApiRequest,
        retry: &RetryConfig,
        authorize: bool,
    ) -> Result<ApiResponse> {
        let mut req = base.clone();
        if authorize {
            if let Some(token) = self.session.bearer_token().await {
                req.set_header("Authorization", format!("Bearer {}", token));
            }
        }
        let req = self.interceptors.run_request(req);

        let outcome = self
            .breaker
            .execute(|| with_retry(|| self.attempt(&req), retry))
            .await;

        match outcome {
            Ok(resp) => Ok(self.interceptors.run_response(resp, &req)),
            Err(err) => {
                self.interceptors.run_error(&err, &req);
                Err(err)
            }
        }
    }

    async fn attempt(&self, req: &ApiRequest) -> Result<ApiResponse> {
        let result = self.transport.send(req).await;
        if let Err(err) = &result {
            if err.status() == Some(429) {
                self.rate_limit.record_throttle(err.retry_after());
            }
        }
        result
    }
}
