use crate::auth::{AuthBackend, HttpAuthBackend, NoopSessionObserver, SessionManager, SessionObserver};
use crate::client::core::ApiClient;
use crate::clock::{system_clock, Clock};
use crate::config::ClientConfig;
use crate::interceptors::{BreadcrumbLogger, ClientId, CorrelationId, InterceptorPipeline, RequestSigner};
use crate::resilience::{CircuitBreaker, Deduplicator, RateLimitTracker};
use crate::session_timeout::{SessionTimeout, SessionTimeoutMonitor};
use crate::storage::{KeyringStorage, SecureStorage};
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`ApiClient`].
///
/// Every collaborator has a production default; tests inject their own.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<dyn SecureStorage>>,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    observer: Option<Arc<dyn SessionObserver>>,
    clock: Option<Arc<dyn Clock>>,
    default_interceptors: bool,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            storage: None,
            auth_backend: None,
            observer: None,
            clock: None,
            default_interceptors: true,
        }
    }

    /// Default: [`HttpTransport`] built from the config.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Default: [`KeyringStorage`].
    pub fn storage(mut self, storage: Arc<dyn SecureStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Default: [`HttpAuthBackend`] over the client's transport.
    pub fn auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth_backend = Some(backend);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Skip the built-in correlation id, client id, signing and breadcrumb hooks.
    pub fn without_default_interceptors(mut self) -> Self {
        self.default_interceptors = false;
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(system_clock);
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(KeyringStorage::default()));
        let backend = self.auth_backend.unwrap_or_else(|| {
            Arc::new(HttpAuthBackend::new(
                Arc::clone(&transport),
                config.base_url.clone(),
            ))
        });
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(NoopSessionObserver));

        let session = SessionManager::new(
            backend,
            storage,
            observer,
            Arc::clone(&clock),
            config.session_config(),
        );

        let interceptors = InterceptorPipeline::new();
        if self.default_interceptors {
            interceptors.add_request(CorrelationId);
            interceptors.add_request(ClientId(config.client_id.clone()));
            if let Some(secret) = &config.signing_secret {
                interceptors.add_request(RequestSigner::with_clock(secret, Arc::clone(&clock)));
            }
            interceptors.add_response(BreadcrumbLogger);
        }

        let timeout_config = config.session_timeout_config();
        let session_timeout = timeout_config.enabled.then(|| {
            let monitor = Arc::new(SessionTimeoutMonitor::new(
                timeout_config.clone(),
                Arc::clone(&clock),
            ));
            SessionTimeout::new(monitor, session.clone())
        });

        debug!(
            base_url = config.base_url.as_str(),
            transport = transport.name(),
            signing = config.signing_secret.is_some(),
            idle_timeout = session_timeout.is_some(),
            "api client built"
        );

        Ok(ApiClient {
            breaker: Arc::new(CircuitBreaker::with_clock(
                config.circuit_breaker_config(),
                Arc::clone(&clock),
            )),
            rate_limit: Arc::new(RateLimitTracker::with_clock(
                config.default_retry_after(),
                Arc::clone(&clock),
            )),
            retry: config.retry_config(),
            dedup: Arc::new(Deduplicator::new()),
            interceptors: Arc::new(interceptors),
            transport,
            session,
            session_timeout,
            config: Arc::new(config),
        })
    }
}
