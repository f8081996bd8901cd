//! Shared fixtures for integration tests: a scripted transport, a fake auth
//! backend and a client harness wired with virtual time.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_api::auth::{
    AuthBackend, AuthResponse, AuthenticatedUser, RecordingSessionObserver, RefreshResponse,
};
use resilient_api::clock::ManualClock;
use resilient_api::storage::MemoryStorage;
use resilient_api::transport::Transport;
use resilient_api::{ApiClient, ApiRequest, ApiResponse, ClientConfig, Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const T0: i64 = 1_700_000_000_000;

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync>;

/// Transport that answers from a queue, then from a responder closure.
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<ApiResponse>>>,
    responder: Responder,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new(responder: impl Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Replies from `script` in order, then `200 {"ok": true}`.
    pub fn sequence(script: Vec<Result<ApiResponse>>) -> Self {
        let t = Self::ok();
        t.queue.lock().unwrap().extend(script);
        t
    }

    pub fn ok() -> Self {
        Self::new(|_| Ok(ApiResponse::ok(serde_json::json!({"ok": true}))))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(req.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.queue.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => (self.responder)(req),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn http_error(status: u16) -> Error {
    Error::http(status, format!(r#"{{"message":"status {}"}}"#, status))
}

pub fn user() -> AuthenticatedUser {
    AuthenticatedUser {
        id: "u1".into(),
        email: "ada@example.com".into(),
        name: "Ada".into(),
        avatar: None,
        created_at: None,
        updated_at: None,
    }
}

/// Issues `access-1` on sign-in and `access-refreshed-N` on the Nth refresh.
#[derive(Default)]
pub struct FakeAuthBackend {
    pub refreshes: AtomicUsize,
    pub fail_refresh: bool,
    pub expires_in: u64,
}

impl FakeAuthBackend {
    pub fn new() -> Self {
        Self {
            expires_in: 3600,
            ..Default::default()
        }
    }

    pub fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::new()
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for FakeAuthBackend {
    async fn sign_in(&self, _email: &str, password: &str) -> Result<AuthResponse> {
        if password != "secret" {
            return Err(Error::Auth {
                message: "Invalid credentials".into(),
                status: Some(401),
            });
        }
        Ok(AuthResponse {
            user: user(),
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_in: self.expires_in,
        })
    }

    async fn sign_up(&self, email: &str, password: &str, _name: &str) -> Result<AuthResponse> {
        self.sign_in(email, password).await
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_refresh {
            return Err(Error::Auth {
                message: "refresh token revoked".into(),
                status: Some(401),
            });
        }
        Ok(RefreshResponse {
            access_token: format!("access-refreshed-{}", n),
            refresh_token: Some(format!("refresh-{}", n + 1)),
            expires_in: self.expires_in,
        })
    }
}

pub struct Harness {
    pub client: ApiClient,
    pub transport: Arc<ScriptedTransport>,
    pub backend: Arc<FakeAuthBackend>,
    pub storage: Arc<MemoryStorage>,
    pub observer: Arc<RecordingSessionObserver>,
    pub clock: ManualClock,
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.base_url = "https://api.test/v1".to_string();
    config.client_id = "tests/1.0".to_string();
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.retry.jitter = false;
    config.circuit_breaker.threshold = 3;
    config.circuit_breaker.reset_timeout_ms = 1_000;
    config
}

pub fn harness(transport: ScriptedTransport) -> Harness {
    harness_with(transport, FakeAuthBackend::new(), |_| {})
}

pub fn harness_with(
    transport: ScriptedTransport,
    backend: FakeAuthBackend,
    configure: impl FnOnce(&mut ClientConfig),
) -> Harness {
    let mut config = test_config();
    configure(&mut config);

    let transport = Arc::new(transport);
    let backend = Arc::new(backend);
    let storage = Arc::new(MemoryStorage::new());
    let observer = Arc::new(RecordingSessionObserver::new());
    let clock = ManualClock::new(T0);

    let client = ApiClient::builder(config)
        .transport(transport.clone())
        .auth_backend(backend.clone())
        .storage(storage.clone())
        .observer(observer.clone())
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("test client builds");

    Harness {
        client,
        transport,
        backend,
        storage,
        observer,
        clock,
    }
}
