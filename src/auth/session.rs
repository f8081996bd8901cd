use super::backend::AuthBackend;
use super::observer::{NotificationLevel, SessionObserver};
use super::token::{self, TOKENS_KEY, USER_KEY};
use super::types::{AuthResponse, AuthTokens, AuthenticatedUser, UserUpdate};
use crate::clock::Clock;
use crate::storage::SecureStorage;
use crate::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NoSession,
    Loading,
    Authenticated,
    Refreshing,
}

/// Session lifecycle transitions other components can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was established by sign-in, sign-up or restore.
    Started,
    /// The session was cleared by sign-out or expiry.
    Ended,
}

pub type SessionListener = Arc<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Proactive refresh kicks in when tokens expire within this window.
    pub refresh_threshold: Duration,
    pub refresh_check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(5 * 60),
            refresh_check_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    tokens: Option<AuthTokens>,
    user: Option<AuthenticatedUser>,
    /// Bumped on every sign-in and sign-out. A refresh that started under an
    /// older epoch must not resurrect the session.
    epoch: u64,
}

type SharedRefresh = Shared<BoxFuture<'static, bool>>;

/// The in-flight refresh and the session epoch it was started under.
struct RefreshSlot {
    epoch: u64,
    id: u64,
    call: SharedRefresh,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn SecureStorage>,
    observer: Arc<dyn SessionObserver>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    refresh_inflight: Mutex<Option<RefreshSlot>>,
    next_refresh_id: AtomicU64,
    listeners: Mutex<Vec<SessionListener>>,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .auto_refresh
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Session and token lifecycle: sign-in/up/out, single-flight refresh and
/// the proactive refresh task.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn SecureStorage>,
        observer: Arc<dyn SessionObserver>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                observer,
                clock,
                config,
                state: Mutex::new(SessionState {
                    status: SessionStatus::NoSession,
                    tokens: None,
                    user: None,
                    epoch: 0,
                }),
                refresh_inflight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                auto_refresh: Mutex::new(None),
            }),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    /// Register a listener for [`SessionEvent`]s. Listeners run on the task
    /// that caused the transition, with no session lock held.
    pub fn on_session_event(&self, listener: impl Fn(SessionEvent) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::new(listener));
    }

    fn emit(&self, event: SessionEvent) {
        let listeners: Vec<SessionListener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Restore a persisted session.
    ///
    /// Valid tokens and a stored user yield `Authenticated`; expired tokens are
    /// refreshed first. Missing data, storage errors or a failed refresh leave
    /// the manager in `NoSession`.
    pub async fn initialize(&self) -> SessionStatus {
        self.lock_state().status = SessionStatus::Loading;

        let storage = self.inner.storage.as_ref();
        let tokens = token::load_tokens(storage).await;
        let user = token::load_user(storage).await;

        let (tokens, user) = match (tokens, user) {
            (Some(tokens), Some(user)) => (tokens, user),
            _ => {
                debug!("no persisted session");
                self.lock_state().status = SessionStatus::NoSession;
                return SessionStatus::NoSession;
            }
        };

        let expired = tokens.is_expired(self.now_ms());
        {
            let mut state = self.lock_state();
            state.tokens = Some(tokens);
            state.user = Some(user);
            state.status = SessionStatus::Authenticated;
        }

        if expired {
            info!("persisted session expired, refreshing");
            if !self.refresh_session().await {
                let mut state = self.lock_state();
                state.status = SessionStatus::NoSession;
                state.tokens = None;
                state.user = None;
            }
        }

        let status = self.status();
        crate::breadcrumb!("auth", "session initialized", status = ?status);
        if status == SessionStatus::Authenticated {
            self.emit(SessionEvent::Started);
        }
        status
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthenticatedUser> {
        let previous = self.begin_loading();
        let outcome = self.inner.backend.sign_in(email, password).await;
        self.complete_exchange(outcome, previous, "Signed in successfully", "sign in")
            .await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthenticatedUser> {
        let previous = self.begin_loading();
        let outcome = self.inner.backend.sign_up(email, password, name).await;
        self.complete_exchange(outcome, previous, "Account created successfully", "sign up")
            .await
    }

    fn begin_loading(&self) -> SessionStatus {
        let mut state = self.lock_state();
        let previous = state.status;
        state.status = SessionStatus::Loading;
        previous
    }

    async fn complete_exchange(
        &self,
        outcome: Result<AuthResponse>,
        previous: SessionStatus,
        success_message: &str,
        action: &str,
    ) -> Result<AuthenticatedUser> {
        let resp = match outcome {
            Ok(resp) => resp,
            Err(e) => {
                self.lock_state().status = previous;
                warn!(action, error = %e, "authentication failed");
                self.inner
                    .observer
                    .notify(NotificationLevel::Error, &e.user_message());
                return Err(e);
            }
        };

        let tokens = AuthTokens::issued(
            resp.access_token,
            resp.refresh_token,
            resp.expires_in,
            self.now_ms(),
        );
        let user = resp.user;

        self.persist(TOKENS_KEY, &tokens).await;
        self.persist(USER_KEY, &user).await;

        {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.tokens = Some(tokens);
            state.user = Some(user.clone());
            state.status = SessionStatus::Authenticated;
        }

        crate::breadcrumb!("auth", "signed in", action, user_id = user.id.as_str());
        self.emit(SessionEvent::Started);
        self.inner
            .observer
            .notify(NotificationLevel::Success, success_message);
        Ok(user)
    }

    /// Clear the session everywhere. Never fails.
    pub async fn sign_out(&self) {
        self.clear_session().await;
        crate::breadcrumb!("auth", "signed out");
        self.inner.observer.navigate_to_login();
        self.inner
            .observer
            .notify(NotificationLevel::Info, "Signed out");
    }

    async fn clear_session(&self) {
        {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.tokens = None;
            state.user = None;
            state.status = SessionStatus::NoSession;
        }
        self.emit(SessionEvent::Ended);
        for key in [TOKENS_KEY, USER_KEY] {
            if let Err(e) = self.inner.storage.delete(key).await {
                warn!(key, error = %e, "failed to clear secure storage");
            }
        }
    }

    async fn expire_session(&self) {
        self.clear_session().await;
        crate::breadcrumb!("auth", "session expired");
        self.inner.observer.navigate_to_login();
        self.inner.observer.notify(
            NotificationLevel::Warning,
            "Your session has expired. Please sign in again.",
        );
    }

    /// Exchange the refresh token for new tokens.
    ///
    /// Concurrent callers within one session share one exchange and all
    /// observe its outcome; an exchange left over from an earlier session is
    /// not joined. Returns `false` without a refresh token. A failed exchange
    /// expires the session (sign-out plus login redirect) and returns `false`.
    pub async fn refresh_session(&self) -> bool {
        let call = {
            let mut slot = self
                .inner
                .refresh_inflight
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            let (refresh_token, epoch) = {
                let state = self.lock_state();
                match state.tokens.as_ref() {
                    Some(t) => (t.refresh_token.clone(), state.epoch),
                    None => return false,
                }
            };
            match slot.as_ref() {
                Some(current) if current.epoch == epoch => current.call.clone(),
                _ => {
                    let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
                    let this = self.clone();
                    let task = tokio::spawn(async move {
                        let ok = this.exchange_refresh(refresh_token, epoch).await;
                        let mut slot = this
                            .inner
                            .refresh_inflight
                            .lock()
                            .unwrap_or_else(|p| p.into_inner());
                        if slot.as_ref().map(|s| s.id) == Some(id) {
                            slot.take();
                        }
                        ok
                    });
                    let call = async move { task.await.unwrap_or(false) }.boxed().shared();
                    *slot = Some(RefreshSlot {
                        epoch,
                        id,
                        call: call.clone(),
                    });
                    call
                }
            }
        };
        call.await
    }

    async fn exchange_refresh(&self, refresh_token: String, epoch: u64) -> bool {
        {
            let mut state = self.lock_state();
            if state.epoch == epoch && state.status == SessionStatus::Authenticated {
                state.status = SessionStatus::Refreshing;
            }
        }

        match self.inner.backend.refresh(&refresh_token).await {
            Ok(resp) => {
                let tokens = AuthTokens::issued(
                    resp.access_token,
                    resp.refresh_token.unwrap_or(refresh_token),
                    resp.expires_in,
                    self.now_ms(),
                );
                {
                    let mut state = self.lock_state();
                    if state.epoch != epoch {
                        debug!("session changed during refresh, discarding tokens");
                        return false;
                    }
                    state.tokens = Some(tokens.clone());
                    state.status = SessionStatus::Authenticated;
                }
                self.persist(TOKENS_KEY, &tokens).await;
                info!(expires_at = tokens.expires_at, "session refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                if self.lock_state().epoch == epoch {
                    self.expire_session().await;
                }
                false
            }
        }
    }

    /// Shallow-merge `update` into the current user and persist it. Returns
    /// `None` when there is no user.
    pub async fn update_user(&self, update: UserUpdate) -> Option<AuthenticatedUser> {
        let user = {
            let mut state = self.lock_state();
            let user = state.user.as_mut()?;
            user.merge(update);
            user.clone()
        };
        self.persist(USER_KEY, &user).await;
        Some(user)
    }

    async fn persist<T: serde::Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to encode session value");
                return;
            }
        };
        if let Err(e) = self.inner.storage.set(key, &raw).await {
            warn!(key, error = %e, "failed to persist session value");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock_state()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    /// Token for the `Authorization` header: the in-memory token, falling back
    /// to whatever is persisted.
    pub async fn bearer_token(&self) -> Option<String> {
        if let Some(token) = self.access_token() {
            return Some(token);
        }
        token::get_auth_token(self.inner.storage.as_ref(), self.inner.clock.as_ref()).await
    }

    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.lock_state().user.clone()
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.lock_state().tokens.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.lock_state();
        state.user.is_some()
            && matches!(
                state.status,
                SessionStatus::Authenticated | SessionStatus::Refreshing
            )
    }

    pub fn is_loading(&self) -> bool {
        self.status() == SessionStatus::Loading
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .refresh_inflight
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Refresh now if the tokens expire within the configured threshold.
    /// Returns whether a refresh was attempted and succeeded.
    pub async fn refresh_if_expiring(&self) -> bool {
        let due = self
            .tokens()
            .map(|t| t.is_expiring_soon(self.now_ms(), self.inner.config.refresh_threshold))
            .unwrap_or(false);
        if !due {
            return false;
        }
        debug!("tokens expiring soon, refreshing proactively");
        self.refresh_session().await
    }

    /// Spawn the proactive refresh loop. Idempotent while the loop is running.
    pub fn start_auto_refresh(&self) {
        let mut slot = self
            .inner
            .auto_refresh
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.refresh_check_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { inner };
                let refreshed = manager.refresh_if_expiring().await;
                debug!(refreshed, status = ?manager.status(), "auto refresh check");
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "auto refresh started");
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self
            .inner
            .auto_refresh
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
            debug!("auto refresh stopped");
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .auto_refresh
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn storage(&self) -> Arc<dyn SecureStorage> {
        Arc::clone(&self.inner.storage)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }
}
