//! Idle-session timeout.
//!
//! Distinct from token expiry: the session is considered idle once no
//! activity has been recorded with [`SessionTimeoutMonitor::touch`] for
//! `timeout`. A warning fires `warning_before` ahead of that, once per idle
//! period; expiry fires once and stops the monitor.

use crate::auth::{SessionEvent, SessionManager};
use crate::clock::{duration_ms, Clock};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimeoutConfig {
    pub enabled: bool,
    pub timeout: Duration,
    pub warning_before: Duration,
}

impl Default for SessionTimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(30 * 60),
            warning_before: Duration::from_secs(2 * 60),
        }
    }
}

/// Result of one evaluation of the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    Idle,
    Warning,
    Expired,
}

pub type TimeoutListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct IdleState {
    last_activity: i64,
    warning_emitted: bool,
    expired_emitted: bool,
}

pub struct SessionTimeoutMonitor {
    config: SessionTimeoutConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<IdleState>,
    warning_listeners: Mutex<Vec<TimeoutListener>>,
    expired_listeners: Mutex<Vec<TimeoutListener>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionTimeoutMonitor {
    pub fn new(config: SessionTimeoutConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            config,
            clock,
            state: Mutex::new(IdleState {
                last_activity: now,
                warning_emitted: false,
                expired_emitted: false,
            }),
            warning_listeners: Mutex::new(Vec::new()),
            expired_listeners: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionTimeoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn on_warning(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.warning_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::new(listener));
    }

    pub fn on_expired(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.expired_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::new(listener));
    }

    /// Record activity and start a new idle period.
    pub fn touch(&self) {
        if !self.config.enabled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.last_activity = self.clock.now_ms();
        state.warning_emitted = false;
        state.expired_emitted = false;
    }

    fn idle_ms(&self) -> i64 {
        let last = self
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last_activity;
        self.clock.now_ms().saturating_sub(last)
    }

    pub fn is_expired(&self) -> bool {
        self.config.enabled && self.idle_ms() >= duration_ms(self.config.timeout)
    }

    /// True only inside `[timeout - warning_before, timeout)`.
    pub fn is_warning(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let idle = self.idle_ms();
        let timeout = duration_ms(self.config.timeout);
        let warn_at = timeout.saturating_sub(duration_ms(self.config.warning_before));
        idle >= warn_at && idle < timeout
    }

    /// Whole seconds left before expiry, rounded up. Zero when disabled or expired.
    pub fn remaining_seconds(&self) -> u64 {
        if !self.config.enabled {
            return 0;
        }
        let left = duration_ms(self.config.timeout).saturating_sub(self.idle_ms());
        if left <= 0 {
            0
        } else {
            (left as u64).div_ceil(1000)
        }
    }

    /// Evaluate the timer once and fire listeners for newly reached states.
    pub fn tick(&self) -> TimeoutEvent {
        if !self.config.enabled {
            return TimeoutEvent::Idle;
        }
        let expired = self.is_expired();
        let warning = !expired && self.is_warning();

        let event = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if expired && !state.expired_emitted {
                state.expired_emitted = true;
                Some(TimeoutEvent::Expired)
            } else if warning && !state.warning_emitted {
                state.warning_emitted = true;
                Some(TimeoutEvent::Warning)
            } else {
                None
            }
        };

        match event {
            Some(TimeoutEvent::Expired) => {
                info!("session idle timeout reached");
                crate::breadcrumb!("session", "idle timeout expired");
                self.fire(&self.expired_listeners);
                TimeoutEvent::Expired
            }
            Some(TimeoutEvent::Warning) => {
                debug!(
                    remaining_secs = self.remaining_seconds(),
                    "session idle warning"
                );
                self.fire(&self.warning_listeners);
                TimeoutEvent::Warning
            }
            _ if expired => TimeoutEvent::Expired,
            _ if warning => TimeoutEvent::Warning,
            _ => TimeoutEvent::Idle,
        }
    }

    fn fire(&self, listeners: &Mutex<Vec<TimeoutListener>>) {
        let snapshot: Vec<TimeoutListener> = listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for listener in snapshot {
            listener();
        }
    }

    /// Poll once per second until expiry. Idempotent; a no-op when disabled.
    pub fn start_monitoring(self: &Arc<Self>) {
        if !self.config.enabled {
            return;
        }
        let mut slot = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                if monitor.tick() == TimeoutEvent::Expired {
                    debug!("session monitor stopped after expiry");
                    break;
                }
            }
        }));
        debug!(
            timeout_ms = self.config.timeout.as_millis() as u64,
            "session monitor started"
        );
    }

    /// Safe to call when not monitoring.
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for SessionTimeoutMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Idle-timeout surface bound to a session: expiry signs the user out.
///
/// Monitoring follows the session: it starts with a fresh idle period
/// whenever a session is established and stops when the session ends.
#[derive(Clone)]
pub struct SessionTimeout {
    monitor: Arc<SessionTimeoutMonitor>,
    session: SessionManager,
}

impl SessionTimeout {
    pub fn new(monitor: Arc<SessionTimeoutMonitor>, session: SessionManager) -> Self {
        let on_expiry = session.clone();
        monitor.on_expired(move || {
            let session = on_expiry.clone();
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(async move { session.sign_out().await });
            }
        });

        let tracked = Arc::downgrade(&monitor);
        session.on_session_event(move |event| {
            let Some(monitor) = tracked.upgrade() else {
                return;
            };
            match event {
                SessionEvent::Started => {
                    monitor.touch();
                    monitor.start_monitoring();
                }
                SessionEvent::Ended => monitor.stop_monitoring(),
            }
        });
        Self { monitor, session }
    }

    pub fn monitor(&self) -> &Arc<SessionTimeoutMonitor> {
        &self.monitor
    }

    pub fn is_warning(&self) -> bool {
        self.monitor.is_warning()
    }

    pub fn is_expired(&self) -> bool {
        self.monitor.is_expired()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.monitor.remaining_seconds()
    }

    /// Treat "stay signed in" as activity.
    pub fn extend(&self) {
        self.monitor.touch();
    }

    pub async fn logout(&self) {
        self.monitor.stop_monitoring();
        self.session.sign_out().await;
    }
}
