//! UI side effects of session transitions.

use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Receives user-visible notifications and login redirects.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);

    fn navigate_to_login(&self);
}

/// Logs and discards everything. Default for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionObserver;

impl SessionObserver for NoopSessionObserver {
    fn notify(&self, level: NotificationLevel, message: &str) {
        debug!(?level, message, "session notification");
    }

    fn navigate_to_login(&self) {
        debug!("navigate to login");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Notification(NotificationLevel, String),
    NavigateToLogin,
}

/// Records every call in order.
#[derive(Debug, Default)]
pub struct RecordingSessionObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingSessionObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn notifications(&self) -> Vec<(NotificationLevel, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Notification(level, msg) => Some((level, msg)),
                ObservedEvent::NavigateToLogin => None,
            })
            .collect()
    }

    pub fn login_redirects(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ObservedEvent::NavigateToLogin))
            .count()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

impl SessionObserver for RecordingSessionObserver {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.push(ObservedEvent::Notification(level, message.to_string()));
    }

    fn navigate_to_login(&self) {
        self.push(ObservedEvent::NavigateToLogin);
    }
}
