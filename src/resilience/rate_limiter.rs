use crate::clock::{duration_ms, Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What consumers poll: whether the server is throttling us and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitState {
    pub is_rate_limited: bool,
    /// Whole seconds until the window ends (0 when not limited).
    pub retry_after_secs: u64,
    /// Epoch ms at which the window ends (0 = never limited).
    pub reset_time: i64,
}

/// Records the server-signalled throttling window.
///
/// A 429 sets `rate_limited_until = now + retry_after`; everything else only reads it.
pub struct RateLimitTracker {
    clock: Arc<dyn Clock>,
    /// Epoch ms at which the current window ends. Watchers subscribe to it.
    window: watch::Sender<i64>,
    default_retry_after: Duration,
}

impl RateLimitTracker {
    pub fn new(default_retry_after: Duration) -> Self {
        Self::with_clock(default_retry_after, Arc::new(SystemClock))
    }

    pub fn with_clock(default_retry_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window: watch::channel(0).0,
            default_retry_after,
        }
    }

    /// Record a throttling response. `None` applies the default window.
    pub fn record_throttle(&self, retry_after: Option<Duration>) {
        let after = retry_after.unwrap_or(self.default_retry_after);
        let until = self.clock.now_ms().saturating_add(duration_ms(after));
        self.window.send_replace(until);
        warn!(
            retry_after_ms = after.as_millis() as u64,
            "server signalled rate limiting"
        );
    }

    pub fn rate_limited_until(&self) -> i64 {
        *self.window.borrow()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.clock.now_ms() < self.rate_limited_until()
    }

    pub fn retry_after_secs(&self) -> u64 {
        let remaining = self.rate_limited_until() - self.clock.now_ms();
        if remaining <= 0 {
            0
        } else {
            ((remaining + 999) / 1000) as u64
        }
    }

    pub fn reset_time(&self) -> i64 {
        self.rate_limited_until()
    }

    pub fn state(&self) -> RateLimitState {
        RateLimitState {
            is_rate_limited: self.is_rate_limited(),
            retry_after_secs: self.retry_after_secs(),
            reset_time: self.reset_time(),
        }
    }

    pub fn clear(&self) {
        self.window.send_replace(0);
    }

    /// Start a poller publishing [`RateLimitState`] once per second while limited.
    ///
    /// The poller idles once the window elapses and resumes on the next throttle.
    /// Dropping the returned handle stops it.
    pub fn watch(self: &Arc<Self>) -> RateLimitWatch {
        let (tx, rx) = watch::channel(self.state());
        let mut window = self.window.subscribe();
        let tracker = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                while !tracker.is_rate_limited() {
                    if window.changed().await.is_err() {
                        return;
                    }
                }
                debug!("rate limit watch polling");
                while tracker.is_rate_limited() {
                    if tx.send(tracker.state()).is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                if tx.send(tracker.state()).is_err() {
                    return;
                }
            }
        });
        RateLimitWatch { rx, task }
    }
}

/// Live view of the rate-limit window; stops polling on drop.
pub struct RateLimitWatch {
    rx: watch::Receiver<RateLimitState>,
    task: JoinHandle<()>,
}

impl RateLimitWatch {
    pub fn current(&self) -> RateLimitState {
        *self.rx.borrow()
    }

    /// Wait for the next published state.
    pub async fn changed(&mut self) -> Option<RateLimitState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

impl Drop for RateLimitWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
