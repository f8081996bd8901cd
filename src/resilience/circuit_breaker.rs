use crate::clock::{duration_ms, Clock, SystemClock};
use crate::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub threshold: u32,
    pub reset_timeout_ms: u64,
    pub failure_count: u32,
    pub last_failure_time: i64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the circuit
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// How long the circuit stays open before admitting a trial call
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: i64,
    /// A half-open trial call is running.
    trial_in_flight: bool,
}

/// Consecutive-failure circuit breaker for one guarded channel.
///
/// - Closed: calls pass through
/// - Open: calls fail fast with [`Error::CircuitOpen`]
/// - Half-open: entered lazily once `reset_timeout` has elapsed; one trial call is admitted
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: 0,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lazily move `Open` to `HalfOpen` once the reset timeout has elapsed.
    fn evaluate(&self, st: &mut State) -> CircuitState {
        if st.state == CircuitState::Open
            && self.clock.now_ms() - st.last_failure_time >= duration_ms(self.cfg.reset_timeout)
        {
            st.state = CircuitState::HalfOpen;
            st.trial_in_flight = false;
        }
        st.state
    }

    fn open_remaining_ms(&self, st: &State) -> u64 {
        let until = st.last_failure_time + duration_ms(self.cfg.reset_timeout);
        (until - self.clock.now_ms()).max(0) as u64
    }

    pub fn state(&self) -> CircuitState {
        let mut st = self.lock();
        self.evaluate(&mut st)
    }

    /// Gate a call. Returns `Err(CircuitOpen)` while open, or while a half-open trial is running.
    pub fn allow(&self) -> Result<()> {
        self.admit().map(|_| ())
    }

    /// Like [`allow`](Self::allow), reporting whether the admitted call is the half-open trial.
    fn admit(&self) -> Result<bool> {
        let mut st = self.lock();
        match self.evaluate(&mut st) {
            CircuitState::Closed => Ok(false),
            CircuitState::HalfOpen if !st.trial_in_flight => {
                st.trial_in_flight = true;
                Ok(true)
            }
            CircuitState::HalfOpen => Err(Error::CircuitOpen { retry_in_ms: 0 }),
            CircuitState::Open => Err(Error::CircuitOpen {
                retry_in_ms: self.open_remaining_ms(&st),
            }),
        }
    }

    /// Give up a trial that ended without an outcome so the next caller can try.
    fn release_trial(&self) {
        let mut st = self.lock();
        if st.state == CircuitState::HalfOpen && st.trial_in_flight {
            debug!("half-open trial abandoned, releasing");
            st.trial_in_flight = false;
        }
    }

    pub fn on_success(&self) {
        let mut st = self.lock();
        if st.state == CircuitState::HalfOpen {
            info!("circuit breaker recovered, closing");
        }
        st.state = CircuitState::Closed;
        st.failure_count = 0;
        st.trial_in_flight = false;
    }

    pub fn on_failure(&self) {
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure_time = self.clock.now_ms();
        st.trial_in_flight = false;
        if st.failure_count >= self.cfg.threshold {
            if st.state != CircuitState::Open {
                warn!(
                    failure_count = st.failure_count,
                    threshold = self.cfg.threshold,
                    reset_timeout_ms = self.cfg.reset_timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
            }
            st.state = CircuitState::Open;
        }
    }

    /// Run `op` behind the breaker, recording its outcome.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trial = TrialGuard {
            breaker: self,
            armed: self.admit()?,
        };
        let outcome = op().await;
        trial.settle();
        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Unconditionally return to `Closed` with zero failures.
    pub fn reset(&self) {
        let mut st = self.lock();
        st.state = CircuitState::Closed;
        st.failure_count = 0;
        st.last_failure_time = 0;
        st.trial_in_flight = false;
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut st = self.lock();
        let state = self.evaluate(&mut st);
        CircuitBreakerSnapshot {
            state,
            threshold: self.cfg.threshold,
            reset_timeout_ms: self.cfg.reset_timeout.as_millis() as u64,
            failure_count: st.failure_count,
            last_failure_time: st.last_failure_time,
            open_remaining_ms: (state == CircuitState::Open).then(|| self.open_remaining_ms(&st)),
        }
    }
}

/// Releases the half-open trial slot if the trial future is dropped before it settles.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl TrialGuard<'_> {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}
