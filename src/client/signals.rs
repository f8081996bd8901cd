use crate::auth::SessionStatus;
use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::resilience::rate_limiter::RateLimitState;

/// Point-in-time view of the client's resilience state, for diagnostics and tests.
///
/// Facts only; callers decide what to do with them.
#[derive(Debug, Clone)]
pub struct SignalsSnapshot {
    /// Distinct deduplicated requests currently in flight.
    pub inflight: usize,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub rate_limit: RateLimitState,
    pub session: SessionStatus,
    /// Seconds until the idle timeout fires, when it is enabled.
    pub idle_remaining_secs: Option<u64>,
}
