//! Resilience primitives for outbound API calls.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`backoff`] | Exponential backoff with optional jitter |
//! | [`retry`] | Retry executor with status-based classification |
//! | [`dedup`] | Coalesces identical in-flight requests |
//! | [`circuit_breaker`] | Closed / open / half-open failure isolation |
//! | [`rate_limiter`] | Server-signalled throttling window |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use resilient_api::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_threshold(5)
//!     .with_reset_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//! assert!(breaker.allow().is_ok());
//! ```
//!
//! ## Retry
//!
//! ```rust,no_run
//! use resilient_api::resilience::retry::{with_retry, RetryConfig};
//!
//! # async fn run() -> resilient_api::Result<()> {
//! let value = with_retry(|| async { Ok::<_, resilient_api::Error>(1) }, &RetryConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod dedup;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dedup::{dedup_key, Deduplicator};
pub use rate_limiter::{RateLimitState, RateLimitTracker, RateLimitWatch};
pub use retry::{with_retry, RetryConfig, RetryOverrides};
