//! Exponential backoff with optional jitter.

use super::retry::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Delay before the retry that follows failed attempt `attempt` (0-based).
///
/// `base_delay * 2^attempt`, capped at `max_delay`. With jitter enabled the
/// capped value is scaled by a uniform factor in `[0.5, 1.0]`.
pub fn delay(attempt: u32, cfg: &RetryConfig) -> Duration {
    let capped = exponential(attempt, cfg);
    if !cfg.jitter {
        return capped;
    }
    let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
    Duration::from_millis((capped.as_millis() as f64 * factor).round() as u64)
}

fn exponential(attempt: u32, cfg: &RetryConfig) -> Duration {
    let base = cfg.base_delay.as_millis() as u64;
    let cap = cfg.max_delay.as_millis() as u64;
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base.saturating_mul(factor).min(cap))
}
