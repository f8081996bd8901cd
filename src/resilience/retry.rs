//! Retry executor.
//!
//! Wraps an async operation and retries transient failures with exponential
//! backoff. There is no mid-attempt cancellation: an attempt always completes
//! before the loop decides whether to retry.

use super::backoff;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

/// Per-call overrides merged over the process defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub jitter: Option<bool>,
    pub retryable_statuses: Option<Vec<u16>>,
}

impl RetryOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = Some(d);
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = Some(enabled);
        self
    }

    pub fn retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = Some(statuses);
        self
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn merged(&self, overrides: &RetryOverrides) -> Self {
        Self {
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            base_delay: overrides.base_delay.unwrap_or(self.base_delay),
            max_delay: overrides.max_delay.unwrap_or(self.max_delay),
            jitter: overrides.jitter.unwrap_or(self.jitter),
            retryable_statuses: overrides
                .retryable_statuses
                .clone()
                .unwrap_or_else(|| self.retryable_statuses.clone()),
        }
    }

    /// A failure without a status is a transient network failure; otherwise the
    /// status must be in the retryable set. Circuit-open rejections never retry.
    pub fn is_retryable(&self, err: &Error) -> bool {
        match err {
            Error::Network { .. } => true,
            Error::Http { status, .. } => self.retryable_statuses.contains(status),
            Error::Auth {
                status: Some(status),
                ..
            } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
///
/// The error from the final attempt is returned unchanged.
pub async fn with_retry<T, F, Fut>(mut op: F, cfg: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = cfg.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let last = attempt + 1 >= max_attempts;
        if last || !cfg.is_retryable(&err) {
            return Err(err);
        }

        let wait = backoff::delay(attempt, cfg);
        warn!(
            attempt = attempt + 1,
            max_attempts,
            delay_ms = wait.as_millis() as u64,
            status = err.status(),
            error = %err,
            "request failed, retrying"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
