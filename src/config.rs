//! Process-wide client configuration.
//!
//! Defaults are overridable from a YAML file or from `APP_API_*` environment
//! variables. Component configs (`RetryConfig`, `CircuitBreakerConfig`, ...) are
//! derived from this value when the client is built.

use crate::auth::SessionConfig;
use crate::error::ErrorContext;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::retry::RetryConfig;
use crate::session_timeout::SessionTimeoutConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as `X-Client-ID` on every request.
    pub client_id: String,
    pub timeout_ms: u64,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    /// Enables request signing when present.
    pub signing_secret: Option<String>,
    pub session: SessionSettings,
    pub rate_limit: RateLimitSettings,
    pub session_timeout: SessionTimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub threshold: u32,
    pub reset_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub refresh_threshold_ms: u64,
    pub refresh_check_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Window applied when a 429 carries no `Retry-After`.
    pub default_retry_after_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimeoutSettings {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub warning_before_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            client_id: format!("resilient-api/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 30_000,
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            signing_secret: None,
            session: SessionSettings::default(),
            rate_limit: RateLimitSettings::default(),
            session_timeout: SessionTimeoutSettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        let d = RetryConfig::default();
        Self {
            max_attempts: d.max_attempts,
            base_delay_ms: d.base_delay.as_millis() as u64,
            max_delay_ms: d.max_delay.as_millis() as u64,
            jitter: d.jitter,
            retryable_statuses: d.retryable_statuses,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_threshold_ms: 5 * 60 * 1000,
            refresh_check_interval_ms: 60 * 1000,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_retry_after_ms: 60_000,
        }
    }
}

impl Default for SessionTimeoutSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 30 * 60 * 1000,
            warning_before_ms: 2 * 60 * 1000,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `APP_API_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_with(|k| std::env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Overlay values from an arbitrary variable lookup (the process env in production).
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |k: &str| lookup(k).and_then(|s| s.trim().parse::<u64>().ok());

        if let Some(v) = lookup("APP_API_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.base_url = v.trim().to_string();
        }
        if let Some(v) = lookup("APP_API_CLIENT_ID").filter(|s| !s.trim().is_empty()) {
            self.client_id = v.trim().to_string();
        }
        if let Some(v) = num("APP_API_TIMEOUT_MS") {
            self.timeout_ms = v;
        }
        if let Some(v) = num("APP_API_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v as u32;
        }
        if let Some(v) = num("APP_API_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = num("APP_API_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = lookup("APP_API_RETRY_JITTER").and_then(|s| parse_bool(&s)) {
            self.retry.jitter = v;
        }
        if let Some(v) = num("APP_API_BREAKER_THRESHOLD") {
            self.circuit_breaker.threshold = v as u32;
        }
        if let Some(v) = num("APP_API_BREAKER_RESET_MS") {
            self.circuit_breaker.reset_timeout_ms = v;
        }
        if let Some(v) = lookup("APP_API_SIGNING_SECRET").filter(|s| !s.is_empty()) {
            self.signing_secret = Some(v);
        }
        if let Some(v) = lookup("APP_API_SESSION_TIMEOUT_ENABLED").and_then(|s| parse_bool(&s)) {
            self.session_timeout.enabled = v;
        }
        if let Some(v) = num("APP_API_SESSION_TIMEOUT_MS") {
            self.session_timeout.timeout_ms = v;
        }
        if let Some(v) = num("APP_API_SESSION_WARNING_MS") {
            self.session_timeout.warning_before_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new()
                    .with_field_path(field.to_string())
                    .with_source("config_loader"),
            )
        };

        url::Url::parse(&self.base_url).map_err(|e| invalid("base_url", &e.to_string()))?;
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.circuit_breaker.threshold == 0 {
            return Err(invalid("circuit_breaker.threshold", "must be at least 1"));
        }
        if self.session_timeout.enabled
            && self.session_timeout.warning_before_ms >= self.session_timeout.timeout_ms
        {
            return Err(invalid(
                "session_timeout.warning_before_ms",
                "must be shorter than session_timeout.timeout_ms",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
            retryable_statuses: self.retry.retryable_statuses.clone(),
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_threshold(self.circuit_breaker.threshold.max(1))
            .with_reset_timeout(Duration::from_millis(self.circuit_breaker.reset_timeout_ms))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_threshold: Duration::from_millis(self.session.refresh_threshold_ms),
            refresh_check_interval: Duration::from_millis(
                self.session.refresh_check_interval_ms.max(1),
            ),
        }
    }

    pub fn session_timeout_config(&self) -> SessionTimeoutConfig {
        SessionTimeoutConfig {
            enabled: self.session_timeout.enabled,
            timeout: Duration::from_millis(self.session_timeout.timeout_ms),
            warning_before: Duration::from_millis(self.session_timeout.warning_before_ms),
        }
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.rate_limit.default_retry_after_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ClientConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.retryable_statuses, vec![408, 429, 500, 502, 503, 504]);
        assert_eq!(cfg.circuit_breaker.threshold, 5);
        assert_eq!(cfg.session.refresh_threshold_ms, 300_000);
        assert!(!cfg.session_timeout.enabled);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("APP_API_BASE_URL", "https://api.example.com/v1"),
            ("APP_API_RETRY_MAX_ATTEMPTS", "5"),
            ("APP_API_RETRY_JITTER", "false"),
            ("APP_API_BREAKER_THRESHOLD", "2"),
            ("APP_API_SIGNING_SECRET", "s3cret"),
            ("APP_API_SESSION_TIMEOUT_ENABLED", "yes"),
            ("APP_API_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ClientConfig::default();
        cfg.apply_env_with(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.base_url, "https://api.example.com/v1");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!(!cfg.retry.jitter);
        assert_eq!(cfg.circuit_breaker.threshold, 2);
        assert_eq!(cfg.signing_secret.as_deref(), Some("s3cret"));
        assert!(cfg.session_timeout.enabled);
        // unparsable values keep the default
        assert_eq!(cfg.timeout_ms, 30_000);
    }

    #[test]
    fn test_yaml_partial_config() {
        let raw = r#"
base_url: "https://api.example.com"
retry:
  max_attempts: 4
  jitter: false
session_timeout:
  enabled: true
  timeout_ms: 60000
  warning_before_ms: 10000
"#;
        let cfg = ClientConfig::from_yaml_str(raw).unwrap();
        assert_eq!(cfg.retry.max_attempts, 4);
        assert_eq!(cfg.retry.base_delay_ms, 1000);
        let rc = cfg.retry_config();
        assert!(!rc.jitter);
        let st = cfg.session_timeout_config();
        assert_eq!(st.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = ClientConfig::default();
        cfg.retry.max_attempts = 0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("retry.max_attempts")
        );

        let mut cfg = ClientConfig::default();
        cfg.base_url = "not a url".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.session_timeout.enabled = true;
        cfg.session_timeout.warning_before_ms = cfg.session_timeout.timeout_ms;
        assert!(cfg.validate().is_err());
    }
}
