use thiserror::Error;

/// Structured error context for configuration and storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Configuration key or storage key involved (e.g. "retry.max_attempts", "auth_tokens")
    pub field_path: Option<String>,
    /// Additional context about the error
    pub details: Option<String>,
    /// Component that raised the error (e.g. "config_loader", "keyring_storage")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Discriminant of [`Error`], used for classification without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Http,
    CircuitOpen,
    Auth,
    Storage,
    Serialization,
    Configuration,
}

/// Unified error type for the client core.
///
/// Errors are `Clone` so that a single outcome can be handed to every caller
/// sharing a deduplicated request or a single-flight refresh.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The exchange never produced an HTTP status (connect, timeout, abort).
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Server-provided `Retry-After`, if any.
        retry_after_ms: Option<u64>,
    },

    #[error("Circuit breaker open (retry in {retry_in_ms} ms)")]
    CircuitOpen { retry_in_ms: u64 },

    #[error("Authentication error: {message}")]
    Auth { message: String, status: Option<u16> },

    #[error("Storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network {
            message: msg.into(),
        }
    }

    pub fn http(status: u16, msg: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: msg.into(),
            retry_after_ms: None,
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth {
            message: msg.into(),
            status: None,
        }
    }

    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Http { .. } => ErrorKind::Http,
            Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Error::Auth { .. } => ErrorKind::Auth,
            Error::Storage { .. } => ErrorKind::Storage,
            Error::Serialization { .. } => ErrorKind::Serialization,
            Error::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// HTTP status carried by the error, if the exchange produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Auth { status, .. } => *status,
            _ => None,
        }
    }

    /// Server-requested wait carried by a throttling response.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::Http {
                retry_after_ms: Some(ms),
                ..
            } => Some(std::time::Duration::from_millis(*ms)),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human-readable message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            Error::Http { message, .. } | Error::Auth { message, .. } => {
                server_message(message).unwrap_or_else(|| message.clone())
            }
            other => other.to_string(),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Storage { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Pull `message` (or `error.message`) out of a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("message")
        .or_else(|| json.get("error").and_then(|e| e.get("message")))
        .or_else(|| json.get("error"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::http(status.as_u16(), err.to_string()),
            None if err.is_decode() => Error::Serialization {
                message: err.to_string(),
            },
            None => Error::network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::configuration_with_context(
            err.to_string(),
            ErrorContext::new().with_source("config_loader"),
        )
    }
}

impl From<keyring::Error> for Error {
    fn from(err: keyring::Error) -> Self {
        Error::storage_with_context(
            err.to_string(),
            ErrorContext::new().with_source("keyring_storage"),
        )
    }
}
