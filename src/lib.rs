//! # resilient-api
//!
//! Resilient HTTP API client core: request deduplication, retry with
//! exponential backoff, a circuit breaker, server-driven rate-limit tracking,
//! interceptors, and an authentication session with single-flight token
//! refresh and idle timeout.
//!
//! ## Overview
//!
//! [`ApiClient`] composes the pieces into one pipeline:
//!
//! ```text
//! request -> dedup -> bearer token -> request interceptors -> circuit breaker
//!         -> retry(transport) -> 401? refresh + replay once -> response interceptors
//! ```
//!
//! Every collaborator (transport, secure storage, auth backend, UI observer,
//! clock) sits behind a trait and is injected through [`ApiClientBuilder`], so
//! each component can also be used on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_api::{ApiClient, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> resilient_api::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let client = ApiClient::builder(config).build()?;
//!     client.initialize().await;
//!
//!     let resp = client.get("/orders").await?;
//!     println!("{}", resp.body);
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Composed client and builder |
//! | [`resilience`] | Backoff, retry, dedup, circuit breaker, rate-limit tracker |
//! | [`interceptors`] | Request/response hooks and the built-in ones |
//! | [`auth`] | Session manager, token storage, auth backend |
//! | [`session_timeout`] | Idle-session timeout monitor |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`storage`] | Secure storage trait, keyring and in-memory stores |
//! | [`config`] | YAML/env configuration |
//! | [`logging`] | `tracing` subscriber setup and breadcrumbs |

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod interceptors;
pub mod logging;
pub mod resilience;
pub mod session_timeout;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use auth::{get_auth_token, SessionManager, SessionStatus};
pub use client::{ApiClient, ApiClientBuilder, SignalsSnapshot};
pub use config::ClientConfig;
pub use session_timeout::SessionTimeout;
pub use types::{ApiRequest, ApiResponse, Method, RequestOptions};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind};
