//! Request and response descriptors shared by the transport, interceptors and client.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Method`] | HTTP method |
//! | [`ApiRequest`] | `{url, method, headers, body}` descriptor passed through interceptors |
//! | [`RequestOptions`] | Per-call options for [`crate::ApiClient`] |
//! | [`ApiResponse`] | `{status, headers, body}` returned by a [`crate::transport::Transport`] |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api::types::{ApiRequest, Method};
//!
//! let req = ApiRequest::new(Method::Post, "https://api.example.com/items")
//!     .with_header("X-Trace", "abc")
//!     .with_body(serde_json::json!({"name": "widget"}));
//! assert_eq!(req.header("x-trace"), Some("abc"));
//! ```

pub mod request;
pub mod response;

pub use request::{ApiRequest, Method, RequestOptions};
pub use response::ApiResponse;
