//! API client: the composition root of the request pipeline.
//!
//! Every call flows through dedup, bearer-token attach, request interceptors,
//! the circuit breaker, the retry loop around the transport, 401
//! refresh-and-replay and finally the response interceptors. Implementation
//! details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod execution;
pub mod signals;

pub use builder::ApiClientBuilder;
pub use core::ApiClient;
pub use signals::SignalsSnapshot;
