//! HTTP Middleware Module
//!
//! Axum glue for applying coordination primitives to inbound requests.

mod rate_limit;

pub use rate_limit::{rate_limit, RateLimitPolicy};
