//! Rate Limit Middleware
//!
//! Applies a [`RateLimiter`] to inbound axum requests, keyed by client IP.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::coordination::RateLimiter;
use crate::store::millis;

/// Limiter plus the budget each client gets per window.
#[derive(Clone)]
pub struct RateLimitPolicy {
    pub limiter: RateLimiter,
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limiter: RateLimiter, limit: u64, window: Duration) -> Self {
        Self {
            limiter,
            limit,
            window,
        }
    }

    /// Whole seconds a denied client should wait, at least one.
    fn retry_after_secs(&self) -> u64 {
        millis(self.window).div_ceil(1000).max(1)
    }
}

/// Resolves the client key: `x-real-ip`, then the first `x-forwarded-for`
/// entry, then the socket peer address.
fn client_key(req: &Request) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// Axum middleware. Mount with
/// `axum::middleware::from_fn_with_state(policy, rate_limit)`.
///
/// Denied requests get `429` with `Retry-After`; a store outage yields the
/// error's own response (`503`) instead of failing open.
pub async fn rate_limit(
    State(policy): State<RateLimitPolicy>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(&req);

    match policy
        .limiter
        .is_allowed(&client, policy.limit, policy.window)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            debug!(client = %client, limit = policy.limit, "request rate limited");
            let retry_after = policy.retry_after_secs();
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many requests",
                    "retry_after_secs": retry_after,
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
        Err(err) => {
            warn!(client = %client, error = %err, "rate limit check failed");
            err.into_response()
        }
    }
}
