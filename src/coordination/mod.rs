//! Coordination Module
//!
//! Cross-process primitives built on the store's atomic operations: a
//! lease-based distributed lock and a sliding-window rate limiter.

mod lock;
mod rate_limiter;
mod token;


// Re-export public types
pub use lock::DistributedLock;
pub use rate_limiter::RateLimiter;
pub use token::LockToken;
