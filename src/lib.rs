//! Redis Patterns - coordination primitives over a shared key-value store
//!
//! A distributed lock, a sliding-window rate limiter and a cache with
//! background refresh, all built on the atomic operations of
//! [`store::KeyValueStore`]. [`store::RedisStore`] talks to a Redis server;
//! [`store::MemoryStore`] keeps everything in process.

pub mod cache;
pub mod client;
pub mod config;
pub mod coordination;
pub mod error;
pub mod middleware;
pub mod store;
pub mod tasks;

pub use cache::{Cache, CacheStats};
pub use client::CoordinationClient;
pub use config::Config;
pub use coordination::{DistributedLock, LockToken, RateLimiter};
pub use error::{CoordError, Result};
pub use store::{KeyTtl, KeyValueStore, MemoryStore, RedisStore};
pub use tasks::spawn_sweep_task;
