//! Cache Module
//!
//! Typed cache-aside client over a [`crate::store::KeyValueStore`]. Values
//! are stored as JSON under a configurable key prefix.

mod client;
mod stats;

// Re-export public types
pub use client::Cache;
pub use stats::{CacheStats, StatsRecorder};
