//! Store Module
//!
//! The key-value store contract the coordination primitives are built on,
//! plus a Redis adapter and an in-process implementation.
//!
//! Every method is a single atomic operation against the store. Anything
//! that decides lock ownership or rate-limit admission lives in one method
//! (`compare_and_delete`, `compare_and_extend`, `admit_sliding_window`) so an
//! implementation can run it as one script or transaction.

mod entry;
mod memory;
mod redis_store;
mod scripts;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CoordError, Result};

pub use entry::current_timestamp_ms;
pub(crate) use entry::{StoredEntry, StoredValue};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

// == Key TTL ==
/// Remaining lifetime of a key, the typed form of Redis' `PTTL` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (`-2`)
    Missing,
    /// Key exists without an expiry (`-1`)
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Converts a raw `PTTL` reply.
    pub fn from_pttl(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms as u64)),
        }
    }
}

// == Scored Member ==
/// One element of an ordered set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

// == Sliding Window Admission ==
/// Parameters of one atomic sliding-window admission attempt.
#[derive(Debug, Clone)]
pub struct WindowAdmission {
    /// Admission time in Unix milliseconds; also the score of the new entry
    pub now_ms: u64,
    /// Trailing window length
    pub window: Duration,
    /// Maximum admissions inside the window
    pub limit: u64,
    /// Unique member recorded for this admission
    pub member: String,
}

impl WindowAdmission {
    /// Entries scored strictly below this are outside the window.
    pub fn window_start_ms(&self) -> f64 {
        self.now_ms as f64 - millis(self.window) as f64
    }
}

// == Key Value Store ==
/// Atomic primitives over a shared keyed store.
///
/// All operations fail with [`CoordError::StoreUnavailable`] when the store
/// cannot be reached; callers treat that as a hard failure.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn increment(&self, key: &str) -> Result<i64>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Stores `value` with a lease only if `key` is absent.
    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> Result<bool>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Adds `additional` to the remaining lease of `key` only if it holds `expected`.
    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool>;

    async fn add_to_ordered_set(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Removes members with `min <= score <= max`, returning how many went.
    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64>;

    async fn count_ordered_set(&self, key: &str) -> Result<u64>;

    /// Members between rank `start` and `stop` inclusive, lowest score first.
    /// Negative ranks count from the end.
    async fn range_ordered_set(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<ScoredMember>>;

    /// Purges entries older than the window, counts the rest and, if under
    /// the limit, records `admission.member` and refreshes the key's expiry
    /// to the window length. Returns whether the admission was recorded.
    async fn admit_sliding_window(&self, key: &str, admission: &WindowAdmission) -> Result<bool>;
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Rejects expiries the store cannot represent (below one millisecond).
pub(crate) fn expiry_millis(duration: Duration) -> Result<u64> {
    match millis(duration) {
        0 => Err(CoordError::InvalidArgument(format!(
            "expiry must be at least 1ms, got {:?}",
            duration
        ))),
        ms => Ok(ms),
    }
}
