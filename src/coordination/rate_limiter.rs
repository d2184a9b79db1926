//! Sliding-window rate limiter.
//!
//! Each limiter key owns an ordered set of admissions scored by their Unix
//! millisecond timestamp. Purge, count and admit run as one atomic store
//! operation, so concurrent callers can never push a window past its limit.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::coordination::token::random_suffix;
use crate::error::Result;
use crate::store::{
    current_timestamp_ms, expiry_millis, KeyValueStore, ScoredMember, WindowAdmission,
};

/// Sliding-window rate limiter over a shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, config.rate_limit_prefix.clone())
    }

    fn window_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Admits the call if fewer than `limit` admissions happened for `key`
    /// during the trailing `window`.
    ///
    /// A denied call records nothing. `limit == 0` denies without touching
    /// the store; a window under one millisecond is `InvalidArgument`.
    pub async fn is_allowed(&self, key: &str, limit: u64, window: Duration) -> Result<bool> {
        expiry_millis(window)?;
        if limit == 0 {
            return Ok(false);
        }

        let now_ms = current_timestamp_ms();
        let admission = WindowAdmission {
            now_ms,
            window,
            limit,
            member: format!("{}-{}", now_ms, random_suffix()),
        };

        let allowed = self
            .store
            .admit_sliding_window(&self.window_key(key), &admission)
            .await?;
        debug!(key = %key, limit, allowed, "rate limit check");
        Ok(allowed)
    }

    /// Admissions currently recorded for `key`, oldest first. May include
    /// entries that have left the window but were not purged yet.
    pub async fn recent_admissions(&self, key: &str) -> Result<Vec<ScoredMember>> {
        self.store.range_ordered_set(&self.window_key(key), 0, -1).await
    }

    /// Forgets every admission for `key`.
    pub async fn reset(&self, key: &str) -> Result<()> {
        self.store.delete(&self.window_key(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordError;
    use crate::store::{KeyTtl, MemoryStore};

    const WINDOW: Duration = Duration::from_secs(60);

    fn test_limiter() -> (RateLimiter, MemoryStore) {
        let store = MemoryStore::new();
        (RateLimiter::new(Arc::new(store.clone()), "ratelimit:"), store)
    }

    #[tokio::test]
    async fn test_admits_up_to_limit() {
        let (limiter, _) = test_limiter();

        for _ in 0..5 {
            assert!(limiter.is_allowed("user:42", 5, WINDOW).await.unwrap());
        }
        assert!(!limiter.is_allowed("user:42", 5, WINDOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _) = test_limiter();

        assert!(limiter.is_allowed("a", 1, WINDOW).await.unwrap());
        assert!(!limiter.is_allowed("a", 1, WINDOW).await.unwrap());
        assert!(limiter.is_allowed("b", 1, WINDOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_calls_are_not_recorded() {
        let (limiter, _) = test_limiter();

        for _ in 0..10 {
            limiter.is_allowed("user:42", 3, WINDOW).await.unwrap();
        }

        assert_eq!(limiter.recent_admissions("user:42").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_members_are_unique_within_a_millisecond() {
        let (limiter, _) = test_limiter();

        for _ in 0..50 {
            limiter.is_allowed("burst", 100, WINDOW).await.unwrap();
        }

        let admissions = limiter.recent_admissions("burst").await.unwrap();
        assert_eq!(admissions.len(), 50);
        for admission in &admissions {
            let (millis, suffix) = admission.member.split_once('-').unwrap();
            assert_eq!(millis.parse::<f64>().unwrap(), admission.score);
            assert!(!suffix.is_empty());
        }
    }

    #[tokio::test]
    async fn test_window_slides() {
        let (limiter, _) = test_limiter();
        let window = Duration::from_millis(100);

        assert!(limiter.is_allowed("k", 2, window).await.unwrap());
        assert!(limiter.is_allowed("k", 2, window).await.unwrap());
        assert!(!limiter.is_allowed("k", 2, window).await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.is_allowed("k", 2, window).await.unwrap());
    }

    #[tokio::test]
    async fn test_window_key_carries_expiry() {
        let (limiter, store) = test_limiter();

        limiter.is_allowed("k", 1, WINDOW).await.unwrap();

        let KeyTtl::Expires(remaining) = store.ttl("ratelimit:k").await.unwrap() else {
            panic!("window key should expire");
        };
        assert!(remaining <= WINDOW);
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let (limiter, store) = test_limiter();

        assert!(!limiter.is_allowed("k", 0, WINDOW).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_window_rejected() {
        let (limiter, _) = test_limiter();

        let result = limiter.is_allowed("k", 5, Duration::ZERO).await;
        assert!(matches!(result, Err(CoordError::InvalidArgument(_))));

        let result = limiter.is_allowed("k", 0, Duration::ZERO).await;
        assert!(matches!(result, Err(CoordError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_store_outage_is_neither_allowed_nor_denied() {
        let (limiter, store) = test_limiter();
        store.set_available(false);

        let result = limiter.is_allowed("k", 5, WINDOW).await;
        assert!(matches!(result, Err(CoordError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_reset_clears_window() {
        let (limiter, _) = test_limiter();
        assert!(limiter.is_allowed("k", 1, WINDOW).await.unwrap());
        assert!(!limiter.is_allowed("k", 1, WINDOW).await.unwrap());

        limiter.reset("k").await.unwrap();

        assert!(limiter.is_allowed("k", 1, WINDOW).await.unwrap());
    }
}
