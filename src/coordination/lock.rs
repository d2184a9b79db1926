//! Distributed Lock Module
//!
//! Lease-based mutual exclusion over a shared store. A resource is either
//! unlocked or held under a single owner token; only that token can release
//! or extend it, and the store drops it when the lease runs out.
//!
//! Locks are not session-based. A holder that outlives its lease can overlap
//! the next holder, so long critical sections should call
//! [`DistributedLock::extend_lock`] and stop when it returns `false`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::coordination::LockToken;
use crate::error::Result;
use crate::store::{expiry_millis, millis, KeyValueStore};

// == Distributed Lock ==
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, config.lock_prefix.clone())
    }

    fn lock_key(&self, resource: &str) -> String {
        format!("{}{}", self.prefix, resource)
    }

    // == Acquire ==
    /// Tries once to take `resource` for `lease`.
    ///
    /// Returns the owner token on success and `None` when someone else holds
    /// it. Never blocks or retries.
    pub async fn acquire_lock(&self, resource: &str, lease: Duration) -> Result<Option<LockToken>> {
        expiry_millis(lease)?;
        let token = LockToken::generate();
        let acquired = self
            .store
            .set_if_absent(&self.lock_key(resource), token.as_str(), lease)
            .await?;

        if acquired {
            debug!(resource = %resource, lease_ms = millis(lease), "lock acquired");
            Ok(Some(token))
        } else {
            debug!(resource = %resource, "lock held by another owner");
            Ok(None)
        }
    }

    // == Release ==
    /// Releases `resource` if `token` still owns it.
    ///
    /// `false` means the lease already expired or another owner holds the
    /// lock; the caller may have lost exclusivity during its critical section.
    pub async fn release_lock(&self, resource: &str, token: &LockToken) -> Result<bool> {
        let released = self
            .store
            .compare_and_delete(&self.lock_key(resource), token.as_str())
            .await?;
        debug!(resource = %resource, released, "lock release");
        Ok(released)
    }

    // == Extend ==
    /// Adds `additional` to the remaining lease if `token` still owns it.
    pub async fn extend_lock(
        &self,
        resource: &str,
        token: &LockToken,
        additional: Duration,
    ) -> Result<bool> {
        let extended = self
            .store
            .compare_and_extend(&self.lock_key(resource), token.as_str(), additional)
            .await?;
        debug!(resource = %resource, extended, additional_ms = millis(additional), "lock extend");
        Ok(extended)
    }

    // == With Lock ==
    /// Acquires `resource` once, runs `critical_section` with the owner token
    /// and releases afterwards.
    ///
    /// Returns `None` without running the section when the lock is held
    /// elsewhere. A failed release is logged; the section's output is still
    /// returned.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource: &str,
        lease: Duration,
        critical_section: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(LockToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(token) = self.acquire_lock(resource, lease).await? else {
            return Ok(None);
        };

        let output = critical_section(token.clone()).await;

        match self.release_lock(resource, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(resource = %resource, "lease expired before release, exclusivity may have been lost"),
            Err(err) => warn!(resource = %resource, error = %err, "lock release failed, lease will expire on its own"),
        }
        Ok(Some(output))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordError;
    use crate::store::{KeyTtl, MemoryStore};

    const LEASE: Duration = Duration::from_secs(5);

    fn test_lock() -> (DistributedLock, MemoryStore) {
        let store = MemoryStore::new();
        (DistributedLock::new(Arc::new(store.clone()), "lock:"), store)
    }

    #[tokio::test]
    async fn test_acquire_stores_token_under_prefixed_key() {
        let (lock, store) = test_lock();

        let token = lock.acquire_lock("order:99", LEASE).await.unwrap().unwrap();

        assert_eq!(
            store.get("lock:order:99").await.unwrap().as_deref(),
            Some(token.as_str())
        );
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let (lock, _) = test_lock();

        assert!(lock.acquire_lock("order:99", LEASE).await.unwrap().is_some());
        assert!(lock.acquire_lock("order:99", LEASE).await.unwrap().is_none());
        assert!(lock.acquire_lock("order:100", LEASE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_succeeds_exactly_once() {
        let (lock, _) = test_lock();
        let token = lock.acquire_lock("order:99", LEASE).await.unwrap().unwrap();

        assert!(lock.release_lock("order:99", &token).await.unwrap());
        assert!(!lock.release_lock("order:99", &token).await.unwrap());
        assert!(lock.acquire_lock("order:99", LEASE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_keeps_lock() {
        let (lock, store) = test_lock();
        let owner = lock.acquire_lock("order:99", LEASE).await.unwrap().unwrap();

        let stranger = LockToken::generate();
        assert!(!lock.release_lock("order:99", &stranger).await.unwrap());

        assert_eq!(
            store.get("lock:order:99").await.unwrap().as_deref(),
            Some(owner.as_str())
        );
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_the_lock() {
        let (lock, _) = test_lock();
        let stale = lock
            .acquire_lock("job", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let fresh = lock.acquire_lock("job", LEASE).await.unwrap().unwrap();
        assert!(!lock.release_lock("job", &stale).await.unwrap());
        assert!(lock.release_lock("job", &fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_only_for_owner() {
        let (lock, store) = test_lock();
        let token = lock
            .acquire_lock("job", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        assert!(!lock
            .extend_lock("job", &LockToken::generate(), LEASE)
            .await
            .unwrap());
        assert!(lock.extend_lock("job", &token, LEASE).await.unwrap());

        let KeyTtl::Expires(remaining) = store.ttl("lock:job").await.unwrap() else {
            panic!("lock should carry a lease");
        };
        assert!(remaining > LEASE);
    }

    #[tokio::test]
    async fn test_extend_after_release_fails() {
        let (lock, _) = test_lock();
        let token = lock.acquire_lock("job", LEASE).await.unwrap().unwrap();
        lock.release_lock("job", &token).await.unwrap();

        assert!(!lock.extend_lock("job", &token, LEASE).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_lease_rejected() {
        let (lock, _) = test_lock();

        let result = lock.acquire_lock("job", Duration::ZERO).await;
        assert!(matches!(result, Err(CoordError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let (lock, store) = test_lock();
        store.set_available(false);

        let result = lock.acquire_lock("job", LEASE).await;
        assert!(matches!(result, Err(CoordError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_with_lock_runs_and_releases() {
        let (lock, store) = test_lock();

        let output = lock
            .with_lock("report", LEASE, |token| async move { token.as_str().len() })
            .await
            .unwrap();

        assert_eq!(output, Some(32));
        assert_eq!(store.get("lock:report").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_with_lock_skips_section_when_held() {
        let (lock, _) = test_lock();
        let _held = lock.acquire_lock("report", LEASE).await.unwrap().unwrap();

        let output = lock
            .with_lock("report", LEASE, |_| async { panic!("section must not run") })
            .await
            .unwrap();

        assert_eq!(output, None::<()>);
    }
}
