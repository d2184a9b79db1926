//! Coordination Client
//!
//! Bundles the cache, rate limiter and distributed lock over one shared store
//! connection.

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::cache::Cache;
use crate::config::Config;
use crate::coordination::{DistributedLock, LockToken, RateLimiter};
use crate::error::Result;
use crate::store::{KeyValueStore, RedisStore};

#[derive(Clone)]
pub struct CoordinationClient {
    pub cache: Cache,
    pub rate_limiter: RateLimiter,
    pub lock: DistributedLock,
    config: Config,
}

impl CoordinationClient {
    /// Builds every primitive over `store`, namespaced per `config`.
    pub fn from_store(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self {
            cache: Cache::from_config(store.clone(), config),
            rate_limiter: RateLimiter::from_config(store.clone(), config),
            lock: DistributedLock::from_config(store, config),
            config: config.clone(),
        }
    }

    /// Connects to the Redis server at `config.redis_url`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = RedisStore::connect(&config.redis_url).await?;
        info!(
            cache_prefix = %config.cache_prefix,
            lock_prefix = %config.lock_prefix,
            rate_limit_prefix = %config.rate_limit_prefix,
            "coordination client ready"
        );
        Ok(Self::from_store(Arc::new(store), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// [`DistributedLock::with_lock`] with the configured default lease.
    pub async fn with_lock<T, F, Fut>(&self, resource: &str, critical_section: F) -> Result<Option<T>>
    where
        F: FnOnce(LockToken) -> Fut,
        Fut: Future<Output = T>,
    {
        self.lock
            .with_lock(resource, self.config.lock_lease(), critical_section)
            .await
    }
}
