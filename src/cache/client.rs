//! Cache Client Module
//!
//! JSON-serializing cache over a [`KeyValueStore`], with a get-or-compute
//! helper and staleness-aware background refresh.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::{CacheStats, StatsRecorder};
use crate::config::Config;
use crate::error::{CoordError, Result};
use crate::store::{expiry_millis, KeyTtl, KeyValueStore};

// == Cache ==
/// Cache client. Clones share the store connection and statistics.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    default_ttl: Duration,
    stats: Arc<StatsRecorder>,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache storing keys under `prefix`, using `default_ttl` when
    /// `set` is called without one.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self::new(store, config.cache_prefix.clone(), config.default_ttl())
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Set ==
    /// Serializes `value` and stores it under `key`.
    ///
    /// Overwrites any previous value and resets the TTL. Uses the default TTL
    /// when `ttl` is `None`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        expiry_millis(ttl)?;
        let payload = serde_json::to_string(value)?;
        self.store.set(&self.full_key(key), &payload, Some(ttl)).await
    }

    // == Get ==
    /// Fetches and deserializes `key`. Absent and expired keys yield `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.read(&self.full_key(key)).await
    }

    async fn read<T: DeserializeOwned>(&self, full_key: &str) -> Result<Option<T>> {
        match self.store.get(full_key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw).map_err(|source| {
                    CoordError::Deserialization {
                        key: full_key.to_string(),
                        source,
                    }
                })?;
                self.stats.record_hit();
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Delete ==
    /// Removes `key`. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.store.delete(&self.full_key(key)).await?;
        debug!(key = %key, removed, "cache delete");
        Ok(())
    }

    // == Get Or Compute ==
    /// Returns the cached value, or awaits `compute`, stores its result with
    /// `ttl` and returns it.
    ///
    /// Concurrent misses on the same key each run `compute`; the last write
    /// wins.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        expiry_millis(ttl)?;
        let full_key = self.full_key(key);
        if let Some(value) = self.read(&full_key).await? {
            return Ok(value);
        }
        self.compute_and_store(&full_key, ttl, compute).await
    }

    /// Like [`Cache::get_or_compute`], but when a hit's remaining TTL drops
    /// below `ttl * refresh_threshold` the stale value is returned at once and
    /// `compute` runs on a detached task that overwrites the entry.
    ///
    /// Refresh failures are logged and counted, never returned.
    /// `refresh_threshold` must lie in `(0.0, 1.0]`.
    pub async fn get_or_compute_with_background_refresh<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        refresh_threshold: f64,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if !(refresh_threshold > 0.0 && refresh_threshold <= 1.0) {
            return Err(CoordError::InvalidArgument(format!(
                "refresh threshold must be in (0, 1], got {}",
                refresh_threshold
            )));
        }
        expiry_millis(ttl)?;

        let full_key = self.full_key(key);
        let Some(value) = self.read(&full_key).await? else {
            return self.compute_and_store(&full_key, ttl, compute).await;
        };

        match self.store.ttl(&full_key).await? {
            KeyTtl::Expires(remaining) if remaining < ttl.mul_f64(refresh_threshold) => {
                debug!(key = %full_key, remaining_ms = remaining.as_millis() as u64, "entry stale, refreshing in background");
                self.spawn_refresh(full_key, ttl, compute);
            }
            // Expired between the read and the TTL lookup; the next read recomputes.
            KeyTtl::Missing => debug!(key = %full_key, "entry expired after read, refresh skipped"),
            KeyTtl::Expires(_) | KeyTtl::Persistent => {}
        }
        Ok(value)
    }

    async fn compute_and_store<T, F, Fut>(&self, full_key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let value = compute().await.map_err(CoordError::Compute)?;
        let payload = serde_json::to_string(&value)?;
        self.store.set(full_key, &payload, Some(ttl)).await?;
        debug!(key = %full_key, "computed value cached");
        Ok(value)
    }

    fn spawn_refresh<T, F, Fut>(&self, full_key: String, ttl: Duration, compute: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(key = %full_key, "no tokio runtime, skipping background refresh");
            return;
        };

        self.stats.record_refresh_started();
        let cache = self.clone();
        let key = full_key.clone();
        let work = runtime.spawn(async move {
            cache.compute_and_store(&key, ttl, compute).await.map(|_| ())
        });

        // A panicking compute surfaces here as a JoinError.
        let stats = self.stats.clone();
        runtime.spawn(async move {
            let outcome = match work.await {
                Ok(result) => result,
                Err(join_err) => Err(CoordError::Compute(anyhow::Error::new(join_err))),
            };
            match outcome {
                Ok(()) => debug!(key = %full_key, "background refresh complete"),
                Err(err) => {
                    stats.record_refresh_failure();
                    warn!(key = %full_key, error = %err, "background refresh failed");
                }
            }
        });
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
