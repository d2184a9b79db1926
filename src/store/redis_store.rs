//! Redis Store Module
//!
//! [`KeyValueStore`] over a multiplexed async Redis connection. Atomic
//! compare-and-act operations run as server-side Lua scripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient, Script};
use tracing::info;

use crate::error::Result;
use crate::store::scripts;
use crate::store::{expiry_millis, KeyTtl, KeyValueStore, ScoredMember, WindowAdmission};

struct Scripts {
    compare_and_delete: Script,
    compare_and_extend: Script,
    sliding_window_admit: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            compare_and_delete: Script::new(scripts::COMPARE_AND_DELETE),
            compare_and_extend: Script::new(scripts::COMPARE_AND_EXTEND),
            sliding_window_admit: Script::new(scripts::SLIDING_WINDOW_ADMIT),
        }
    }
}

// == Redis Store ==
/// Redis-backed store. Clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    scripts: Arc<Scripts>,
}

impl RedisStore {
    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = RedisClient::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis at {}", redis_url);
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            scripts: Arc::new(Scripts::load()),
        }
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let _: () = conn.pset_ex(key, value, expiry_millis(ttl)?).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: u64 = self.conn().del(key).await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let value: i64 = self.conn().incr(key, 1).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = expiry_millis(ttl)?;
        let applied: bool = self.conn().pexpire(key, ttl_ms as i64).await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let reply: i64 = self.conn().pttl(key).await?;
        Ok(KeyTtl::from_pttl(reply))
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> Result<bool> {
        let lease_ms = expiry_millis(lease)?;
        // SET key value NX PX lease -> "OK" when written, nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut self.conn())
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let removed: i64 = self
            .scripts
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(removed == 1)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool> {
        let additional_ms = expiry_millis(additional)?;
        let extended: i64 = self
            .scripts
            .compare_and_extend
            .key(key)
            .arg(expected)
            .arg(additional_ms)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(extended == 1)
    }

    async fn add_to_ordered_set(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let _: u64 = self.conn().zadd(key, member, score).await?;
        Ok(())
    }

    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let removed: u64 = self.conn().zrembyscore(key, min, max).await?;
        Ok(removed)
    }

    async fn count_ordered_set(&self, key: &str) -> Result<u64> {
        let count: u64 = self.conn().zcard(key).await?;
        Ok(count)
    }

    async fn range_ordered_set(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<ScoredMember>> {
        let pairs: Vec<(String, f64)> = self.conn().zrange_withscores(key, start, stop).await?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn admit_sliding_window(&self, key: &str, admission: &WindowAdmission) -> Result<bool> {
        let window_ms = expiry_millis(admission.window)?;
        let admitted: i64 = self
            .scripts
            .sliding_window_admit
            .key(key)
            .arg(admission.now_ms)
            .arg(window_ms)
            .arg(admission.limit)
            .arg(&admission.member)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(admitted == 1)
    }
}
