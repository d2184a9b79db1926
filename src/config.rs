//! Configuration Module
//!
//! Handles loading coordination settings from environment variables.

use std::env;
use std::time::Duration;

/// Coordination layer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection URL of the backing Redis server
    pub redis_url: String,
    /// Default cache TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Default lock lease in milliseconds
    pub lock_lease_ms: u64,
    /// Namespace prepended to cache keys
    pub cache_prefix: String,
    /// Namespace prepended to lock keys
    pub lock_prefix: String,
    /// Namespace prepended to rate limiter keys
    pub rate_limit_prefix: String,
    /// In-memory store sweep interval in seconds
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Store connection URL (default: redis://127.0.0.1:6379)
    /// - `DEFAULT_TTL` - Default cache TTL in seconds (default: 300)
    /// - `LOCK_LEASE_MS` - Default lock lease in milliseconds (default: 30000)
    /// - `CACHE_PREFIX` - Cache key namespace (default: cache:)
    /// - `LOCK_PREFIX` - Lock key namespace (default: lock:)
    /// - `RATE_LIMIT_PREFIX` - Rate limiter key namespace (default: ratelimit:)
    /// - `SWEEP_INTERVAL` - In-memory sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            lock_lease_ms: parse_var("LOCK_LEASE_MS").unwrap_or(defaults.lock_lease_ms),
            cache_prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            lock_prefix: env::var("LOCK_PREFIX").unwrap_or(defaults.lock_prefix),
            rate_limit_prefix: env::var("RATE_LIMIT_PREFIX")
                .unwrap_or(defaults.rate_limit_prefix),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

fn parse_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_ttl: 300,
            lock_lease_ms: 30_000,
            cache_prefix: "cache:".to_string(),
            lock_prefix: "lock:".to_string(),
            rate_limit_prefix: "ratelimit:".to_string(),
            sweep_interval: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.lock_lease_ms, 30_000);
        assert_eq!(config.lock_prefix, "lock:");
        assert_eq!(config.sweep_interval, 1);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("DEFAULT_TTL");
        env::remove_var("LOCK_LEASE_MS");
        env::remove_var("CACHE_PREFIX");
        env::remove_var("RATE_LIMIT_PREFIX");

        let config = Config::from_env();
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.lock_lease_ms, 30_000);
        assert_eq!(config.cache_prefix, "cache:");
        assert_eq!(config.rate_limit_prefix, "ratelimit:");
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.lock_lease(), Duration::from_millis(30_000));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
