//! Shared throttle counter stores.
//!
//! The admission policy only needs one primitive from a store: an atomic
//! "increment this key, creating it with a TTL if it does not exist". Two
//! interchangeable backends implement it; which one is used is decided once
//! from configuration.

pub mod memory;
pub mod redis;

use crate::config::{StoreDriver, ThrottlerConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Counter storage shared by every service process.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Increment `key` and return the new value. A key that does not exist
    /// yet starts at 1 and expires after `ttl`; later increments keep the
    /// original expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Check that the store can currently be reached.
    async fn ping(&self) -> Result<(), StoreError>;

    fn name(&self) -> &'static str;
}

/// Build the configured backend.
pub fn from_config(config: &ThrottlerConfig) -> Result<Arc<dyn ThrottleStore>, StoreError> {
    match config.driver {
        StoreDriver::Redis => Ok(Arc::new(RedisStore::new(&config.redis_url)?)),
        StoreDriver::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_backend() {
        let memory = from_config(&ThrottlerConfig {
            driver: StoreDriver::Memory,
            ..ThrottlerConfig::default()
        })
        .unwrap();
        assert_eq!(memory.name(), "memory");

        let redis = from_config(&ThrottlerConfig::default()).unwrap();
        assert_eq!(redis.name(), "redis");
    }

    #[test]
    fn test_factory_rejects_malformed_redis_url() {
        let result = from_config(&ThrottlerConfig {
            redis_url: "not a url".to_string(),
            ..ThrottlerConfig::default()
        });
        assert!(result.is_err());
    }
}
