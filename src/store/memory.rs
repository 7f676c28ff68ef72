use super::{StoreError, ThrottleStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Process-local counter store.
///
/// Counters are not shared between processes; this backend suits single
/// instance deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    counters: Arc<Mutex<HashMap<String, Counter>>>,
}

#[derive(Clone, Copy)]
struct Counter {
    value: u64,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment_at(&self, key: &str, ttl: Duration, now: Instant) -> Result<u64, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Internal("Failed to acquire lock on counters".to_string()))?;

        let counter = counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: now + ttl,
        });

        if counter.expires_at <= now {
            *counter = Counter {
                value: 0,
                expires_at: now + ttl,
            };
        }

        counter.value += 1;
        Ok(counter.value)
    }

    /// Drop expired counters, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> Result<usize, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Internal("Failed to acquire lock on counters".to_string()))?;

        let before = counters.len();
        counters.retain(|_, counter| counter.expires_at > now);
        Ok(before - counters.len())
    }

    pub fn len(&self) -> usize {
        self.counters.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ThrottleStore for MemoryStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.increment_at(key, ttl, Instant::now())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
