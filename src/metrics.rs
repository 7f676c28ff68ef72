use crate::error::ErrorKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct ProxyMetrics {
    pub total_requests: u64,
    pub served_requests: u64,
    pub throttled_requests: u64,
    /// Failures per error kind, throttled requests included.
    pub failures: BTreeMap<&'static str, u64>,
    /// Unix seconds the counters started from.
    pub started_at: u64,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            served_requests: 0,
            throttled_requests: 0,
            failures: BTreeMap::new(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ProxyMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_served(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.served_requests += 1;
    }

    pub async fn record_failure(&self, kind: ErrorKind) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        if kind == ErrorKind::RateExceeded {
            metrics.throttled_requests += 1;
        }
        *metrics.failures.entry(kind.as_str()).or_default() += 1;
    }

    pub async fn snapshot(&self) -> ProxyMetrics {
        self.metrics.read().await.clone()
    }
}
