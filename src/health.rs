use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use serde::{Deserialize, Serialize};

use crate::throttler::Throttler;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub throttle_store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub backend: Option<String>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    throttler: Option<Arc<Throttler>>,
}

impl HealthChecker {
    pub fn new(throttler: Option<Arc<Throttler>>) -> Self {
        std::sync::LazyLock::force(&START_TIME);
        Self { throttler }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let store_status = self.check_store().await;

        let overall_status = if store_status.status == "unavailable" {
            // Throttling fails open, images are still served
            "degraded"
        } else {
            "healthy"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                throttle_store: store_status,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        let Some(throttler) = &self.throttler else {
            return ServiceStatus {
                status: "disabled".to_string(),
                backend: None,
                response_time_ms: 0,
                error: None,
            };
        };

        let start = Instant::now();
        let result = tokio::time::timeout(PING_TIMEOUT, throttler.ping()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;
        let backend = Some(throttler.store_name().to_string());

        match result {
            Ok(Ok(())) => ServiceStatus {
                status: "healthy".to_string(),
                backend,
                response_time_ms,
                error: None,
            },
            Ok(Err(e)) => ServiceStatus {
                status: "unavailable".to_string(),
                backend,
                response_time_ms,
                error: Some(e.to_string()),
            },
            Err(_) => ServiceStatus {
                status: "unavailable".to_string(),
                backend,
                response_time_ms,
                error: Some(format!("no answer within {:?}", PING_TIMEOUT)),
            },
        }
    }
}
