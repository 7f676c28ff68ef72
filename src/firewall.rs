//! Network-level bans through an external firewall API.
//!
//! Ban directives are dispatched on a detached task with a per-attempt
//! timeout and a bounded number of attempts. Failures are logged and
//! swallowed; the admission decision never waits for the firewall.

use crate::config::FirewallConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    #[error("firewall request failed: {0}")]
    Request(String),

    #[error("firewall rejected rule with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("firewall request timed out")]
    Timeout,
}

/// Request to block a client identity at the network edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanDirective {
    pub identity: String,
    pub reason: String,
    pub duration: Duration,
}

impl BanDirective {
    /// Unix timestamp at which the ban is meant to lapse.
    pub fn expires_at(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(self.duration)
            .as_secs()
    }
}

#[async_trait]
pub trait Firewall: Send + Sync {
    async fn block(&self, directive: &BanDirective) -> Result<(), FirewallError>;
}

/// Used when no firewall is configured: bans are recorded in the log only.
pub struct LogOnlyFirewall;

#[async_trait]
impl Firewall for LogOnlyFirewall {
    async fn block(&self, directive: &BanDirective) -> Result<(), FirewallError> {
        info!(
            identity = %directive.identity,
            reason = %directive.reason,
            "Ban directive issued without a configured firewall"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AccessRule<'a> {
    mode: &'a str,
    configuration: RuleTarget<'a>,
    notes: String,
}

#[derive(Debug, Serialize)]
struct RuleTarget<'a> {
    target: &'static str,
    value: &'a str,
}

/// Cloudflare zone firewall access rules.
pub struct CloudflareFirewall {
    client: reqwest::Client,
    config: FirewallConfig,
}

impl CloudflareFirewall {
    pub fn new(config: FirewallConfig) -> Result<Self, FirewallError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FirewallError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn rules_url(&self) -> String {
        format!(
            "{}/zones/{}/firewall/access_rules/rules",
            self.config.api_base.trim_end_matches('/'),
            self.config.zone_id
        )
    }
}

fn rule_target(identity: &str) -> &'static str {
    match identity.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => "ip6",
        _ => "ip",
    }
}

#[async_trait]
impl Firewall for CloudflareFirewall {
    async fn block(&self, directive: &BanDirective) -> Result<(), FirewallError> {
        let rule = AccessRule {
            mode: &self.config.mode,
            configuration: RuleTarget {
                target: rule_target(&directive.identity),
                value: &directive.identity,
            },
            notes: format!(
                "Banned until {}: {}",
                directive.expires_at(),
                directive.reason
            ),
        };

        let response = self
            .client
            .post(self.rules_url())
            .header("X-Auth-Email", &self.config.email)
            .header("X-Auth-Key", &self.config.auth_key)
            .json(&rule)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FirewallError::Timeout
                } else {
                    FirewallError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FirewallError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Fire-and-forget front for a [`Firewall`].
#[derive(Clone)]
pub struct BanDispatcher {
    firewall: Arc<dyn Firewall>,
    attempt_timeout: Duration,
    max_attempts: u32,
}

impl BanDispatcher {
    pub fn new(firewall: Arc<dyn Firewall>, attempt_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            firewall,
            attempt_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: Option<&FirewallConfig>) -> Result<Self, FirewallError> {
        match config {
            Some(config) => Ok(Self::new(
                Arc::new(CloudflareFirewall::new(config.clone())?),
                config.request_timeout,
                config.max_attempts,
            )),
            None => Ok(Self::new(Arc::new(LogOnlyFirewall), Duration::from_secs(5), 1)),
        }
    }

    /// Spawn the ban on a detached task and return immediately.
    pub fn dispatch(&self, directive: BanDirective) -> tokio::task::JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(&directive).await })
    }

    /// Deliver with bounded retries; returns whether the firewall accepted the rule.
    pub async fn deliver(&self, directive: &BanDirective) -> bool {
        for attempt in 1..=self.max_attempts {
            let result = tokio::time::timeout(self.attempt_timeout, self.firewall.block(directive))
                .await
                .unwrap_or(Err(FirewallError::Timeout));

            match result {
                Ok(()) => {
                    info!(identity = %directive.identity, attempt, "Client banned at firewall");
                    return true;
                }
                Err(e) => {
                    warn!(
                        identity = %directive.identity,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Firewall ban attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records directives and fails the first `failures` calls.
    #[derive(Default)]
    pub struct RecordingFirewall {
        pub calls: Mutex<Vec<BanDirective>>,
        pub failures: Mutex<u32>,
    }

    #[async_trait]
    impl Firewall for RecordingFirewall {
        async fn block(&self, directive: &BanDirective) -> Result<(), FirewallError> {
            self.calls.lock().unwrap().push(directive.clone());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(FirewallError::Request("simulated outage".to_string()));
            }
            Ok(())
        }
    }

    struct HangingFirewall;

    #[async_trait]
    impl Firewall for HangingFirewall {
        async fn block(&self, _directive: &BanDirective) -> Result<(), FirewallError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn directive() -> BanDirective {
        BanDirective {
            identity: "203.0.113.9".to_string(),
            reason: "rate limit exceeded".to_string(),
            duration: Duration::from_secs(3600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let firewall = Arc::new(RecordingFirewall::default());
        *firewall.failures.lock().unwrap() = 2;
        let dispatcher = BanDispatcher::new(firewall.clone(), Duration::from_secs(1), 3);

        assert!(dispatcher.dispatch(directive()).await.unwrap());
        assert_eq!(firewall.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let firewall = Arc::new(RecordingFirewall::default());
        *firewall.failures.lock().unwrap() = 10;
        let dispatcher = BanDispatcher::new(firewall.clone(), Duration::from_secs(1), 2);

        assert!(!dispatcher.deliver(&directive()).await);
        assert_eq!(firewall.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_firewall_is_bounded() {
        let dispatcher = BanDispatcher::new(Arc::new(HangingFirewall), Duration::from_secs(1), 2);
        assert!(!dispatcher.deliver(&directive()).await);
    }

    #[test]
    fn test_rule_target_by_address_family() {
        assert_eq!(rule_target("198.51.100.1"), "ip");
        assert_eq!(rule_target("2001:db8::1"), "ip6");
    }

    #[tokio::test]
    async fn test_cloudflare_rule_request() {
        use axum::extract::Json;
        use axum::http::HeaderMap;
        use axum::routing::post;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(HeaderMap, serde_json::Value)>();
        let app = axum::Router::new().route(
            "/zones/zone123/firewall/access_rules/rules",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((headers, body));
                    Json(serde_json::json!({ "success": true }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let firewall = CloudflareFirewall::new(FirewallConfig {
            email: "ops@example.com".to_string(),
            auth_key: "secret".to_string(),
            zone_id: "zone123".to_string(),
            api_base: format!("http://{}/", addr),
            ..FirewallConfig::default()
        })
        .unwrap();

        firewall.block(&directive()).await.unwrap();

        let (headers, body) = rx.recv().await.unwrap();
        assert_eq!(headers["x-auth-email"], "ops@example.com");
        assert_eq!(headers["x-auth-key"], "secret");
        assert_eq!(body["mode"], "block");
        assert_eq!(body["configuration"]["target"], "ip");
        assert_eq!(body["configuration"]["value"], "203.0.113.9");
        assert!(body["notes"].as_str().unwrap().starts_with("Banned until "));
    }
}
