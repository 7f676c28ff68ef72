use crate::config::{FailMode, StoreDriver, ThrottlerConfig};
use crate::firewall::{BanDirective, BanDispatcher};
use crate::key_generator::KeyGenerator;
use crate::store::{self, MemoryStore, StoreError, ThrottleStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const BAN_REASON: &str = "Exceeded the image proxy request rate";

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Throttled,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        self == Admission::Allowed
    }
}

/// Admission controller: fixed window request counting per client identity
/// with escalation to firewall bans.
pub struct Throttler {
    store: Arc<dyn ThrottleStore>,
    keys: KeyGenerator,
    config: ThrottlerConfig,
    whitelist: HashSet<String>,
    bans: BanDispatcher,
    memory: Option<MemoryStore>,
}

impl Throttler {
    pub fn new(store: Arc<dyn ThrottleStore>, config: ThrottlerConfig, bans: BanDispatcher) -> Self {
        Self {
            store,
            keys: KeyGenerator::new(config.prefix.clone()),
            whitelist: config.whitelist.iter().cloned().collect(),
            config,
            bans,
            memory: None,
        }
    }

    /// Build the throttler and its configured store backend.
    pub fn from_config(config: ThrottlerConfig, bans: BanDispatcher) -> Result<Self, StoreError> {
        match config.driver {
            StoreDriver::Memory => {
                let memory = MemoryStore::new();
                let mut throttler = Self::new(Arc::new(memory.clone()), config, bans);
                throttler.memory = Some(memory);
                Ok(throttler)
            }
            StoreDriver::Redis => {
                let store = store::from_config(&config)?;
                Ok(Self::new(store, config, bans))
            }
        }
    }

    /// Decide whether a request from `identity` may proceed.
    ///
    /// Never fails: store errors are resolved by the configured fail mode.
    pub async fn admit(&self, identity: &str) -> Admission {
        if self.whitelist.contains(identity) {
            debug!(identity = %identity, "Whitelisted client bypasses throttling");
            return Admission::Allowed;
        }

        match self.check(identity).await {
            Ok(admission) => admission,
            Err(e) => match self.config.fail_mode {
                FailMode::Open => {
                    warn!(
                        identity = %identity,
                        store = self.store.name(),
                        error = %e,
                        "Throttle store failed, admitting request"
                    );
                    Admission::Allowed
                }
                FailMode::Closed => {
                    warn!(
                        identity = %identity,
                        store = self.store.name(),
                        error = %e,
                        "Throttle store failed, rejecting request"
                    );
                    Admission::Throttled
                }
            },
        }
    }

    async fn check(&self, identity: &str) -> Result<Admission, StoreError> {
        let count = self
            .store
            .increment(&self.keys.throttle_key(identity), self.config.window)
            .await?;

        if count <= self.config.allowed_requests {
            return Ok(Admission::Allowed);
        }

        let violations = self
            .store
            .increment(&self.keys.violations_key(identity), self.config.ban_time)
            .await?;

        debug!(
            identity = %identity,
            count,
            violations,
            "Request rate exceeded"
        );

        if violations == self.config.ban_after {
            info!(
                identity = %identity,
                violations,
                ban_time = ?self.config.ban_time,
                "Escalating to firewall ban"
            );
            self.bans.dispatch(BanDirective {
                identity: identity.to_string(),
                reason: BAN_REASON.to_string(),
                duration: self.config.ban_time,
            });
        }

        Ok(Admission::Throttled)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Periodically purge expired counters of a process-local store.
    /// Shared stores expire keys themselves, so nothing is spawned for them.
    pub fn spawn_cleanup(&self) -> Option<JoinHandle<()>> {
        let memory = self.memory.clone()?;
        let period = self.config.cleanup_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match memory.purge_expired() {
                    Ok(removed) if removed > 0 => {
                        debug!(removed, "Purged expired throttle counters")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Throttle counter cleanup failed"),
                }
            }
        }))
    }
}
