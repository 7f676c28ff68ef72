use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration, built once at start-up and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Server bind address
    pub bind_addr: SocketAddr,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    /// Use `X-Forwarded-For` / `X-Real-IP` as the client identity
    pub trust_forwarded_headers: bool,

    #[validate(nested)]
    pub client: FetchConfig,

    #[validate(nested)]
    pub image: ImageConfig,

    /// Admission control; `None` disables throttling entirely
    pub throttler: Option<ThrottlerConfig>,

    /// Firewall control plane; `None` means ban directives are only logged
    pub firewall: Option<FirewallConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            trust_forwarded_headers: false,
            client: FetchConfig::default(),
            image: ImageConfig::default(),
            throttler: None,
            firewall: None,
        }
    }
}

/// Limits applied to every origin fetch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FetchConfig {
    #[validate(length(min = 1))]
    pub user_agent: String,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Byte ceiling for a download, 0 = unlimited
    pub max_image_size: u64,

    #[validate(range(max = 50))]
    pub max_redirects: u32,

    /// Empty list allows every MIME type
    pub allowed_mime_types: Vec<String>,

    /// Treat loopback/private/link-local targets as unresolvable
    pub block_private_networks: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; ImageFetcher/1.0; +https://github.com/yourusername/image-proxy)"
                .to_string(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            max_image_size: 0,
            max_redirects: 10,
            allowed_mime_types: Vec::new(),
            block_private_networks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ImageConfig {
    /// Largest width*height accepted for a decoded source or a resize target
    #[validate(range(min = 1))]
    pub max_pixels: u64,

    /// Hard ceiling for either side of a decoded raster
    #[validate(range(min = 1))]
    pub max_dimension: u32,

    #[serde(with = "humantime_serde")]
    pub transform_timeout: Duration,

    #[validate(range(max = 100))]
    pub default_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_pixels: 71_000_000,
            max_dimension: 65_535,
            transform_timeout: Duration::from_secs(30),
            default_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    Redis,
    Memory,
}

/// What admission control does when the shared store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ThrottlerConfig {
    pub driver: StoreDriver,

    pub redis_url: String,

    /// Requests allowed per identity per window
    #[validate(range(min = 1))]
    pub allowed_requests: u64,

    #[serde(with = "humantime_serde")]
    pub window: Duration,

    pub prefix: String,

    /// Violations within `ban_time` before a ban directive is sent
    #[validate(range(min = 1))]
    pub ban_after: u64,

    #[serde(with = "humantime_serde")]
    pub ban_time: Duration,

    pub fail_mode: FailMode,

    /// Identities that bypass admission control
    pub whitelist: Vec<String>,

    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            allowed_requests: 700,
            window: Duration::from_secs(3 * 60),
            prefix: "images_".to_string(),
            ban_after: 1,
            ban_time: Duration::from_secs(60 * 60),
            fail_mode: FailMode::Open,
            whitelist: Vec::new(),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FirewallConfig {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub auth_key: String,

    #[validate(length(min = 1))]
    pub zone_id: String,

    /// Cloudflare access rule mode, e.g. `block` or `challenge`
    pub mode: String,

    pub api_base: String,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            auth_key: String::new(),
            zone_id: String::new(),
            mode: "block".to_string(),
            api_base: "https://api.cloudflare.com/client/v4".to_string(),
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then an optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("BIND_ADDR") {
            self.bind_addr = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "BIND_ADDR",
                value: value.clone(),
            })?;
        }
        if let Ok(value) = std::env::var("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Ok(value) = std::env::var("REDIS_URL") {
            self.throttler
                .get_or_insert_with(ThrottlerConfig::default)
                .redis_url = value;
        }
        Ok(())
    }
}
