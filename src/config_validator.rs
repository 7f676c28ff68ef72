use crate::config::{Config, ConfigError, StoreDriver, ThrottlerConfig};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use validator::Validate;

static MIME_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+-]*/[a-z0-9][a-z0-9!#$&^_.+-]*$").unwrap());

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the whole configuration, including the optional sections
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Self::validate_timeout("client.connect_timeout", config.client.connect_timeout)?;
        Self::validate_timeout("client.timeout", config.client.timeout)?;
        Self::validate_timeout("image.transform_timeout", config.image.transform_timeout)?;

        for mime in &config.client.allowed_mime_types {
            Self::validate_mime_type(mime)?;
        }

        if let Some(throttler) = &config.throttler {
            Self::validate_throttler(throttler)?;
        }

        if let Some(firewall) = &config.firewall {
            firewall
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("firewall: {}", e)))?;
            Self::validate_timeout("firewall.request_timeout", firewall.request_timeout)?;
        }

        Ok(())
    }

    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::Invalid("Redis URL cannot be empty".to_string()));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ConfigError::Invalid(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_mime_type(mime: &str) -> Result<(), ConfigError> {
        if !MIME_TYPE.is_match(mime) {
            return Err(ConfigError::Invalid(format!(
                "'{}' is not a valid MIME type",
                mime
            )));
        }
        Ok(())
    }

    fn validate_throttler(throttler: &ThrottlerConfig) -> Result<(), ConfigError> {
        throttler
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("throttler: {}", e)))?;

        if throttler.driver == StoreDriver::Redis {
            Self::validate_redis_url(&throttler.redis_url)?;
        }

        if throttler.window.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "throttler.window must be at least one second".to_string(),
            ));
        }

        if throttler.ban_time.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "throttler.ban_time must be at least one second".to_string(),
            ));
        }

        Self::validate_timeout("throttler.cleanup_interval", throttler.cleanup_interval)?;

        Ok(())
    }

    fn validate_timeout(name: &str, value: Duration) -> Result<(), ConfigError> {
        if value.is_zero() {
            return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FirewallConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_redis_url_ignored_for_memory_driver() {
        let mut config = Config::default();
        config.throttler = Some(ThrottlerConfig {
            driver: StoreDriver::Memory,
            redis_url: String::new(),
            ..ThrottlerConfig::default()
        });
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = Config::default();
        config.throttler = Some(ThrottlerConfig {
            window: Duration::ZERO,
            ..ThrottlerConfig::default()
        });
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let mut config = Config::default();
        config.throttler = Some(ThrottlerConfig {
            driver: StoreDriver::Memory,
            cleanup_interval: Duration::ZERO,
            ..ThrottlerConfig::default()
        });
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("cleanup_interval"));
    }

    #[test]
    fn test_mime_types() {
        assert!(ConfigValidator::validate_mime_type("image/jpeg").is_ok());
        assert!(ConfigValidator::validate_mime_type("image/vnd.microsoft.icon").is_ok());
        assert!(ConfigValidator::validate_mime_type("jpeg").is_err());
    }

    #[test]
    fn test_firewall_requires_credentials() {
        let mut config = Config::default();
        config.firewall = Some(FirewallConfig::default());
        assert!(ConfigValidator::validate(&config).is_err());

        config.firewall = Some(FirewallConfig {
            email: "ops@example.com".to_string(),
            auth_key: "key".to_string(),
            zone_id: "zone".to_string(),
            ..FirewallConfig::default()
        });
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_excessive_redirects_rejected() {
        let mut config = Config::default();
        config.client.max_redirects = 500;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
