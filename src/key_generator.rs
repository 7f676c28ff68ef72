//! Client identity resolution and throttle key naming.

use axum::http::HeaderMap;
use std::net::SocketAddr;

const VIOLATIONS_SUFFIX: &str = ":violations";

/// Builds store keys for a client identity under a configured prefix.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Request counter key, e.g. `images_203.0.113.9`.
    pub fn throttle_key(&self, identity: &str) -> String {
        format!("{}{}", self.prefix, Self::sanitize_key(identity))
    }

    /// Violation counter key used to decide when a ban is issued.
    pub fn violations_key(&self, identity: &str) -> String {
        format!("{}{}", self.throttle_key(identity), VIOLATIONS_SUFFIX)
    }

    /// Resolve the identity a request is throttled and logged under.
    ///
    /// Forwarding headers are only honoured when the service sits behind a
    /// trusted proxy; otherwise they are client controlled.
    pub fn client_identity(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded: bool,
    ) -> String {
        if trust_forwarded {
            if let Some(ip) = Self::extract_forwarded_ip(headers) {
                return ip;
            }
        }

        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// First hop of `X-Forwarded-For`, then `X-Real-IP`.
    pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<String> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|xff| xff.split(',').next())
            .map(|ip| ip.trim())
            .filter(|ip| !ip.is_empty());

        forwarded
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|ip| ip.trim())
                    .filter(|ip| !ip.is_empty())
            })
            .map(str::to_string)
    }

    /// Sanitize key components to ensure valid store keys
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == ':' || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
