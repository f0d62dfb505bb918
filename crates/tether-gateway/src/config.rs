//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Shared secret expected in the `x-webhook-secret` header.
    ///
    /// Webhooks are accepted unauthenticated when unset.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// API key required as a bearer token on user routes.
    ///
    /// User routes are open when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Delay before the startup self-test resolves the default identity.
    #[serde(default = "GatewayConfig::default_self_test_delay")]
    pub self_test_delay_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_max_body() -> usize {
        256 * 1024 // 256 KB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_self_test_delay() -> u64 {
        5
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the self-test delay as a `Duration`.
    #[must_use]
    pub fn self_test_delay(&self) -> Duration {
        Duration::from_secs(self.self_test_delay_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            webhook_secret: None,
            api_key: None,
            self_test_delay_seconds: Self::default_self_test_delay(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("cors_origins", &self.cors_origins)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("self_test_delay_seconds", &self.self_test_delay_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.max_body_bytes, 256 * 1024);
        assert!(config.webhook_secret.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn durations() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.self_test_delay(), Duration::from_secs(5));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"api_key": "k1", "request_timeout_seconds": 5}"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k1"));
        assert_eq!(config.request_timeout_seconds, 5);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn debug_hides_secrets() {
        let config = GatewayConfig {
            webhook_secret: Some("whsec_123".into()),
            api_key: Some("key_456".into()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("whsec_123"));
        assert!(!rendered.contains("key_456"));
        assert!(rendered.contains("<redacted>"));
    }
}
