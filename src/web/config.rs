//! Web server configuration.

use crate::config::HubConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the web server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Whether to enable CORS
    pub enable_cors: bool,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
    /// Token expected in `Authorization: Bearer <token>`
    pub api_key: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            cors_origins: Vec::new(),
            api_key: String::new(),
        }
    }
}

impl WebConfig {
    /// Create a new web configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Take server, CORS and auth settings from the hub configuration.
    pub fn from_hub_config(config: &HubConfig) -> Self {
        Self::new(&config.server.host, config.server.port)
            .with_cors_origins(config.cors_origins.clone())
            .with_api_key(&config.api_key)
    }

    /// Set the host for the web server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port for the web server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Set the allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Set the API key. A leading `Bearer ` is accepted and stripped.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = api_key
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .unwrap_or(api_key);
        self
    }

    /// Get the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The exact `Authorization` header value clients must send.
    pub fn expected_authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hub_config() {
        let mut hub = HubConfig::default();
        hub.server.port = 6000;
        hub.api_key = "abc".to_string();

        let config = WebConfig::from_hub_config(&hub);
        assert_eq!(config.bind_address(), "0.0.0.0:6000");
        assert_eq!(config.cors_origins, hub.cors_origins);
        assert_eq!(config.expected_authorization(), "Bearer abc");
    }

    #[test]
    fn test_bearer_prefix_stripped() {
        let config = WebConfig::default().with_api_key("Bearer token123");
        assert_eq!(config.api_key, "token123");
        assert_eq!(config.expected_authorization(), "Bearer token123");
    }
}
