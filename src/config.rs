//! Configuration management.
//!
//! The hub is configured from a single YAML file read once at startup. A
//! handful of environment variables override file values so the same file can
//! be shipped to several boards.

use crate::coordinator::ReadPolicy;
use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Configuration file used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// One configured physical sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Unique identifier, used in URLs
    pub id: String,

    /// Sensor family, e.g. "DHT22"
    #[serde(rename = "type")]
    pub sensor_type: String,

    /// Human-readable name; falls back to the id
    #[serde(default)]
    pub name: String,

    /// Disabled specs are skipped at registry build time
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// GPIO pin name for pin-based sensors ("D4", "GPIO4", "4")
    #[serde(default)]
    pub pin: Option<String>,

    /// Shared bus name; sensors on the same bus never read concurrently
    #[serde(default)]
    pub bus: Option<String>,
}

impl SensorSpec {
    /// Create an enabled spec with the given id and type.
    pub fn new(id: impl Into<String>, sensor_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sensor_type: sensor_type.into(),
            name: String::new(),
            enabled: true,
            pin: None,
            bus: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the GPIO pin.
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Set the shared bus.
    pub fn with_bus(mut self, bus: impl Into<String>) -> Self {
        self.bus = Some(bus.into());
        self
    }

    /// Enable or disable the sensor.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The name shown to clients.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Bearer token expected on `/api/*` requests
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Sensors, in listing order
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,

    /// Retry/timeout policy for hardware reads
    #[serde(default)]
    pub read_policy: ReadPolicy,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Sensor served by the historical `/api/temp-and-humid-sensor` endpoint
    #[serde(default)]
    pub legacy_sensor: Option<String>,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    crate::DEFAULT_WEB_PORT
}

fn default_api_key() -> String {
    "your_secret_api_key".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://192.168.50.42:3000".to_string(),
        "https://kurisu.noatorie.com".to_string(),
    ]
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            cors_origins: default_cors_origins(),
            sensors: Vec::new(),
            read_policy: ReadPolicy::default(),
            server: ServerConfig::default(),
            legacy_sensor: None,
        }
    }
}

impl HubConfig {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parses and validates configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: HubConfig = serde_yaml::from_str(content)
            .map_err(|e| HubError::config_error(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that cannot work at all.
    pub fn validate(&self) -> Result<()> {
        self.read_policy.validate()?;
        if self.api_key.trim().is_empty() {
            return Err(HubError::config_error("api_key must not be empty"));
        }
        Ok(())
    }

    /// Applies `API_KEY`, `HOST` and `PORT` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("API_KEY") {
            self.api_key = api_key;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| HubError::config_error(format!("Invalid PORT value: {}", port)))?;
        }
        self.validate()
    }

    /// Enabled sensor specs, in configuration order.
    pub fn enabled_sensors(&self) -> impl Iterator<Item = &SensorSpec> {
        self.sensors.iter().filter(|spec| spec.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Backoff;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
api_key: "s3cret"
cors_origins:
  - "http://dashboard.local:3000"
legacy_sensor: living_room
read_policy:
  max_attempts: 5
  backoff: linear
sensors:
  - id: living_room
    type: DHT22
    name: Living Room
    pin: D4
  - id: garage
    type: DHT22
    enabled: false
    pin: D17
"#;

    #[test]
    fn test_parse_sample() {
        let config = HubConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.api_key, "s3cret");
        assert_eq!(config.cors_origins, vec!["http://dashboard.local:3000"]);
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[0].sensor_type, "DHT22");
        assert_eq!(config.sensors[0].pin.as_deref(), Some("D4"));
        assert!(!config.sensors[1].enabled);
        assert_eq!(config.read_policy.max_attempts, 5);
        assert_eq!(config.read_policy.backoff, Backoff::Linear);
        assert_eq!(config.legacy_sensor.as_deref(), Some("living_room"));
        assert_eq!(config.enabled_sensors().count(), 1);
    }

    #[test]
    fn test_defaults_for_empty_file() {
        let config = HubConfig::from_yaml("{}").unwrap();
        assert!(config.sensors.is_empty());
        assert_eq!(config.server.port, crate::DEFAULT_WEB_PORT);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.read_policy, ReadPolicy::default());
        assert_eq!(
            config.cors_origins,
            vec![
                "http://localhost:3000",
                "http://192.168.50.42:3000",
                "https://kurisu.noatorie.com",
            ]
        );
    }

    #[test]
    fn test_spec_defaults() {
        let spec: SensorSpec = serde_yaml::from_str("id: probe\ntype: SIMULATED").unwrap();
        assert!(spec.enabled);
        assert!(spec.pin.is_none());
        assert_eq!(spec.display_name(), "probe");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = HubConfig::from_yaml("read_policy:\n  max_attempts: 0\n");
        assert!(matches!(result, Err(HubError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [("API_KEY", "from-env"), ("PORT", "8081")]
            .into_iter()
            .collect();
        let mut config = HubConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = HubConfig::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = HubConfig::load("/nonexistent/sensor_hub.yaml");
        match result {
            Err(HubError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected an I/O error, got {:?}", other.map(|_| ())),
        }
    }
}
