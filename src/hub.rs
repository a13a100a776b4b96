//! The sensor hub façade used by the HTTP layer and the CLI.

use crate::config::HubConfig;
use crate::coordinator::{ReadCoordinator, ReadPolicy};
use crate::error::Result;
use crate::health::{HealthAggregator, HealthReport};
use crate::registry::{HardwareInitWarning, RegistryBuilder, SensorRegistry};
use crate::sensors::dht22::DHT22_TYPE;
use crate::sensors::{ReadResult, SensorInfo};
use std::sync::Arc;
use tracing::{info, warn};

/// Registry, coordinator and health aggregator wired together.
pub struct SensorHub {
    registry: Arc<SensorRegistry>,
    coordinator: Arc<ReadCoordinator>,
    health: HealthAggregator,
    legacy_sensor: Option<String>,
}

impl SensorHub {
    /// Wrap an already built registry.
    pub fn new(registry: SensorRegistry, policy: ReadPolicy) -> Self {
        let registry = Arc::new(registry);
        let coordinator = Arc::new(ReadCoordinator::new(&registry, policy));
        let health = HealthAggregator::new(registry.clone(), coordinator.clone());

        Self {
            registry,
            coordinator,
            health,
            legacy_sensor: None,
        }
    }

    /// Build everything from configuration with the built-in sensor types.
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        Self::from_config_with(config, &RegistryBuilder::default())
    }

    /// Build from configuration with a caller-supplied factory table.
    pub fn from_config_with(config: &HubConfig, builder: &RegistryBuilder) -> Result<Self> {
        config.validate()?;
        let registry = builder.build(&config.sensors)?;

        for warning in registry.warnings() {
            warn!(
                "Sensor {} unavailable: {}",
                warning.sensor_id, warning.reason
            );
        }
        info!("Sensor Hub initialized with {} sensor(s)", registry.len());

        let hub = Self::new(registry, config.read_policy.clone())
            .with_legacy_sensor(config.legacy_sensor.clone());
        if let Some(id) = hub.unregistered_legacy_sensor() {
            warn!(
                "legacy_sensor '{}' is not a registered sensor; the legacy endpoint will return 404",
                id
            );
        }
        Ok(hub)
    }

    /// Pin the sensor served by the legacy endpoint.
    pub fn with_legacy_sensor(mut self, sensor_id: Option<String>) -> Self {
        self.legacy_sensor = sensor_id;
        self
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &ReadCoordinator {
        &self.coordinator
    }

    pub fn warnings(&self) -> &[HardwareInitWarning] {
        self.registry.warnings()
    }

    /// Metadata for every sensor, in configuration order.
    pub fn list_sensors(&self) -> Vec<SensorInfo> {
        self.registry.list()
    }

    /// Coordinated read of one sensor.
    pub async fn read_sensor(&self, id: &str) -> Result<ReadResult> {
        let entry = self.registry.get(id)?;
        Ok(self.coordinator.coordinated_read(entry).await)
    }

    /// Metadata of one sensor.
    pub fn sensor_info(&self, id: &str) -> Result<SensorInfo> {
        Ok(self.registry.get(id)?.sensor().get_info())
    }

    /// Read every sensor and reduce to a verdict.
    pub async fn health(&self) -> HealthReport {
        self.health.aggregate().await
    }

    /// Sensor behind the legacy endpoint: the configured one, else the first DHT22.
    pub fn legacy_sensor_id(&self) -> Option<String> {
        self.legacy_sensor.clone().or_else(|| {
            self.registry
                .iter()
                .find(|entry| entry.spec().sensor_type.eq_ignore_ascii_case(DHT22_TYPE))
                .map(|entry| entry.id().to_string())
        })
    }

    /// The configured legacy sensor id, when no registered sensor carries it.
    pub fn unregistered_legacy_sensor(&self) -> Option<&str> {
        self.legacy_sensor
            .as_deref()
            .filter(|id| self.registry.get(id).is_err())
    }

    /// Release all hardware handles.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        info!("Sensor Hub shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorSpec;
    use crate::sensors::simulated::SIMULATED_TYPE;

    fn config(sensors: Vec<SensorSpec>) -> HubConfig {
        HubConfig {
            sensors,
            ..HubConfig::default()
        }
    }

    #[tokio::test]
    async fn test_read_and_info() {
        let hub = SensorHub::from_config(&config(vec![SensorSpec::new("sim", SIMULATED_TYPE)]))
            .unwrap();

        assert!(hub.read_sensor("sim").await.unwrap().success);
        assert_eq!(hub.sensor_info("sim").unwrap().sensor_id, "sim");
        assert_eq!(hub.list_sensors().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let hub = SensorHub::from_config(&config(Vec::new())).unwrap();
        assert!(hub.read_sensor("nope").await.unwrap_err().is_not_found());
        assert!(hub.sensor_info("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_legacy_sensor_configured() {
        let hub = SensorHub::from_config(&config(vec![SensorSpec::new("sim", SIMULATED_TYPE)]))
            .unwrap()
            .with_legacy_sensor(Some("sim".to_string()));
        assert_eq!(hub.legacy_sensor_id().as_deref(), Some("sim"));
    }

    #[test]
    fn test_unregistered_legacy_sensor_is_detected() {
        let mut hub_config = config(vec![
            SensorSpec::new("sim", SIMULATED_TYPE),
            SensorSpec::new("off", SIMULATED_TYPE).with_enabled(false),
        ]);
        hub_config.legacy_sensor = Some("off".to_string());

        let hub = SensorHub::from_config(&hub_config).unwrap();
        assert_eq!(hub.unregistered_legacy_sensor(), Some("off"));

        let hub = hub.with_legacy_sensor(Some("sim".to_string()));
        assert_eq!(hub.unregistered_legacy_sensor(), None);
    }

    #[test]
    fn test_no_legacy_sensor_without_dht22() {
        let hub = SensorHub::from_config(&config(vec![SensorSpec::new("sim", SIMULATED_TYPE)]))
            .unwrap();
        assert_eq!(hub.legacy_sensor_id(), None);
    }
}
