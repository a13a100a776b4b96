//! Sensor registry: turns configuration specs into live sensor instances.
//!
//! Building happens in two passes. The first validates every enabled spec and
//! fails the whole build on configuration mistakes. The second acquires
//! hardware; a sensor whose hardware cannot be claimed is left out and
//! recorded as a warning, and the rest of the registry is still usable.
//!
//! After [`RegistryBuilder::build`] returns, the registry is never mutated, so
//! lookups need no locking.

use crate::config::SensorSpec;
use crate::error::{HubError, Result};
use crate::sensors::dht22::DHT22_TYPE;
use crate::sensors::gpio::{BcmPin, PinClaims};
use crate::sensors::simulated::SIMULATED_TYPE;
use crate::sensors::{Dht22Sensor, Sensor, SensorInfo, SimulatedSensor};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handle to a sensor instance.
pub type SensorHandle = Arc<dyn Sensor>;

type BuildFn = dyn Fn(&SensorSpec, &mut PinClaims) -> Result<SensorHandle> + Send + Sync;

/// Knows how to construct one sensor family.
pub struct SensorFactory {
    type_name: String,
    requires_pin: bool,
    build: Box<BuildFn>,
}

impl SensorFactory {
    pub fn new<F>(type_name: impl Into<String>, requires_pin: bool, build: F) -> Self
    where
        F: Fn(&SensorSpec, &mut PinClaims) -> Result<SensorHandle> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            requires_pin,
            build: Box::new(build),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn matches(&self, sensor_type: &str) -> bool {
        self.type_name.eq_ignore_ascii_case(sensor_type.trim())
    }
}

/// A sensor left out of the registry because its hardware could not be claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareInitWarning {
    pub sensor_id: String,
    pub reason: String,
}

/// Builds a [`SensorRegistry`] from a factory table.
pub struct RegistryBuilder {
    factories: Vec<SensorFactory>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::empty()
            .register(SensorFactory::new(DHT22_TYPE, true, |spec, claims| {
                Ok(Arc::new(Dht22Sensor::open(spec, claims)?) as SensorHandle)
            }))
            .register(SensorFactory::new(SIMULATED_TYPE, false, |spec, _| {
                Ok(Arc::new(SimulatedSensor::new(spec)) as SensorHandle)
            }))
    }
}

impl RegistryBuilder {
    /// A builder that knows no sensor types at all.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Add (or replace) the factory for a sensor type.
    pub fn register(mut self, factory: SensorFactory) -> Self {
        self.factories
            .retain(|existing| !existing.matches(&factory.type_name));
        self.factories.push(factory);
        self
    }

    /// Sensor types this builder can construct.
    pub fn known_types(&self) -> Vec<&str> {
        self.factories.iter().map(SensorFactory::type_name).collect()
    }

    fn factory_for(&self, sensor_type: &str) -> Option<&SensorFactory> {
        self.factories.iter().find(|f| f.matches(sensor_type))
    }

    /// Validate all specs, then instantiate the enabled ones.
    pub fn build(&self, specs: &[SensorSpec]) -> Result<SensorRegistry> {
        self.validate(specs)?;

        let mut claims = PinClaims::new();
        let mut sensors = Vec::new();
        let mut warnings = Vec::new();

        for spec in specs {
            if !spec.enabled {
                info!("Skipping disabled sensor: {}", spec.id);
                continue;
            }

            // validate() guarantees a factory exists
            let Some(factory) = self.factory_for(&spec.sensor_type) else {
                continue;
            };

            match (factory.build)(spec, &mut claims) {
                Ok(sensor) => {
                    info!("Loaded sensor: {} ({})", spec.id, factory.type_name);
                    sensors.push(RegisteredSensor {
                        spec: spec.clone(),
                        sensor,
                    });
                }
                Err(HubError::HardwareInit { sensor_id, reason }) => {
                    warn!("Failed to load sensor {}: {}", sensor_id, reason);
                    warnings.push(HardwareInitWarning { sensor_id, reason });
                }
                Err(e @ HubError::Config(_)) => return Err(e),
                Err(e) => {
                    warn!("Failed to load sensor {}: {}", spec.id, e);
                    warnings.push(HardwareInitWarning {
                        sensor_id: spec.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let index = sensors
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.spec.id.clone(), i))
            .collect();

        Ok(SensorRegistry {
            sensors,
            index,
            warnings,
        })
    }

    fn validate(&self, specs: &[SensorSpec]) -> Result<()> {
        let mut seen = HashSet::new();

        for spec in specs.iter().filter(|spec| spec.enabled) {
            if spec.id.trim().is_empty() {
                return Err(HubError::config_error("Sensor spec is missing an id"));
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(HubError::config_error(format!(
                    "Duplicate sensor id: '{}'",
                    spec.id
                )));
            }

            let factory = self.factory_for(&spec.sensor_type).ok_or_else(|| {
                HubError::config_error(format!(
                    "Sensor '{}' has unknown type '{}' (known: {})",
                    spec.id,
                    spec.sensor_type,
                    self.known_types().join(", ")
                ))
            })?;

            if factory.requires_pin {
                match spec.pin.as_deref().map(str::trim) {
                    Some(pin) if !pin.is_empty() => {
                        BcmPin::parse(pin)?;
                    }
                    _ => {
                        return Err(HubError::config_error(format!(
                            "Sensor '{}' of type {} requires a pin",
                            spec.id, factory.type_name
                        )))
                    }
                }
            }
        }

        Ok(())
    }
}

/// A live sensor together with the spec it was built from.
pub struct RegisteredSensor {
    spec: SensorSpec,
    sensor: SensorHandle,
}

impl std::fmt::Debug for RegisteredSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSensor")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl RegisteredSensor {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    pub fn sensor(&self) -> &SensorHandle {
        &self.sensor
    }

    /// The unit reads are serialized on: the shared bus if any, else the sensor.
    pub fn lock_key(&self) -> String {
        match &self.spec.bus {
            Some(bus) => format!("bus:{}", bus),
            None => format!("sensor:{}", self.spec.id),
        }
    }
}

/// Id-keyed collection of live sensors, in configuration order.
pub struct SensorRegistry {
    sensors: Vec<RegisteredSensor>,
    index: HashMap<String, usize>,
    warnings: Vec<HardwareInitWarning>,
}

impl SensorRegistry {
    /// Build with the built-in sensor types.
    pub fn build(specs: &[SensorSpec]) -> Result<Self> {
        RegistryBuilder::default().build(specs)
    }

    /// Look up a sensor by id.
    pub fn get(&self, id: &str) -> Result<&RegisteredSensor> {
        self.index
            .get(id)
            .map(|&i| &self.sensors[i])
            .ok_or_else(|| HubError::not_found(id))
    }

    /// Metadata for every registered sensor, in configuration order.
    pub fn list(&self) -> Vec<SensorInfo> {
        self.sensors.iter().map(|s| s.sensor.get_info()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSensor> {
        self.sensors.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sensors.iter().map(RegisteredSensor::id).collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Sensors that were configured but could not be brought up.
    pub fn warnings(&self) -> &[HardwareInitWarning] {
        &self.warnings
    }

    /// Release every sensor's hardware handle.
    pub fn shutdown(&self) {
        for entry in &self.sensors {
            entry.sensor.release();
        }
        info!("Released {} sensor(s)", self.sensors.len());
    }
}
