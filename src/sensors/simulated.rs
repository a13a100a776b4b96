//! Simulated temperature/humidity sensor for development machines.
//!
//! Produces slowly drifting values derived from the wall clock, so dashboards
//! have something plausible to draw when no GPIO header is present.

use super::{round1, MeasurementInfo, ReadResult, ReadingData, Sensor, SensorInfo};
use crate::config::SensorSpec;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

/// Type name used in configuration.
pub const SIMULATED_TYPE: &str = "SIMULATED";

const PERIOD_SECONDS: f64 = 600.0;

/// A sensor that needs no hardware.
pub struct SimulatedSensor {
    id: String,
    name: String,
    bus: Option<String>,
}

impl SimulatedSensor {
    pub fn new(spec: &SensorSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.display_name().to_string(),
            bus: spec.bus.clone(),
        }
    }

    /// Readings this sensor reports at `at`.
    pub fn reading_at(&self, at: DateTime<Utc>) -> ReadingData {
        let phase = (at.timestamp_millis() as f64 / 1000.0) / PERIOD_SECONDS * TAU;
        let temperature = 21.0 + 2.5 * phase.sin();
        let humidity = 45.0 + 7.5 * phase.cos();

        let mut data = ReadingData::new();
        data.insert("temperature_c".to_string(), round1(temperature).into());
        data.insert("humidity".to_string(), round1(humidity).into());
        data
    }
}

impl Sensor for SimulatedSensor {
    fn read(&self) -> ReadResult {
        ReadResult::ok(self.reading_at(Utc::now()))
    }

    fn get_info(&self) -> SensorInfo {
        let mut measurements = BTreeMap::new();
        measurements.insert(
            "temperature_c".to_string(),
            MeasurementInfo::new("°C", "Simulated temperature in Celsius"),
        );
        measurements.insert(
            "humidity".to_string(),
            MeasurementInfo::new("%", "Simulated relative humidity"),
        );

        SensorInfo {
            sensor_id: self.id.clone(),
            name: self.name.clone(),
            sensor_type: SIMULATED_TYPE.to_string(),
            description: "Simulated temperature and humidity sensor".to_string(),
            measurements,
            pin: None,
            bus: self.bus.clone(),
            enabled: true,
        }
    }
}
