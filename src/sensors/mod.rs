//! Sensor capability and the built-in sensor families.
//!
//! Every physical sensor family implements [`Sensor`]. The registry and the
//! read coordinator only ever see `Arc<dyn Sensor>`, so adding a family means
//! adding a type here plus a factory entry, nothing else.

pub mod dht22;
pub mod gpio;
pub mod simulated;

pub use dht22::Dht22Sensor;
pub use simulated::SimulatedSensor;

use crate::error::ReadError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl ReadingValue {
    /// Numeric value, if this reading is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ReadingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Measurement name to value.
pub type ReadingData = BTreeMap<String, ReadingValue>;

/// Outcome of one read.
///
/// Built only through [`ReadResult::ok`] and [`ReadResult::failure`], so
/// exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReadingData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReadResult {
    /// A successful reading.
    pub fn ok(data: ReadingData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed reading.
    pub fn failure(error: ReadError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Look up one measurement.
    pub fn value(&self, key: &str) -> Option<&ReadingValue> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}

/// Unit and description of one measurement a sensor produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementInfo {
    pub unit: String,
    pub description: String,
}

impl MeasurementInfo {
    pub fn new(unit: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            description: description.into(),
        }
    }
}

/// Static sensor metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub description: String,
    pub measurements: BTreeMap<String, MeasurementInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    pub enabled: bool,
}

/// The capability shared by every sensor family.
pub trait Sensor: Send + Sync {
    /// Perform exactly one acquisition attempt.
    ///
    /// Blocking. Must not retry and must not panic; hardware faults come back
    /// as a failed [`ReadResult`].
    fn read(&self) -> ReadResult;

    /// Metadata; never touches hardware.
    fn get_info(&self) -> SensorInfo;

    /// Minimum quiet period the device needs between two reads.
    fn min_read_interval(&self) -> Duration {
        Duration::ZERO
    }

    /// Free the hardware handle. Later reads fail instead of touching the pin.
    fn release(&self) {}
}

/// Round to one decimal place, the resolution of the supported devices.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_result_has_only_data() {
        let mut data = ReadingData::new();
        data.insert("temperature_c".to_string(), 21.5.into());
        let result = ReadResult::ok(data);
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(
            result.value("temperature_c").and_then(ReadingValue::as_f64),
            Some(21.5)
        );
    }

    #[test]
    fn test_failure_result_has_only_error() {
        let result = ReadResult::failure(ReadError::transient("bus busy"));
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("Transient read error: bus busy")
        );
    }

    #[test]
    fn test_result_json_shape() {
        let result = ReadResult::failure(ReadError::transient("nope"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_reading_value_untagged() {
        let number = serde_json::to_string(&ReadingValue::Number(40.1)).unwrap();
        let text = serde_json::to_string(&ReadingValue::from("ok")).unwrap();
        assert_eq!(number, "40.1");
        assert_eq!(text, "\"ok\"");
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(21.46), 21.5);
        assert_eq!(round1(-3.04), -3.0);
    }
}
