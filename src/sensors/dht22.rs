//! DHT22 (AM2302) temperature and humidity sensor.
//!
//! The device speaks a single-wire protocol: the host holds the line low for
//! at least 1ms, releases it, and the sensor answers with an 80us low / 80us
//! high preamble followed by 40 bits. Each bit is a ~50us low followed by a
//! high pulse whose width encodes the value (~27us for 0, ~70us for 1).
//!
//! Frame layout: humidity (u16, tenths of %RH), temperature (15-bit magnitude
//! in tenths of °C, top bit is the sign), checksum (low byte of the sum of the
//! four data bytes).

use super::gpio::{open_data_line, BcmPin, DataLine, PinClaims};
use super::{round1, MeasurementInfo, ReadResult, ReadingData, Sensor, SensorInfo};
use crate::config::SensorSpec;
use crate::error::{HubError, ReadError, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Type name used in configuration.
pub const DHT22_TYPE: &str = "DHT22";

/// The device returns stale or garbage data when polled faster than this.
pub const DHT22_MIN_READ_INTERVAL: Duration = Duration::from_secs(2);

const START_SIGNAL: Duration = Duration::from_micros(1100);
const RESPONSE_TIMEOUT: Duration = Duration::from_micros(1000);
const EDGE_TIMEOUT: Duration = Duration::from_micros(500);
const ONE_BIT_THRESHOLD: Duration = Duration::from_micros(48);

const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
const TEMPERATURE_RANGE: (f64, f64) = (-40.0, 80.0);

/// Data keys produced by this sensor.
pub const TEMPERATURE_KEY: &str = "temperature_c";
pub const HUMIDITY_KEY: &str = "humidity";

/// DHT22 sensor bound to one GPIO pin.
pub struct Dht22Sensor {
    id: String,
    name: String,
    pin_name: String,
    bus: Option<String>,
    line: Mutex<Option<Box<dyn DataLine>>>,
}

impl Dht22Sensor {
    /// Claim the spec's pin and open the data line.
    pub fn open(spec: &SensorSpec, claims: &mut PinClaims) -> Result<Self> {
        let pin_name = spec.pin.as_deref().ok_or_else(|| {
            HubError::config_error(format!("Sensor '{}' requires a pin", spec.id))
        })?;
        let pin = BcmPin::parse(pin_name)?;

        claims.claim(pin, &spec.id)?;
        let line = match open_data_line(pin, &spec.id) {
            Ok(line) => line,
            Err(e) => {
                claims.release(pin);
                return Err(e);
            }
        };

        info!("DHT22 sensor initialized on pin {} ({})", pin_name, pin);
        Ok(Self::with_line(spec, line))
    }

    /// Build a sensor around an already opened line.
    pub fn with_line(spec: &SensorSpec, line: Box<dyn DataLine>) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.display_name().to_string(),
            pin_name: spec.pin.clone().unwrap_or_default(),
            bus: spec.bus.clone(),
            line: Mutex::new(Some(line)),
        }
    }

    fn read_frame(&self) -> std::result::Result<[u8; 5], ReadError> {
        let mut guard = self
            .line
            .lock()
            .map_err(|_| ReadError::transient("data line lock poisoned"))?;
        let line = guard
            .as_mut()
            .ok_or_else(|| ReadError::transient("sensor hardware has been released"))?;
        acquire_frame(&mut **line)
    }
}

impl Sensor for Dht22Sensor {
    fn read(&self) -> ReadResult {
        match self.read_frame().and_then(decode_frame) {
            Ok(data) => ReadResult::ok(data),
            Err(e) => {
                warn!("DHT22 {} read error: {}", self.id, e);
                ReadResult::failure(e)
            }
        }
    }

    fn get_info(&self) -> SensorInfo {
        let mut measurements = BTreeMap::new();
        measurements.insert(
            TEMPERATURE_KEY.to_string(),
            MeasurementInfo::new("°C", "Temperature in Celsius"),
        );
        measurements.insert(
            HUMIDITY_KEY.to_string(),
            MeasurementInfo::new("%", "Relative humidity"),
        );

        SensorInfo {
            sensor_id: self.id.clone(),
            name: self.name.clone(),
            sensor_type: DHT22_TYPE.to_string(),
            description: "Temperature and humidity sensor".to_string(),
            measurements,
            pin: Some(self.pin_name.clone()),
            bus: self.bus.clone(),
            enabled: true,
        }
    }

    fn min_read_interval(&self) -> Duration {
        DHT22_MIN_READ_INTERVAL
    }

    fn release(&self) {
        match self.line.lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    info!("DHT22 sensor {} cleaned up", self.id);
                }
            }
            Err(_) => warn!("Error cleaning up DHT22 sensor {}: lock poisoned", self.id),
        }
    }
}

/// Run one start/response/data exchange on the line.
pub fn acquire_frame(line: &mut dyn DataLine) -> std::result::Result<[u8; 5], ReadError> {
    line.drive_low();
    thread::sleep(START_SIGNAL);
    line.release_to_input();

    wait_for_level(line, false, RESPONSE_TIMEOUT, "sensor response")?;
    wait_for_level(line, true, EDGE_TIMEOUT, "response preamble")?;
    wait_for_level(line, false, EDGE_TIMEOUT, "first data bit")?;

    let mut frame = [0u8; 5];
    for bit in 0..40 {
        wait_for_level(line, true, EDGE_TIMEOUT, "bit start")?;
        let high = wait_for_level(line, false, EDGE_TIMEOUT, "bit end")?;
        let byte = &mut frame[bit / 8];
        *byte <<= 1;
        if high > ONE_BIT_THRESHOLD {
            *byte |= 1;
        }
    }

    debug!("DHT22 raw frame: {:02x?}", frame);
    Ok(frame)
}

/// Busy-wait until the line reaches `level`; returns how long that took.
fn wait_for_level(
    line: &dyn DataLine,
    level: bool,
    limit: Duration,
    phase: &str,
) -> std::result::Result<Duration, ReadError> {
    let start = Instant::now();
    while line.is_high() != level {
        if start.elapsed() > limit {
            return Err(ReadError::Timeout(format!("waiting for {}", phase)));
        }
    }
    Ok(start.elapsed())
}

/// Validate and convert a raw 5-byte frame into readings.
pub fn decode_frame(frame: [u8; 5]) -> std::result::Result<ReadingData, ReadError> {
    let computed = frame[..4]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    if computed != frame[4] {
        return Err(ReadError::Checksum {
            expected: frame[4],
            computed,
        });
    }

    let humidity = f64::from(u16::from_be_bytes([frame[0], frame[1]])) / 10.0;
    let raw_temperature = u16::from_be_bytes([frame[2], frame[3]]);
    let magnitude = f64::from(raw_temperature & 0x7fff) / 10.0;
    let temperature = if raw_temperature & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    };

    if !(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1).contains(&humidity) {
        return Err(ReadError::transient(format!(
            "implausible humidity {:.1}%",
            humidity
        )));
    }
    if !(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&temperature) {
        return Err(ReadError::transient(format!(
            "implausible temperature {:.1}°C",
            temperature
        )));
    }

    let mut data = ReadingData::new();
    data.insert(TEMPERATURE_KEY.to_string(), round1(temperature).into());
    data.insert(HUMIDITY_KEY.to_string(), round1(humidity).into());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ReadingValue;

    fn frame(humidity_tenths: u16, temperature_raw: u16) -> [u8; 5] {
        let [h0, h1] = humidity_tenths.to_be_bytes();
        let [t0, t1] = temperature_raw.to_be_bytes();
        let checksum = h0.wrapping_add(h1).wrapping_add(t0).wrapping_add(t1);
        [h0, h1, t0, t1, checksum]
    }

    fn number(data: &ReadingData, key: &str) -> f64 {
        data.get(key).and_then(ReadingValue::as_f64).unwrap()
    }

    /// A line stuck at one level, as with a disconnected or shorted sensor.
    struct StuckLine(bool);

    impl DataLine for StuckLine {
        fn drive_low(&mut self) {}
        fn release_to_input(&mut self) {}
        fn is_high(&self) -> bool {
            self.0
        }
    }

    fn spec() -> SensorSpec {
        SensorSpec::new("dht", DHT22_TYPE)
            .with_name("Porch")
            .with_pin("D4")
    }

    #[test]
    fn test_decode_datasheet_example() {
        // 65.2 %RH, 35.1 °C
        let data = decode_frame([0x02, 0x8c, 0x01, 0x5f, 0xee]).unwrap();
        assert_eq!(number(&data, HUMIDITY_KEY), 65.2);
        assert_eq!(number(&data, TEMPERATURE_KEY), 35.1);
    }

    #[test]
    fn test_decode_negative_temperature() {
        let data = decode_frame(frame(412, 0x8000 | 101)).unwrap();
        assert_eq!(number(&data, TEMPERATURE_KEY), -10.1);
        assert_eq!(number(&data, HUMIDITY_KEY), 41.2);
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut bad = frame(500, 215);
        bad[4] = bad[4].wrapping_add(1);
        let err = decode_frame(bad).unwrap_err();
        assert!(matches!(err, ReadError::Checksum { .. }));
    }

    #[test]
    fn test_decode_out_of_range() {
        assert!(matches!(
            decode_frame(frame(1001, 200)),
            Err(ReadError::Transient(_))
        ));
        assert!(matches!(
            decode_frame(frame(500, 801)),
            Err(ReadError::Transient(_))
        ));
    }

    #[test]
    fn test_silent_sensor_times_out() {
        let mut line = StuckLine(true);
        let err = acquire_frame(&mut line).unwrap_err();
        assert_eq!(err, ReadError::Timeout("waiting for sensor response".into()));
    }

    #[test]
    fn test_shorted_line_times_out_in_preamble() {
        let mut line = StuckLine(false);
        let err = acquire_frame(&mut line).unwrap_err();
        assert_eq!(err, ReadError::Timeout("waiting for response preamble".into()));
    }

    #[test]
    fn test_read_reports_failure_not_panic() {
        let sensor = Dht22Sensor::with_line(&spec(), Box::new(StuckLine(true)));
        let result = sensor.read();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("sensor response"));
    }

    #[test]
    fn test_info_without_hardware() {
        let sensor = Dht22Sensor::with_line(&spec(), Box::new(StuckLine(true)));
        let info = sensor.get_info();
        assert_eq!(info.sensor_id, "dht");
        assert_eq!(info.name, "Porch");
        assert_eq!(info.sensor_type, "DHT22");
        assert_eq!(info.pin.as_deref(), Some("D4"));
        assert_eq!(info.measurements[TEMPERATURE_KEY].unit, "°C");
        assert_eq!(sensor.min_read_interval(), DHT22_MIN_READ_INTERVAL);
    }

    #[test]
    fn test_released_sensor_fails_cleanly() {
        let sensor = Dht22Sensor::with_line(&spec(), Box::new(StuckLine(true)));
        sensor.release();
        let result = sensor.read();
        assert!(result.error.unwrap().contains("released"));
    }

    #[test]
    fn test_open_requires_pin() {
        let mut claims = PinClaims::new();
        let spec = SensorSpec::new("dht", DHT22_TYPE);
        assert!(matches!(
            Dht22Sensor::open(&spec, &mut claims),
            Err(HubError::Config(_))
        ));
    }

    #[cfg(not(feature = "gpio"))]
    #[test]
    fn test_open_without_gpio_frees_claim() {
        let mut claims = PinClaims::new();
        let result = Dht22Sensor::open(&spec(), &mut claims);
        assert!(matches!(result, Err(HubError::HardwareInit { .. })));
        assert_eq!(claims.owner(BcmPin::parse("D4").unwrap()), None);
    }
}
