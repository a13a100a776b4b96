//! Error handling for the sensor hub.
//!
//! Two families live here. [`HubError`] covers faults that escape to callers:
//! bad configuration, hardware that could not be claimed, unknown sensor ids.
//! [`ReadError`] covers a single failed acquisition; it never escapes the
//! read pipeline and is folded into a failed
//! [`ReadResult`](crate::sensors::ReadResult) instead.

use std::time::Duration;

/// A specialized `Result` type for sensor hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// The main error type for sensor hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Invalid sensor specs or settings; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware handle could not be acquired; fatal only for that sensor
    #[error("Hardware init failed for sensor '{sensor_id}': {reason}")]
    HardwareInit { sensor_id: String, reason: String },

    /// No sensor registered under this id
    #[error("Sensor {0} not found")]
    NotFound(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl HubError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new hardware initialization error
    pub fn hardware_init(sensor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HardwareInit {
            sensor_id: sensor_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(sensor_id: impl Into<String>) -> Self {
        Self::NotFound(sensor_id.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether this error is an unknown-sensor lookup failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Why a single physical read attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The device (or the attempt as a whole) did not respond in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The frame arrived but its checksum does not match
    #[error("Checksum mismatch: expected {expected:#04x}, computed {computed:#04x}")]
    Checksum { expected: u8, computed: u8 },

    /// Bus contention, implausible values, released handle and the like
    #[error("Transient read error: {0}")]
    Transient(String),
}

impl ReadError {
    /// An attempt that exceeded its time budget.
    pub fn attempt_timeout(limit: Duration) -> Self {
        Self::Timeout(format!("read attempt exceeded {}ms", limit.as_millis()))
    }

    /// Create a new transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_init_message_names_sensor() {
        let err = HubError::hardware_init("dht22_1", "pin D4 already claimed");
        assert_eq!(
            err.to_string(),
            "Hardware init failed for sensor 'dht22_1': pin D4 already claimed"
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(HubError::not_found("ghost").is_not_found());
        assert!(!HubError::config_error("bad").is_not_found());
    }

    #[test]
    fn test_checksum_message_is_hex() {
        let err = ReadError::Checksum {
            expected: 0x0a,
            computed: 0xff,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0x0a, computed 0xff"
        );
    }

    #[test]
    fn test_attempt_timeout_message() {
        let err = ReadError::attempt_timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Timed out: read attempt exceeded 1500ms");
    }
}
