//! GPIO pin naming, exclusive pin claims and the single-wire data line.
//!
//! Real pin access is feature-gated so the crate builds and runs on machines
//! without a Raspberry Pi header; there every attempt to open a line fails,
//! which the registry reports as a hardware init failure for that sensor.

use crate::error::{HubError, Result};
use std::collections::HashMap;
use std::fmt;

/// Highest BCM GPIO number exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// A GPIO pin in BCM numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BcmPin(u8);

impl BcmPin {
    /// Parse a pin name: `D4`, `GPIO4`, `BCM4` or plain `4`.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let upper = trimmed.to_ascii_uppercase();
        let digits = ["GPIO", "BCM", "D"]
            .iter()
            .find_map(|prefix| upper.strip_prefix(prefix))
            .unwrap_or(&upper);

        let number: u8 = digits
            .parse()
            .map_err(|_| HubError::config_error(format!("Invalid pin name: '{}'", trimmed)))?;

        if number > MAX_BCM_PIN {
            return Err(HubError::config_error(format!(
                "Pin '{}' is out of range (0-{})",
                trimmed, MAX_BCM_PIN
            )));
        }

        Ok(Self(number))
    }

    /// The BCM number.
    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for BcmPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Which sensor owns which pin. Used while building the registry.
#[derive(Debug, Default)]
pub struct PinClaims {
    owners: HashMap<BcmPin, String>,
}

impl PinClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `pin` for `sensor_id`, failing if another sensor holds it.
    pub fn claim(&mut self, pin: BcmPin, sensor_id: &str) -> Result<()> {
        if let Some(owner) = self.owners.get(&pin) {
            return Err(HubError::hardware_init(
                sensor_id,
                format!("pin {} already claimed by sensor '{}'", pin, owner),
            ));
        }
        self.owners.insert(pin, sensor_id.to_string());
        Ok(())
    }

    /// Give a pin back, e.g. when opening the line failed after claiming.
    pub fn release(&mut self, pin: BcmPin) {
        self.owners.remove(&pin);
    }

    /// Current owner of a pin.
    pub fn owner(&self, pin: BcmPin) -> Option<&str> {
        self.owners.get(&pin).map(String::as_str)
    }
}

/// A bidirectional single-wire data line.
pub trait DataLine: Send {
    /// Drive the line low (host start signal).
    fn drive_low(&mut self);

    /// Stop driving; switch to input with pull-up so the device can talk.
    fn release_to_input(&mut self);

    /// Sample the line.
    fn is_high(&self) -> bool;
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Gpio, IoPin, Mode, PullUpDown};

    /// Raspberry Pi data line backed by an rppal `IoPin`.
    pub struct RaspberryPiLine {
        pin: IoPin,
    }

    impl RaspberryPiLine {
        pub fn open(pin: BcmPin) -> std::result::Result<Self, String> {
            let gpio = Gpio::new().map_err(|e| format!("Failed to initialize GPIO: {}", e))?;
            let mut pin = gpio
                .get(pin.number())
                .map_err(|e| format!("Failed to access pin {}: {}", pin, e))?
                .into_io(Mode::Input);
            pin.set_pullupdown(PullUpDown::PullUp);
            Ok(Self { pin })
        }
    }

    impl DataLine for RaspberryPiLine {
        fn drive_low(&mut self) {
            self.pin.set_mode(Mode::Output);
            self.pin.set_low();
        }

        fn release_to_input(&mut self) {
            self.pin.set_mode(Mode::Input);
            self.pin.set_pullupdown(PullUpDown::PullUp);
        }

        fn is_high(&self) -> bool {
            self.pin.is_high()
        }
    }
}

#[cfg(not(feature = "gpio"))]
mod unavailable {
    use super::*;

    /// Stand-in for systems built without GPIO support.
    pub struct UnavailableLine;

    impl UnavailableLine {
        pub fn open(pin: BcmPin) -> std::result::Result<Self, String> {
            Err(format!(
                "GPIO not available on this system (attempted to open pin {})",
                pin
            ))
        }
    }

    impl DataLine for UnavailableLine {
        fn drive_low(&mut self) {}

        fn release_to_input(&mut self) {}

        fn is_high(&self) -> bool {
            false
        }
    }
}

#[cfg(feature = "gpio")]
use raspberry_pi::RaspberryPiLine as PlatformLine;

#[cfg(not(feature = "gpio"))]
use unavailable::UnavailableLine as PlatformLine;

/// Open the platform data line for `pin`, on behalf of `sensor_id`.
pub fn open_data_line(pin: BcmPin, sensor_id: &str) -> Result<Box<dyn DataLine>> {
    PlatformLine::open(pin)
        .map(|line| Box::new(line) as Box<dyn DataLine>)
        .map_err(|reason| HubError::hardware_init(sensor_id, reason))
}

/// Whether this build can talk to real GPIO hardware.
pub fn gpio_supported() -> bool {
    cfg!(feature = "gpio")
}
