//! # Sensor Hub - environmental sensors over HTTP
//!
//! Turns a list of configured sensors attached to a Raspberry Pi into live
//! sensor instances and serves their readings through a small JSON API.
//!
//! ## Features
//!
//! - **Pluggable sensor families**: DHT22 out of the box, simulated sensors for
//!   development, custom families through [`RegistryBuilder`]
//! - **Flaky hardware made predictable**: retries, quiet periods and per-attempt
//!   timeouts centralized in the [`ReadCoordinator`]
//! - **Exclusive hardware access**: one in-flight read per sensor (or shared bus)
//! - **Health verdict**: healthy / degraded / unhealthy over all sensors
//! - **GPIO feature-gated**: builds and runs on machines without a Pi header
//!
//! GPIO handles are process-exclusive. Run exactly one sensor hub process per
//! board; concurrency happens inside that process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_hub::{HubConfig, SensorHub};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::load("config.yaml")?;
//!     let hub = SensorHub::from_config(&config)?;
//!
//!     for info in hub.list_sensors() {
//!         let reading = hub.read_sensor(&info.sensor_id).await?;
//!         println!("{}: {:?}", info.name, reading.data);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod hub;
pub mod registry;
pub mod sensors;
pub mod web;

// Re-export public API
pub use config::{HubConfig, SensorSpec};
pub use coordinator::{Backoff, ReadCoordinator, ReadPolicy};
pub use error::{HubError, ReadError, Result};
pub use health::{HealthAggregator, HealthReport, HealthStatus, HealthSummary};
pub use hub::SensorHub;
pub use registry::{RegistryBuilder, SensorFactory, SensorHandle, SensorRegistry};
pub use sensors::{ReadResult, ReadingData, ReadingValue, Sensor, SensorInfo};

pub use web::{start_web_server, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 5000;
