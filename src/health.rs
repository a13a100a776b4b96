//! Aggregate health over every registered sensor.

use crate::coordinator::ReadCoordinator;
use crate::registry::SensorRegistry;
use crate::sensors::ReadResult;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Three-valued verdict over all sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Reduce success counts to a verdict. No sensors at all is unhealthy.
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if total == 0 || healthy == 0 {
            Self::Unhealthy
        } else if healthy == total {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// Counts behind a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Verdict plus the read result of every sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub per_sensor: BTreeMap<String, ReadResult>,
}

impl HealthReport {
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (String, ReadResult)>,
    {
        let per_sensor: BTreeMap<_, _> = results.into_iter().collect();
        let healthy = per_sensor.values().filter(|r| r.success).count();
        Self {
            overall: HealthStatus::from_counts(healthy, per_sensor.len()),
            per_sensor,
        }
    }

    pub fn summary(&self) -> HealthSummary {
        let healthy = self.per_sensor.values().filter(|r| r.success).count();
        HealthSummary {
            total: self.per_sensor.len(),
            healthy,
            unhealthy: self.per_sensor.len() - healthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall == HealthStatus::Healthy
    }
}

/// Polls every sensor through the coordinator and reduces the results.
pub struct HealthAggregator {
    registry: Arc<SensorRegistry>,
    coordinator: Arc<ReadCoordinator>,
}

impl HealthAggregator {
    pub fn new(registry: Arc<SensorRegistry>, coordinator: Arc<ReadCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Read all sensors in parallel and build the report.
    pub async fn aggregate(&self) -> HealthReport {
        let reads = self.registry.iter().map(|entry| async move {
            let result = self.coordinator.coordinated_read(entry).await;
            (entry.id().to_string(), result)
        });
        let report = HealthReport::from_results(join_all(reads).await);

        debug!(
            "Health check: {} ({} sensor(s))",
            report.overall,
            report.per_sensor.len()
        );
        report
    }
}
