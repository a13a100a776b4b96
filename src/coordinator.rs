//! Read coordination: retries, timeouts and exclusive hardware access.
//!
//! Every physical read goes through [`ReadCoordinator::coordinated_read`]. The
//! coordinator owns one async lock per serialization unit (a sensor, or the
//! bus it shares with others) and holds it for the whole retry loop, so two
//! requests never interleave transactions on the same pin.
//!
//! Reads are blocking and run on tokio's blocking pool, gated by a semaphore.
//! A blocking read cannot be interrupted, so its handle lives in the unit's
//! slot rather than in the caller's future: a read that timed out, or whose
//! caller went away, is still tracked and is collected before the next read on
//! the same unit starts. The quiet period counts from when the hardware
//! actually went idle.

use crate::error::{HubError, ReadError, Result};
use crate::registry::{RegisteredSensor, SensorRegistry};
use crate::sensors::ReadResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay multiplied by the number of failed attempts so far
    Linear,
}

/// Retry and timeout policy for hardware reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPolicy {
    /// Attempts per coordinated read, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Delay growth between attempts
    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound for a single attempt in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Blocking reads allowed to run at once across all sensors
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_attempt_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_reads() -> usize {
    4
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: Backoff::default(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_concurrent_reads: default_max_concurrent_reads(),
        }
    }
}

impl ReadPolicy {
    /// Rejects policies under which no read could ever happen.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HubError::config_error("read_policy.max_attempts must be at least 1"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(HubError::config_error(
                "read_policy.attempt_timeout_ms must be greater than 0",
            ));
        }
        if self.max_concurrent_reads == 0 {
            return Err(HubError::config_error(
                "read_policy.max_concurrent_reads must be at least 1",
            ));
        }
        Ok(())
    }

    /// Delay before the retry that follows `failed_attempts` failures.
    pub fn retry_delay(&self, failed_attempts: u32) -> Duration {
        let base = Duration::from_millis(self.retry_delay_ms);
        match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base * failed_attempts.max(1),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// A physical read that left the hardware.
struct Finished {
    sensor_id: String,
    result: ReadResult,
    at: Instant,
}

/// What waiting on a unit's in-flight read produced.
enum Collected {
    /// Nothing was in flight
    Idle,
    /// The read finished and the hardware is free
    Done(ReadResult),
    /// The read is still running
    Pending,
}

/// State of one serialization unit.
#[derive(Default)]
struct ReadSlot {
    /// When each sensor on this unit last left the hardware
    last_finished: HashMap<String, Instant>,
    /// The physical read currently touching the hardware, if any
    in_flight: Option<JoinHandle<Finished>>,
}

impl ReadSlot {
    /// Wait up to `limit` for the in-flight read to finish.
    ///
    /// Cancel-safe: if the caller is dropped while waiting, the handle stays
    /// in the slot for the next caller to collect.
    async fn collect(&mut self, limit: Duration) -> Collected {
        let Some(handle) = self.in_flight.as_mut() else {
            return Collected::Idle;
        };
        let joined = match time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return Collected::Pending,
        };
        self.in_flight = None;

        match joined {
            Ok(finished) => {
                self.last_finished.insert(finished.sensor_id, finished.at);
                Collected::Done(finished.result)
            }
            Err(join_error) => Collected::Done(ReadResult::failure(ReadError::transient(
                format!("read task failed: {}", join_error),
            ))),
        }
    }
}

/// Serializes, retries and times out physical reads.
pub struct ReadCoordinator {
    policy: ReadPolicy,
    slots: HashMap<String, Arc<Mutex<ReadSlot>>>,
    workers: Arc<Semaphore>,
}

impl ReadCoordinator {
    /// One lock per serialization unit found in the registry.
    pub fn new(registry: &SensorRegistry, policy: ReadPolicy) -> Self {
        let slots = registry
            .iter()
            .map(|entry| (entry.lock_key(), Arc::new(Mutex::new(ReadSlot::default()))))
            .collect();
        let workers = Arc::new(Semaphore::new(policy.max_concurrent_reads.max(1)));

        Self {
            policy,
            slots,
            workers,
        }
    }

    pub fn policy(&self) -> &ReadPolicy {
        &self.policy
    }

    /// Read `entry` with retries, returning the first success or the last failure.
    pub async fn coordinated_read(&self, entry: &RegisteredSensor) -> ReadResult {
        let Some(slot) = self.slots.get(&entry.lock_key()) else {
            return ReadResult::failure(ReadError::transient(format!(
                "sensor '{}' is not managed by this coordinator",
                entry.id()
            )));
        };

        let mut slot = slot.lock().await;
        let quiet = entry.sensor().min_read_interval();
        let limit = self.policy.attempt_timeout();
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let result = match slot.collect(limit).await {
                Collected::Pending => ReadResult::failure(ReadError::Timeout(format!(
                    "previous read on {} still running after {}ms",
                    entry.lock_key(),
                    limit.as_millis()
                ))),
                collected => {
                    if let Collected::Done(earlier) = collected {
                        debug!(
                            "Collected earlier read on {} (success: {})",
                            entry.lock_key(),
                            earlier.success
                        );
                    }

                    let gap = if attempt == 1 {
                        quiet
                    } else {
                        self.policy.retry_delay(attempt - 1).max(quiet)
                    };
                    if let Some(finished) = slot.last_finished.get(entry.id()) {
                        time::sleep_until(*finished + gap).await;
                    }

                    self.attempt(entry, &mut slot, limit).await
                }
            };

            if result.success {
                if attempt > 1 {
                    debug!("Sensor {} read succeeded on attempt {}", entry.id(), attempt);
                }
                return result;
            }

            if attempt >= max_attempts {
                warn!(
                    "Sensor {} failed after {} attempt(s): {}",
                    entry.id(),
                    attempt,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                return result;
            }

            debug!(
                "Sensor {} attempt {}/{} failed: {}",
                entry.id(),
                attempt,
                max_attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
            attempt += 1;
        }
    }

    /// One physical read on the blocking pool, bounded by `limit`.
    async fn attempt(
        &self,
        entry: &RegisteredSensor,
        slot: &mut ReadSlot,
        limit: Duration,
    ) -> ReadResult {
        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return ReadResult::failure(ReadError::transient("read workers shut down")),
        };

        let sensor = Arc::clone(entry.sensor());
        let sensor_id = entry.id().to_string();
        slot.in_flight = Some(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = sensor.read();
            Finished {
                sensor_id,
                result,
                at: Instant::now(),
            }
        }));

        match slot.collect(limit).await {
            Collected::Done(result) => result,
            Collected::Pending => ReadResult::failure(ReadError::attempt_timeout(limit)),
            Collected::Idle => ReadResult::failure(ReadError::transient("read task lost")),
        }
    }
}
