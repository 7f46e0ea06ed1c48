//! Tracker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// Configuration for attribution and event ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Upper bound on a single invite fetch, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Capacity of each community's event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attribute unexplained joins to a role-mapped vanity code.
    #[serde(default = "default_true")]
    pub fallback_to_vanity: bool,

    /// A community's workers exit after this long without work, in milliseconds.
    #[serde(default = "default_worker_idle_ms")]
    pub worker_idle_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            fallback_to_vanity: true,
            worker_idle_ms: default_worker_idle_ms(),
        }
    }
}

impl TrackerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reject values that would stall the gate or the queues.
    pub fn validate(&self) -> TrackerResult<()> {
        if self.fetch_timeout_ms == 0 {
            return Err(TrackerError::Configuration(
                "fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TrackerError::Configuration(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.worker_idle_ms == 0 {
            return Err(TrackerError::Configuration(
                "worker_idle_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_worker_idle_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}
