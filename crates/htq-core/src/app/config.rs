use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_TIMEOUT_SECS;

/// Tunables of the task lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// How many times `cancel` re-reads and retries after losing a race
    /// before giving up with `Conflict`.
    pub cancel_max_attempts: u32,

    /// Poll interval of the response waiter.
    pub wait_poll_interval_ms: u64,

    /// How long an idle worker sleeps before looking at the queue again.
    pub worker_idle_ms: u64,

    /// Outbound timeout for submissions that do not set one.
    pub default_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cancel_max_attempts: 8,
            wait_poll_interval_ms: 10,
            worker_idle_ms: 100,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BrokerConfig {
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }
}
