//! Backoff policy for wrapping host paths that do not exist yet.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff used while waiting for a hook target to appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapPolicy {
    /// Delay before the first timed retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier for each subsequent wait.
    pub backoff_factor: f64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Timed retries before the path is abandoned.
    pub max_attempts: u32,
}

impl Default for WrapPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            backoff_factor: 1.5,
            max_delay_ms: 5_000,
            max_attempts: 10,
        }
    }
}

impl WrapPolicy {
    /// Delay before retry number `attempt` (0-indexed): `base × factor^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on how long a path can stay pending.
    pub fn total_budget(&self) -> Duration {
        (0..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}
