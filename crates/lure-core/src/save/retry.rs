//! Exponential backoff for queued saves

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY_SECS: u64 = 2;
pub const DEFAULT_MAX_DELAY_SECS: u64 = 300;

/// How often a queued save is retried before it becomes a dead letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_base_delay_secs() -> u64 {
    DEFAULT_BASE_DELAY_SECS
}

const fn default_max_delay_secs() -> u64 {
    DEFAULT_MAX_DELAY_SECS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `retries` failures:
    /// `min(base * 2^retries, max)`
    pub fn delay(&self, retries: u32) -> Duration {
        let factor = 1_u64.checked_shl(retries).unwrap_or(u64::MAX);
        let secs = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }

    /// Whether an entry that failed `retries` times should stop being retried
    pub const fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}
