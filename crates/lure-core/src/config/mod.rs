//! Save pipeline configuration.
//!
//! `SaveConfig` is loaded from JSON (profile files) or from `LURE_*`
//! environment variables. Unknown JSON fields are rejected so typos surface
//! instead of silently falling back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compression::COMPRESSION_THRESHOLD;
use crate::diff::SNAPSHOT_INTERVAL;
use crate::error::{Error, Result};
use crate::save::RetryPolicy;

pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1500;

pub const ENV_SNAPSHOT_INTERVAL: &str = "LURE_SNAPSHOT_INTERVAL";
pub const ENV_COMPRESSION_THRESHOLD: &str = "LURE_COMPRESSION_THRESHOLD";
pub const ENV_MAX_RETRIES: &str = "LURE_MAX_RETRIES";
pub const ENV_RETRY_BASE_DELAY_SECS: &str = "LURE_RETRY_BASE_DELAY_SECS";
pub const ENV_RETRY_MAX_DELAY_SECS: &str = "LURE_RETRY_MAX_DELAY_SECS";
pub const ENV_DRAIN_INTERVAL_SECS: &str = "LURE_DRAIN_INTERVAL_SECS";
pub const ENV_AUTOSAVE_DEBOUNCE_MS: &str = "LURE_AUTOSAVE_DEBOUNCE_MS";

/// Tunables of the save pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveConfig {
    /// Every n-th revision is written as a full snapshot
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,
    /// Serialized size below which stored payloads stay uncompressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,
}

const fn default_snapshot_interval() -> u64 {
    SNAPSHOT_INTERVAL
}

const fn default_compression_threshold() -> usize {
    COMPRESSION_THRESHOLD
}

const fn default_drain_interval_secs() -> u64 {
    DEFAULT_DRAIN_INTERVAL_SECS
}

const fn default_autosave_debounce_ms() -> u64 {
    DEFAULT_AUTOSAVE_DEBOUNCE_MS
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: SNAPSHOT_INTERVAL,
            compression_threshold: COMPRESSION_THRESHOLD,
            retry: RetryPolicy::default(),
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
        }
    }
}

impl SaveConfig {
    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self> {
        parse_config(|key| std::env::var(key).ok())
    }

    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub const fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            return Err(Error::InvalidInput(format!(
                "retry base delay ({}s) exceeds max delay ({}s)",
                self.retry.base_delay_secs, self.retry.max_delay_secs
            )));
        }
        if self.drain_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "drain interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build a config from defaults plus the variables `lookup` returns.
///
/// Public for testability; `from_env` passes `std::env::var`.
pub fn parse_config<F>(lookup: F) -> Result<SaveConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = SaveConfig::default();
    let read = |key: &str| setting_value(lookup(key));

    if let Some(value) = read(ENV_SNAPSHOT_INTERVAL) {
        config.snapshot_interval = parse_number(ENV_SNAPSHOT_INTERVAL, &value)?;
    }
    if let Some(value) = read(ENV_COMPRESSION_THRESHOLD) {
        config.compression_threshold = parse_number(ENV_COMPRESSION_THRESHOLD, &value)?;
    }
    if let Some(value) = read(ENV_MAX_RETRIES) {
        config.retry.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
    }
    if let Some(value) = read(ENV_RETRY_BASE_DELAY_SECS) {
        config.retry.base_delay_secs = parse_number(ENV_RETRY_BASE_DELAY_SECS, &value)?;
    }
    if let Some(value) = read(ENV_RETRY_MAX_DELAY_SECS) {
        config.retry.max_delay_secs = parse_number(ENV_RETRY_MAX_DELAY_SECS, &value)?;
    }
    if let Some(value) = read(ENV_DRAIN_INTERVAL_SECS) {
        config.drain_interval_secs = parse_number(ENV_DRAIN_INTERVAL_SECS, &value)?;
    }
    if let Some(value) = read(ENV_AUTOSAVE_DEBOUNCE_MS) {
        config.autosave_debounce_ms = parse_number(ENV_AUTOSAVE_DEBOUNCE_MS, &value)?;
    }

    config.validate()?;
    Ok(config)
}

/// Trimmed setting; blank counts as unset
pub fn setting_value(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Campaign API base URL with its scheme checked and no trailing `/`
pub fn normalize_api_base_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(Error::InvalidInput(
            "API base URL must not be empty".to_string(),
        ));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(Error::InvalidInput(format!(
            "API base URL must include http:// or https://, got '{url}'"
        )))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key} must be a non-negative integer, got '{value}'")))
}
