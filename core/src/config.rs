//! Timeout and retry policy for a `RequestLifecycle`.
//!
//! Values are kept in the units callers usually write them in (seconds,
//! milliseconds) so the struct deserializes from flat JSON. The accessor
//! methods turn them into `Duration`s and apply the disabling rules.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const ENV_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";
const ENV_RETRY_ATTEMPTS: &str = "REQUEST_RETRY_ATTEMPTS";
const ENV_RETRY_DELAY: &str = "REQUEST_RETRY_DELAY_SECS";
const ENV_POLL_INTERVAL: &str = "REQUEST_POLL_INTERVAL_MS";

/// Shortest pause between transport polls.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds before an attempt is abandoned. Zero or negative disables it.
    pub timeout_secs: f64,
    /// Retries after a failed attempt, so at most `retry_attempts + 1` attempts.
    pub retry_attempts: u32,
    /// Fixed pause before each retry.
    pub delay_between_retries_secs: f64,
    /// Pause between transport polls while an attempt is in flight.
    pub poll_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: -1.0,
            retry_attempts: 0,
            delay_between_retries_secs: 0.25,
            poll_interval_ms: 16, // one frame at 60 Hz
        }
    }
}

impl LifecycleConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by the `REQUEST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_value(ENV_TIMEOUT)? {
            config.timeout_secs = v;
        }
        if let Some(v) = env_value(ENV_RETRY_ATTEMPTS)? {
            config.retry_attempts = v;
        }
        if let Some(v) = env_value(ENV_RETRY_DELAY)? {
            config.delay_between_retries_secs = v;
        }
        if let Some(v) = env_value(ENV_POLL_INTERVAL)? {
            config.poll_interval_ms = v;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.delay_between_retries_secs = delay.as_secs_f64();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// `None` when disabled. A value too large for a `Duration` never fires,
    /// so it is treated as disabled too.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs > 0.0 {
            Duration::try_from_secs_f64(self.timeout_secs).ok()
        } else {
            None
        }
    }

    /// Non-positive delays clamp to zero, oversized ones saturate.
    pub fn retry_delay(&self) -> Duration {
        let secs = self.delay_between_retries_secs;
        if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }
}

fn env_value<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
        Err(_) => Ok(None),
    }
}
