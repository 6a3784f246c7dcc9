//! Scheduler tuning knobs.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Default hard-stop deadline for an executing atom, in milliseconds.
pub const DEFAULT_HANG_TIMEOUT_MS: u64 = 2000;

/// Default preemption re-evaluation interval, in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 50;

/// Default deadline for a blocked semaphore wait, in milliseconds.
pub const DEFAULT_SEMAPHORE_TIMEOUT_MS: u64 = 5000;

// The tick must fire well before hang recovery does.
const_assert!(DEFAULT_TICK_MS < DEFAULT_HANG_TIMEOUT_MS);

/// Timeout configuration for a scheduler instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// An executing atom past this deadline is considered hung and
    /// hard-stopped.
    pub hang_timeout: Duration,
    /// How often an executing atom is re-evaluated for preemption while
    /// other atoms wait on its slot.
    pub tick: Duration,
    /// A semaphore wait past this deadline fails with `TimedOut`.
    pub semaphore_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            hang_timeout: Duration::from_millis(DEFAULT_HANG_TIMEOUT_MS),
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            semaphore_timeout: Duration::from_millis(DEFAULT_SEMAPHORE_TIMEOUT_MS),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hang_timeout.is_zero() {
            bail!("hang_timeout must be non-zero");
        }
        if self.tick.is_zero() {
            bail!("tick must be non-zero");
        }
        if self.semaphore_timeout.is_zero() {
            bail!("semaphore_timeout must be non-zero");
        }
        if self.tick >= self.hang_timeout {
            bail!(
                "tick ({:?}) must be shorter than hang_timeout ({:?})",
                self.tick,
                self.hang_timeout
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = SchedulerConfig::default();
        config.tick = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.hang_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.semaphore_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_must_be_shorter_than_hang_timeout() {
        let mut config = SchedulerConfig::default();
        config.tick = config.hang_timeout;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.tick, Duration::from_millis(DEFAULT_TICK_MS));
    }
}
