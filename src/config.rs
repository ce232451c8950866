//! Tunables consumed by the core.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Submissions admitted per window across all owners.
    pub global_rate_limit: u32,
    /// Submissions admitted per window for any single owner.
    pub per_owner_rate_limit: u32,
    pub window_duration_seconds: u64,
    /// Upper bound on how long an idle worker waits before polling again.
    pub worker_idle_poll_interval_ms: u64,
    /// How long the built-in executor spends on each job.
    pub simulated_work_ms: u64,
    pub max_payload_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_rate_limit: 100,
            per_owner_rate_limit: 10,
            window_duration_seconds: 60,
            worker_idle_poll_interval_ms: 1000,
            simulated_work_ms: 2000,
            max_payload_size: 65535,
        }
    }
}

impl Config {
    /// Loads a YAML config file. Absent keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_rate_limit == 0 {
            return Err(ConfigError::Zero("global_rate_limit"));
        }
        if self.per_owner_rate_limit == 0 {
            return Err(ConfigError::Zero("per_owner_rate_limit"));
        }
        if self.window_duration_seconds == 0 {
            return Err(ConfigError::Zero("window_duration_seconds"));
        }
        if self.worker_idle_poll_interval_ms == 0 {
            return Err(ConfigError::Zero("worker_idle_poll_interval_ms"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_duration_seconds)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_idle_poll_interval_ms)
    }

    pub fn simulated_work(&self) -> Duration {
        Duration::from_millis(self.simulated_work_ms)
    }
}
