//! Configuration for the timing subsystem.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! - `DEPLOY_TIMING_TICK_MS`: display refresh period in milliseconds
//! - `DEPLOY_TIMING_POLL_SECS`: deployment polling period in seconds
//! - `DEPLOY_TIMING_RETENTION_HOURS`: how long terminated timings are kept
//! - `DEPLOY_TIMING_INVALIDATION_INTERVAL_SECS`: switches lock expiry to the
//!   rate-limited invalidation policy with this interval

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TimingError};
use crate::lock::InvalidationPolicy;
use crate::steps::{StepDefinitions, StepEstimates, MAX_STEP_SECS};
use crate::sweeper::DEFAULT_RETENTION_HOURS;

const ENV_TICK_MS: &str = "DEPLOY_TIMING_TICK_MS";
const ENV_POLL_SECS: &str = "DEPLOY_TIMING_POLL_SECS";
const ENV_RETENTION_HOURS: &str = "DEPLOY_TIMING_RETENTION_HOURS";
const ENV_INVALIDATION_INTERVAL_SECS: &str = "DEPLOY_TIMING_INVALIDATION_INTERVAL_SECS";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Display refresh period in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Polling period while a deployment is active, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Hours a terminated deployment's timing is kept
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Estimated duration of each pipeline step
    #[serde(default)]
    pub steps: StepEstimates,
    /// What to do when a watched lock expires
    #[serde(default)]
    pub invalidation: InvalidationPolicy,
}

fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_retention_hours() -> u64 {
    DEFAULT_RETENTION_HOURS
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            steps: StepEstimates::default(),
            tick_interval_ms: default_tick_interval_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            retention_hours: default_retention_hours(),
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl TimingConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| TimingError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded timing config");
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(ENV_TICK_MS) {
            self.tick_interval_ms = parse_u64(ENV_TICK_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_SECS) {
            self.poll_interval_secs = parse_u64(ENV_POLL_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETENTION_HOURS) {
            self.retention_hours = parse_u64(ENV_RETENTION_HOURS, &value)?;
        }
        if let Some(value) = lookup(ENV_INVALIDATION_INTERVAL_SECS) {
            self.invalidation = InvalidationPolicy::RateLimited {
                min_interval_secs: parse_u64(ENV_INVALIDATION_INTERVAL_SECS, &value)?,
            };
        }
        self.validate()
    }

    /// Reject values that would stall the clock or the poller, and step
    /// estimates above [`MAX_STEP_SECS`].
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(TimingError::InvalidConfig(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(TimingError::InvalidConfig(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if let Some((key, value)) = self.steps.out_of_range() {
            return Err(TimingError::InvalidConfig(format!(
                "steps.{key} = {value} exceeds the maximum of {MAX_STEP_SECS} seconds"
            )));
        }
        if let InvalidationPolicy::RateLimited {
            min_interval_secs: 0,
        } = self.invalidation
        {
            return Err(TimingError::InvalidConfig(
                "rate-limited invalidation needs a non-zero interval".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn retention(&self) -> ChronoDuration {
        let hours = i64::try_from(self.retention_hours)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 3_600_000);
        ChronoDuration::hours(hours)
    }

    #[must_use]
    pub fn step_definitions(&self) -> StepDefinitions {
        StepDefinitions::from_estimates(&self.steps)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| {
            TimingError::InvalidConfig(format!(
                "{key} must be a non-negative integer, got '{value}'"
            ))
        })
}
