//! Monitor configuration.
//!
//! `MonitorSettings` is the raw environment view (envconfig); `MonitorConfig`
//! is the validated form the monitor runs with. `ConfigOverrides` carries
//! values that win over the environment (command-line flags).

use std::fmt::{Display, Formatter};
use std::time::Duration;

use envconfig::Envconfig;
use tracing::debug;

use crate::domain::ConfigError;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Envconfig, Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    #[envconfig(from = "TASKLOG_BATCH_SIZE", default = "100")]
    pub batch_size: usize,
    #[envconfig(from = "TASKLOG_FLUSH_INTERVAL_SECS", default = "10")]
    pub flush_interval_secs: u64,
}

impl Display for MonitorSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "TASKLOG_BATCH_SIZE: {}", self.batch_size)?;
        writeln!(f, "TASKLOG_FLUSH_INTERVAL_SECS: {}", self.flush_interval_secs)
    }
}

/// Values applied on top of [`MonitorSettings`] before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub batch_size: Option<usize>,
    pub flush_interval_secs: Option<u64>,
}

impl ConfigOverrides {
    fn apply(self, settings: &mut MonitorSettings) {
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(secs) = self.flush_interval_secs {
            settings.flush_interval_secs = secs;
        }
    }
}

/// Flush triggers: whichever of size or age is reached first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    batch_size: usize,
    flush_interval: Duration,
}

impl MonitorConfig {
    pub fn new(batch_size: usize, flush_interval: Duration) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        if flush_interval.is_zero() {
            return Err(ConfigError::InvalidFlushInterval);
        }
        Ok(Self {
            batch_size,
            flush_interval,
        })
    }

    /// Read `TASKLOG_*` from the environment, apply `overrides`, validate.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_settings(MonitorSettings::init_from_env()?, overrides)
    }

    fn from_settings(
        mut settings: MonitorSettings,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        overrides.apply(&mut settings);
        debug!("monitor settings:\n{settings}");
        Self::try_from(settings)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl TryFrom<MonitorSettings> for MonitorConfig {
    type Error = ConfigError;

    fn try_from(settings: MonitorSettings) -> Result<Self, Self::Error> {
        Self::new(
            settings.batch_size,
            Duration::from_secs(settings.flush_interval_secs),
        )
    }
}
