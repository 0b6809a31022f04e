use std::time::Duration;

use thiserror::Error;

/// Timings for a FEL processing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FelConfig {
    /// How often elapsed time and progress are refreshed
    pub tick_interval: Duration,
    /// How often the authority is asked for the document status
    pub poll_interval: Duration,
    /// Local ceiling after which the session ends in `timeout`
    pub timeout: Duration,
    /// Typical authority turnaround, used for the remaining-time estimate
    pub expected_duration: Duration,
    /// Consecutive failed polls tolerated before the session ends in `error`
    pub max_poll_failures: u32,
}

impl Default for FelConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
            expected_duration: Duration::from_secs(30),
            max_poll_failures: 3,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid number")]
    NotANumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },

    #[error("poll interval must not be shorter than the tick interval")]
    PollFasterThanTick,

    #[error("timeout must be longer than the poll interval")]
    TimeoutTooShort,
}

impl FelConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_duration(mut self, expected: Duration) -> Self {
        self.expected_duration = expected;
        self
    }

    pub fn with_max_poll_failures(mut self, max: u32) -> Self {
        self.max_poll_failures = max;
        self
    }

    /// Defaults overridden by `FEL_TICK_INTERVAL_MS`, `FEL_POLL_INTERVAL_MS`,
    /// `FEL_TIMEOUT_SECS`, `FEL_EXPECTED_SECS` and `FEL_MAX_POLL_FAILURES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(raw) => {
                    let value = raw
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::NotANumber { var, value: raw.clone() })?;
                    if value == 0 {
                        return Err(ConfigError::Zero { var });
                    }
                    Ok(Some(value))
                }
            }
        };

        let mut config = Self::default();
        if let Some(ms) = read("FEL_TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read("FEL_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = read("FEL_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read("FEL_EXPECTED_SECS")? {
            config.expected_duration = Duration::from_secs(secs);
        }
        if let Some(max) = read("FEL_MAX_POLL_FAILURES")? {
            config.max_poll_failures = u32::try_from(max).map_err(|_| ConfigError::NotANumber {
                var: "FEL_MAX_POLL_FAILURES",
                value: max.to_string(),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Zero { var: "FEL_TICK_INTERVAL_MS" });
        }
        if self.max_poll_failures == 0 {
            return Err(ConfigError::Zero { var: "FEL_MAX_POLL_FAILURES" });
        }
        if self.poll_interval < self.tick_interval {
            return Err(ConfigError::PollFasterThanTick);
        }
        if self.timeout <= self.poll_interval {
            return Err(ConfigError::TimeoutTooShort);
        }
        Ok(())
    }
}
