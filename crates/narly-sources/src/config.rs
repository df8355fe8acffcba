#![forbid(unsafe_code)]

//! Scheduler configuration.
//!
//! Defaults can be overridden from the environment:
//!
//! - `NARLY_MAX_TIMER_FIRES`: upper bound on timer fires in one
//!   [`Scheduler::advance`](crate::Scheduler::advance) call.

use std::env;

/// Environment variable overriding [`SchedulerConfig::max_fires_per_advance`].
pub const MAX_TIMER_FIRES_ENV: &str = "NARLY_MAX_TIMER_FIRES";

/// Tunables for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Fires allowed in one `advance` before it bails out with
    /// [`SourceError::RunawayTimers`](crate::SourceError::RunawayTimers).
    /// Zero disables the limit.
    pub max_fires_per_advance: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_fires_per_advance: 100_000,
        }
    }
}

impl SchedulerConfig {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults with overrides read through `lookup`. Unparseable values are
    /// ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup(MAX_TIMER_FIRES_ENV)
            && let Ok(n) = val.trim().parse()
        {
            config.max_fires_per_advance = n;
        }
        config
    }

    #[must_use]
    pub fn max_fires_per_advance(mut self, limit: usize) -> Self {
        self.max_fires_per_advance = limit;
        self
    }

    pub(crate) fn limit(&self) -> Option<usize> {
        (self.max_fires_per_advance > 0).then_some(self.max_fires_per_advance)
    }
}
