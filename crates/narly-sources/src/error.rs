use web_time::Duration;

use thiserror::Error;

/// Result alias for fallible source and scheduler operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised while building sources or driving a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// A timer, delay, or period of zero was requested.
    #[error("timer interval must be non-zero")]
    ZeroInterval,

    /// One `advance` fired more timers than the configured limit allows.
    #[error("timer fire limit exceeded: {fired} fires within {advanced:?} (limit {limit})")]
    RunawayTimers {
        /// Fires counted before bailing out.
        fired: usize,
        /// The configured `max_fires_per_advance`.
        limit: usize,
        /// Clock time covered before bailing out.
        advanced: Duration,
    },
}

impl SourceError {
    /// Build a [`SourceError::RunawayTimers`].
    #[must_use]
    pub fn runaway(fired: usize, limit: usize, advanced: Duration) -> Self {
        Self::RunawayTimers {
            fired,
            limit,
            advanced,
        }
    }
}
