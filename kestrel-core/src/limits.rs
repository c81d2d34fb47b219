//! Request bounds and timeout policy.
//!
//! Every caller-supplied size and timeout passes through [`Limits`] before it
//! reaches a broker. Out-of-range values are clamped, not rejected, so a
//! careless UI cannot make a console call unbounded.

use std::time::Duration;

use crate::error::{ConsoleError, ConsoleResult};

/// Bounds applied to console requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Record count bounds.
    /// Smallest accepted `maxMessages`.
    pub min_messages: u32,
    /// Largest accepted `maxMessages`; also the per-poll record cap.
    pub max_messages: u32,
    /// `maxMessages` used when the caller sends none.
    pub default_messages: u32,

    // Per-poll timeout bounds.
    /// Shortest accepted per-poll timeout in milliseconds.
    pub min_poll_timeout_ms: u32,
    /// Longest accepted per-poll timeout in milliseconds.
    pub max_poll_timeout_ms: u32,
    /// Per-poll timeout used when the caller sends none.
    pub default_poll_timeout_ms: u32,

    // API timeout policy.
    /// Configured API timeouts below this are considered unset.
    pub min_api_timeout_ms: u32,
    /// API timeout used when the configured one is unset or too small.
    pub fallback_api_timeout_ms: u32,
    /// Lower clamp for admin (group describe/list/alter) calls.
    pub min_admin_timeout_ms: u32,
    /// Upper clamp for admin calls.
    pub max_admin_timeout_ms: u32,
    /// Floor for the consumer's max poll interval.
    pub min_poll_interval_ms: u32,
}

impl Limits {
    /// Creates limits with the console defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Records: 1..=500, default 50.
            min_messages: 1,
            max_messages: 500,
            default_messages: 50,

            // Poll: 100ms..=10s, default 1s.
            min_poll_timeout_ms: 100,
            max_poll_timeout_ms: 10_000,
            default_poll_timeout_ms: 1_000,

            // API: anything under 1s means 15s; admin calls 8s..=15s.
            min_api_timeout_ms: 1_000,
            fallback_api_timeout_ms: 15_000,
            min_admin_timeout_ms: 8_000,
            max_admin_timeout_ms: 15_000,
            min_poll_interval_ms: 30_000,
        }
    }

    /// Clamps a requested record count into `min_messages..=max_messages`.
    #[must_use]
    pub fn clamp_messages(&self, requested: Option<u32>) -> u32 {
        requested.map_or(self.default_messages, |value| {
            value.clamp(self.min_messages, self.max_messages)
        })
    }

    /// Clamps a requested per-poll timeout into its bounds.
    #[must_use]
    pub fn clamp_poll_timeout(&self, requested_ms: Option<u32>) -> Duration {
        let ms = requested_ms.map_or(self.default_poll_timeout_ms, |value| {
            value.clamp(self.min_poll_timeout_ms, self.max_poll_timeout_ms)
        });
        Duration::from_millis(u64::from(ms))
    }

    /// Resolves the configured API timeout, falling back when it is unset or
    /// below the minimum.
    #[must_use]
    pub fn api_timeout(&self, configured_ms: Option<u32>) -> Duration {
        let ms = match configured_ms {
            Some(value) if value >= self.min_api_timeout_ms => value,
            _ => self.fallback_api_timeout_ms,
        };
        Duration::from_millis(u64::from(ms))
    }

    /// Clamps an API timeout into the admin call window.
    #[must_use]
    pub fn admin_timeout(&self, api_timeout: Duration) -> Duration {
        api_timeout.clamp(
            Duration::from_millis(u64::from(self.min_admin_timeout_ms)),
            Duration::from_millis(u64::from(self.max_admin_timeout_ms)),
        )
    }

    /// Wall-clock budget for a bounded fetch: never shorter than one poll.
    #[must_use]
    pub fn fetch_budget(&self, poll_timeout: Duration, api_timeout: Duration) -> Duration {
        poll_timeout.max(api_timeout)
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any range is empty or a default falls outside it.
    pub fn validate(&self) -> ConsoleResult<()> {
        if self.min_messages == 0 {
            return Err(ConsoleError::invalid_argument(
                "min_messages",
                "must be positive",
            ));
        }

        if self.max_messages < self.min_messages
            || !(self.min_messages..=self.max_messages).contains(&self.default_messages)
        {
            return Err(ConsoleError::invalid_argument(
                "default_messages",
                "must lie within min_messages..=max_messages",
            ));
        }

        if self.max_poll_timeout_ms < self.min_poll_timeout_ms
            || !(self.min_poll_timeout_ms..=self.max_poll_timeout_ms)
                .contains(&self.default_poll_timeout_ms)
        {
            return Err(ConsoleError::invalid_argument(
                "default_poll_timeout_ms",
                "must lie within min_poll_timeout_ms..=max_poll_timeout_ms",
            ));
        }

        if self.max_admin_timeout_ms < self.min_admin_timeout_ms {
            return Err(ConsoleError::invalid_argument(
                "max_admin_timeout_ms",
                "must be >= min_admin_timeout_ms",
            ));
        }

        if self.fallback_api_timeout_ms < self.min_api_timeout_ms {
            return Err(ConsoleError::invalid_argument(
                "fallback_api_timeout_ms",
                "must be >= min_api_timeout_ms",
            ));
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
