//! Bounded retry policies shared by the sensor strategies and the transmitter.
//!
//! Every polling loop in the node is expressed as a [`RetryPolicy`] so the
//! attempt budget, the pause between attempts, and the wall-clock ceiling are
//! declared once next to the configuration instead of being scattered through
//! the acquisition code.

use core::time::Duration;

/// Attempt budget plus pacing for a bounded loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub attempts: u16,
    /// Pause inserted after each attempt.
    pub interval: Duration,
    /// Wall-clock ceiling for the whole loop, if the loop measures time.
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Policy that runs exactly once without pacing.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            interval: Duration::ZERO,
            timeout: None,
        }
    }

    /// Creates a policy with an attempt budget and a pause between attempts.
    #[must_use]
    pub const fn new(attempts: u16, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            timeout: None,
        }
    }

    /// Attaches a wall-clock ceiling to the policy.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pause between attempts in whole milliseconds, saturating at `u32::MAX`.
    pub fn interval_ms(&self) -> u32 {
        u32::try_from(self.interval.as_millis()).unwrap_or(u32::MAX)
    }

    /// Pause between attempts in whole microseconds, saturating at `u32::MAX`.
    pub fn interval_us(&self) -> u32 {
        u32::try_from(self.interval.as_micros()).unwrap_or(u32::MAX)
    }

    /// Timeout in whole microseconds, if one is configured.
    pub fn timeout_us(&self) -> Option<u64> {
        self.timeout
            .map(|timeout| u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX))
    }

    /// Returns `true` when `elapsed_us` has reached the configured ceiling.
    pub fn timed_out(&self, elapsed_us: u64) -> bool {
        self.timeout_us().is_some_and(|limit| elapsed_us >= limit)
    }

    /// Iterator over attempt indices, never yielding fewer than one attempt.
    pub fn attempt_indices(&self) -> core::ops::Range<u16> {
        0..self.attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}
