//! Retry timing for deferred sync work.
//!
//! Exponential backoff starting at a fixed base delay, plus the hard attempt
//! ceiling after which a job gives up and leaves its pending row for the
//! periodic reconciliation pass.

use std::time::Duration;

/// Default base delay before the first retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(2_000);

/// Upper bound for a single backoff delay (five hours).
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

/// Number of attempts after which a worker reports permanent failure.
pub const MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
}

impl BackoffPolicy {
    /// Create an exponential policy with the given base delay.
    pub fn exponential(base: Duration) -> Self {
        Self { base }
    }

    /// The base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before running attempt number `attempt` again.
    ///
    /// `attempt` counts completed attempts, so the first retry
    /// (`attempt == 1`) waits exactly `base`, the second `2 * base`, and so
    /// on, capped at [`MAX_BACKOFF_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF_DELAY)
            .min(MAX_BACKOFF_DELAY)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_BASE)
    }
}

/// Whether a job that has already run `attempt` times must give up.
pub fn is_exhausted(attempt: u32, max_attempts: u32) -> bool {
    attempt >= max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_waits_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn attempt_zero_treated_as_first() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), policy.base());
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(2));
        assert_eq!(policy.delay_for(40), MAX_BACKOFF_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn exhaustion_at_ceiling() {
        assert!(!is_exhausted(0, MAX_ATTEMPTS));
        assert!(!is_exhausted(4, MAX_ATTEMPTS));
        assert!(is_exhausted(5, MAX_ATTEMPTS));
        assert!(is_exhausted(9, MAX_ATTEMPTS));
    }
}
