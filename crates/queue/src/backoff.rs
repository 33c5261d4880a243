//! Retry delay computation.
//!
//! Exponential backoff with a hard ceiling and optional jitter. The jitter
//! spreads retries of jobs that failed together (an inference outage fails a
//! whole batch at once) so they do not all become claimable in the same poll
//! tick.

use std::time::Duration;

use rand::Rng;

/// How long to wait before re-running a failed job.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per additional attempt.
    pub multiplier: f64,
    /// Ceiling on the computed delay, applied before jitter.
    pub max_delay: Duration,
    /// Randomize each delay within ±25%.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay to apply after the given attempt number (1-based).
    ///
    /// Attempt 1 waits `base`, attempt 2 waits `base * multiplier`, and so
    /// on, clamped to `max_delay`. Attempt 0 is treated as 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let clamped = raw.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter {
            clamped * rand::rng().random_range(0.75..1.25)
        } else {
            clamped
        };
        Duration::from_secs_f64(secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
