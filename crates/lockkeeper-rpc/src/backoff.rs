//! Backoff between endpoint attempts
//!
//! Delay for attempt `n` (0-based) is `min(base * (n + 1), max)` scaled by a
//! random jitter in `[0.5, 1.5]`, then capped at `max` again.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Upper bound on any single sleep between attempts
pub const MAX_BACKOFF: Duration = Duration::from_millis(1500);

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Un-jittered delay for a 0-based attempt number
    pub fn ceiling(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay for an attempt with an explicit jitter factor
    pub fn delay(&self, attempt: usize, jitter: f64) -> Duration {
        let jitter = jitter.clamp(JITTER_MIN, JITTER_MAX);
        self.ceiling(attempt).mul_f64(jitter).min(self.max_delay)
    }

    /// Delay for an attempt with a fresh random jitter
    pub fn jittered(&self, attempt: usize) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.delay(attempt, jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), MAX_BACKOFF)
    }
}

/// Something that can wait. Injected so tests can observe delays
/// instead of sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
