//! Retry/backoff primitives (C19).
//!
//! A single combinator used by the webhook delivery engine and available to any
//! port caller. Mirrors the original `RetryConfig`/`calculate_delay` formula:
//! `delay = min(max_delay, base_delay * exponential_base^attempt)`, jittered by
//! `± uniform(0, delay * jitter)`, floored at zero.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Fraction of `delay` used as the jitter range, e.g. `0.1` == ±10%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay schedule used by the webhook delivery engine: 1s, 5s, 30s.
    pub fn webhook_delivery() -> FixedSchedule {
        FixedSchedule(vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(30),
        ])
    }

    /// Computes the delay before retry attempt `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let delay = if self.jitter > 0.0 {
            let jitter_range = capped * self.jitter;
            let offset = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }

    /// Non-retryable codes always win over retryable codes, matching the
    /// original's "check non-retryable first" precedence.
    pub fn should_retry(&self, code: &str, retryable: &[&str], non_retryable: &[&str]) -> bool {
        if non_retryable.contains(&code) {
            return false;
        }
        retryable.contains(&code)
    }

    /// Runs `op` until it succeeds or `max_retries` is exhausted, sleeping
    /// `calculate_delay` between attempts. The predicate decides whether a
    /// given error is worth retrying.
    pub async fn run<F, Fut, T, E>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    tokio::time::sleep(self.calculate_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A literal, non-formulaic delay schedule (webhook delivery's 1s/5s/30s).
pub struct FixedSchedule(Vec<Duration>);

impl FixedSchedule {
    pub fn max_attempts(&self) -> u32 {
        self.0.len() as u32
    }

    /// Delay before the (1-indexed) retry attempt `n`, i.e. the delay after
    /// the `n`-th failed attempt. Returns `None` once attempts are exhausted.
    pub fn delay_for_attempt(&self, attempt_number: u32) -> Option<Duration> {
        self.0.get((attempt_number - 1) as usize).copied()
    }
}
