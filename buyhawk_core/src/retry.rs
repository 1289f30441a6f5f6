// Bounded retry with exponential backoff for transient network failures.
// One policy value is shared by the chain reader, the executor, and the
// notifier so upstream quotas see a consistent shape.

use crate::error::CoreError;
use crate::settings::Settings;
use log::debug;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.retry_max_attempts,
            Duration::from_millis(settings.retry_base_delay_ms),
            Duration::from_millis(settings.retry_max_delay_ms),
        )
    }

    /// Backoff before the retry following the given 1-based attempt:
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// Only errors reporting `is_transient()` are retried.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.delay_for(attempt);
                    debug!(
                        "{} failed (attempt {}/{}), backing off {:?}: {}",
                        what, attempt, self.max_attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
