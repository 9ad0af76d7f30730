use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::RetryConfig;

/// Exponential backoff with jitter, applied uniformly to any operation
/// against a rate-limited backend.
///
/// Delay before retry `attempt` (zero-based) is
/// `min(base_delay * 2^attempt + jitter, max_delay)` where jitter is drawn
/// uniformly from `[0, base_delay)`. The attempt counter belongs to one
/// logical operation; callers construct or reuse the policy per operation.
#[derive(Debug, Clone, Copy)]
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

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Deterministic component of the backoff delay, before jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.base_delay.as_millis() > 0 {
            rand::thread_rng().gen_range(0..self.base_delay.as_millis() as u64)
        } else {
            0
        };
        let delay = self.base_delay_for(attempt) + Duration::from_millis(jitter_ms);
        delay.min(self.max_delay)
    }

    /// Run `op`, retrying while `is_retryable` holds and attempts remain.
    /// The first call is attempt 0 and is never delayed; only retries wait.
    pub async fn call<T, E, F, Fut, P>(&self, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
