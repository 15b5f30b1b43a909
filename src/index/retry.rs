//! Bounded retry with per-attempt timeout and exponential backoff.
//!
//! Every call to the index goes through a `RetryPolicy`. Only transient
//! failures (timeouts, dropped connections, 429/502/503/504) are retried;
//! anything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::IndexError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
    /// Growth factor applied after each retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            attempt_timeout: Duration::from_secs(180),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_retries` retries after the first attempt.
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            attempt_timeout,
            ..Default::default()
        }
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(current.as_secs_f64() * self.multiplier).min(self.max_delay)
    }

    /// Run `op`, retrying transient failures until the attempt cap is reached.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, IndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexError>>,
    {
        self.run_counted(operation, op).await.map(|(value, _)| value)
    }

    /// Like `run`, also returning how many attempts the successful call took.
    pub async fn run_counted<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<(T, u32), IndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(IndexError::Timeout {
                    operation: operation.to_string(),
                    timeout: self.attempt_timeout,
                }),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok((value, attempt));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempt, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
