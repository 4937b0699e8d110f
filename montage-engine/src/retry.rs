//! Step retry policy
//!
//! Transient step errors are retried with capped exponential backoff; every
//! attempt runs under a timeout. Terminal errors stop immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StepError;

/// How a step body is retried before its failure is recorded
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the body exactly once
    pub fn once(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            timeout,
            ..Default::default()
        }
    }

    /// Delay before the retry following `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `f` until it succeeds, fails terminally or attempts run out
    ///
    /// A transient error on the last attempt is reported as terminal so the
    /// caller can record it.
    pub async fn run<T, F, Fut>(&self, step: &str, mut f: F) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(StepError::transient(format!(
                    "timed out after {:?}",
                    self.timeout
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(StepError::Terminal(msg)) => return Err(StepError::Terminal(msg)),
                Err(StepError::Transient(msg)) if attempt >= max_attempts => {
                    return Err(StepError::terminal(format!(
                        "{msg} (after {attempt} attempts)"
                    )));
                }
                Err(StepError::Transient(msg)) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "Step '{}' attempt {}/{} failed: {}. Retrying in {:?}",
                        step, attempt, max_attempts, msg, delay
                    );
                    tokio::time::sleep(delay).await;
                    debug!("Retrying step '{}'", step);
                }
            }
        }
    }
}
