//! Retry logic.
//!
//! # Responsibilities
//! - Classify a failure as retryable (throttled) or terminal
//! - Execute retries with exponential backoff
//! - Cap the number of attempts per logical operation
//!
//! # Design Decisions
//! - Only a throttling signal is retryable; every other error returns at once
//! - Attempt counter and delay are local to one `execute` call
//! - The last error is returned unchanged when attempts run out

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Error classifier used by [`RetryExecutor::execute`].
pub trait Retryable {
    /// Whether the failed operation may be attempted again.
    fn is_retryable(&self) -> bool;
}

/// Attempt ceiling and initial backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
        }
    }
}

/// Runs remote operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `operation`, retrying while its error reports [`Retryable::is_retryable`].
    pub async fn execute<T, E, F, Fut>(&self, name: &'static str, operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(name, operation, |e: &E| e.is_retryable())
            .await
    }

    /// Like [`execute`](Self::execute) with an explicit classifier.
    pub async fn execute_with<T, E, F, Fut, C>(
        &self,
        name: &'static str,
        mut operation: F,
        classify: C,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= max_attempts || !classify(&error) {
                if attempt > 1 {
                    tracing::warn!(
                        operation = name,
                        attempts = attempt,
                        error = %error,
                        "Giving up on remote call"
                    );
                }
                return Err(error);
            }

            let delay = calculate_backoff(attempt, self.policy.initial_delay);
            tracing::info!(
                operation = name,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Throttled, retrying after backoff"
            );
            metrics::record_retry(name);
            sleep(delay).await;
        }
    }
}
