//! Exponential backoff for rate-limited model calls.
//!
//! Only [`LlmError::RateLimited`] is retried. Every other error surfaces at
//! once. Each wait is announced with a `WorkshopRateLimitWarning` event and
//! can be interrupted through the run's cancellation token.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use workshop_config::RetryConfig;
use workshop_core::error::{Error, LlmError};
use workshop_core::event::{Notifier, WorkshopEvent};

/// Waits between attempts. Swapped out in tests to record the schedule.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Who is retrying, for log lines and warning events.
pub struct RetryScope<'a> {
    pub workbench_id: &'a str,
    pub provider_id: &'a str,
    pub model_id: &'a str,
    pub phase: &'a str,
    pub notifier: &'a dyn Notifier,
    pub sleeper: &'a dyn Sleeper,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |wait| wait.min(self.max_delay))
    }

    /// Run `call` until it succeeds, fails with something other than a rate
    /// limit, or the retries are used up. Cancellation wins over both the
    /// call and the wait.
    pub async fn run<T, F, Fut>(&self, scope: &RetryScope<'_>, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => return Err(Error::Canceled),
                outcome = call() => outcome,
            };
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err @ LlmError::RateLimited(_)) if attempt < self.max_retries => err,
                Err(err) => return Err(err.into()),
            };

            attempt += 1;
            let wait = self.backoff(attempt);
            let wait_ms = wait.as_millis() as u64;
            warn!(
                workbench_id = scope.workbench_id,
                phase = scope.phase,
                retry_attempt = attempt,
                retry_max = self.max_retries,
                retry_in_ms = wait_ms,
                error = %err,
                "Rate limited; retrying"
            );
            scope.notifier.notify(WorkshopEvent::RateLimitWarning {
                workbench_id: scope.workbench_id.to_string(),
                provider_id: scope.provider_id.to_string(),
                model_id: scope.model_id.to_string(),
                phase: scope.phase.trim().to_string(),
                retry_attempt: attempt,
                retry_max: self.max_retries,
                wait_ms,
                warning_message: format!(
                    "Rate limit reached. Retrying in {wait_ms} ms ({attempt}/{}).",
                    self.max_retries
                ),
            });

            tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => return Err(Error::Canceled),
                _ = scope.sleeper.sleep(wait) => {}
            }
        }
    }
}
