//! Bounded retry with exponential backoff.
//!
//! Only errors classified by [`crate::models::HintcalError::is_retryable`] are retried;
//! everything else returns on first failure.

use crate::models::{Result, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry schedule for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Wait before retry number `attempt` (0-based).
    ///
    /// A server-provided `retry_after_secs` takes precedence over the
    /// exponential schedule. Both are capped at `max_backoff`.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<f64>) -> Duration {
        let delay = match retry_after_secs {
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
            }
            _ => self
                .base_backoff
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.delay(attempt, e.retry_after());
                    debug!(
                        op = label,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
