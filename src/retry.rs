//! Bounded exponential-backoff retries for outbound calls.
//!
//! Every upload and submission goes through [`RetryPolicy::execute`]. The
//! wait before retry `n` (0-indexed) is `backoff_base * 2^n`, so with the
//! default 1 s base and 3 attempts the sequence is 1 s → 2 s.
//!
//! Only errors whose [`Transient::is_transient`] returns `true` are retried.
//! Anything else, and the error of the last attempt, is returned unchanged.

use crate::error::Transient;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry bound and backoff base shared by all outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts; it is clamped to ≥ 1.
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_base,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait applied after the failed attempt with index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// bound is reached.
    ///
    /// `label` names the operation in retry notices.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_retries,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
