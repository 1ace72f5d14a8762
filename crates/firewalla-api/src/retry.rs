//! Bounded exponential backoff for transient API failures.
//!
//! Only errors classified as [`ErrorKind::Transient`](crate::ErrorKind::Transient)
//! are retried. Auth, not-found and validation failures surface on the
//! first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Error;

/// Retry schedule: delay doubles from `base_delay`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Every delay this policy will sleep, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|retry| self.delay_for(retry))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
///
/// A rate-limit response stretches the delay to the server's `Retry-After`,
/// still bounded by `max_delay`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut retry = 0u32;

    loop {
        match op().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(operation, attempts = retry + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && retry + 1 < attempts => {
                let mut delay = policy.delay_for(retry);
                if let Some(secs) = err.retry_after_secs() {
                    delay = delay.max(Duration::from_secs(secs)).min(policy.max_delay);
                }
                warn!(
                    operation,
                    attempt = retry + 1,
                    max_attempts = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation, attempts, error = %err, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}
