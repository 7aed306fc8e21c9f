//! Retrying Remote Calls
//!
//! Every gateway call made by the store goes through [`RetryPolicy::run`]:
//! each attempt is time-boxed, transient failures are retried after a fixed
//! delay, everything else is returned at once.

use std::future::Future;
use std::time::Duration;

use bulletin_gateway::{GatewayError, GatewayResult};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            attempt_timeout,
            retry_delay,
        }
    }

    /// One time-boxed attempt, no retries
    pub fn single_attempt(attempt_timeout: Duration) -> Self {
        Self::new(0, attempt_timeout, Duration::ZERO)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Upper bound on the time `run` can take, delays included
    pub fn worst_case(&self) -> Duration {
        self.attempt_timeout * self.total_attempts()
    }

    /// Run `operation` until it succeeds, fails terminally, or the attempts
    /// are used up. The whole run, delays included, ends by `worst_case`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let attempts = self.total_attempts();
        let deadline = Instant::now() + self.worst_case();
        let mut last = GatewayError::Timeout;
        let mut made = 0;

        while made < attempts {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            made += 1;
            let attempt_deadline = (now + self.attempt_timeout).min(deadline);
            let outcome = match tokio::time::timeout_at(attempt_deadline, operation()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout),
            };

            match outcome {
                Ok(value) => {
                    if made > 1 {
                        debug!(label, attempt = made, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(SyncError::Gateway(e)),
                Err(e) => {
                    warn!(label, attempt = made, attempts, error = %e, "attempt failed");
                    last = e;
                    if made < attempts {
                        let resume = (Instant::now() + self.retry_delay).min(deadline);
                        tokio::time::sleep_until(resume).await;
                    }
                }
            }
        }

        if made <= 1 {
            Err(SyncError::Gateway(last))
        } else {
            Err(SyncError::RetriesExhausted {
                attempts: made,
                last,
            })
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(10), Duration::from_secs(1))
    }
}
