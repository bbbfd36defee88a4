//! Bounded-retry combinator for remote calls.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

/// Exponential backoff with a fixed attempt ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `op` until it succeeds or the attempt ceiling is hit, sleeping the
/// backoff interval between attempts. Returns the last error once the
/// ceiling is reached; the operation must be idempotent.
pub async fn with_retry<T, E, Op, Fut>(policy: &RetryPolicy, label: &str, mut op: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => {
                tracing::warn!(op = label, attempts = attempt, error = %err, "retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                tracing::debug!(
                    op = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "remote call failed, backing off",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
