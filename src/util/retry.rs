//! Bounded retry with exponential backoff for collaborator RPCs.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry budget for a remote operation. The delay doubles after every
/// failed attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds or the attempt budget is spent,
    /// returning the last error.
    pub async fn run<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.initial_delay * 2u32.pow(attempt - 1);
                    warn!(error = %e, attempt, ?delay, "{name} failed, retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
