//! Reusable retry policy with exponential backoff.
//!
//! One policy serves both task fetch and result submission: a bounded number
//! of attempts, `base * 2^attempt` delay between them, and a per-error
//! retryability predicate so credential rejections and cancellations bail
//! out immediately. Shutdown interrupts both the backoff wait and the loop.

use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;
use crate::shutdown::Shutdown;

/// Errors a [`RetryPolicy`] can classify.
pub trait Retryable {
    /// Whether another attempt may be made after this error.
    fn is_retryable(&self) -> bool;

    /// The error surfaced when shutdown aborts the loop.
    fn cancelled() -> Self;
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        ClientError::is_retryable(self)
    }

    fn cancelled() -> Self {
        ClientError::Cancelled
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` fails: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `op` until it succeeds, fails unretryably, or the attempt budget
    /// is spent. The last error is returned on exhaustion.
    ///
    /// No backoff wait follows the final attempt, and shutdown aborts both
    /// waits and further attempts with the cancelled error.
    pub async fn run<T, E, F, Fut>(&self, shutdown: &Shutdown, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            if shutdown.is_shutdown() {
                return Err(E::cancelled());
            }
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < attempts
                        && !shutdown.sleep(self.delay_for(attempt)).await
                    {
                        return Err(E::cancelled());
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(E::cancelled))
    }
}
