//! Bounded retry with exponential backoff and a per-attempt deadline.

use std::future::Future;
use std::time::Duration;

use crate::error::{QueryError, QueryErrorKind};

/// Retry policy attached to a single external call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Error kinds that trigger another attempt.
    pub retry_on: Vec<QueryErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            retry_on: vec![
                QueryErrorKind::ServiceUnavailable,
                QueryErrorKind::RateLimited,
            ],
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn is_retryable(&self, kind: QueryErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Wait before retry number `attempt`: the backoff, stretched to an upstream
    /// `Retry-After` hint when that is longer, never past `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        retry_after
            .map_or(backoff, |hint| hint.max(backoff))
            .min(self.max_delay)
    }

    /// Run `f` until it succeeds, fails with a non-retryable kind, or attempts run out.
    ///
    /// Each attempt is bounded by `timeout`; an elapsed deadline counts as
    /// [`QueryErrorKind::ServiceUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns the last error once the policy gives up.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        mut f: F,
    ) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<QueryError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e.into(),
                Err(_) => QueryError::unavailable(format!(
                    "{operation} timed out after {}ms",
                    timeout.as_millis()
                )),
            };

            attempt += 1;
            if attempt >= attempts || !self.is_retryable(err.kind) {
                if attempt > 1 {
                    tracing::warn!(operation, attempt, kind = %err.kind, "giving up: {}", err.message);
                }
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1, err.retry_after);
            tracing::warn!(
                operation,
                attempt,
                max_attempts = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                kind = %err.kind,
                "retrying: {}",
                err.message
            );
            tokio::time::sleep(delay).await;
        }
    }
}
