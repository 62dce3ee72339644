//! Back-off policy for transient store failures.

use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

const MAX_DELAY: Duration = Duration::from_secs(60);

/// Whether a failed request may succeed if sent again unchanged.
///
/// Timeouts, connection failures, 5xx and 429 qualify. Precondition
/// answers and other 4xx never do.
pub(crate) fn is_transient(err: &StoreError) -> bool {
    match err {
        StoreError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        StoreError::Status { .. } => err.is_transient_status(),
        StoreError::Xml(_)
        | StoreError::InvalidResponse(_)
        | StoreError::InvalidConfig(_)
        | StoreError::Signing(_)
        | StoreError::TooManyPages { .. }
        | StoreError::LockPoisoned => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Extra attempts after the first one.
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based): the base
    /// doubled per retry, capped at one minute.
    pub(crate) fn nominal_delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// [`Self::nominal_delay`] scaled by a random factor in `[0.75, 1.25)`.
    fn jittered_delay(&self, retry: u32) -> Duration {
        self.nominal_delay(retry)
            .mul_f64(rand::random::<f64>() * 0.5 + 0.75)
    }

    /// Run `send` until it succeeds, fails permanently, or the retry budget
    /// is spent. The last error is returned.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &'static str, mut send: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match send().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if retry >= self.max_retries || !is_transient(&err) {
                return Err(err);
            }
            retry += 1;
            let delay = self.jittered_delay(retry);
            tracing::warn!(
                operation,
                retry,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "store: transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
