//! Bounded retry with exponential backoff for transient fetch failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::error::FetchError;

/// How often and how patiently to retry.
///
/// With the defaults (3 retries, 500ms base) the waits are 0.5s, 1s, 2s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
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
    /// Wait before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of retries.
///
/// Permanent errors are returned unchanged. When every attempt failed
/// transiently the last error is wrapped in [`FetchError::Upstream`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt > policy.max_retries => {
                return Err(FetchError::Upstream {
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.delay(attempt);
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient fetch failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    fn unavailable() -> FetchError {
        FetchError::Status {
            status: 503,
            url: "https://example.test".to_string(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(3), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("rows")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_upstream_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(&fast(2), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        match result {
            Err(FetchError::Upstream { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_retry(&fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                status: 404,
                url: "https://example.test".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
