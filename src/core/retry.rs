//! Retry with exponential backoff for calls to external services.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::errors::ServiceError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff for the given zero-based retry attempt, with up to 25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let exp = base.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::rng().random_range(0..=exp / 4);
        Duration::from_millis(exp + jitter)
    }
}

pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempts = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempts < policy.max_retries => {
                let delay = policy.delay_for(attempts);
                attempts += 1;
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation,
                    attempts,
                    policy.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::error!("{} failed after {} retries: {}", operation, attempts, err);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::timeout("svc", 1))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(2), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::transport("svc", "down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(5), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::decode("svc", "garbage")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let first = policy.delay_for(0).as_millis();
        let third = policy.delay_for(2).as_millis();
        assert!((100..=125).contains(&first));
        assert!((400..=500).contains(&third));
    }
}
