//! Retry logic with exponential backoff
//!
//! Registry lookups get a bounded attempt budget. Only transient failures
//! (network errors, timeouts) are retried; a definitive answer such as
//! "version not found" is returned immediately. [`with_timeout`] bounds a
//! single call and turns an elapsed deadline into [`DepupError::Timeout`].

use crate::core::error::DepupError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Options for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Await `future` for at most `limit`
pub async fn with_timeout<T, Fut>(
    operation: impl FnOnce() -> String,
    limit: Duration,
    future: Fut,
) -> Result<T, DepupError>
where
    Fut: Future<Output = Result<T, DepupError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(DepupError::Timeout {
            operation: operation(),
            after: limit,
        }),
    }
}

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use depup::core::{RetryManager, RetryOptions};
///
/// # async fn example() -> depup::core::Result<()> {
/// let manager = RetryManager::new(RetryOptions::default());
/// let version = manager
///     .retry("resolve lodash", || async { Ok::<_, depup::core::DepupError>("4.17.21") })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Execute the given async operation with retry logic
    ///
    /// `label` only appears in log lines.
    pub async fn retry<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, DepupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DepupError>>,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if !error.is_transient() || attempt >= max_attempts => {
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, max_attempts, error, delay
                    );
                    sleep(delay).await;

                    delay = Duration::from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(max_attempts: u32) -> RetryOptions {
        RetryOptions {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    fn network_error() -> DepupError {
        DepupError::Network {
            spec: "lodash".to_string(),
            message: "ECONNRESET".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let manager = RetryManager::new(RetryOptions::default());

        let result = manager.retry("op", || async { Ok::<_, DepupError>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let manager = RetryManager::new(fast_options(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = manager
            .retry("op", move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(network_error())
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let manager = RetryManager::new(fast_options(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = manager
            .retry("op", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<i32, _>(network_error()) }
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resolution_error_is_not_retried() {
        let manager = RetryManager::new(fast_options(5));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = manager
            .retry("op", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err::<i32, _>(DepupError::Resolution {
                        spec: "nope@1.0.0".to_string(),
                        message: "not found".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().code(), "RESOLUTION_ERROR");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let manager = RetryManager::new(fast_options(0));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let _ = manager
            .retry("op", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<i32, _>(network_error()) }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let manager = RetryManager::new(RetryOptions {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
        });

        let start = std::time::Instant::now();
        let _ = manager
            .retry("op", || async { Err::<i32, _>(network_error()) })
            .await;

        // 10ms + 20ms, the last attempt does not wait
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_deadline() {
        let slow = with_timeout(
            || "resolve chalk".to_string(),
            Duration::from_millis(10),
            async {
                sleep(Duration::from_millis(200)).await;
                Ok::<_, DepupError>(1)
            },
        )
        .await;
        let error = slow.unwrap_err();
        assert_eq!(error.code(), "TIMEOUT_ERROR");
        assert!(error.to_string().contains("resolve chalk"));

        let fast = with_timeout(
            || "add".to_string(),
            Duration::from_secs(1),
            async { Ok::<_, DepupError>(7) },
        )
        .await;
        assert_eq!(fast.unwrap(), 7);
    }

    #[test]
    fn test_retry_options_default() {
        let options = RetryOptions::default();

        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.initial_delay, Duration::from_secs(1));
        assert_eq!(options.max_delay, Duration::from_secs(30));
        assert_eq!(options.backoff_multiplier, 2.0);
    }
}
