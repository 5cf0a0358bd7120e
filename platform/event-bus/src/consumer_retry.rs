//! Consumer retry logic with exponential backoff
//!
//! Provides retry functionality for event consumers to handle transient failures
//! before events are sent to the Dead Letter Queue (DLQ).

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration (doubles on each retry)
    pub initial_backoff: Duration,
    /// Maximum backoff duration to cap exponential growth
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Retry a fallible async operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry (must be Send)
/// * `config` - Retry configuration
/// * `context` - Context string for logging (e.g., "process_payment_event")
///
/// # Returns
/// * `Ok(T)` if operation succeeds within max_attempts
/// * `Err(E)` if all retries are exhausted
///
/// # Example
/// ```rust
/// use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
///
/// # async fn example() -> Result<(), String> {
/// let config = RetryConfig::default();
/// let result = retry_with_backoff(
///     || async { Ok::<_, String>(42) },
///     &config,
///     "example_operation"
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Send,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        context = %context,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        context = %context,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    context = %context,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Operation failed, retrying with backoff"
                );

                sleep(backoff).await;

                // Exponential backoff with cap
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

/// Result of [`retry_from`]: the operation's output plus the attempt index it succeeded on.
///
/// Callers that chain a second `retry_from` call (the provider handler's DB-then-publish steps)
/// pass `attempts_used` back in as `start_attempt` so the back-off ladder keeps climbing instead
/// of resetting to zero — this is the "retry counter coupling" the provider handler depends on.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts_used: u32,
}

/// Why [`retry_from`] stopped without producing a value.
///
/// `Cancelled` is distinct from attempt exhaustion: it means the parent shutdown token fired
/// while the backoff sleep or the operation itself was in flight, and the caller should unwind
/// rather than treat this as a normal failed attempt (e.g. by publishing a `payments.failed`
/// event for work that was never actually attempted).
#[derive(Debug)]
pub enum RetryError<E> {
    Cancelled,
    Failed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "cancelled"),
            RetryError::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Linear-backoff retry with an externally supplied starting attempt index.
///
/// Sleeps `5s * attempt` before each call (attempt 0 sleeps 0s, i.e. runs immediately), and gives
/// up after `max_attempts` total tries starting from `start_attempt`. This is distinct from
/// [`retry_with_backoff`]'s exponential ladder: the provider handler's DB-insert and publish
/// steps share one continuing attempt counter rather than each independently starting fresh.
///
/// Both the backoff sleep and the operation call race against `shutdown` so a cancellation fires
/// within one tick rather than after the whole retry ladder unwinds.
pub async fn retry_from<F, Fut, T, E>(
    start_attempt: u32,
    max_attempts: u32,
    operation: F,
    context: &str,
    shutdown: &CancellationToken,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Send,
{
    let mut last_err = None;

    for attempt in start_attempt..max_attempts {
        if attempt > 0 {
            tokio::select! {
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(Duration::from_secs(5) * attempt) => {}
            }
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => return Ok(RetryOutcome { value, attempts_used: attempt }),
            Err(e) => {
                warn!(
                    context = %context,
                    attempt = attempt + 1,
                    error = %e,
                    "attempt failed"
                );
                last_err = Some(e);
            }
        }
    }

    Err(RetryError::Failed(last_err.expect("max_attempts must be > start_attempt")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let config = RetryConfig::default();
        let result = retry_with_backoff(
            || async { Ok::<_, String>(42) },
            &config,
            "test_operation",
        )
        .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let config = RetryConfig::default();
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff(
            || {
                let attempts = attempts_clone.clone();
                async move {
                    let mut count = attempts.lock().unwrap();
                    *count += 1;
                    if *count < 3 {
                        Err(format!("Attempt {}", *count))
                    } else {
                        Ok(42)
                    }
                }
            },
            &config,
            "test_operation",
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        };

        let result = retry_with_backoff(
            || async { Err::<i32, _>("persistent error") },
            &config,
            "test_operation",
        )
        .await;

        assert_eq!(result, Err("persistent error"));
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };

        let start = std::time::Instant::now();
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let _result = retry_with_backoff(
            || {
                let attempts = attempts_clone.clone();
                async move {
                    let mut count = attempts.lock().unwrap();
                    *count += 1;
                    Err::<i32, _>("error")
                }
            },
            &config,
            "test_operation",
        )
        .await;

        let elapsed = start.elapsed();

        // Should have waited: 10ms + 20ms + 40ms = 70ms minimum
        // But capped at 50ms for last retry: 10ms + 20ms + 50ms = 80ms
        assert!(elapsed >= Duration::from_millis(70));
        assert_eq!(*attempts.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn retry_from_continues_the_attempt_counter() {
        let shutdown = CancellationToken::new();

        // DB step fails once then succeeds on attempt 1.
        let db_attempts = Arc::new(Mutex::new(0));
        let db_attempts_clone = db_attempts.clone();
        let db_outcome = retry_from(
            0,
            4,
            || {
                let attempts = db_attempts_clone.clone();
                async move {
                    let mut count = attempts.lock().unwrap();
                    *count += 1;
                    if *count < 2 {
                        Err("db error")
                    } else {
                        Ok(())
                    }
                }
            },
            "insert_processed_event",
            &shutdown,
        )
        .await
        .unwrap();

        assert_eq!(db_outcome.attempts_used, 1);

        // Publish step starts from attempt 1, not 0 — the counter continues rather than resets.
        let pub_outcome = retry_from(
            db_outcome.attempts_used,
            4,
            || async { Ok::<_, &str>(()) },
            "publish",
            &shutdown,
        )
        .await
        .unwrap();

        assert_eq!(pub_outcome.attempts_used, 1);
    }

    #[tokio::test]
    async fn retry_from_exhausts_and_returns_last_error() {
        let shutdown = CancellationToken::new();
        let result: Result<RetryOutcome<i32>, RetryError<&str>> = retry_from(
            2,
            4,
            || async { Err::<i32, _>("still failing") },
            "test_operation",
            &shutdown,
        )
        .await;

        match result.unwrap_err() {
            RetryError::Failed(e) => assert_eq!(e, "still failing"),
            RetryError::Cancelled => panic!("expected Failed, got Cancelled"),
        }
    }

    #[tokio::test]
    async fn retry_from_is_cancellable_mid_backoff_sleep() {
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown_clone.cancel();
        });

        let start = std::time::Instant::now();
        let result: Result<RetryOutcome<i32>, RetryError<&str>> =
            retry_from(1, 4, || async { Err::<i32, _>("still failing") }, "test_operation", &shutdown).await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5), "cancellation must interrupt the 5s backoff sleep");
    }
}
