//! # Retry Handler
//!
//! Wraps a single remote operation with bounded
//! exponential-backoff-with-jitter retry.
//!
//! Only errors marked retryable are retried; anything else propagates
//! immediately without consuming further attempts. When the final attempt
//! also fails with a retryable error, a distinct
//! [`SyncError::RetryExhausted`] is raised carrying the attempt count and
//! the last underlying error, so callers and logs can tell "gave up after
//! N tries" apart from "failed once, terminally".

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use bridge_traits::error::{Result, SyncError};

use crate::config::RetryConfig;

/// Retry executor with exponential backoff and ±25% jitter.
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the retry that follows attempt `attempt` (1-indexed):
    /// `min(initial_delay * 2^(attempt-1), max_delay)` with ±25% symmetric
    /// jitter, floored at zero.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_secs_f64();
        let cap = self.config.max_delay.as_secs_f64();

        let exponential = base * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exponential.min(cap);

        let jitter = capped * 0.25 * (2.0 * rand::thread_rng().gen::<f64>() - 1.0);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Invoke `op` up to `max_attempts` times.
    ///
    /// `sku` and `stage` are carried into warnings and the exhaustion error.
    pub async fn execute<T, F, Fut>(&self, sku: &str, stage: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut last_error: Option<SyncError> = None;

        for attempt in 1..=max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt >= max_attempts {
                        last_error = Some(e);
                        break;
                    }

                    let delay = self.compute_delay(attempt);
                    warn!(
                        sku,
                        stage,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // only reachable when the final attempt failed retryably
        let last = last_error.expect("retry loop exited without an error");
        Err(SyncError::retry_exhausted(sku, stage, max_attempts, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_attempts: u32, initial_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn delays_follow_the_capped_exponential_within_jitter() {
        let handler = RetryHandler::new(config(5, 10, 100));

        let mut previous_ideal = 0.0f64;
        for (attempt, ideal_ms) in [(1, 10.0), (2, 20.0), (3, 40.0), (4, 80.0), (5, 100.0)] {
            // jitter is random; sample a few times per attempt
            for _ in 0..20 {
                let delay_ms = handler.compute_delay(attempt).as_secs_f64() * 1000.0;
                assert!(
                    delay_ms >= ideal_ms * 0.75 - 1e-6 && delay_ms <= ideal_ms * 1.25 + 1e-6,
                    "attempt {attempt}: {delay_ms}ms outside ±25% of {ideal_ms}ms"
                );
            }
            assert!(ideal_ms >= previous_ideal, "ideal delays must be non-decreasing");
            previous_ideal = ideal_ms;
        }
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let handler = RetryHandler::new(config(10, 10, 100));
        for attempt in 5..10 {
            let delay_ms = handler.compute_delay(attempt).as_secs_f64() * 1000.0;
            assert!(delay_ms <= 125.0 + 1e-6);
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_ok() {
        let handler = RetryHandler::new(config(3, 1, 10));
        let calls = AtomicU32::new(0);

        let value = handler
            .execute("SKU-1", "lookup", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SyncError>(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let handler = RetryHandler::new(config(3, 1, 5));
        let calls = AtomicU32::new(0);

        let value = handler
            .execute("SKU-1", "lookup", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(SyncError::transport("SKU-1", "lookup", "503"))
                } else {
                    Ok(99)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let handler = RetryHandler::new(config(3, 1, 5));
        let calls = AtomicU32::new(0);

        let err = handler
            .execute("SKU-1", "create", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::conflict("SKU-1", "create", "duplicate slug"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "conflict");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_carries_attempt_count_and_last_error() {
        let handler = RetryHandler::new(config(3, 1, 5));
        let calls = AtomicU32::new(0);

        let err = handler
            .execute("SKU-1", "create", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::transport("SKU-1", "create", "timeout"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            SyncError::RetryExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), "transport");
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_attempt_config_never_sleeps() {
        let handler = RetryHandler::new(config(1, 60_000, 60_000));
        let started = std::time::Instant::now();

        let err = handler
            .execute("SKU-1", "lookup", || async {
                Err::<(), _>(SyncError::transport("SKU-1", "lookup", "down"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RetryExhausted { attempts: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
