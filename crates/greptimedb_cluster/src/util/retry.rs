//! Fixed-delay retries for side effects against a server that may still be starting.

use std::time::Duration;

use tracing::{error, warn};

/// How many times to try an operation and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Upper bound of the time spent sleeping between attempts.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// Pipeline uploads: the standalone may refuse connections for a few seconds after it reports Running.
pub const PIPELINE_UPLOAD_POLICY: RetryPolicy = RetryPolicy::fixed(10, Duration::from_millis(500));

/// Runs `operation` until it succeeds, fails with a non-retryable error, or the policy is exhausted.
///
/// The last error is returned when attempts run out.
pub async fn retry_with_policy<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => {
                error!(operation = %operation_name, attempt, error = %e, "Operation failed with a permanent error");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                error!(operation = %operation_name, attempt, error = %e, "Operation failed after max retries");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = policy.delay.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const FAST: RetryPolicy = RetryPolicy::fixed(3, Duration::from_millis(1));

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<u32, String> = retry_with_policy(&FAST, "op", |_| true, || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_at_attempt_cap() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<(), String> = retry_with_policy(&FAST, "op", |_| true, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("connection refused".to_string())
            }
        })
        .await;
        assert_eq!(result, Err("connection refused".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<(), String> = retry_with_policy(&FAST, "op", |e: &String| e != "fatal", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pipeline_policy_bounds_wall_time() {
        assert_eq!(PIPELINE_UPLOAD_POLICY.max_wait(), Duration::from_millis(4500));
    }
}
