use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::llm::LlmError;

/// Bounded exponential backoff for model calls. `max_attempts` counts every
/// call, the first one included. The wait after failed attempt `n` (from 0)
/// is `base_delay * 2^n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(2_000) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out. The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        event_name = "agent.model.retry_scheduled",
                        label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retryable model failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::time::Instant;

    use super::RetryPolicy;
    use crate::llm::LlmError;

    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<&'static str, LlmError> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        if call < failures {
            Err(LlmError::Overloaded(format!("HTTP 503 on call {call}")))
        } else {
            Ok("ok")
        }
    }

    fn assert_backoff(started: Instant, expected_ms: u64) {
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(expected_ms), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(expected_ms + 10), "waited {elapsed:?}");
    }

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::new(3, Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(0), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(8_000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_failures_fit_in_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy.run("test", || flaky(&calls, 2)).await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_backoff(started, 2_000 + 4_000);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error_unmodified() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy.run("test", || flaky(&calls, 3)).await;

        assert_eq!(result, Err(LlmError::Overloaded("HTTP 503 on call 2".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_backoff(started, 6_000);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), LlmError> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::Http { status: 400, message: "bad schema".to_string() }) }
            })
            .await;

        assert!(matches!(result, Err(LlmError::Http { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(1));
    }
}
