//! Timeout and retry policy applied to every external call

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::types::Stage;

/// Bounded timeout plus exponential backoff for one stage's external calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub timeout: Duration,
    /// Attempts including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl StagePolicy {
    pub fn new(timeout: Duration, max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn for_stage(config: &PipelineConfig, stage: Stage) -> Self {
        Self::new(
            config.timeout_for(stage),
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation`, retrying retryable errors and timeouts
    ///
    /// The error of the final attempt is returned; a final timeout surfaces as
    /// `Error::Timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(operation, self.timeout.as_secs())),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt + 1,
                        self.max_attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> StagePolicy {
        StagePolicy::new(Duration::from_millis(50), max_attempts, Duration::ZERO)
    }

    #[test]
    fn backoff_doubles() {
        let policy = StagePolicy::new(Duration::from_secs(1), 3, Duration::from_millis(1000));
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
    }

    #[test]
    fn policy_from_config() {
        let policy = StagePolicy::for_stage(&PipelineConfig::default(), Stage::Embedding);
        assert_eq!(policy.timeout, Duration::from_secs(120));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn single_attempt_passes_value_through() {
        let value = tokio_test::block_on(fast(1).run("metadata", || async { Ok::<_, Error>("done") }));
        assert_eq!(value.unwrap(), "done");
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("embedding", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::provider("ollama", "connection refused"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_usage_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("embedding", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::DimensionMismatch { expected: 4, actual: 3 })
            })
            .await;

        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn final_timeout_is_reported() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(2)
            .run("vision", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct Running<'a>(&'a AtomicBool);

    impl Drop for Running<'_> {
        fn drop(&mut self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn timed_out_attempt_is_dropped_before_the_retry() {
        let running = AtomicBool::new(false);
        let overlaps = AtomicU32::new(0);
        let calls = AtomicU32::new(0);

        let result: Result<()> = fast(3)
            .run("ocr", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                if running.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                let _running = Running(&running);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!running.load(Ordering::SeqCst));
    }
}
