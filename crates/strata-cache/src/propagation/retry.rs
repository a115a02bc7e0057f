//! Bounded retry with linear backoff

use std::future::Future;
use std::time::Duration;

use strata_cache_core::{CacheError, Result};
use tracing::warn;

/// Retry policy for a single side of a composite operation
#[derive(Debug, Clone, Copy)]
pub(crate) struct Retry {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `delay * n` before retrying
    pub delay: Duration,
    /// Per-attempt deadline
    pub timeout: Option<Duration>,
}

impl Retry {
    /// Run `op` until it succeeds or the retries are used up
    pub(crate) async fn run<T, F, Fut>(self, what: &str, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::Timeout),
                },
                None => op().await,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(CacheError::RetriesExhausted {
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        target: "strata_cache",
                        key = %key,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "{what} failed, retrying"
                    );
                    tokio::time::sleep(self.delay.saturating_mul(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry(max_retries: u32) -> Retry {
        Retry {
            max_retries,
            delay: Duration::from_millis(10),
            timeout: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(3)
            .run("save", "k", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CacheError::source("flaky"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(2)
            .run("save", "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::source("down"))
            })
            .await;

        match result {
            Err(CacheError::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("down"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear() {
        let start = tokio::time::Instant::now();
        let _: Result<()> = retry(3)
            .run("save", "k", || async { Err(CacheError::source("down")) })
            .await;

        // 10ms + 20ms + 30ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(60), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(70), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let policy = Retry {
            max_retries: 0,
            delay: Duration::ZERO,
            timeout: Some(Duration::from_millis(50)),
        };
        let result: Result<()> = policy
            .run("save", "k", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(CacheError::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_delay_saturates() {
        let policy = Retry {
            max_retries: 2,
            delay: Duration::MAX,
            timeout: None,
        };
        let calls = AtomicU32::new(0);
        let result = policy
            .run("save", "k", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CacheError::source("flaky"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_futures_outlive_the_policy_value() {
        let first = retry(1).run("save", "a", || async { Ok::<_, CacheError>(1) });
        let second = retry(1).run("save", "b", || async { Ok::<_, CacheError>(2) });

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap() + b.unwrap(), 3);
    }
}
