/*!
 * Retry logic with exponential backoff
 */

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::UploadConfig;
use crate::protocol::{StoreError, StoreResult};

/// Retry bounds and backoff for store requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random extra delay as a fraction of the computed delay
    pub jitter_factor: f64,
    /// Timeout applied to every attempt
    pub attempt_timeout: Duration,
}

/// The final result of a retried request and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: StoreResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_retries: config.max_retries_per_part,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            jitter_factor: config.retry_jitter,
            attempt_timeout: config.attempt_timeout,
        }
    }

    /// Policy that never retries
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
            attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `retry_index` (0-based), without jitter
    pub fn backoff(&self, retry_index: u32) -> Duration {
        2u32.checked_pow(retry_index)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Backoff before retry number `retry_index`, with jitter applied
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let delay = self.backoff(retry_index);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let fraction = rand::rng().random_range(0.0..=self.jitter_factor);
        delay + delay.mul_f64(fraction)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// bound is reached.
    ///
    /// Each attempt is bounded by `attempt_timeout`; an elapsed attempt counts
    /// as a transient `Timeout`. `on_retry` sees the failed attempt number,
    /// the delay about to be slept and the error.
    pub async fn run<T, F, Fut, C>(&self, operation: F, on_retry: C) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
        C: FnMut(u32, Duration, &StoreError),
    {
        self.run_if(operation, StoreError::is_retryable, on_retry).await
    }

    /// Like [`run`](Self::run), but only errors accepted by `retry_if` are
    /// retried. Used for requests that are not safe to repeat after every
    /// transient failure.
    pub async fn run_if<T, F, Fut, P, C>(
        &self,
        mut operation: F,
        retry_if: P,
        mut on_retry: C,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
        P: Fn(&StoreError) -> bool,
        C: FnMut(u32, Duration, &StoreError),
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(format!(
                    "attempt {} exceeded {:?}",
                    attempts, self.attempt_timeout
                ))),
            };

            match result {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(e) if retry_if(&e) && attempts <= self.max_retries => {
                    let delay = self.delay_for(attempts - 1);
                    on_retry(attempts, delay, &e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Attempted {
                        result: Err(e),
                        attempts,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(3);
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(3), Duration::from_millis(800));
        assert_eq!(p.backoff(4), Duration::from_secs(1));
        assert_eq!(p.backoff(40), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let p = RetryPolicy {
            jitter_factor: 0.5,
            ..policy(3)
        };
        for _ in 0..100 {
            let delay = p.delay_for(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let p = policy(3);
        assert_eq!(p.delay_for(2), p.backoff(2));
        assert_eq!(RetryPolicy::no_retry(Duration::from_secs(1)).delay_for(0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let outcome = policy(3)
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(StoreError::Network("reset".into()))
                        } else {
                            Ok("tag")
                        }
                    }
                },
                |attempt, delay, _| retries.push((attempt, delay)),
            )
            .await;

        assert_eq!(outcome.result.unwrap(), "tag");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            retries,
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let outcome = policy(2)
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(StoreError::Timeout("slow".into())) }
                },
                |_, _, _| {},
            )
            .await;

        assert!(matches!(outcome.result, Err(StoreError::Timeout(_))));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome = policy(5)
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(StoreError::AccessDenied("no".into())) }
                },
                |_, _, _| panic!("permanent errors must not be retried"),
            )
            .await;

        assert!(matches!(outcome.result, Err(StoreError::AccessDenied(_))));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_attempt_is_retried_as_timeout() {
        let calls = AtomicU32::new(0);
        let p = RetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            ..policy(1)
        };

        let outcome = p
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok(n)
                    }
                },
                |_, _, err| assert!(matches!(err, StoreError::Timeout(_))),
            )
            .await;

        assert_eq!(outcome.result.unwrap(), 1);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_if_skips_rejected_errors() {
        let calls = AtomicU32::new(0);
        let p = RetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            ..policy(3)
        };

        let outcome = p
            .run_if(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                },
                |err| err.is_retryable() && !matches!(err, StoreError::Timeout(_)),
                |_, _, _| panic!("timeout must not be retried"),
            )
            .await;

        assert!(matches!(outcome.result, Err(StoreError::Timeout(_))));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
