//! Retry policy over cancellable operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Interval between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Delay grows by `multiplier` per retry, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        /// Add up to 25% random jitter.
        jitter: bool,
    },
}

/// Bounded retry policy.
///
/// An operation gets one initial attempt plus up to `max_retries` retries,
/// each preceded by the backoff delay. Disabled policies make exactly one
/// attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff: Backoff,
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed; `last` is the final failure.
    #[error("exhausted {retries} retries: {last}")]
    Exhausted { retries: u32, last: E },

    /// The policy was disabled and the single attempt failed.
    #[error("{0}")]
    Failed(E),

    /// The cancellation token fired between attempts.
    #[error("retry cancelled")]
    Cancelled,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(2), 3)
    }
}

impl RetryPolicy {
    /// Fixed-interval policy.
    #[must_use]
    pub fn fixed(interval: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Fixed(interval),
        }
    }

    /// Exponential policy with jitter.
    #[must_use]
    pub fn exponential(initial: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Exponential {
                initial,
                max,
                multiplier: 2.0,
                jitter: true,
            },
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(interval) => *interval,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let base = initial.as_secs_f64() * multiplier.powi(exp);
                let delay = base.min(max.as_secs_f64());
                if *jitter {
                    let factor = 1.0 + rand::rng().random_range(0.0..0.25);
                    Duration::from_secs_f64(delay * factor)
                } else {
                    Duration::from_secs_f64(delay)
                }
            }
        }
    }

    /// Drive `op` until it succeeds, the policy is exhausted, or `cancel`
    /// fires. `op` receives the attempt number, 0 for the initial attempt.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last = match op(0).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !self.enabled {
            return Err(RetryError::Failed(last));
        }

        for retry in 1..=self.max_retries {
            tokio::select! {
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                () = tokio::time::sleep(self.delay_for_retry(retry)) => {}
            }

            match op(retry).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::debug!(retry, max_retries = self.max_retries, "attempt failed");
                    last = err;
                }
            }
        }

        Err(RetryError::Exhausted {
            retries: self.max_retries,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 5)
            .backoff(Backoff::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
                multiplier: 2.0,
                jitter: false,
            });

        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(10), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 5);
        for _ in 0..100 {
            let delay = policy.delay_for_retry(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_counts_initial_plus_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(Duration::from_secs(2), 3);
        let started = Instant::now();

        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("refused")
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                retries: 3,
                last: "refused"
            })
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_success() {
        let policy = RetryPolicy::fixed(Duration::from_secs(2), 3);
        let result = policy
            .run(&CancellationToken::new(), |attempt| async move {
                if attempt < 2 {
                    Err("refused")
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_disabled_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::disabled()
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("refused") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(RetryError::Failed("refused")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_attempts() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::fixed(Duration::from_secs(2), 10)
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("refused") }
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
