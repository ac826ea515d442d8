//! Bounded retry with exponential backoff for transient store failures.
//!
//! Only errors for which [`EngineError::is_transient`] holds are retried.
//! Everything else (validation, capacity, integrity, fatal) is returned on
//! the first attempt. Once the budget is spent the caller gets
//! [`EngineError::TryAgain`].

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(250),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32).max(0.0);
        let millis = (self.initial_delay.as_millis() as f64 * factor).round();
        let delay = Duration::from_millis(millis.min(u64::MAX as f64) as u64);
        delay.min(self.max_delay)
    }
}

pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_retries {
                    warn!(operation, attempts = attempt + 1, "Giving up after transient store failures: {}", err);
                    return Err(EngineError::TryAgain { operation });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(operation, attempt, ?delay, "Transient store failure, retrying: {}", err);
                sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(25));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_transient(&RetryPolicy::immediate(3), "probe", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::Store(StoreError::Transient("serialization failure".into())))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_try_again() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: EngineResult<()> = retry_transient(&RetryPolicy::immediate(2), "probe", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Store(StoreError::Transient("deadlock".into())))
        })
        .await;

        assert!(matches!(result, Err(EngineError::TryAgain { operation: "probe" })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: EngineResult<()> = retry_transient(&RetryPolicy::immediate(5), "probe", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::SeatsUnavailable { requested: 1, available: 0 })
        })
        .await;

        assert!(matches!(result, Err(EngineError::SeatsUnavailable { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
