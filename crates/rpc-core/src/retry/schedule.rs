//! Retry scheduling: recurse on a retryable failure while attempts remain.

use std::{future::Future, sync::Arc, time::Duration};

use crate::error::RpcError;
use crate::runtime::TimeDriver;

/// A retry schedule: growth curve plus the stop conditions.
///
/// The initial attempt is never counted as a retry — with `max_retries = 3`
/// the effect may run up to four times total.
#[derive(Clone)]
pub struct RetryPolicy {
    pub backoff: super::backoff::BackoffPolicy,
    pub max_retries: u32,
    retry_on: Arc<dyn Fn(&RpcError) -> bool + Send + Sync>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: super::backoff::BackoffPolicy::default(),
            max_retries: 3,
            retry_on: Arc::new(RpcError::is_retryable),
        }
    }
}

impl RetryPolicy {
    pub fn with_retry_on(mut self, predicate: impl Fn(&RpcError) -> bool + Send + Sync + 'static) -> Self {
        self.retry_on = Arc::new(predicate);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: super::backoff::BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    fn should_retry(&self, attempt: u32, error: &RpcError) -> bool {
        attempt < self.max_retries && (self.retry_on)(error)
    }
}

/// Run `effect` under `policy`, sleeping between attempts via `time`.
///
/// `effect` is called with the zero-based attempt index so callers can
/// observe how many times it ran (useful in tests and for the logging
/// interceptor).
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    time: &(dyn TimeDriver),
    mut effect: F,
) -> Result<T, RpcError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0u32;
    loop {
        match effect(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.should_retry(attempt, &error) {
                    return Err(error);
                }
                let delay = policy.backoff.delay_for_attempt(attempt);
                if delay > Duration::ZERO {
                    time.sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopTime;
    impl TimeDriver for NoopTime {
        fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let policy = RetryPolicy::default()
            .with_max_retries(3)
            .with_backoff(super::super::backoff::BackoffPolicy {
                jitter: false,
                base_delay: Duration::from_millis(1),
                ..Default::default()
            });
        let calls = AtomicU32::new(0);
        let time = NoopTime;
        let result = run_with_retry(&policy, &time, |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RpcError::call("INTERNAL_ERROR", "transient"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_first_attempt() {
        let policy = RetryPolicy::default().with_max_retries(5);
        let calls = AtomicU32::new(0);
        let time = NoopTime;
        let result: Result<(), RpcError> = run_with_retry(&policy, &time, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RpcError::call("VALIDATION_ERROR", "bad input")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_budget_propagates_last_error() {
        let policy = RetryPolicy::default().with_max_retries(2).with_backoff(
            super::super::backoff::BackoffPolicy {
                jitter: false,
                base_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let calls = AtomicU32::new(0);
        let time = NoopTime;
        let result: Result<(), RpcError> = run_with_retry(&policy, &time, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RpcError::call("INTERNAL_ERROR", "still down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
