//! Call-with-retry for outward HTTP requests
//!
//! Every request to the mailbox provider and the hosted store runs through
//! [`RetryPolicy::run`]. Classification lives on [`FetchError::is_retryable`];
//! the delay before retry `k` (starting at 0) is
//! `base_delay * 2^k + jitter(0..=max_jitter)`, capped at `max_delay`.
//!
//! Exhausted or terminal failures are always returned to the caller. Whether
//! to downgrade them (empty list, `None`) is the caller's decision.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound of the random jitter added to each delay
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

/// Hard cap for a single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before retry `retry` for a given jitter sample
    pub fn backoff(&self, retry: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    /// Run `op` until it succeeds, fails terminally, or retries run out
    ///
    /// `label` only feeds the logs.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retry = 0u32;
        let mut previous_delay = Duration::ZERO;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(label, error = %err, "Terminal failure, not retrying");
                return Err(err);
            }

            if retry >= self.max_retries {
                warn!(
                    label,
                    attempts = retry + 1,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }

            // jitter larger than the base could otherwise shrink the delay
            let delay = self
                .backoff(retry, self.sample_jitter())
                .max(previous_delay);
            warn!(
                label,
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;

            previous_delay = delay;
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            status: code,
            body: String::new(),
        }
    }

    /// Records the instant of every attempt and fails with `make_err`
    fn recording_op(
        calls: Arc<Mutex<Vec<Instant>>>,
        make_err: fn() -> FetchError,
    ) -> impl FnMut() -> std::future::Ready<Result<(), FetchError>> {
        move || {
            calls.lock().unwrap().push(Instant::now());
            std::future::ready(Err(make_err()))
        }
    }

    #[test]
    fn test_backoff_formula() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, Duration::ZERO), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1, Duration::from_millis(250)), Duration::from_millis(2250));
        assert_eq!(policy.backoff(2, Duration::from_millis(999)), Duration::from_millis(4999));
        assert_eq!(policy.backoff(3, Duration::from_millis(1000)), Duration::from_millis(9000));
        assert_eq!(policy.backoff(4, Duration::ZERO), Duration::from_secs(10));
        assert_eq!(policy.backoff(40, Duration::ZERO), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            assert!(policy.sample_jitter() <= DEFAULT_MAX_JITTER);
        }
        assert_eq!(
            policy.with_max_jitter(Duration::ZERO).sample_jitter(),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("ok", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, FetchError>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_401_or_404() {
        let cases: [fn() -> FetchError; 2] = [|| status(401), || status(404)];
        for make_err in cases {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let result = RetryPolicy::default()
                .run("terminal", recording_op(calls.clone(), make_err))
                .await;

            assert!(result.is_err());
            assert_eq!(calls.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_500_with_non_decreasing_delays() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let result = RetryPolicy::default()
            .run("server-error", recording_op(calls.clone(), || status(500)))
            .await;

        assert_eq!(result.unwrap_err().status(), Some(500));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1 + DEFAULT_MAX_RETRIES as usize);

        let delays: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        for (retry, delay) in delays.iter().enumerate() {
            let floor = DEFAULT_BASE_DELAY * 2u32.pow(retry as u32);
            assert!(*delay >= floor, "retry {} waited {:?}", retry, delay);
            assert!(*delay <= DEFAULT_MAX_DELAY);
        }
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", delays);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_network_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let result = RetryPolicy::default()
            .with_max_retries(2)
            .run(
                "network",
                recording_op(calls.clone(), || {
                    FetchError::Transport("connection refused".into())
                }),
            )
            .await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(status(503))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_stay_monotonic_with_large_jitter() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_jitter(Duration::from_millis(5000))
            .with_max_retries(6);
        let _ = policy
            .run("jittery", recording_op(calls.clone(), || FetchError::Timeout))
            .await;

        let calls = calls.lock().unwrap();
        let delays: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(delays.len(), 6);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", delays);
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_policy_is_single_attempt() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let _ = RetryPolicy::none()
            .run("once", recording_op(calls.clone(), || status(502)))
            .await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
