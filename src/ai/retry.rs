//! Retry Executor
//!
//! Runs a fallible async operation with exponential backoff. Every wait is
//! raced against a [`CancellationToken`] so a cancelled caller is released
//! immediately instead of after the remaining delay.
//!
//! ## Schedule
//!
//! The wait after failed attempt `n` (0-based) is
//! `min(initial_delay * multiplier^n, max_delay)`. With jitter enabled a
//! random extra of up to 25% is added and the result is clamped back to
//! `max_delay`.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::constants::retry as retry_constants;
use crate::types::{DoxError, ErrorClassifier, Result};

/// Decides whether an error is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&DoxError) -> bool + Send + Sync>;

/// Backoff policy owned by a single provider client
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    retryable: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(retry_constants::INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(retry_constants::MAX_DELAY_MS),
            multiplier: retry_constants::BACKOFF_FACTOR,
            jitter: true,
            retryable: Arc::new(ErrorClassifier::is_retryable),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryability predicate
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DoxError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn is_retryable(&self, err: &DoxError) -> bool {
        (self.retryable)(err)
    }

    /// Deterministic delay after failed attempt `attempt`, before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay actually waited after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        std::cmp::min(base + random_jitter(base), self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// retries, or `cancel` fires.
///
/// The closure receives the 0-based attempt number. The last error is
/// returned unchanged once retries are exhausted so callers can still
/// inspect it structurally. Cancellation always yields
/// [`DoxError::Cancelled`].
pub async fn run_with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DoxError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DoxError::Cancelled),
            outcome = operation(attempt) => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.is_cancelled() {
            return Err(err);
        }

        if !policy.is_retryable(&err) {
            debug!(
                operation = operation_name,
                attempt,
                category = %err.category(),
                error = %err,
                "Permanent failure, not retrying"
            );
            return Err(err);
        }

        if attempt >= policy.max_retries {
            warn!(
                operation = operation_name,
                attempts = attempt + 1,
                error = %err,
                "Retries exhausted"
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        debug!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            category = %err.category(),
            error = %err,
            "Attempt failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DoxError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Random extra wait of up to a quarter of `base_delay`
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as f64 * retry_constants::JITTER_RATIO) as u64;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..=max_jitter_ms);
    Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
            .with_jitter(false)
    }

    fn status_error(status: u16) -> DoxError {
        ProviderError::new("test", status, "failure").into()
    }

    #[test]
    fn test_base_delay_grows_and_caps() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_multiplier(2.0);

        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay(4), Duration::from_secs(16));
        assert_eq!(policy.base_delay(5), Duration::from_secs(30));
        assert_eq!(policy.base_delay(500), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(1500));

        for _ in 0..200 {
            let first = policy.delay_for(0);
            assert!(first >= Duration::from_millis(1000));
            assert!(first <= Duration::from_millis(1250));

            let capped = policy.delay_for(3);
            assert_eq!(capped, Duration::from_millis(1500));
        }
    }

    #[tokio::test]
    async fn test_success_needs_single_attempt() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = run_with_retry(&cancel, &fast_policy(3), "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DoxError>("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_error_exhausts_all_attempts() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = run_with_retry(&cancel, &fast_policy(3), "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status_error(503))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(DoxError::Provider(e)) => assert_eq!(e.status, 503),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = run_with_retry(&cancel, &fast_policy(3), "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status_error(400))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let _: Result<()> = run_with_retry(&cancel, &RetryPolicy::no_retry(), "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status_error(503))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let cancel = CancellationToken::new();

        let result = run_with_retry(&cancel, &fast_policy(3), "test", |attempt| async move {
            if attempt < 2 {
                Err(status_error(429))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_custom_predicate_overrides_classifier() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = fast_policy(2).with_predicate(|_| false);

        let _: Result<()> = run_with_retry(&cancel, &policy, "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(status_error(503))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = run_with_retry(&cancel, &fast_policy(3), "test", move |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DoxError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_promptly() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(60))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(false);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<()> =
            run_with_retry(&cancel, &policy, "test", |_| async { Err(status_error(503)) }).await;

        assert!(matches!(result, Err(DoxError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: Result<()> = run_with_retry(&cancel, &fast_policy(0), "test", move |_| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DoxError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_follow_schedule() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_max_retries(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(false);

        let started = Instant::now();
        let _: Result<()> =
            run_with_retry(&cancel, &policy, "test", |_| async { Err(status_error(502)) }).await;

        // 1s + 2s + 3s (capped)
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7));
    }
}
