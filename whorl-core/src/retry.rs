//! Retry logic for connection attempts.
//!
//! WHOIS servers commonly refuse or drop connections under load, so the
//! transport retries a configurable number of times with a fixed pause.
//! The pause can optionally grow exponentially and carry jitter.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::WhorlError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth).
    pub max_delay: Duration,
    /// Multiplier applied after each retry; 1.0 means a fixed interval.
    pub multiplier: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(16),
            multiplier: 1.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
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
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Creates a policy that disables retries (single attempt only).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculates the delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 && !self.jitter {
            return self.initial_delay;
        }

        // powi on a capped exponent keeps the value finite
        let safe_attempt = attempt.min(20) as i32;

        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(safe_attempt);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            let mut rng = rand::thread_rng();
            let jitter_factor = rng.gen_range(0.5..1.0);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Decides whether a failed attempt is worth repeating.
pub trait RetryClassifier: Send + Sync {
    fn is_retryable(&self, error: &WhorlError) -> bool;
}

/// Classifier for socket connects: transient I/O failures are retried,
/// everything that points at bad input is not.
#[derive(Debug, Clone, Default)]
pub struct ConnectRetryClassifier;

impl ConnectRetryClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl RetryClassifier for ConnectRetryClassifier {
    fn is_retryable(&self, error: &WhorlError) -> bool {
        match error {
            WhorlError::Io(e) => !matches!(e.kind(), ErrorKind::InvalidInput | ErrorKind::Unsupported),
            WhorlError::ReadTimeout(_) => true,
            _ => false,
        }
    }
}

/// The error that ended a retry loop, with the number of attempts made.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: usize,
    pub last_error: WhorlError,
    /// The loop stopped because the next pause would outlast the deadline.
    pub deadline_reached: bool,
}

/// Executes operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: RetryClassifier> {
    policy: RetryPolicy,
    classifier: C,
}

impl RetryExecutor<ConnectRetryClassifier> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: ConnectRetryClassifier::new(),
        }
    }
}

impl<C: RetryClassifier> RetryExecutor<C> {
    pub fn with_classifier(policy: RetryPolicy, classifier: C) -> Self {
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently, or the
    /// policy's attempts are used up. `on_failure` sees every failed attempt
    /// (1-indexed) before any pause.
    pub async fn execute<F, Fut, T, L>(
        &self,
        operation: F,
        on_failure: L,
    ) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
        L: FnMut(usize, &WhorlError),
    {
        self.execute_until(None, operation, on_failure).await
    }

    /// Like [`execute`](Self::execute), but gives up instead of pausing
    /// when the pause would end at or after `deadline`.
    pub async fn execute_until<F, Fut, T, L>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
        mut on_failure: L,
    ) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
        L: FnMut(usize, &WhorlError),
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    on_failure(attempt + 1, &e);

                    let attempts_remaining = self.policy.max_attempts - attempt - 1;
                    if !self.classifier.is_retryable(&e) || attempts_remaining == 0 {
                        if attempt > 0 {
                            warn!(
                                attempts = attempt + 1,
                                error = %e,
                                "Operation failed after retries"
                            );
                        }
                        return Err(RetryFailure {
                            attempts: attempt + 1,
                            last_error: e,
                            deadline_reached: false,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    if deadline.is_some_and(|deadline| Instant::now() + delay >= deadline) {
                        debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis(),
                            "No time left for another attempt"
                        );
                        return Err(RetryFailure {
                            attempts: attempt + 1,
                            last_error: e,
                            deadline_reached: true,
                        });
                    }
                    debug!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn refused() -> WhorlError {
        WhorlError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 1.0);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_fixed_interval_by_default() {
        let policy = RetryPolicy::new().with_initial_delay(Duration::from_millis(250));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_multiplier(10.0)
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert!(policy.delay_for_attempt(1000) <= Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_below_base() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(true);

        for attempt in 0..10 {
            assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_classifier() {
        let classifier = ConnectRetryClassifier::new();
        assert!(classifier.is_retryable(&refused()));
        assert!(!classifier.is_retryable(&WhorlError::MalformedServerSpec("x".to_string())));
    }

    #[tokio::test]
    async fn test_executor_exhausts_attempts_and_reports_each_failure() {
        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(1));
        let executor = RetryExecutor::new(policy);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut seen = Vec::new();

        let calls_clone = calls.clone();
        let result: std::result::Result<(), RetryFailure> = executor
            .execute(
                || {
                    let c = calls_clone.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(refused())
                    }
                },
                |attempt, _| seen.push(attempt),
            )
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_executor_stops_on_permanent_error() {
        let executor = RetryExecutor::new(RetryPolicy::new().with_max_attempts(5));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let result: std::result::Result<(), RetryFailure> = executor
            .execute(
                || {
                    let c = calls_clone.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(WhorlError::MalformedServerSpec("bad".to_string()))
                    }
                },
                |_, _| {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_executor_recovers() {
        let executor = RetryExecutor::new(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1)),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let result = executor
            .execute(
                || {
                    let c = calls_clone.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(refused())
                        } else {
                            Ok("connected")
                        }
                    }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_executor_never_pauses_past_deadline() {
        let executor = RetryExecutor::new(
            RetryPolicy::new()
                .with_max_attempts(4)
                .with_initial_delay(Duration::from_secs(2)),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let deadline = start + Duration::from_millis(500);

        let calls_clone = calls.clone();
        let result: std::result::Result<(), RetryFailure> = executor
            .execute_until(
                Some(deadline),
                || {
                    let c = calls_clone.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(refused())
                    }
                },
                |_, _| {},
            )
            .await;

        let failure = result.unwrap_err();
        assert!(failure.deadline_reached);
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
