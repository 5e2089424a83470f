//! Bounded exponential backoff for transient oracle failures.

use super::BoundaryOracle;
use crate::boundary::BoundaryCandidate;
use crate::config::RetrySettings;
use crate::error::OracleError;
use crate::patterns::DetectedPatterns;
use crate::section::SectionType;
use std::time::Duration;

/// Waits between attempts. Tests pass a no-op.
pub type Sleeper = fn(Duration);

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetrySettings::default())
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings)
    }
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms.max(settings.base_delay_ms)),
        }
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    /// A rate limit's `retry_after` wins when it is longer.
    pub fn delay_for_attempt(&self, attempt: u32, error: &OracleError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        match error {
            OracleError::RateLimited {
                retry_after: Some(wait),
            } => backoff.max((*wait).min(self.max_delay)),
            _ => backoff,
        }
    }

    /// Runs `call` until it succeeds, fails permanently or runs out of attempts.
    pub fn run<T>(
        &self,
        operation: &str,
        sleeper: Sleeper,
        mut call: impl FnMut() -> Result<T, OracleError>,
    ) -> Result<T, OracleError> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt, &err);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "oracle call failed, retrying"
                    );
                    sleeper(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wraps an oracle so every call is retried under a [`RetryPolicy`].
pub struct Retrying<O> {
    inner: O,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl<O: BoundaryOracle> Retrying<O> {
    pub fn new(inner: O, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleeper: std::thread::sleep,
        }
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: BoundaryOracle> BoundaryOracle for Retrying<O> {
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        self.policy.run("detect_boundary", self.sleeper, || {
            self.inner.detect_boundary(text, section)
        })
    }

    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError> {
        self.policy
            .run("detect_patterns", self.sleeper, || self.inner.detect_patterns(text))
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        self.policy
            .run("reflow_chunk", self.sleeper, || self.inner.reflow_chunk(text))
    }

    fn cost_so_far(&self) -> f64 {
        self.inner.cost_so_far()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_wait(_: Duration) {}

    struct Flaky {
        failures: usize,
        error: OracleError,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize, error: OracleError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BoundaryOracle for Flaky {
        fn detect_boundary(
            &self,
            _text: &str,
            _section: SectionType,
        ) -> Result<Option<BoundaryCandidate>, OracleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(Some(BoundaryCandidate::new(300, 400, 0.8)))
            }
        }

        fn detect_patterns(&self, _text: &str) -> Result<DetectedPatterns, OracleError> {
            Err(self.error.clone())
        }

        fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
            Ok(text.to_string())
        }
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        let err = OracleError::Timeout;
        assert_eq!(policy.delay_for_attempt(1, &err), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2, &err), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3, &err), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(10, &err), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_after_is_honoured() {
        let policy = RetryPolicy::default();
        let err = OracleError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(policy.delay_for_attempt(1, &err), Duration::from_secs(3));
    }

    #[test]
    fn test_extreme_waits_are_logged_and_retried() {
        let policy = RetryPolicy::new(RetrySettings {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: u64::MAX,
        });
        let err = OracleError::RateLimited {
            retry_after: Some(Duration::MAX),
        };
        assert_eq!(policy.delay_for_attempt(1, &err), Duration::from_millis(u64::MAX));

        let oracle = Retrying::new(Flaky::new(1, err), policy).with_sleeper(no_wait);
        assert!(oracle.detect_boundary("", SectionType::BackMatter).unwrap().is_some());
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let oracle = Retrying::new(Flaky::new(2, OracleError::Timeout), RetryPolicy::default())
            .with_sleeper(no_wait);
        let candidate = oracle.detect_boundary("", SectionType::BackMatter).unwrap();
        assert!(candidate.is_some());
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let oracle = Retrying::new(Flaky::new(5, OracleError::Timeout), RetryPolicy::default())
            .with_sleeper(no_wait);
        assert_eq!(
            oracle.detect_boundary("", SectionType::BackMatter),
            Err(OracleError::Timeout)
        );
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failures_are_not_retried() {
        let oracle = Retrying::new(
            Flaky::new(1, OracleError::Auth("bad key".into())),
            RetryPolicy::default(),
        )
        .with_sleeper(no_wait);
        assert!(oracle.detect_boundary("", SectionType::Index).is_err());
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 1);
    }
}
