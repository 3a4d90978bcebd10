//! Retry with exponential backoff plus a circuit breaker for the
//! embedding service.
//!
//! The breaker opens after a run of consecutive failures and short-circuits
//! further calls for a cooldown window; after the window it half-opens and
//! lets a single trial call through. While open, callers fall back to
//! persisting chunks as `embedding_pending` instead of calling the service.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker with a fixed cooldown
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: usize,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Current state; an expired cooldown moves Open to HalfOpen
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::Open {
            let expired = inner
                .opened_at
                .map(|t| t.elapsed() >= self.cooldown)
                .unwrap_or(true);
            if expired {
                debug!("Circuit breaker cooldown expired; half-open");
                inner.state = BreakerState::HalfOpen;
            }
        }
        inner.state
    }

    /// Whether a call may proceed right now
    pub fn allow(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.state = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        let trip = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if trip && inner.state != BreakerState::Open {
            warn!(
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        } else if trip {
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn delay(&self, attempt: usize) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.min(16) as u32)
    }
}

/// Retry-with-backoff wrapped in the circuit breaker
pub struct GuardedService {
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl GuardedService {
    pub fn new(breaker: CircuitBreaker, policy: RetryPolicy) -> Self {
        Self { breaker, policy }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Run `op`, retrying transient failures up to the policy's attempt
    /// budget. Returns `EmbeddingUnavailable` when the breaker is open or
    /// every attempt failed.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.breaker.allow() {
            return Err(Error::EmbeddingUnavailable(
                "circuit breaker open".to_string(),
            ));
        }

        let mut last_err: Option<Error> = None;
        for attempt in 0..self.policy.max_attempts {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "Service call failed");
                    self.breaker.record_failure();
                    last_err = Some(err);
                    if !self.breaker.allow() {
                        break;
                    }
                }
            }
            if attempt + 1 < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }
        }

        Err(Error::EmbeddingUnavailable(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "service call failed".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_breaker_success_resets_failure_run() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_breaker_half_opens_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        // Cooldown of zero expires immediately
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow());

        // A half-open failure reopens
        breaker.record_failure();
        let inner_state = {
            let inner = breaker.inner.lock().unwrap();
            inner.state
        };
        assert_eq!(inner_state, BreakerState::Open);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200));
        assert_eq!(policy.delay(0), Duration::from_millis(200));
        assert_eq!(policy.delay(1), Duration::from_millis(400));
        assert_eq!(policy.delay(2), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_guarded_retries_then_succeeds() {
        let guard = GuardedService::new(
            CircuitBreaker::new(10, Duration::from_secs(60)),
            RetryPolicy::new(5, Duration::from_millis(1)),
        );
        let calls = AtomicUsize::new(0);

        let result = guard
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Embedding("transient".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_guarded_exhausts_attempts_into_unavailable() {
        let guard = GuardedService::new(
            CircuitBreaker::new(10, Duration::from_secs(60)),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let calls = AtomicUsize::new(0);

        let result: Result<()> = guard
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Embedding("down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::EmbeddingUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let guard = GuardedService::new(
            CircuitBreaker::new(1, Duration::from_secs(60)),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        let calls = AtomicUsize::new(0);

        // First run trips the breaker on the first failure
        let _ = guard
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Embedding("down".to_string()))
            })
            .await;
        let after_first = calls.load(Ordering::SeqCst);
        assert_eq!(after_first, 1);
        assert_eq!(guard.breaker_state(), BreakerState::Open);

        // Second run never reaches the service
        let result: Result<()> = guard
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::EmbeddingUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), after_first);
    }
}
