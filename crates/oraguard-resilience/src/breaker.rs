//! Three-state circuit breaker guarding the database path.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED before the circuit opens.
    pub failure_threshold: u32,
    /// How long an OPEN circuit waits before trialing recovery.
    pub recovery_timeout: Duration,
    /// Consecutive trial successes in HALF_OPEN before closing.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Healthy; calls pass through.
    Closed,
    /// Downstream considered down; calls are rejected until the
    /// recovery timeout elapses.
    Open,
    /// Trial mode; a limited number of calls probe recovery.
    HalfOpen,
}

/// Point-in-time view of the breaker, for health payloads.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Seconds since the most recent failure, if any.
    pub seconds_since_last_failure: Option<u64>,
}

/// A breaker rejection or the guarded call's own error.
///
/// The two must stay distinguishable: an open-circuit rejection carries
/// a retry-after hint that a downstream error does not.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error> {
    /// The circuit is open; no call was made.
    #[error(
        "Circuit breaker is OPEN. Database appears to be down. Retry in {retry_after_secs} \
         seconds."
    )]
    Open {
        /// Whole seconds until the next recovery trial is allowed.
        retry_after_secs: u64,
    },

    /// The guarded call ran and failed.
    #[error(transparent)]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker: CLOSED passes calls through, OPEN rejects with a
/// timed hint, HALF_OPEN admits recovery trials.
///
/// State reads and transitions happen under the breaker's lock; the
/// guarded call itself runs outside it so slow queries never serialize
/// behind one another here.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the CLOSED state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Runs `operation` through the breaker.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error,
        F: FnOnce() -> Result<T, E>,
    {
        {
            let mut inner = self.inner.lock().expect("breaker lock poisoned");
            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .last_failure_time
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.recovery_timeout);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    info!("circuit breaker entering half-open trial");
                } else {
                    let retry_after_secs =
                        (self.config.recovery_timeout - elapsed).as_secs();
                    return Err(BreakerError::Open { retry_after_secs });
                }
            }
        }

        match operation() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Current state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            seconds_since_last_failure: inner.last_failure_time.map(|at| at.elapsed().as_secs()),
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.success_count = 0;
                info!("circuit breaker closed after successful recovery trials");
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        inner.success_count = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            warn!("circuit breaker reopened: recovery trial failed");
        } else if inner.state == CircuitState::Closed
            && inner.failure_count >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            warn!(
                failures = inner.failure_count,
                "circuit breaker opened after consecutive failures"
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
