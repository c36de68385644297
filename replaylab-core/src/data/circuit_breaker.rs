//! Circuit breaker guarding remote bar sources.
//!
//! Consecutive failures (rate limits, lockouts, transport errors) open the
//! breaker; while open, every fetch is refused with `CircuitBreakerTripped`
//! until the cooldown has elapsed.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::provider::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { opened_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

/// Shared failure gate for one upstream provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        assert!(failure_threshold >= 1, "failure threshold must be >= 1");
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold,
        }
    }

    /// Five-minute cooldown after three consecutive failures.
    pub fn for_exchange() -> Self {
        Self::new(Duration::from_secs(5 * 60), 3)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the counters half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Ok` if a request may be sent now; closes the breaker once the cooldown expires.
    pub fn check(&self) -> Result<(), DataError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open { opened_at } if opened_at.elapsed() >= self.cooldown => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                Ok(())
            }
            BreakerState::Open { .. } => Err(DataError::CircuitBreakerTripped),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.check().is_ok()
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open {
                opened_at: Instant::now(),
            };
        }
    }

    /// Open immediately, e.g. on an explicit lockout response.
    pub fn trip(&self) {
        self.lock().state = BreakerState::Open {
            opened_at: Instant::now(),
        };
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { opened_at } => self.cooldown.saturating_sub(opened_at.elapsed()),
        }
    }
}
