//! Per-provider circuit breaker.
//!
//! Three states: `Closed` (normal), `Open` (short-circuit every call until
//! the reset timeout elapses), `HalfOpen` (admit one probe; its outcome
//! decides). One breaker per provider, shared between the resilient
//! wrapper and the provider manager.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use cg_domain::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure_at: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Whether a call may proceed. An elapsed `Open` breaker transitions
    /// to `HalfOpen` here and admits the probe.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        Self::tick(&mut inner, self.reset_timeout);
        inner.state != BreakerState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        inner.state = BreakerState::Closed;
    }

    /// Record a failed call. Returns `true` when this failure opened the
    /// breaker (the caller publishes the outage alert exactly once).
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    return true;
                }
                false
            }
            // A half-open probe failed: re-open and restart the timer.
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                true
            }
            BreakerState::Open => false,
        }
    }

    /// Current state. Idempotent modulo the `Open → HalfOpen` time check.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        Self::tick(&mut inner, self.reset_timeout);
        inner.state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    fn tick(inner: &mut Inner, reset_timeout: Duration) {
        if inner.state == BreakerState::Open {
            // Invariant: Open implies a recorded failure instant.
            let since = inner
                .last_failure_at
                .map(|at| at.elapsed())
                .unwrap_or(reset_timeout);
            if since >= reset_timeout {
                inner.state = BreakerState::HalfOpen;
            }
        }
    }
}
