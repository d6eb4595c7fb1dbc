//! Fixed-window request counting per `(scope, key)`.
//!
//! Windows never overlap: a bucket resets the instant its window
//! elapses, and counts are monotonic within a live window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-skill policy. Skills override via `Skill::rate_policy`; typical
/// values range from 30 to 100 requests over 60 s to an hour.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// Time until the current window resets; set on denial.
    pub retry_after: Option<Duration>,
}

struct Bucket {
    window_started: Instant,
    count: u32,
}

/// In-memory fixed-window rate limiter.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, String), Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `(scope, key)` under `policy`.
    pub fn check(&self, scope: &str, key: &str, policy: RatePolicy) -> RateDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((scope.to_string(), key.to_string()))
            .or_insert(Bucket { window_started: now, count: 0 });

        let elapsed = now.duration_since(bucket.window_started);
        if elapsed >= policy.window {
            bucket.window_started = now;
            bucket.count = 0;
        }

        if bucket.count < policy.max_requests {
            bucket.count += 1;
            RateDecision { allowed: true, retry_after: None }
        } else {
            RateDecision {
                allowed: false,
                retry_after: Some(policy.window.saturating_sub(elapsed)),
            }
        }
    }

    /// Drop buckets whose window has long elapsed (housekeeping).
    pub fn prune(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .retain(|_, b| now.duration_since(b.window_started) < max_age);
    }
}
