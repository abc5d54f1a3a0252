//! Defensive per-volunteer throttle on the scan endpoint.
//!
//! Scanning hardware and trigger-happy UIs produce accidental rapid
//! double-taps; this sliding-window limiter absorbs them. It is not a
//! correctness mechanism; exactly-once redemption comes from the row lock
//! in the redemption transaction, not from this cap.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter keyed by caller.
///
/// In-process state is acceptable here: the throttle only needs to dampen
/// one scanner's double-taps, not coordinate across replicas.
pub struct ScanRateLimiter {
    max_attempts: u32,
    window: Duration,
    attempts: Mutex<HashMap<i64, Vec<Instant>>>,
}

impl ScanRateLimiter {
    /// Create a limiter allowing `max_attempts` per `window` per key.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record one attempt for `key` in a single step.
    ///
    /// Returns `false` when the key already used up its window budget; the
    /// attempt is only recorded when allowed, so a throttled caller does not
    /// extend their own penalty.
    pub fn check_and_record(&self, key: i64) -> bool {
        let now = Instant::now();
        let Ok(mut attempts) = self.attempts.lock() else {
            // A poisoned lock means a panic elsewhere; failing open keeps
            // the throttle from blocking legitimate scans.
            return true;
        };

        let window = attempts.entry(key).or_default();
        window.retain(|at| now.duration_since(*at) < self.window);

        if window.len() >= self.max_attempts as usize {
            metrics::counter!("coupon.scans.throttled").increment(1);
            return false;
        }
        window.push(now);
        true
    }

    /// Drop windows with no recent attempts. Called opportunistically so the
    /// map does not grow with one entry per volunteer forever.
    pub fn prune(&self) {
        let now = Instant::now();
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.retain(|_, window| {
                window.retain(|at| now.duration_since(*at) < self.window);
                !window.is_empty()
            });
        }
    }
}
