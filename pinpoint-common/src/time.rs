//! Timestamp utilities
//!
//! Everything that ages data (cache TTLs, freshness, breaker cooldowns, history
//! timestamps) reads time through a [`Clock`] so tests can drive it by hand.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of "now" for time-dependent logic
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays
///
/// Clones share the same instant, so a test can keep a handle while the
/// components under test hold theirs.
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.instant.lock().unwrap_or_else(|p| p.into_inner());
        *guard = instant;
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut guard = self.instant.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Age of `then` in fractional days as seen from `now`, never negative
pub fn age_days(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    let secs = (now - then).num_milliseconds() as f64 / 1000.0;
    (secs / 86_400.0).max(0.0)
}
