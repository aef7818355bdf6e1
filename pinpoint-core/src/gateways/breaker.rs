//! Per-source circuit breaker
//!
//! After `failure_threshold` consecutive health failures a source is skipped
//! until `cooldown` has elapsed. After the cooldown a single caller is let
//! through as a trial call while the others are still skipped: success closes
//! the breaker, failure reopens it for another cooldown. A trial that never
//! reports back is replaced once another cooldown has passed.

use crate::types::SourceKind;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone)]
struct SourceHealth {
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
    trial_started_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    health: Mutex<HashMap<SourceKind, SourceHealth>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `source` may proceed at `now`
    ///
    /// Once the cooldown is over only the first caller gets `true` until the
    /// trial is settled by one of the `record_*` calls or [`Self::release_trial`].
    pub fn allow(&self, source: SourceKind, now: DateTime<Utc>) -> bool {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        let Some(entry) = health.get_mut(&source) else {
            return true;
        };
        let Some(until) = entry.open_until else {
            return true;
        };
        if now < until {
            return false;
        }
        match entry.trial_started_at {
            Some(started) if now < started + self.cooldown => false,
            _ => {
                debug!(source = %source, "Letting trial call through half-open breaker");
                entry.trial_started_at = Some(now);
                true
            }
        }
    }

    /// Settle a trial call whose outcome says nothing about source health
    pub fn release_trial(&self, source: SourceKind) {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = health.get_mut(&source) {
            entry.trial_started_at = None;
        }
    }

    pub fn record_success(&self, source: SourceKind) {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = health.get_mut(&source) {
            if entry.open_until.is_some() {
                info!(source = %source, "Source recovered, closing breaker");
            }
            *entry = SourceHealth::default();
        }
    }

    pub fn record_failure(&self, source: SourceKind, now: DateTime<Utc>) {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        let entry = health.entry(source).or_default();
        entry.consecutive_failures += 1;
        entry.trial_started_at = None;
        if entry.consecutive_failures >= self.failure_threshold {
            entry.open_until = Some(now + self.cooldown);
            warn!(
                source = %source,
                failures = entry.consecutive_failures,
                cooldown_secs = self.cooldown.num_seconds(),
                "Opening circuit breaker"
            );
        }
    }

    /// Sources currently skipped at `now`
    pub fn open_sources(&self, now: DateTime<Utc>) -> Vec<SourceKind> {
        let health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        let mut open: Vec<SourceKind> = health
            .iter()
            .filter(|(_, h)| h.open_until.map(|until| now < until).unwrap_or(false))
            .map(|(source, _)| *source)
            .collect();
        open.sort();
        open
    }
}
