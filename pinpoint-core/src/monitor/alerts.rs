//! Drift alerts and subscriber delivery
//!
//! Alerts fire on fixed hard thresholds and are delivered synchronously to
//! every subscriber. A subscriber that errors or panics is logged and skipped;
//! the remaining subscribers still receive the alert.

use super::metrics::QualityMetrics;
use chrono::{DateTime, Duration, Utc};
use pinpoint_common::events::{EventBus, PinpointEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Hard limits that raise alerts regardless of configuration
pub const ALERT_ACCURACY_M: f64 = 100.0;
pub const ALERT_FRESHNESS_DAYS: f64 = 365.0;
pub const ALERT_CONSENSUS: f64 = 0.4;
pub const ALERT_DRIFT_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    QualityDegradation,
    DataStaleness,
    SourceConflict,
    CoordinateDrift,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::QualityDegradation => "quality_degradation",
            AlertType::DataStaleness => "data_staleness",
            AlertType::SourceConflict => "source_conflict",
            AlertType::CoordinateDrift => "coordinate_drift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    pub id: Uuid,
    pub location_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub auto_resolvable: bool,
    pub recommendations: Vec<String>,
}

impl DriftAlert {
    fn new(
        location_id: &str,
        alert_type: AlertType,
        severity: Severity,
        message: String,
        detected_at: DateTime<Utc>,
        auto_resolvable: bool,
        recommendations: &[&str],
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            location_id: location_id.to_string(),
            alert_type,
            severity,
            message,
            detected_at,
            auto_resolvable,
            recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Build the alerts a snapshot triggers
///
/// `drift_m` is the distance the consensus coordinate moved since the
/// previous snapshot, when both snapshots had a coordinate.
pub fn threshold_alerts(
    location_id: &str,
    location_name: &str,
    quality: &QualityMetrics,
    drift_m: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<DriftAlert> {
    let mut alerts = Vec::new();

    if quality.accuracy_m > ALERT_ACCURACY_M {
        alerts.push(DriftAlert::new(
            location_id,
            AlertType::QualityDegradation,
            Severity::High,
            format!(
                "Coordinate accuracy degraded to {:.1}m for {}",
                quality.accuracy_m, location_name
            ),
            now,
            false,
            &[
                "Verify coordinates with official sources",
                "Check for recent changes in the area",
                "Consider manual verification",
            ],
        ));
    }

    if quality.freshness_days > ALERT_FRESHNESS_DAYS {
        alerts.push(DriftAlert::new(
            location_id,
            AlertType::DataStaleness,
            Severity::Critical,
            format!(
                "Data for {} is {:.0} days old",
                location_name, quality.freshness_days
            ),
            now,
            true,
            &[
                "Schedule immediate data refresh",
                "Verify current status of location",
                "Update from authoritative sources",
            ],
        ));
    }

    if quality.consensus_score < ALERT_CONSENSUS {
        alerts.push(DriftAlert::new(
            location_id,
            AlertType::SourceConflict,
            Severity::Medium,
            format!(
                "Low consensus score ({:.2}) for {}",
                quality.consensus_score, location_name
            ),
            now,
            false,
            &[
                "Review conflicting data sources",
                "Investigate recent changes",
                "Consider additional verification sources",
            ],
        ));
    }

    if let Some(moved) = drift_m.filter(|d| *d > ALERT_DRIFT_M) {
        alerts.push(DriftAlert::new(
            location_id,
            AlertType::CoordinateDrift,
            Severity::Medium,
            format!(
                "Consensus coordinate for {} moved {:.1}m since the last check",
                location_name, moved
            ),
            now,
            false,
            &[
                "Compare current sources with the previous consensus",
                "Confirm whether the location has relocated",
            ],
        ));
    }

    alerts
}

// ============================================================================
// Delivery
// ============================================================================

/// Receives drift alerts
pub trait AlertSubscriber: Send + Sync {
    fn on_alert(&self, alert: &DriftAlert) -> anyhow::Result<()>;
}

impl<F> AlertSubscriber for F
where
    F: Fn(&DriftAlert) -> anyhow::Result<()> + Send + Sync,
{
    fn on_alert(&self, alert: &DriftAlert) -> anyhow::Result<()> {
        self(alert)
    }
}

/// Fans alerts out to subscribers and the event bus
pub struct AlertDispatcher {
    subscribers: RwLock<Vec<Arc<dyn AlertSubscriber>>>,
    /// Zero disables suppression
    cooldown: Duration,
    last_sent: Mutex<HashMap<(String, AlertType), DateTime<Utc>>>,
    events: Option<EventBus>,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    pub fn set_event_bus(&mut self, bus: EventBus) {
        self.events = Some(bus);
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Deliver alerts, returning the ones not suppressed by the cooldown
    pub fn dispatch(&self, alerts: Vec<DriftAlert>, now: DateTime<Utc>) -> Vec<DriftAlert> {
        let delivered: Vec<DriftAlert> = alerts
            .into_iter()
            .filter(|alert| self.admit(alert, now))
            .collect();

        if delivered.is_empty() {
            return delivered;
        }

        // Snapshot so callbacks run without the lock held
        let subscribers: Vec<Arc<dyn AlertSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        for alert in &delivered {
            warn!(
                location_id = %alert.location_id,
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                "{}",
                alert.message
            );

            for (index, subscriber) in subscribers.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| subscriber.on_alert(alert))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(subscriber = index, alert_id = %alert.id, "Alert subscriber failed: {:#}", e)
                    }
                    Err(_) => {
                        error!(subscriber = index, alert_id = %alert.id, "Alert subscriber panicked")
                    }
                }
            }

            if let Some(bus) = &self.events {
                bus.emit_lossy(PinpointEvent::DriftAlertRaised {
                    alert_id: alert.id,
                    location_id: alert.location_id.clone(),
                    alert_type: alert.alert_type.as_str().to_string(),
                    severity: alert.severity.as_str().to_string(),
                    message: alert.message.clone(),
                    timestamp: alert.detected_at,
                });
            }
        }

        delivered
    }

    fn admit(&self, alert: &DriftAlert, now: DateTime<Utc>) -> bool {
        if self.cooldown <= Duration::zero() {
            return true;
        }
        let key = (alert.location_id.clone(), alert.alert_type);
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = last_sent.get(&key) {
            if now - *previous < self.cooldown {
                debug!(
                    location_id = %alert.location_id,
                    alert_type = alert.alert_type.as_str(),
                    "Alert suppressed by cooldown"
                );
                return false;
            }
        }
        last_sent.insert(key, now);
        true
    }
}
