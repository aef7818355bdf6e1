//! Quality monitoring over time
//!
//! Each `monitor` call runs a fresh consensus, derives [`QualityMetrics`],
//! appends a snapshot to the location's bounded history, compares it with the
//! previous snapshot and raises alerts.
//!
//! # Example
//! ```rust,ignore
//! let monitor = QualityMonitor::new(engine.clone(), config.monitor.clone());
//! monitor.subscribe(Arc::new(|alert: &DriftAlert| -> anyhow::Result<()> {
//!     println!("{}", alert.message);
//!     Ok(())
//! }));
//! let report = monitor.monitor("loc-42", "Gyeongbokgung").await?;
//! ```

pub mod alerts;
pub mod metrics;
pub mod recommendations;

pub use alerts::{AlertDispatcher, AlertSubscriber, AlertType, DriftAlert, Severity};
pub use metrics::{
    MetricKind, QualityMetrics, QualityThresholds, QualityTrend, TrendDirection,
    VerificationStatus,
};
pub use recommendations::{AlertLevel, Priority, QualityRecommendation, RecommendationType};

use crate::consensus::{CachePolicy, ConsensusEngine, ValidationOptions, ValidationResult};
use crate::error::ConsensusError;
use chrono::{DateTime, Duration, Utc};
use pinpoint_common::config::MonitorConfig;
use pinpoint_common::events::EventBus;
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// One recorded observation of a location's quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub recorded_at: DateTime<Utc>,
    pub location_name: String,
    pub region: String,
    pub metrics: QualityMetrics,
    /// Consensus coordinate, absent when no source answered
    pub coordinate: Option<Coordinate>,
    pub source_count: usize,
}

impl QualitySnapshot {
    pub fn data_available(&self) -> bool {
        self.coordinate.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub location_id: String,
    pub location_name: String,
    pub current_quality: QualityMetrics,
    pub trends: Vec<QualityTrend>,
    pub recommendations: Vec<QualityRecommendation>,
    pub alert_level: AlertLevel,
    pub alerts: Vec<DriftAlert>,
    pub data_available: bool,
    pub last_updated: DateTime<Utc>,
    pub validation: Option<ValidationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessAction {
    pub location_id: String,
    pub action: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub total_locations: usize,
    pub assessed_locations: usize,
    pub stale_count: usize,
    pub urgent_count: usize,
    pub critical_count: usize,
    /// Mean over assessed locations (days)
    pub average_freshness_days: f64,
    /// Most urgent first
    pub actions: Vec<FreshnessAction>,
}

/// Freshness bands used by the freshness report (days)
const FRESHNESS_CRITICAL_DAYS: f64 = 365.0;
const FRESHNESS_URGENT_DAYS: f64 = 180.0;
const FRESHNESS_STALE_DAYS: f64 = 90.0;

pub struct QualityMonitor {
    engine: Arc<ConsensusEngine>,
    config: MonitorConfig,
    thresholds: QualityThresholds,
    history: RwLock<HashMap<String, VecDeque<QualitySnapshot>>>,
    dispatcher: AlertDispatcher,
}

impl QualityMonitor {
    pub fn new(engine: Arc<ConsensusEngine>, config: MonitorConfig) -> Self {
        let dispatcher = AlertDispatcher::new(Duration::seconds(config.alert_cooldown_secs));
        Self {
            engine,
            config,
            thresholds: QualityThresholds::default(),
            history: RwLock::new(HashMap::new()),
            dispatcher,
        }
    }

    /// Publish `DriftAlertRaised` events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.dispatcher.set_event_bus(bus);
        self
    }

    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) {
        self.dispatcher.subscribe(subscriber);
    }

    /// Monitor a location in the configured default region
    pub async fn monitor(
        &self,
        location_id: &str,
        location_name: &str,
    ) -> Result<QualityReport, ConsensusError> {
        let region = self.config.default_region.clone();
        self.monitor_in(location_id, location_name, &region).await
    }

    /// Monitor a location in an explicit region
    ///
    /// Always runs a fresh consensus. When no source answers the snapshot is
    /// recorded with worst-case metrics and `data_available = false`.
    pub async fn monitor_in(
        &self,
        location_id: &str,
        location_name: &str,
        region: &str,
    ) -> Result<QualityReport, ConsensusError> {
        let options = ValidationOptions {
            cache: CachePolicy::Refresh,
            ..Default::default()
        };

        let validation = match self.engine.validate(location_name, region, options).await {
            Ok(result) => Some(result),
            Err(ConsensusError::SourceUnavailable { failures, .. }) => {
                warn!(
                    location_id,
                    location_name,
                    failed = failures.len(),
                    "No source answered; recording no-data snapshot"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let now = self.engine.clock().now();
        let current = match &validation {
            Some(result) => QualityMetrics::assess(result, now),
            None => QualityMetrics::unavailable(),
        };

        let snapshot = QualitySnapshot {
            recorded_at: validation.as_ref().map(|v| v.validated_at).unwrap_or(now),
            location_name: location_name.trim().to_string(),
            region: region.to_string(),
            metrics: current.clone(),
            coordinate: validation.as_ref().map(|v| v.coordinate),
            source_count: validation.as_ref().map(|v| v.source_count).unwrap_or(0),
        };

        let previous_coordinate = self.coordinate_before(location_id, snapshot.recorded_at);
        let previous = self.record(location_id, snapshot);

        // Late snapshots compare against their predecessor in time, not the newest
        let trends = match &previous {
            Some(before) => metrics::trends(&before.metrics, &current),
            None => Vec::new(),
        };

        let drift_m = match (previous_coordinate, validation.as_ref().map(|v| v.coordinate)) {
            (Some(before), Some(after)) => Some(before.distance_m(&after)),
            _ => None,
        };

        let recommendations = recommendations::recommendations(&current, &trends, &self.thresholds);
        let alert_level = recommendations::alert_level(&current, &trends, &self.thresholds);
        let raised = alerts::threshold_alerts(location_id, location_name, &current, drift_m, now);
        let alerts = self.dispatcher.dispatch(raised, now);

        info!(
            location_id,
            location_name,
            consensus = current.consensus_score,
            accuracy_m = current.accuracy_m,
            alert_level = ?alert_level,
            alerts = alerts.len(),
            "Quality monitored"
        );

        Ok(QualityReport {
            location_id: location_id.to_string(),
            location_name: location_name.trim().to_string(),
            current_quality: current,
            trends,
            recommendations,
            alert_level,
            alerts,
            data_available: validation.is_some(),
            last_updated: now,
            validation,
        })
    }

    /// Insert a snapshot in timestamp order, evicting the oldest beyond the cap
    ///
    /// Returns the snapshot that precedes the inserted one in time, if any.
    fn record(&self, location_id: &str, snapshot: QualitySnapshot) -> Option<QualitySnapshot> {
        let cap = self.config.history_cap.max(1);
        let mut history = self.history.write().unwrap_or_else(|p| p.into_inner());
        let entries = history.entry(location_id.to_string()).or_default();

        let position = entries.partition_point(|s| s.recorded_at <= snapshot.recorded_at);
        let previous = position.checked_sub(1).and_then(|i| entries.get(i).cloned());
        entries.insert(position, snapshot);
        while entries.len() > cap {
            entries.pop_front();
        }
        previous
    }

    /// Latest known coordinate recorded at or before `at`
    fn coordinate_before(&self, location_id: &str, at: DateTime<Utc>) -> Option<Coordinate> {
        self.history
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(location_id)
            .and_then(|entries| {
                entries
                    .iter()
                    .rev()
                    .filter(|s| s.recorded_at <= at)
                    .find_map(|s| s.coordinate)
            })
    }

    /// Snapshots for a location, oldest first
    pub fn history(&self, location_id: &str) -> Vec<QualitySnapshot> {
        self.history
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(location_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Histories for several locations, captured under one lock
    pub fn histories(&self, location_ids: &[String]) -> HashMap<String, Vec<QualitySnapshot>> {
        let history = self.history.read().unwrap_or_else(|p| p.into_inner());
        location_ids
            .iter()
            .map(|id| {
                let entries = history
                    .get(id)
                    .map(|e| e.iter().cloned().collect())
                    .unwrap_or_default();
                (id.clone(), entries)
            })
            .collect()
    }

    pub fn latest(&self, location_id: &str) -> Option<QualitySnapshot> {
        self.history
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(location_id)
            .and_then(|entries| entries.back().cloned())
    }

    /// Name last monitored under `location_id`, or the id itself
    pub fn location_name(&self, location_id: &str) -> String {
        self.latest(location_id)
            .map(|s| s.location_name)
            .unwrap_or_else(|| location_id.to_string())
    }

    /// Assess freshness for many locations without recording history
    pub async fn freshness_report(&self, location_ids: &[String]) -> FreshnessReport {
        let mut assessed = 0usize;
        let mut total_freshness = 0.0;
        let (mut stale, mut urgent, mut critical) = (0usize, 0usize, 0usize);
        let mut actions = Vec::new();

        for id in location_ids {
            let name = self.location_name(id);
            let region = self
                .latest(id)
                .map(|s| s.region)
                .unwrap_or_else(|| self.config.default_region.clone());

            let result = match self
                .engine
                .validate(&name, &region, ValidationOptions::default())
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(location_id = %id, "Freshness assessment failed: {}", e);
                    continue;
                }
            };

            let freshness = QualityMetrics::assess(&result, self.engine.clock().now()).freshness_days;
            assessed += 1;
            total_freshness += freshness;

            let band = if freshness > FRESHNESS_CRITICAL_DAYS {
                critical += 1;
                Some(("Immediate refresh required", Priority::Urgent))
            } else if freshness > FRESHNESS_URGENT_DAYS {
                urgent += 1;
                Some(("Schedule refresh within 7 days", Priority::High))
            } else if freshness > FRESHNESS_STALE_DAYS {
                stale += 1;
                Some(("Consider refresh within 30 days", Priority::Medium))
            } else {
                None
            };

            if let Some((action, priority)) = band {
                actions.push(FreshnessAction {
                    location_id: id.clone(),
                    action: action.to_string(),
                    priority,
                });
            }
        }

        actions.sort_by(|a, b| b.priority.cmp(&a.priority));

        FreshnessReport {
            total_locations: location_ids.len(),
            assessed_locations: assessed,
            stale_count: stale,
            urgent_count: urgent,
            critical_count: critical,
            average_freshness_days: if assessed == 0 {
                0.0
            } else {
                total_freshness / assessed as f64
            },
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::mock::MockGateway;
    use crate::gateways::GatewayPool;
    use crate::types::{GatewayError, Observation, SourceGateway, SourceKind};
    use chrono::TimeZone;
    use pinpoint_common::config::ConsensusConfig;
    use pinpoint_common::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn obs(source: SourceKind, lat: f64, lng: f64, observed_at: DateTime<Utc>) -> Observation {
        Observation::new(source, Coordinate::new(lat, lng), 0.9, 5.0, observed_at)
    }

    fn monitor_with(
        gateways: Vec<Arc<dyn SourceGateway>>,
        config: MonitorConfig,
    ) -> (QualityMonitor, ManualClock) {
        let clock = ManualClock::new(t0());
        let consensus = ConsensusConfig::default();
        let pool = GatewayPool::new(gateways, &consensus, Arc::new(clock.clone()));
        let engine = Arc::new(ConsensusEngine::new(pool, consensus, Arc::new(clock.clone())));
        (QualityMonitor::new(engine, config), clock)
    }

    fn agreeing_sources(observed_at: DateTime<Utc>) -> Vec<Arc<dyn SourceGateway>> {
        vec![
            Arc::new(MockGateway::answering(obs(SourceKind::Government, 37.5796, 126.9770, observed_at))),
            Arc::new(MockGateway::answering(obs(SourceKind::Naver, 37.5797, 126.9771, observed_at))),
            Arc::new(MockGateway::answering(obs(SourceKind::Kakao, 37.5795, 126.9769, observed_at))),
        ]
    }

    #[tokio::test]
    async fn test_healthy_location_report() {
        let (monitor, _) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());
        let report = monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        assert!(report.data_available);
        assert_eq!(report.alert_level, AlertLevel::Low);
        assert!(report.alerts.is_empty());
        assert!(report.trends.is_empty());
        assert_eq!(report.current_quality.verification_status, VerificationStatus::Verified);
        assert!(report.current_quality.accuracy_m < 50.0);
        assert_eq!(monitor.history("loc-1").len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_always_recomputes() {
        let google = Arc::new(MockGateway::answering(obs(SourceKind::Google, 37.5, 127.0, t0())));
        let (monitor, _) = monitor_with(vec![google.clone()], MonitorConfig::default());

        monitor.monitor("loc-1", "Namsan").await.unwrap();
        monitor.monitor("loc-1", "Namsan").await.unwrap();
        assert_eq!(google.call_count(), 2);
        assert!(monitor.engine().cached("Namsan", "korea").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_sources_give_critical_no_data_report() {
        let (monitor, _) = monitor_with(
            vec![Arc::new(MockGateway::failing(
                SourceKind::Google,
                GatewayError::Transport("connection refused".into()),
            ))],
            MonitorConfig::default(),
        );
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        monitor.subscribe(Arc::new(move |_: &DriftAlert| -> anyhow::Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let report = monitor.monitor("loc-9", "Atlantis").await.unwrap();
        assert!(!report.data_available);
        assert_eq!(report.alert_level, AlertLevel::Critical);
        assert_eq!(report.alerts.len(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(monitor.latest("loc-9").map(|s| !s.data_available()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_blank_name_is_an_error() {
        let (monitor, _) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());
        assert!(matches!(
            monitor.monitor("loc-1", "  ").await,
            Err(ConsensusError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_freshness_decline_shows_in_trends() {
        let (monitor, clock) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());

        clock.advance(Duration::days(10));
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();
        clock.advance(Duration::days(100));
        let report = monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        let freshness = report
            .trends
            .iter()
            .find(|t| t.metric == MetricKind::Freshness)
            .unwrap();
        assert_eq!(freshness.direction, TrendDirection::Declining);
        assert_eq!(freshness.change, 100.0);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationType::ScheduleRefresh && r.priority == Priority::Medium));
    }

    #[tokio::test]
    async fn test_history_is_capped_fifo() {
        let config = MonitorConfig {
            history_cap: 3,
            ..Default::default()
        };
        let (monitor, clock) = monitor_with(agreeing_sources(t0()), config);

        for _ in 0..5 {
            clock.advance(Duration::hours(1));
            monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();
        }

        let history = monitor.history("loc-1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].recorded_at, t0() + Duration::hours(3));
        assert!(history.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
        assert!(monitor.history("other").is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_snapshots_sorted_by_timestamp() {
        let (monitor, clock) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());

        clock.advance(Duration::hours(5));
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();
        clock.set(t0() + Duration::hours(1));
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        let history = monitor.history("loc-1");
        assert_eq!(history[0].recorded_at, t0() + Duration::hours(1));
        assert_eq!(history[1].recorded_at, t0() + Duration::hours(5));
    }

    #[tokio::test]
    async fn test_late_snapshot_trends_against_its_predecessor() {
        let (monitor, clock) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());

        clock.set(t0() + Duration::days(10));
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();
        clock.set(t0() + Duration::days(100));
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        // Lands between the two earlier snapshots
        clock.set(t0() + Duration::days(50));
        let report = monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        assert_eq!(report.current_quality.freshness_days, 50.0);
        let freshness = report
            .trends
            .iter()
            .find(|t| t.metric == MetricKind::Freshness)
            .unwrap();
        assert_eq!(freshness.change, 40.0);
        assert_eq!(freshness.direction, TrendDirection::Declining);

        // Older than everything recorded: nothing to compare against
        clock.set(t0() + Duration::days(1));
        let earliest = monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();
        assert!(earliest.trends.is_empty());
        assert_eq!(monitor.history("loc-1").len(), 4);
    }

    #[tokio::test]
    async fn test_freshness_report_bands() {
        let (monitor, clock) = monitor_with(agreeing_sources(t0()), MonitorConfig::default());
        monitor.monitor("loc-1", "Gyeongbokgung").await.unwrap();

        clock.advance(Duration::days(200));
        let report = monitor
            .freshness_report(&["loc-1".to_string(), "loc-2".to_string()])
            .await;

        assert_eq!(report.total_locations, 2);
        assert_eq!(report.assessed_locations, 2);
        assert_eq!(report.urgent_count, 2);
        assert_eq!(report.critical_count, 0);
        assert_eq!(report.actions[0].action, "Schedule refresh within 7 days");
        assert!((report.average_freshness_days - 200.0).abs() < 1e-6);
        // no history recorded by the report itself
        assert_eq!(monitor.history("loc-1").len(), 1);
        assert!(monitor.history("loc-2").is_empty());
    }
}
