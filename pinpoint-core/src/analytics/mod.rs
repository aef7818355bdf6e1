//! Fleet analytics dashboard
//!
//! # Flow
//! 1. **Assess** - monitor every location concurrently; failures are logged
//!    and skipped
//! 2. **Capture** - snapshot all histories once
//! 3. **Aggregate** - overview, per-location rows, predictions and anomalies
//!    run concurrently over the captured data
//!
//! Prediction and anomaly detection are pluggable through
//! [`QualityPredictor`] and [`AnomalyDetector`].

pub mod anomaly;
pub mod export;
pub mod insights;
pub mod predictor;

pub use anomaly::{AnomalyDetector, AnomalyResult, AnomalyType, ZScoreAnomalyDetector};
pub use export::ExportFormat;
pub use insights::{GlobalInsights, LocationAnalytics};
pub use predictor::{LinearQualityScorer, PredictionResult, QualityPredictor};

use crate::error::AnalyticsError;
use crate::monitor::{QualityMonitor, QualityReport, QualitySnapshot};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub overview: GlobalInsights,
    /// Best quality first
    pub locations: Vec<LocationAnalytics>,
    /// Most confident first
    pub predictions: Vec<PredictionResult>,
    pub anomalies: Vec<AnomalyResult>,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalyticsEngine {
    monitor: Arc<QualityMonitor>,
    predictor: Box<dyn QualityPredictor>,
    detector: Box<dyn AnomalyDetector>,
}

impl AnalyticsEngine {
    pub fn new(monitor: Arc<QualityMonitor>) -> Self {
        Self {
            monitor,
            predictor: Box::new(LinearQualityScorer::default()),
            detector: Box::new(ZScoreAnomalyDetector::default()),
        }
    }

    pub fn with_predictor(mut self, predictor: Box<dyn QualityPredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn AnomalyDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub async fn generate_dashboard(&self, location_ids: &[String]) -> Dashboard {
        info!(locations = location_ids.len(), "Generating analytics dashboard");

        let assessed = join_all(location_ids.iter().map(|id| async move {
            let name = self.monitor.location_name(id);
            (id, self.monitor.monitor(id, &name).await)
        }))
        .await;

        let mut reports: Vec<QualityReport> = Vec::with_capacity(assessed.len());
        for (id, outcome) in assessed {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => warn!(location_id = %id, "Skipping location: {}", e),
            }
        }

        let histories = self.monitor.histories(location_ids);
        let now = self.monitor.engine().clock().now();

        let (overview, locations, predictions, anomalies) = tokio::join!(
            self.overview(location_ids.len(), &reports, &histories),
            self.locations(&reports, &histories),
            self.predictions(&reports, &histories, now),
            self.anomalies(&reports, &histories, now),
        );

        info!(
            assessed = reports.len(),
            anomalies = anomalies.len(),
            "Dashboard generated"
        );

        Dashboard {
            overview,
            locations,
            predictions,
            anomalies,
            generated_at: now,
        }
    }

    /// Generate a dashboard and render it in `format`
    pub async fn export(
        &self,
        location_ids: &[String],
        format: ExportFormat,
    ) -> Result<String, AnalyticsError> {
        if format == ExportFormat::Spreadsheet {
            return Err(AnalyticsError::UnsupportedFormat(format.to_string()));
        }
        let dashboard = self.generate_dashboard(location_ids).await;
        export::export(&dashboard, format)
    }

    async fn overview(
        &self,
        total: usize,
        reports: &[QualityReport],
        histories: &HashMap<String, Vec<QualitySnapshot>>,
    ) -> GlobalInsights {
        insights::overview(total, reports, histories)
    }

    async fn locations(
        &self,
        reports: &[QualityReport],
        histories: &HashMap<String, Vec<QualitySnapshot>>,
    ) -> Vec<LocationAnalytics> {
        let mut rows: Vec<LocationAnalytics> = reports
            .iter()
            .map(|report| {
                let region = histories
                    .get(&report.location_id)
                    .and_then(|h| h.last())
                    .map(|s| s.region.as_str())
                    .unwrap_or("unknown");
                insights::location_analytics(report, region)
            })
            .collect();
        rows.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    async fn predictions(
        &self,
        reports: &[QualityReport],
        histories: &HashMap<String, Vec<QualitySnapshot>>,
        now: DateTime<Utc>,
    ) -> Vec<PredictionResult> {
        let mut predictions: Vec<PredictionResult> = reports
            .iter()
            .filter_map(|report| {
                let history = histories.get(&report.location_id)?;
                predictor::predict(self.predictor.as_ref(), &report.location_id, history, now)
            })
            .collect();
        predictions.sort_by(|a, b| {
            b.confidence_level
                .partial_cmp(&a.confidence_level)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        predictions
    }

    async fn anomalies(
        &self,
        reports: &[QualityReport],
        histories: &HashMap<String, Vec<QualitySnapshot>>,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyResult> {
        reports
            .iter()
            .filter_map(|report| {
                histories
                    .get(&report.location_id)
                    .map(|history| self.detector.detect(&report.location_id, history, now))
            })
            .flatten()
            .collect()
    }
}
