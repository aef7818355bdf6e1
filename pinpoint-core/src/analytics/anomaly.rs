//! Z-score anomaly detection over monitoring history
//!
//! The latest value of each signal is scored against the distribution of the
//! earlier values. A zero-variance baseline cannot produce a z-score; such a
//! series is flagged only when the latest value deviates by more than the
//! signal's floor.

use crate::monitor::{QualitySnapshot, Severity};
use chrono::{DateTime, Utc};
use pinpoint_common::geo::round_to;
use serde::{Deserialize, Serialize};

/// Below this the baseline counts as zero-variance
const MIN_STDDEV: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    CoordinateJump,
    QualityDrop,
    SourceConflict,
    UnusualPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub location_id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    /// `None` when the baseline had no variance
    pub z_score: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub affected_metrics: Vec<String>,
    pub suggested_investigation: Vec<String>,
}

/// Pluggable anomaly detection strategy
pub trait AnomalyDetector: Send + Sync {
    fn detect(
        &self,
        location_id: &str,
        history: &[QualitySnapshot],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyResult>;
}

#[derive(Debug, Clone)]
pub struct ZScoreAnomalyDetector {
    pub threshold: f64,
    pub min_history: usize,
    /// Coordinate displacement must also exceed this (meters)
    pub min_jump_m: f64,
    /// Zero-variance floors per signal
    pub displacement_floor_m: f64,
    pub quality_floor: f64,
    pub disagreement_floor_m: f64,
    pub reliability_floor: f64,
}

impl Default for ZScoreAnomalyDetector {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            min_history: 5,
            min_jump_m: 10.0,
            displacement_floor_m: 10.0,
            quality_floor: 0.1,
            disagreement_floor_m: 10.0,
            reliability_floor: 0.1,
        }
    }
}

/// Latest value compared with the earlier ones
#[derive(Debug, Clone, Copy, PartialEq)]
struct Deviation {
    current: f64,
    mean: f64,
    z: Option<f64>,
}

impl Deviation {
    fn of(series: &[f64]) -> Option<Self> {
        let (current, baseline) = series.split_last()?;
        if baseline.len() < 2 {
            return None;
        }
        let n = baseline.len() as f64;
        let mean = baseline.iter().sum::<f64>() / n;
        let variance = baseline.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();
        let z = (stddev > MIN_STDDEV).then(|| (current - mean) / stddev);
        Some(Self {
            current: *current,
            mean,
            z,
        })
    }

    fn delta(&self) -> f64 {
        self.current - self.mean
    }

    /// Above the mean by `threshold` sigmas, or by `floor` on a flat baseline
    fn high(&self, threshold: f64, floor: f64) -> bool {
        match self.z {
            Some(z) => z > threshold,
            None => self.delta() > floor,
        }
    }

    fn low(&self, threshold: f64, floor: f64) -> bool {
        match self.z {
            Some(z) => z < -threshold,
            None => self.delta() < -floor,
        }
    }
}

/// Severity by |z|; a flat baseline that moved past its floor counts as high
pub fn severity_for(z: Option<f64>) -> Severity {
    match z.map(f64::abs) {
        Some(z) if z >= 6.0 => Severity::Critical,
        Some(z) if z >= 4.5 => Severity::High,
        Some(_) => Severity::Medium,
        None => Severity::High,
    }
}

impl ZScoreAnomalyDetector {
    #[allow(clippy::too_many_arguments)]
    fn result(
        &self,
        location_id: &str,
        anomaly_type: AnomalyType,
        deviation: Deviation,
        description: String,
        now: DateTime<Utc>,
        affected: &[&str],
        investigate: &[&str],
    ) -> AnomalyResult {
        AnomalyResult {
            location_id: location_id.to_string(),
            anomaly_type,
            severity: severity_for(deviation.z),
            description,
            z_score: deviation.z.map(|z| round_to(z, 2)),
            detected_at: now,
            affected_metrics: affected.iter().map(|s| s.to_string()).collect(),
            suggested_investigation: investigate.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AnomalyDetector for ZScoreAnomalyDetector {
    fn detect(
        &self,
        location_id: &str,
        history: &[QualitySnapshot],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyResult> {
        if history.len() < self.min_history {
            return Vec::new();
        }

        let mut found = Vec::new();
        let with_data: Vec<&QualitySnapshot> = history.iter().filter(|s| s.data_available()).collect();

        // Distance moved between consecutive snapshots
        let displacements: Vec<f64> = with_data
            .windows(2)
            .filter_map(|w| match (w[0].coordinate, w[1].coordinate) {
                (Some(a), Some(b)) => Some(a.distance_m(&b)),
                _ => None,
            })
            .collect();
        if let Some(d) = Deviation::of(&displacements) {
            if d.high(self.threshold, self.displacement_floor_m) && d.current > self.min_jump_m {
                found.push(self.result(
                    location_id,
                    AnomalyType::CoordinateJump,
                    d,
                    format!(
                        "Consensus coordinate jumped {:.1}m (typical movement {:.1}m)",
                        d.current, d.mean
                    ),
                    now,
                    &["coordinate", "accuracy"],
                    &[
                        "Check recent data source changes",
                        "Verify coordinate calculation logic",
                    ],
                ));
            }
        }

        let consensus: Vec<f64> = history.iter().map(|s| s.metrics.consensus_score).collect();
        if let Some(d) = Deviation::of(&consensus) {
            if d.low(self.threshold, self.quality_floor) {
                found.push(self.result(
                    location_id,
                    AnomalyType::QualityDrop,
                    d,
                    format!(
                        "Consensus score dropped to {:.2} (baseline {:.2})",
                        d.current, d.mean
                    ),
                    now,
                    &["quality_score"],
                    &[
                        "Check recent data source changes",
                        "Review failing or disagreeing sources",
                    ],
                ));
            }
        }

        let disagreement: Vec<f64> = with_data.iter().map(|s| s.metrics.accuracy_m).collect();
        if let Some(d) = Deviation::of(&disagreement) {
            if d.high(self.threshold, self.disagreement_floor_m) {
                found.push(self.result(
                    location_id,
                    AnomalyType::SourceConflict,
                    d,
                    format!(
                        "Sources disagree by {:.1}m (baseline {:.1}m)",
                        d.current, d.mean
                    ),
                    now,
                    &["accuracy"],
                    &[
                        "Review conflicting data sources",
                        "Review manual entries",
                    ],
                ));
            }
        }

        let reliability: Vec<f64> = history.iter().map(|s| s.metrics.source_reliability).collect();
        if let Some(d) = Deviation::of(&reliability) {
            if d.high(self.threshold, self.reliability_floor) || d.low(self.threshold, self.reliability_floor) {
                found.push(self.result(
                    location_id,
                    AnomalyType::UnusualPattern,
                    d,
                    format!(
                        "Source reliability mix changed to {:.2} (baseline {:.2})",
                        d.current, d.mean
                    ),
                    now,
                    &["reliability"],
                    &["Check which sources answered recently"],
                ));
            }
        }

        found
    }
}
