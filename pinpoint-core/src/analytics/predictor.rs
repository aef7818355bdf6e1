//! Quality prediction from monitoring history

use crate::monitor::{Priority, QualitySnapshot};
use chrono::{DateTime, Duration, Utc};
use pinpoint_common::geo::round_to;
use serde::{Deserialize, Serialize};

/// Snapshots needed for full prediction confidence
const FULL_CONFIDENCE_HISTORY: f64 = 10.0;
/// Window counted by the update frequency feature (days)
const UPDATE_WINDOW_DAYS: i64 = 30;

/// Inputs to a quality prediction, in raw units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub source_count: f64,
    pub avg_reliability: f64,
    /// Days since the freshest observation
    pub data_freshness: f64,
    pub consensus_score: f64,
    /// Mean accuracy over history (meters)
    pub historical_accuracy: f64,
    pub region_stability: f64,
    /// Snapshots within the last 30 days
    pub update_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    /// -1.0 to 1.0
    pub impact: f64,
    pub likelihood: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Minimal,
    Moderate,
    Significant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveAction {
    pub action: String,
    pub priority: Priority,
    pub impact: f64,
    pub effort: Effort,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub location_id: String,
    pub predicted_quality: f64,
    pub confidence_level: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub recommended_actions: Vec<PredictiveAction>,
    pub timeframe: String,
}

/// Pluggable quality prediction strategy
pub trait QualityPredictor: Send + Sync {
    /// Features from a location's history (oldest first, non-empty)
    fn extract_features(&self, history: &[QualitySnapshot], now: DateTime<Utc>) -> FeatureVector;

    /// Predicted quality in [0, 1]
    fn score(&self, features: &FeatureVector) -> f64;
}

/// Weighted sum of min-max normalised features
#[derive(Debug, Clone)]
pub struct LinearQualityScorer {
    pub weights: FeatureWeights,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureWeights {
    pub source_count: f64,
    pub avg_reliability: f64,
    pub data_freshness: f64,
    pub consensus_score: f64,
    pub historical_accuracy: f64,
    pub region_stability: f64,
    pub update_frequency: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            source_count: 0.25,
            avg_reliability: 0.20,
            data_freshness: 0.15,
            consensus_score: 0.15,
            historical_accuracy: 0.10,
            region_stability: 0.10,
            update_frequency: 0.05,
        }
    }
}

impl Default for LinearQualityScorer {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
        }
    }
}

fn normalise(value: f64, min: f64, max: f64) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl QualityPredictor for LinearQualityScorer {
    fn extract_features(&self, history: &[QualitySnapshot], now: DateTime<Utc>) -> FeatureVector {
        let latest = history.last();
        let with_data: Vec<&QualitySnapshot> = history.iter().filter(|s| s.data_available()).collect();

        let consensus: Vec<f64> = history.iter().map(|s| s.metrics.consensus_score).collect();
        let stability = match mean(consensus.iter().copied()) {
            Some(m) => {
                let variance = consensus.iter().map(|c| (c - m).powi(2)).sum::<f64>() / consensus.len() as f64;
                (1.0 - variance.sqrt()).clamp(0.0, 1.0)
            }
            None => 0.0,
        };

        let window_start = now - Duration::days(UPDATE_WINDOW_DAYS);

        FeatureVector {
            source_count: latest.map(|s| s.source_count as f64).unwrap_or(0.0),
            avg_reliability: mean(history.iter().map(|s| s.metrics.source_reliability)).unwrap_or(0.0),
            data_freshness: latest.map(|s| s.metrics.freshness_days).unwrap_or(365.0),
            consensus_score: latest.map(|s| s.metrics.consensus_score).unwrap_or(0.0),
            historical_accuracy: mean(with_data.iter().map(|s| s.metrics.accuracy_m)).unwrap_or(50.0),
            region_stability: stability,
            update_frequency: history.iter().filter(|s| s.recorded_at >= window_start).count() as f64,
        }
    }

    fn score(&self, f: &FeatureVector) -> f64 {
        let w = &self.weights;
        let total = normalise(f.source_count, 0.0, 5.0) * w.source_count
            + normalise(f.avg_reliability, 0.0, 1.0) * w.avg_reliability
            + (1.0 - normalise(f.data_freshness, 0.0, 365.0)) * w.data_freshness
            + normalise(f.consensus_score, 0.0, 1.0) * w.consensus_score
            + (1.0 - normalise(f.historical_accuracy, 0.0, 50.0)) * w.historical_accuracy
            + normalise(f.region_stability, 0.0, 1.0) * w.region_stability
            + normalise(f.update_frequency, 0.0, 30.0) * w.update_frequency;
        total.clamp(0.0, 1.0)
    }
}

pub fn risk_factors(f: &FeatureVector) -> Vec<RiskFactor> {
    let mut risks = Vec::new();

    if f.data_freshness > 90.0 {
        risks.push(RiskFactor {
            factor: "Data Staleness".to_string(),
            impact: -0.3,
            likelihood: 0.8,
            description: "Data has not been updated recently, increasing risk of inaccuracy".to_string(),
        });
    }
    if f.source_count < 3.0 {
        risks.push(RiskFactor {
            factor: "Limited Sources".to_string(),
            impact: -0.2,
            likelihood: 0.6,
            description: "Insufficient data sources for reliable validation".to_string(),
        });
    }
    if f.historical_accuracy > 25.0 {
        risks.push(RiskFactor {
            factor: "Historical Inaccuracy".to_string(),
            impact: -0.4,
            likelihood: 0.7,
            description: "Past accuracy issues indicate potential ongoing problems".to_string(),
        });
    }

    risks.sort_by(|a, b| {
        let (ra, rb) = (a.impact.abs() * a.likelihood, b.impact.abs() * b.likelihood);
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    risks
}

pub fn recommended_actions(prediction: f64, f: &FeatureVector) -> Vec<PredictiveAction> {
    let mut actions = Vec::new();

    if prediction < 0.6 {
        actions.push(PredictiveAction {
            action: "Immediate Manual Verification".to_string(),
            priority: Priority::Urgent,
            impact: 0.4,
            effort: Effort::Significant,
            description: "Low predicted quality requires immediate attention".to_string(),
        });
    }
    if f.data_freshness > 180.0 {
        actions.push(PredictiveAction {
            action: "Data Refresh".to_string(),
            priority: Priority::High,
            impact: 0.3,
            effort: Effort::Moderate,
            description: "Update coordinates from fresh sources".to_string(),
        });
    }
    if f.source_count < 3.0 {
        actions.push(PredictiveAction {
            action: "Add More Sources".to_string(),
            priority: Priority::Medium,
            impact: 0.2,
            effort: Effort::Moderate,
            description: "Gather coordinates from additional reliable sources".to_string(),
        });
    }

    actions.sort_by(|a, b| b.priority.cmp(&a.priority));
    actions
}

/// Run `predictor` over one location's history
///
/// Returns `None` for a location with no recorded history.
pub fn predict(
    predictor: &dyn QualityPredictor,
    location_id: &str,
    history: &[QualitySnapshot],
    now: DateTime<Utc>,
) -> Option<PredictionResult> {
    if history.is_empty() {
        return None;
    }

    let features = predictor.extract_features(history, now);
    let prediction = predictor.score(&features).clamp(0.0, 1.0);

    Some(PredictionResult {
        location_id: location_id.to_string(),
        predicted_quality: round_to(prediction, 3),
        confidence_level: round_to(
            0.5 + 0.5 * (history.len() as f64 / FULL_CONFIDENCE_HISTORY).min(1.0),
            3,
        ),
        risk_factors: risk_factors(&features),
        recommended_actions: recommended_actions(prediction, &features),
        timeframe: "30 days".to_string(),
    })
}
