//! Quality metrics, thresholds and trend analysis

use crate::consensus::ValidationResult;
use chrono::{DateTime, Utc};
use pinpoint_common::geo::{decimal_places, round_to};
use pinpoint_common::time::age_days;
use serde::{Deserialize, Serialize};

/// Accuracy reported when no answer could be obtained at all
pub const NO_DATA_ACCURACY_M: f64 = 10_000.0;
/// Freshness reported when no answer could be obtained at all
pub const NO_DATA_FRESHNESS_DAYS: f64 = 3_650.0;
/// Accuracy assumed for a lone observation without a reported radius
const DEFAULT_SINGLE_SOURCE_ACCURACY_M: f64 = 50.0;
/// Relative change below which a metric counts as stable
const STABLE_CHANGE: f64 = 0.05;

/// Band limits used by recommendations, alert levels and alerts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub accuracy_excellent_m: f64,
    pub accuracy_good_m: f64,
    pub accuracy_acceptable_m: f64,
    pub accuracy_poor_m: f64,
    pub freshness_fresh_days: f64,
    pub freshness_stale_days: f64,
    pub freshness_outdated_days: f64,
    pub consensus_high: f64,
    pub consensus_medium: f64,
    pub consensus_low: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            accuracy_excellent_m: 5.0,
            accuracy_good_m: 20.0,
            accuracy_acceptable_m: 50.0,
            accuracy_poor_m: 100.0,     // Beyond this the coordinate is unusable
            freshness_fresh_days: 30.0,
            freshness_stale_days: 90.0,
            freshness_outdated_days: 365.0,
            consensus_high: 0.8,
            consensus_medium: 0.6,
            consensus_low: 0.4,         // Below this sources disagree
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Pending,
    Disputed,
    Outdated,
}

/// One quality snapshot of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Max pairwise distance among agreeing sources (meters)
    pub accuracy_m: f64,
    /// Decimal digits of the consensus coordinate
    pub precision: u32,
    /// Age of the freshest agreeing observation (days)
    pub freshness_days: f64,
    pub source_reliability: f64,
    pub consensus_score: f64,
    pub verification_status: VerificationStatus,
}

impl QualityMetrics {
    /// Derive metrics from a consensus result as seen at `now`
    pub fn assess(result: &ValidationResult, now: DateTime<Utc>) -> Self {
        Self {
            accuracy_m: accuracy_m(result),
            precision: decimal_places(result.coordinate.lat).min(decimal_places(result.coordinate.lng)),
            freshness_days: result
                .freshest_observation()
                .map(|t| age_days(now, t))
                .unwrap_or(NO_DATA_FRESHNESS_DAYS),
            source_reliability: if result.sources.is_empty() {
                0.0
            } else {
                result.sources.iter().map(|w| w.reliability).sum::<f64>() / result.sources.len() as f64
            },
            consensus_score: result.quality_score,
            verification_status: verification_status(result.quality_score, result.source_count),
        }
    }

    /// Snapshot for a location no source could answer
    pub fn unavailable() -> Self {
        Self {
            accuracy_m: NO_DATA_ACCURACY_M,
            precision: 0,
            freshness_days: NO_DATA_FRESHNESS_DAYS,
            source_reliability: 0.0,
            consensus_score: 0.0,
            verification_status: VerificationStatus::Outdated,
        }
    }

    pub fn value(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Accuracy => self.accuracy_m,
            MetricKind::Precision => self.precision as f64,
            MetricKind::Freshness => self.freshness_days,
            MetricKind::SourceReliability => self.source_reliability,
            MetricKind::ConsensusScore => self.consensus_score,
        }
    }
}

fn accuracy_m(result: &ValidationResult) -> f64 {
    match result.retained.as_slice() {
        [] => NO_DATA_ACCURACY_M,
        [single] => {
            if single.observation.accuracy_m > 0.0 {
                single.observation.accuracy_m
            } else {
                DEFAULT_SINGLE_SOURCE_ACCURACY_M
            }
        }
        many => {
            let mut max = 0.0f64;
            for (i, a) in many.iter().enumerate() {
                for b in &many[i + 1..] {
                    max = max.max(a.coordinate().distance_m(b.coordinate()));
                }
            }
            max.max(1.0)
        }
    }
}

pub fn verification_status(score: f64, source_count: usize) -> VerificationStatus {
    if score >= 0.8 && source_count >= 3 {
        VerificationStatus::Verified
    } else if score >= 0.6 {
        VerificationStatus::Pending
    } else if source_count >= 2 {
        VerificationStatus::Disputed
    } else {
        VerificationStatus::Outdated
    }
}

// ============================================================================
// Trends
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
    Precision,
    Freshness,
    SourceReliability,
    ConsensusScore,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Accuracy,
        MetricKind::Precision,
        MetricKind::Freshness,
        MetricKind::SourceReliability,
        MetricKind::ConsensusScore,
    ];

    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricKind::Accuracy | MetricKind::Freshness)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTrend {
    pub metric: MetricKind,
    pub direction: TrendDirection,
    /// Absolute change, 3 decimals
    pub change: f64,
    pub timeframe: String,
}

/// Direction of a change under the 5% stability rule
///
/// A previous value of zero counts as a full change unless nothing moved.
pub fn direction(previous: f64, recent: f64, lower_is_better: bool) -> TrendDirection {
    let change = recent - previous;
    let relative = if previous == 0.0 {
        if change == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        change.abs() / previous.abs()
    };

    if relative < STABLE_CHANGE {
        TrendDirection::Stable
    } else if (change < 0.0) == lower_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    }
}

/// Compare the two most recent snapshots metric by metric
pub fn trends(previous: &QualityMetrics, recent: &QualityMetrics) -> Vec<QualityTrend> {
    MetricKind::ALL
        .iter()
        .map(|&metric| {
            let (before, after) = (previous.value(metric), recent.value(metric));
            QualityTrend {
                metric,
                direction: direction(before, after, metric.lower_is_better()),
                change: round_to(after - before, 3),
                timeframe: "recent".to_string(),
            }
        })
        .collect()
}

pub fn declining_count(trends: &[QualityTrend]) -> usize {
    trends
        .iter()
        .filter(|t| t.direction == TrendDirection::Declining)
        .count()
}
