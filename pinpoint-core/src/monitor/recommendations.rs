//! Recommendation rules and alert level banding

use super::metrics::{declining_count, QualityMetrics, QualityThresholds, QualityTrend};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    UpdateCoordinates,
    VerifySources,
    ManualReview,
    ScheduleRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub description: String,
    pub action_required: bool,
    pub estimated_effort: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

fn rec(
    kind: RecommendationType,
    priority: Priority,
    description: String,
    action_required: bool,
    effort: &str,
) -> QualityRecommendation {
    QualityRecommendation {
        kind,
        priority,
        description,
        action_required,
        estimated_effort: effort.to_string(),
    }
}

/// Apply the recommendation rule table
pub fn recommendations(
    quality: &QualityMetrics,
    trends: &[QualityTrend],
    thresholds: &QualityThresholds,
) -> Vec<QualityRecommendation> {
    let mut out = Vec::new();

    if quality.accuracy_m > thresholds.accuracy_poor_m {
        out.push(rec(
            RecommendationType::UpdateCoordinates,
            Priority::High,
            format!(
                "Low accuracy detected ({:.1}m). Manual verification recommended.",
                quality.accuracy_m
            ),
            true,
            "30 minutes",
        ));
    } else if quality.accuracy_m > thresholds.accuracy_acceptable_m {
        out.push(rec(
            RecommendationType::VerifySources,
            Priority::Medium,
            format!(
                "Moderate accuracy ({:.1}m). Consider adding more data sources.",
                quality.accuracy_m
            ),
            false,
            "15 minutes",
        ));
    }

    if quality.freshness_days > thresholds.freshness_outdated_days {
        out.push(rec(
            RecommendationType::ScheduleRefresh,
            Priority::Urgent,
            format!(
                "Data is {:.0} days old. Immediate refresh required.",
                quality.freshness_days
            ),
            true,
            "10 minutes",
        ));
    } else if quality.freshness_days > thresholds.freshness_stale_days {
        out.push(rec(
            RecommendationType::ScheduleRefresh,
            Priority::Medium,
            format!(
                "Data is {:.0} days old. Consider refreshing soon.",
                quality.freshness_days
            ),
            false,
            "10 minutes",
        ));
    }

    if quality.consensus_score < thresholds.consensus_low {
        out.push(rec(
            RecommendationType::ManualReview,
            Priority::High,
            format!(
                "Low consensus score ({:.2}). Manual review needed.",
                quality.consensus_score
            ),
            true,
            "45 minutes",
        ));
    }

    if declining_count(trends) >= 2 {
        out.push(rec(
            RecommendationType::ManualReview,
            Priority::Medium,
            "Multiple quality metrics are declining. Proactive review recommended.".to_string(),
            false,
            "20 minutes",
        ));
    }

    out
}

/// Sum banded scores into an alert level
pub fn alert_level(
    quality: &QualityMetrics,
    trends: &[QualityTrend],
    thresholds: &QualityThresholds,
) -> AlertLevel {
    let mut score = 0;

    score += if quality.accuracy_m > thresholds.accuracy_poor_m {
        3
    } else if quality.accuracy_m > thresholds.accuracy_acceptable_m {
        2
    } else if quality.accuracy_m > thresholds.accuracy_good_m {
        1
    } else {
        0
    };

    score += if quality.freshness_days > thresholds.freshness_outdated_days {
        3
    } else if quality.freshness_days > thresholds.freshness_stale_days {
        2
    } else if quality.freshness_days > thresholds.freshness_fresh_days {
        1
    } else {
        0
    };

    score += if quality.consensus_score < thresholds.consensus_low {
        3
    } else if quality.consensus_score < thresholds.consensus_medium {
        2
    } else if quality.consensus_score < thresholds.consensus_high {
        1
    } else {
        0
    };

    score += declining_count(trends).min(2);

    match score {
        s if s >= 8 => AlertLevel::Critical,
        s if s >= 5 => AlertLevel::High,
        s if s >= 2 => AlertLevel::Medium,
        _ => AlertLevel::Low,
    }
}
