//! Quality score, tier and reasoning

use crate::types::{clamp_unit, WeightedObservation};
use pinpoint_common::geo::round_to;
use serde::{Deserialize, Serialize};

/// Source count at which the coverage term saturates
const COVERAGE_SATURATION: f64 = 5.0;

/// Bonus when an authoritative source responded
const AUTHORITATIVE_BONUS: f64 = 0.1;

/// Consensus confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusTier {
    High,
    Medium,
    Low,
}

/// Inputs to [`quality_score`]
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub mean_confidence: f64,
    pub mean_reliability: f64,
    pub cluster_size: usize,
    pub original_size: usize,
    pub source_count: usize,
    pub authoritative_present: bool,
}

impl ScoreInputs {
    /// Means over the retained cluster
    pub fn from_cluster(
        retained: &[&WeightedObservation],
        original_size: usize,
        source_count: usize,
        authoritative_present: bool,
    ) -> Self {
        let n = retained.len().max(1) as f64;
        Self {
            mean_confidence: retained.iter().map(|w| w.observation.confidence).sum::<f64>() / n,
            mean_reliability: retained.iter().map(|w| w.reliability).sum::<f64>() / n,
            cluster_size: retained.len(),
            original_size,
            source_count,
            authoritative_present,
        }
    }
}

/// 0.3·confidence + 0.3·reliability + 0.2·agreement + 0.2·coverage (+0.1 authoritative)
///
/// Capped at 1.0 and rounded to 3 decimals.
pub fn quality_score(inputs: &ScoreInputs) -> f64 {
    let agreement = if inputs.original_size == 0 {
        0.0
    } else {
        inputs.cluster_size as f64 / inputs.original_size as f64
    };
    let coverage = (inputs.source_count as f64 / COVERAGE_SATURATION).min(1.0);

    let mut score = 0.3 * inputs.mean_confidence
        + 0.3 * inputs.mean_reliability
        + 0.2 * agreement
        + 0.2 * coverage;
    if inputs.authoritative_present {
        score += AUTHORITATIVE_BONUS;
    }

    round_to(clamp_unit(score), 3)
}

/// Tier from score; split decisions never rate above Low
pub fn tier(score: f64, has_majority: bool) -> ConsensusTier {
    if !has_majority {
        ConsensusTier::Low
    } else if score > 0.8 {
        ConsensusTier::High
    } else if score > 0.6 {
        ConsensusTier::Medium
    } else {
        ConsensusTier::Low
    }
}

/// Human-readable explanation of a consensus result
pub fn reasoning(score: f64, source_count: usize, retained_count: usize) -> String {
    let mut reasons: Vec<String> = Vec::with_capacity(3);

    reasons.push(
        if score > 0.8 {
            "High confidence from multiple reliable sources"
        } else if score > 0.6 {
            "Moderate confidence with acceptable source agreement"
        } else {
            "Low confidence due to limited or conflicting sources"
        }
        .to_string(),
    );

    reasons.push(if source_count >= 4 {
        format!("Strong validation with {} independent sources", source_count)
    } else if source_count >= 2 {
        format!("Basic validation with {} sources", source_count)
    } else {
        "Limited validation with single source".to_string()
    });

    if retained_count < source_count {
        reasons.push(format!(
            "{} outlier(s) detected and removed",
            source_count - retained_count
        ));
    }

    reasons.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(conf: f64, rel: f64, size: usize, orig: usize, auth: bool) -> ScoreInputs {
        ScoreInputs {
            mean_confidence: conf,
            mean_reliability: rel,
            cluster_size: size,
            original_size: orig,
            source_count: orig,
            authoritative_present: auth,
        }
    }

    #[test]
    fn test_score_formula() {
        // 0.3*0.9 + 0.3*0.9 + 0.2*1 + 0.2*0.6 = 0.86
        assert_eq!(quality_score(&inputs(0.9, 0.9, 3, 3, false)), 0.86);
    }

    #[test]
    fn test_score_capped_with_bonus() {
        assert_eq!(quality_score(&inputs(1.0, 1.0, 5, 5, true)), 1.0);
    }

    #[test]
    fn test_score_empty_original_is_finite() {
        let score = quality_score(&inputs(0.0, 0.0, 0, 0, false));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_tier_bands() {
        assert_eq!(tier(0.81, true), ConsensusTier::High);
        assert_eq!(tier(0.8, true), ConsensusTier::Medium);
        assert_eq!(tier(0.6, true), ConsensusTier::Low);
        assert_eq!(tier(0.95, false), ConsensusTier::Low);
    }

    #[test]
    fn test_two_of_four_cluster_scores_high_but_tiers_low() {
        let split = ScoreInputs {
            mean_confidence: 0.95,
            mean_reliability: 0.925,
            cluster_size: 2,
            original_size: 4,
            source_count: 4,
            authoritative_present: true,
        };
        let score = quality_score(&split);
        assert!(score > 0.9, "score {}", score);
        // 2 of 4 is not a strict majority
        assert_eq!(tier(score, 2 * 2 > 4), ConsensusTier::Low);
    }

    #[test]
    fn test_reasoning_mentions_outliers() {
        let text = reasoning(0.85, 5, 4);
        assert_eq!(
            text,
            "High confidence from multiple reliable sources; \
             Strong validation with 5 independent sources; \
             1 outlier(s) detected and removed"
        );
    }

    #[test]
    fn test_reasoning_single_source() {
        let text = reasoning(0.5, 1, 1);
        assert!(text.starts_with("Low confidence"));
        assert!(text.ends_with("Limited validation with single source"));
    }
}
