//! Fleet-wide aggregations over monitoring reports

use crate::monitor::metrics::direction;
use crate::monitor::{DriftAlert, MetricKind, QualityReport, QualitySnapshot, TrendDirection};
use chrono::{DateTime, Utc};
use pinpoint_common::geo::round_to;
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Examples listed per distribution bucket
const BUCKET_EXAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub region: String,
    pub location_count: usize,
    pub average_quality: f64,
    pub trend: TrendDirection,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityBucket {
    pub range: String,
    pub count: usize,
    pub percentage: f64,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Accuracy,
    Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementOpportunity {
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub description: String,
    pub potential_impact: f64,
    pub locations: Vec<String>,
    pub estimated_effort: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalInsights {
    pub total_locations: usize,
    pub assessed_locations: usize,
    pub average_quality: f64,
    /// Best region first
    pub regions: Vec<RegionStats>,
    pub quality_distribution: Vec<QualityBucket>,
    pub recent_alerts: Vec<DriftAlert>,
    pub improvement_opportunities: Vec<ImprovementOpportunity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsTrend {
    pub metric: String,
    pub value: f64,
    pub change: f64,
    pub direction: TrendDirection,
    pub timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAnalytics {
    pub location_id: String,
    pub location_name: String,
    pub region: String,
    pub coordinate: Option<Coordinate>,
    pub quality_score: f64,
    pub accuracy_m: f64,
    pub source_count: usize,
    pub last_updated: DateTime<Utc>,
    pub trends: Vec<AnalyticsTrend>,
}

pub fn overview(
    total_locations: usize,
    reports: &[QualityReport],
    histories: &HashMap<String, Vec<QualitySnapshot>>,
) -> GlobalInsights {
    let average = if reports.is_empty() {
        0.0
    } else {
        reports
            .iter()
            .map(|r| r.current_quality.consensus_score)
            .sum::<f64>()
            / reports.len() as f64
    };

    let mut recent_alerts: Vec<DriftAlert> =
        reports.iter().flat_map(|r| r.alerts.iter().cloned()).collect();
    recent_alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));

    GlobalInsights {
        total_locations,
        assessed_locations: reports.len(),
        average_quality: round_to(average, 3),
        regions: region_stats(reports, histories),
        quality_distribution: quality_distribution(reports),
        recent_alerts,
        improvement_opportunities: improvement_opportunities(reports),
    }
}

/// Per-region averages with a trend over each location's last two snapshots
pub fn region_stats(
    reports: &[QualityReport],
    histories: &HashMap<String, Vec<QualitySnapshot>>,
) -> Vec<RegionStats> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        quality: f64,
        previous: Vec<f64>,
        latest: Vec<f64>,
        last_updated: Option<DateTime<Utc>>,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for report in reports {
        let history = histories.get(&report.location_id);
        let region = history
            .and_then(|h| h.last())
            .map(|s| s.region.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let acc = groups.entry(region).or_default();
        acc.count += 1;
        acc.quality += report.current_quality.consensus_score;
        acc.last_updated = acc.last_updated.max(Some(report.last_updated));

        if let Some([before, after]) = history.and_then(|h| h.get(h.len().saturating_sub(2)..)) {
            acc.previous.push(before.metrics.consensus_score);
            acc.latest.push(after.metrics.consensus_score);
        }
    }

    let mut stats: Vec<RegionStats> = groups
        .into_iter()
        .map(|(region, acc)| {
            let trend = if acc.previous.is_empty() {
                TrendDirection::Stable
            } else {
                let n = acc.previous.len() as f64;
                direction(
                    acc.previous.iter().sum::<f64>() / n,
                    acc.latest.iter().sum::<f64>() / n,
                    false,
                )
            };
            RegionStats {
                region,
                location_count: acc.count,
                average_quality: round_to(acc.quality / acc.count as f64, 3),
                trend,
                last_updated: acc.last_updated.unwrap_or_default(),
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.average_quality
            .partial_cmp(&a.average_quality)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    stats
}

pub fn quality_distribution(reports: &[QualityReport]) -> Vec<QualityBucket> {
    // Upper bound is exclusive except for the top bucket
    let buckets: [(&str, f64, f64); 5] = [
        ("0.9-1.0 (Excellent)", 0.9, f64::INFINITY),
        ("0.8-0.9 (Good)", 0.8, 0.9),
        ("0.6-0.8 (Fair)", 0.6, 0.8),
        ("0.4-0.6 (Poor)", 0.4, 0.6),
        ("0.0-0.4 (Critical)", f64::NEG_INFINITY, 0.4),
    ];
    let total = reports.len();

    buckets
        .iter()
        .map(|&(range, min, max)| {
            let members: Vec<&QualityReport> = reports
                .iter()
                .filter(|r| {
                    let score = r.current_quality.consensus_score;
                    score >= min && score < max
                })
                .collect();
            QualityBucket {
                range: range.to_string(),
                count: members.len(),
                percentage: if total == 0 {
                    0.0
                } else {
                    round_to(members.len() as f64 / total as f64 * 100.0, 1)
                },
                examples: members
                    .iter()
                    .take(BUCKET_EXAMPLES)
                    .map(|r| r.location_id.clone())
                    .collect(),
            }
        })
        .collect()
}

pub fn improvement_opportunities(reports: &[QualityReport]) -> Vec<ImprovementOpportunity> {
    let mut opportunities = Vec::new();

    let inaccurate: Vec<String> = reports
        .iter()
        .filter(|r| r.current_quality.accuracy_m > 20.0)
        .map(|r| r.location_id.clone())
        .collect();
    if !inaccurate.is_empty() {
        let n = inaccurate.len();
        opportunities.push(ImprovementOpportunity {
            kind: OpportunityKind::Accuracy,
            description: format!("{} locations have accuracy issues (>20m)", n),
            potential_impact: round_to(n as f64 * 0.1, 3),
            locations: inaccurate,
            estimated_effort: format!("{} minutes", n * 15),
        });
    }

    let stale: Vec<String> = reports
        .iter()
        .filter(|r| r.current_quality.freshness_days > 90.0)
        .map(|r| r.location_id.clone())
        .collect();
    if !stale.is_empty() {
        let n = stale.len();
        opportunities.push(ImprovementOpportunity {
            kind: OpportunityKind::Freshness,
            description: format!("{} locations have stale data (>90 days)", n),
            potential_impact: round_to(n as f64 * 0.05, 3),
            locations: stale,
            estimated_effort: format!("{} minutes", n * 10),
        });
    }

    opportunities.sort_by(|a, b| {
        b.potential_impact
            .partial_cmp(&a.potential_impact)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities
}

/// Per-location row built from a monitoring report
pub fn location_analytics(report: &QualityReport, region: &str) -> LocationAnalytics {
    let names = [
        (MetricKind::ConsensusScore, "quality_score"),
        (MetricKind::Accuracy, "accuracy"),
        (MetricKind::Freshness, "freshness"),
        (MetricKind::SourceReliability, "reliability"),
    ];

    let trends = names
        .iter()
        .map(|&(metric, name)| {
            let observed = report.trends.iter().find(|t| t.metric == metric);
            AnalyticsTrend {
                metric: name.to_string(),
                value: report.current_quality.value(metric),
                change: observed.map(|t| t.change).unwrap_or(0.0),
                direction: observed.map(|t| t.direction).unwrap_or(TrendDirection::Stable),
                timeframe: observed
                    .map(|t| t.timeframe.clone())
                    .unwrap_or_else(|| "recent".to_string()),
            }
        })
        .collect();

    LocationAnalytics {
        location_id: report.location_id.clone(),
        location_name: report.location_name.clone(),
        region: region.to_string(),
        coordinate: report.validation.as_ref().map(|v| v.coordinate),
        quality_score: report
            .validation
            .as_ref()
            .map(|v| v.quality_score)
            .unwrap_or(0.0),
        accuracy_m: report.current_quality.accuracy_m,
        source_count: report.validation.as_ref().map(|v| v.source_count).unwrap_or(0),
        last_updated: report.last_updated,
        trends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{AlertLevel, QualityMetrics, VerificationStatus};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn metrics(consensus: f64, accuracy: f64, freshness: f64) -> QualityMetrics {
        QualityMetrics {
            accuracy_m: accuracy,
            precision: 6,
            freshness_days: freshness,
            source_reliability: 0.9,
            consensus_score: consensus,
            verification_status: VerificationStatus::Pending,
        }
    }

    fn report(id: &str, consensus: f64, accuracy: f64, freshness: f64) -> QualityReport {
        QualityReport {
            location_id: id.to_string(),
            location_name: id.to_string(),
            current_quality: metrics(consensus, accuracy, freshness),
            trends: Vec::new(),
            recommendations: Vec::new(),
            alert_level: AlertLevel::Low,
            alerts: Vec::new(),
            data_available: true,
            last_updated: t0(),
            validation: None,
        }
    }

    fn snap(region: &str, consensus: f64, hours: i64) -> QualitySnapshot {
        QualitySnapshot {
            recorded_at: t0() + Duration::hours(hours),
            location_name: "x".to_string(),
            region: region.to_string(),
            metrics: metrics(consensus, 5.0, 1.0),
            coordinate: Some(Coordinate::new(37.5, 127.0)),
            source_count: 3,
        }
    }

    #[test]
    fn test_distribution_buckets() {
        let reports = vec![
            report("a", 1.0, 5.0, 1.0),
            report("b", 0.95, 5.0, 1.0),
            report("c", 0.85, 5.0, 1.0),
            report("d", 0.1, 5.0, 1.0),
        ];
        let buckets = quality_distribution(&reports);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].examples, vec!["a", "b"]);
        assert_eq!(buckets[0].percentage, 50.0);
        assert_eq!(buckets[1].count, 1);
        assert_eq!(buckets[4].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 4);
    }

    #[test]
    fn test_empty_overview() {
        let o = overview(3, &[], &HashMap::new());
        assert_eq!(o.average_quality, 0.0);
        assert_eq!(o.total_locations, 3);
        assert!(o.quality_distribution.iter().all(|b| b.percentage == 0.0));
    }

    #[test]
    fn test_opportunities_sorted_by_impact() {
        let reports = vec![
            report("a", 0.9, 30.0, 100.0),
            report("b", 0.9, 5.0, 120.0),
            report("c", 0.9, 5.0, 150.0),
        ];
        let ops = improvement_opportunities(&reports);
        assert_eq!(ops.len(), 2);
        // freshness: 3 * 0.05 = 0.15 beats accuracy: 1 * 0.1
        assert_eq!(ops[0].kind, OpportunityKind::Freshness);
        assert_eq!(ops[0].estimated_effort, "30 minutes");
        assert_eq!(ops[1].description, "1 locations have accuracy issues (>20m)");
    }

    #[test]
    fn test_region_trend_from_history() {
        let reports = vec![report("a", 0.5, 5.0, 1.0), report("b", 0.9, 5.0, 1.0)];
        let mut histories = HashMap::new();
        histories.insert("a".to_string(), vec![snap("busan", 0.9, 0), snap("busan", 0.5, 1)]);
        histories.insert("b".to_string(), vec![snap("seoul", 0.9, 0)]);

        let stats = region_stats(&reports, &histories);
        assert_eq!(stats[0].region, "seoul");
        assert_eq!(stats[0].trend, TrendDirection::Stable);
        assert_eq!(stats[1].region, "busan");
        assert_eq!(stats[1].trend, TrendDirection::Declining);
    }
}
