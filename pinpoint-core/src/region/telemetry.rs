//! Rolling per-region request telemetry and the reports built from it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Latency and quality samples kept per region
pub const SAMPLE_WINDOW: usize = 1_000;

/// Offline needs at least this many requests before the error rate counts
const OFFLINE_MIN_REQUESTS: u64 = 5;

// Health thresholds
const OFFLINE_ERROR_RATE: f64 = 0.5;
const DEGRADED_ERROR_RATE: f64 = 0.03;
const DEGRADED_LATENCY_MS: f64 = 200.0;
const CACHING_HINT_LATENCY_MS: f64 = 150.0;

#[derive(Debug, Clone, Default)]
struct RegionCounters {
    requests: u64,
    cache_hits: u64,
    errors: u64,
    latencies_ms: VecDeque<u64>,
    quality_scores: VecDeque<f64>,
    last_request_at: Option<DateTime<Utc>>,
}

impl RegionCounters {
    fn push_latency(&mut self, ms: u64) {
        if self.latencies_ms.len() == SAMPLE_WINDOW {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(ms);
    }

    fn push_quality(&mut self, score: f64) {
        if self.quality_scores.len() == SAMPLE_WINDOW {
            self.quality_scores.pop_front();
        }
        self.quality_scores.push_back(score);
    }

    fn mean_latency(&self) -> f64 {
        mean(self.latencies_ms.iter().map(|&v| v as f64))
    }

    fn p95_latency(&self) -> u64 {
        if self.latencies_ms.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    fn error_rate(&self) -> f64 {
        ratio(self.errors, self.requests)
    }

    fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.requests)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// How a request was served
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    CacheHit,
    Computed { quality_score: f64 },
    Failed,
}

#[derive(Default)]
pub struct Telemetry {
    regions: Mutex<BTreeMap<String, RegionCounters>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, region_code: &str, latency_ms: u64, outcome: RequestOutcome, at: DateTime<Utc>) {
        let mut regions = self.regions.lock().unwrap_or_else(|p| p.into_inner());
        let counters = regions.entry(region_code.to_string()).or_default();
        counters.requests += 1;
        counters.last_request_at = Some(at);
        counters.push_latency(latency_ms);
        match outcome {
            RequestOutcome::CacheHit => counters.cache_hits += 1,
            RequestOutcome::Computed { quality_score } => counters.push_quality(quality_score),
            RequestOutcome::Failed => counters.errors += 1,
        }
    }

    /// Cache hit rate across all regions (0.0 before any request)
    pub fn overall_cache_hit_rate(&self) -> f64 {
        let regions = self.regions.lock().unwrap_or_else(|p| p.into_inner());
        let (hits, requests) = regions
            .values()
            .fold((0, 0), |(h, r), c| (h + c.cache_hits, r + c.requests));
        ratio(hits, requests)
    }

    /// Per-region traffic: requests, gateway-bound requests (cache misses)
    pub fn traffic(&self) -> Vec<(String, u64, u64)> {
        let regions = self.regions.lock().unwrap_or_else(|p| p.into_inner());
        regions
            .iter()
            .map(|(code, c)| (code.clone(), c.requests, c.requests - c.cache_hits))
            .collect()
    }

    /// Performance per region with traffic, best quality first
    pub fn region_performance(&self) -> Vec<RegionPerformance> {
        let regions = self.regions.lock().unwrap_or_else(|p| p.into_inner());
        let mut performance: Vec<RegionPerformance> = regions
            .iter()
            .map(|(code, c)| RegionPerformance {
                region: code.clone(),
                request_count: c.requests,
                average_latency_ms: c.mean_latency(),
                p95_latency_ms: c.p95_latency(),
                quality_score: mean(c.quality_scores.iter().copied()),
                error_rate: c.error_rate(),
                cache_hit_rate: c.cache_hit_rate(),
                last_request_at: c.last_request_at,
            })
            .collect();
        performance.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        performance
    }

    /// Service status per region derived from observed errors and latency
    pub fn system_health(&self, now: DateTime<Utc>) -> SystemHealth {
        let regions = self.regions.lock().unwrap_or_else(|p| p.into_inner());
        let services: Vec<ServiceStatus> = regions
            .iter()
            .map(|(code, c)| {
                let error_rate = c.error_rate();
                let latency = c.mean_latency();
                let status = if c.requests >= OFFLINE_MIN_REQUESTS && error_rate > OFFLINE_ERROR_RATE {
                    ServiceState::Offline
                } else if error_rate > DEGRADED_ERROR_RATE || latency > DEGRADED_LATENCY_MS {
                    ServiceState::Degraded
                } else {
                    ServiceState::Online
                };
                ServiceStatus {
                    service: code.clone(),
                    status,
                    response_time_ms: latency,
                    error_rate,
                    last_health_check: now,
                }
            })
            .collect();
        drop(regions);

        let alerts = services
            .iter()
            .filter(|s| s.status != ServiceState::Online)
            .map(|s| SystemAlert {
                level: if s.status == ServiceState::Offline {
                    AlertLevelTag::Critical
                } else {
                    AlertLevelTag::Warning
                },
                message: format!("Service {} is {}", s.service, s.status.as_str()),
                service: s.service.clone(),
                timestamp: now,
                resolved: false,
            })
            .collect();

        let status = if services.iter().all(|s| s.status == ServiceState::Online) {
            OverallHealth::Healthy
        } else if services.iter().any(|s| s.status == ServiceState::Offline) {
            OverallHealth::Critical
        } else {
            OverallHealth::Degraded
        };

        let recommendations = system_recommendations(&services);
        SystemHealth {
            status,
            services,
            alerts,
            recommendations,
        }
    }
}

fn system_recommendations(services: &[ServiceStatus]) -> Vec<SystemRecommendation> {
    let mut recommendations = Vec::new();

    let degraded = services
        .iter()
        .filter(|s| s.status == ServiceState::Degraded)
        .count();
    if degraded > 0 {
        recommendations.push(SystemRecommendation {
            kind: RecommendationKind::Performance,
            description: format!("{} services are experiencing performance issues", degraded),
            impact: Impact::Medium,
            effort: Effort::Moderate,
        });
    }

    if services.iter().any(|s| s.response_time_ms > CACHING_HINT_LATENCY_MS) {
        recommendations.push(SystemRecommendation {
            kind: RecommendationKind::Performance,
            description: "Consider implementing additional caching layers".to_string(),
            impact: Impact::High,
            effort: Effort::Moderate,
        });
    }

    recommendations
}

// ============================================================================
// Report types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPerformance {
    pub region: String,
    pub request_count: u64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: u64,
    pub quality_score: f64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Online,
    Degraded,
    Offline,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Online => "online",
            ServiceState::Degraded => "degraded",
            ServiceState::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: ServiceState,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub last_health_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevelTag {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub level: AlertLevelTag,
    pub message: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Performance,
    Cost,
    Reliability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Minimal,
    Moderate,
    Significant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub description: String,
    pub impact: Impact,
    pub effort: Effort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: OverallHealth,
    pub services: Vec<ServiceStatus>,
    pub alerts: Vec<SystemAlert>,
    pub recommendations: Vec<SystemRecommendation>,
}
