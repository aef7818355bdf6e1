//! Region-aware validation
//!
//! Wraps the consensus engine with per-region policy: each country resolves
//! to a [`RegionProfile`] whose thresholds decide approval, whose preferred
//! sources order the gather, and whose staleness limit sets the cache TTL.
//! Every request is recorded in rolling per-region telemetry that feeds the
//! health, cost and scaling reports.

pub mod profiles;
pub mod telemetry;

pub use profiles::{CulturalPreferences, RegionProfile, RegionThresholds};
pub use telemetry::{RegionPerformance, RequestOutcome, SystemHealth, Telemetry};

use crate::cache::TtlCache;
use crate::consensus::{CachePolicy, ConsensusEngine, ValidationOptions, ValidationResult};
use crate::error::ConsensusError;
use chrono::{DateTime, Duration, Utc};
use pinpoint_common::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Requests slower than this are logged as warnings
const SLOW_VALIDATION_MS: u64 = 500;

/// Auto-scaling triggers (CPU in percent, cache hit rate as a fraction)
const SCALE_UP_CPU_PCT: f64 = 80.0;
const SCALE_DOWN_CPU_PCT: f64 = 30.0;
const CACHE_OPTIMIZE_HIT_RATE: f64 = 0.7;

/// Region policy attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalContext {
    pub region_code: String,
    pub region_name: String,
    pub thresholds: RegionThresholds,
    pub cultural: CulturalPreferences,
    pub meets_standards: bool,
}

/// Options for [`RegionCoordinator::validate_global`]
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Serve a fresh cached result when available
    pub cache_first: bool,
    /// Region code that overrides country resolution when known
    pub region_override: Option<String>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            cache_first: true,
            region_override: None,
        }
    }
}

/// Monthly cost parameters (USD)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub per_gateway_call: f64,
    pub storage_monthly: f64,
    pub compute_monthly: f64,
    /// Expected traffic growth used for the projection
    pub growth_rate: f64,
    pub target_cache_hit_rate: f64,
    pub caching_implementation_cost: f64,
    pub retention_monthly_savings: f64,
    pub retention_implementation_cost: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            per_gateway_call: 0.005,
            storage_monthly: 300.0,
            compute_monthly: 600.0,
            growth_rate: 0.2,
            target_cache_hit_rate: 0.9,
            caching_implementation_cost: 500.0,
            retention_monthly_savings: 100.0,
            retention_implementation_cost: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSaving {
    pub area: String,
    pub current_cost: f64,
    pub optimized_cost: f64,
    pub savings: f64,
    pub implementation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecommendation {
    pub action: String,
    pub monthly_savings: f64,
    pub implementation_cost: f64,
    /// Months until the implementation cost is recovered
    pub payback_months: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub current_cost: f64,
    pub projected_cost: f64,
    pub gateway_calls: u64,
    pub savings: Vec<CostSaving>,
    pub recommendations: Vec<CostRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScalingAction {
    ScaleUp { cpu_pct: f64 },
    ScaleDown { cpu_pct: f64 },
    CacheOptimize { hit_rate: f64, purged_entries: usize },
    LoadBalance { requests_by_region: Vec<(String, u64)> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDashboard {
    pub generated_at: DateTime<Utc>,
    pub regions: Vec<RegionPerformance>,
    pub health: SystemHealth,
    pub cost: CostReport,
}

pub struct RegionCoordinator {
    engine: Arc<ConsensusEngine>,
    cache: TtlCache<(String, String), ValidationResult>,
    telemetry: Telemetry,
    cost_model: CostModel,
    clock: Arc<dyn Clock>,
}

impl RegionCoordinator {
    pub fn new(engine: Arc<ConsensusEngine>) -> Self {
        let clock = engine.clock();
        Self {
            engine,
            cache: TtlCache::new(Arc::clone(&clock)),
            telemetry: Telemetry::new(),
            cost_model: CostModel::default(),
            clock,
        }
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    /// Validate a location under the policy of its country's region
    ///
    /// Results are cached by name and country only, so a result computed under
    /// a `region_override` is also served to plain calls for the same pair.
    pub async fn validate_global(
        &self,
        location: &str,
        country_code: &str,
        language: Option<&str>,
        options: GlobalOptions,
    ) -> Result<ValidationResult, ConsensusError> {
        let started = Instant::now();
        let profile = profiles::resolve(country_code, options.region_override.as_deref());
        let key = (location.trim().to_string(), country_code.trim().to_uppercase());

        if options.cache_first {
            if let Some(hit) = self.cache.get(&key) {
                info!(location, country = %key.1, region = %profile.code, "Global cache hit");
                self.telemetry.record(
                    &profile.code,
                    elapsed_ms(started),
                    RequestOutcome::CacheHit,
                    self.clock.now(),
                );
                return Ok(hit);
            }
        }

        let engine_options = ValidationOptions {
            min_sources: Some(profile.thresholds.min_sources),
            cache: if options.cache_first {
                CachePolicy::Use
            } else {
                CachePolicy::Refresh
            },
            source_order: Some(profile.preferred_sources.clone()),
            language: language.map(str::to_string),
        };

        let result = match self.engine.validate(location, &profile.code, engine_options).await {
            Ok(result) => apply_regional_policy(result, profile),
            Err(e) => {
                self.telemetry.record(
                    &profile.code,
                    elapsed_ms(started),
                    RequestOutcome::Failed,
                    self.clock.now(),
                );
                warn!(location, region = %profile.code, error = %e, "Global validation failed");
                return Err(e);
            }
        };

        self.cache.insert(
            key,
            result.clone(),
            Duration::days(profile.thresholds.max_staleness_days),
        );

        let latency = elapsed_ms(started);
        self.telemetry.record(
            &profile.code,
            latency,
            RequestOutcome::Computed {
                quality_score: result.quality_score,
            },
            self.clock.now(),
        );
        if latency > SLOW_VALIDATION_MS {
            warn!(location, region = %profile.code, latency_ms = latency, "Slow global validation");
        }

        info!(
            location,
            region = %profile.code,
            approved = result.approved,
            quality = result.quality_score,
            latency_ms = latency,
            "Global validation completed"
        );
        Ok(result)
    }

    pub fn region_performance(&self) -> Vec<RegionPerformance> {
        self.telemetry.region_performance()
    }

    pub fn system_health(&self) -> SystemHealth {
        self.telemetry.system_health(self.clock.now())
    }

    /// Monthly cost estimate from observed gateway traffic
    pub fn cost_report(&self) -> CostReport {
        let model = &self.cost_model;
        let mut gateway_calls = 0u64;
        let mut optimized_calls = 0.0;
        for (code, requests, misses) in self.telemetry.traffic() {
            let fan_out = profiles::by_code(&code)
                .map(|p| p.preferred_sources.len())
                .unwrap_or_else(|| self.engine.pool().count())
                .max(1) as u64;
            gateway_calls += misses * fan_out;
            optimized_calls += requests as f64 * (1.0 - model.target_cache_hit_rate) * fan_out as f64;
        }

        let api_cost = gateway_calls as f64 * model.per_gateway_call;
        let optimized_api_cost = (optimized_calls * model.per_gateway_call).min(api_cost);
        let api_savings = api_cost - optimized_api_cost;
        let current_cost = api_cost + model.storage_monthly + model.compute_monthly;

        let mut savings = Vec::new();
        let mut recommendations = Vec::new();

        if api_savings > 0.0 {
            savings.push(CostSaving {
                area: "API Calls".to_string(),
                current_cost: api_cost,
                optimized_cost: optimized_api_cost,
                savings: api_savings,
                implementation: "Implement smarter caching strategy".to_string(),
            });
            recommendations.push(CostRecommendation {
                action: "Implement intelligent caching".to_string(),
                monthly_savings: api_savings,
                implementation_cost: model.caching_implementation_cost,
                payback_months: model.caching_implementation_cost / api_savings,
            });
        }

        if model.retention_monthly_savings > 0.0 {
            savings.push(CostSaving {
                area: "Data Storage".to_string(),
                current_cost: model.storage_monthly,
                optimized_cost: (model.storage_monthly - model.retention_monthly_savings).max(0.0),
                savings: model.retention_monthly_savings.min(model.storage_monthly),
                implementation: "Archive old data and compress cache".to_string(),
            });
            recommendations.push(CostRecommendation {
                action: "Optimize data retention policies".to_string(),
                monthly_savings: model.retention_monthly_savings,
                implementation_cost: model.retention_implementation_cost,
                payback_months: model.retention_implementation_cost / model.retention_monthly_savings,
            });
        }

        recommendations.sort_by(|a, b| {
            a.payback_months
                .partial_cmp(&b.payback_months)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        CostReport {
            current_cost,
            projected_cost: current_cost * (1.0 + model.growth_rate),
            gateway_calls,
            savings,
            recommendations,
        }
    }

    pub fn global_dashboard(&self) -> GlobalDashboard {
        GlobalDashboard {
            generated_at: self.clock.now(),
            regions: self.region_performance(),
            health: self.system_health(),
            cost: self.cost_report(),
        }
    }

    /// Decide scaling steps for the observed CPU load
    ///
    /// Infrastructure changes are left to the caller; only the cache purge is
    /// carried out here.
    pub fn auto_scale(&self, cpu_utilisation_pct: f64) -> Vec<ScalingAction> {
        let mut actions = Vec::new();

        if cpu_utilisation_pct > SCALE_UP_CPU_PCT {
            info!(cpu = cpu_utilisation_pct, "Scaling up resources");
            actions.push(ScalingAction::ScaleUp {
                cpu_pct: cpu_utilisation_pct,
            });
        } else if cpu_utilisation_pct < SCALE_DOWN_CPU_PCT {
            info!(cpu = cpu_utilisation_pct, "Scaling down resources");
            actions.push(ScalingAction::ScaleDown {
                cpu_pct: cpu_utilisation_pct,
            });
        }

        let hit_rate = self.telemetry.overall_cache_hit_rate();
        if hit_rate < CACHE_OPTIMIZE_HIT_RATE {
            let purged_entries = self.cache.purge_expired();
            info!(hit_rate, purged_entries, "Optimizing cache strategy");
            actions.push(ScalingAction::CacheOptimize {
                hit_rate,
                purged_entries,
            });
        }

        let requests_by_region: Vec<(String, u64)> = self
            .telemetry
            .traffic()
            .into_iter()
            .map(|(code, requests, _)| (code, requests))
            .collect();
        info!(regions = requests_by_region.len(), "Balancing regional load");
        actions.push(ScalingAction::LoadBalance { requests_by_region });

        actions
    }
}

/// Re-judge a result against the region's own bar
pub fn apply_regional_policy(mut result: ValidationResult, profile: &RegionProfile) -> ValidationResult {
    let thresholds = profile.thresholds;
    let meets = result.quality_score >= thresholds.consensus_threshold
        && result.source_count >= thresholds.min_sources;

    result.approved = meets;
    result.reasoning = format!(
        "{}; {} {} quality standards",
        result.reasoning,
        if meets { "Meets" } else { "Does not meet" },
        profile.name
    );
    result.regional = Some(RegionalContext {
        region_code: profile.code.clone(),
        region_name: profile.name.clone(),
        thresholds,
        cultural: profile.cultural.clone(),
        meets_standards: meets,
    });
    result
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::mock::MockGateway;
    use crate::gateways::GatewayPool;
    use crate::types::{GatewayError, Observation, SourceGateway, SourceKind};
    use chrono::TimeZone;
    use pinpoint_common::config::ConsensusConfig;
    use pinpoint_common::{Coordinate, ManualClock};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn obs(source: SourceKind, lat: f64, lng: f64) -> Observation {
        Observation::new(source, Coordinate::new(lat, lng), 0.95, 3.0, t0())
    }

    fn coordinator(gateways: Vec<Arc<dyn SourceGateway>>) -> (RegionCoordinator, ManualClock) {
        let clock = ManualClock::new(t0());
        let config = ConsensusConfig::default();
        let pool = GatewayPool::new(gateways, &config, Arc::new(clock.clone()));
        let engine = Arc::new(ConsensusEngine::new(pool, config, Arc::new(clock.clone())));
        (RegionCoordinator::new(engine), clock)
    }

    fn three_agreeing() -> Vec<Arc<dyn SourceGateway>> {
        vec![
            Arc::new(MockGateway::answering(obs(SourceKind::Government, 37.5796, 126.9770))),
            Arc::new(MockGateway::answering(obs(SourceKind::Naver, 37.5797, 126.9771))),
            Arc::new(MockGateway::answering(obs(SourceKind::Kakao, 37.5796, 126.9771))),
        ]
    }

    #[tokio::test]
    async fn test_regional_policy_attached() {
        let (coordinator, _) = coordinator(three_agreeing());
        let result = coordinator
            .validate_global("Gyeongbokgung", "KR", Some("ko"), GlobalOptions::default())
            .await
            .unwrap();

        let regional = result.regional.as_ref().unwrap();
        assert_eq!(regional.region_code, "KR");
        assert!(result.approved);
        assert!(result.reasoning.ends_with("; Meets South Korea quality standards"));
        assert_eq!(result.region, "KR");
    }

    #[tokio::test]
    async fn test_region_minimum_sources_enforced() {
        let (coordinator, _) = coordinator(vec![
            Arc::new(MockGateway::answering(obs(SourceKind::Government, 37.5796, 126.9770))),
            Arc::new(MockGateway::answering(obs(SourceKind::Naver, 37.5797, 126.9771))),
        ]);
        let result = coordinator
            .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
            .await
            .unwrap();
        assert!(!result.approved, "Korea requires three sources");
        assert!(result.reasoning.ends_with("Does not meet South Korea quality standards"));
    }

    #[tokio::test]
    async fn test_cache_ttl_follows_region_staleness() {
        let gov = Arc::new(MockGateway::answering(obs(SourceKind::Government, 40.7, -74.0)));
        let (coordinator, clock) = coordinator(vec![
            gov.clone(),
            Arc::new(MockGateway::answering(obs(SourceKind::Google, 40.7, -74.0))),
        ]);

        coordinator
            .validate_global("Battery Park", "US", None, GlobalOptions::default())
            .await
            .unwrap();
        clock.advance(Duration::days(100));
        let cached = coordinator
            .validate_global("Battery Park", "us", None, GlobalOptions::default())
            .await
            .unwrap();
        assert_eq!(gov.call_count(), 1, "US keeps results for 180 days");
        assert_eq!(cached.regional.unwrap().region_code, "US");

        clock.advance(Duration::days(81));
        coordinator
            .validate_global("Battery Park", "US", None, GlobalOptions::default())
            .await
            .unwrap();
        assert_eq!(gov.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failures_recorded_in_telemetry() {
        let (coordinator, _) = coordinator(vec![Arc::new(MockGateway::failing(
            SourceKind::Google,
            GatewayError::Transport("down".into()),
        ))]);
        let err = coordinator
            .validate_global("Shibuya", "JP", None, GlobalOptions::default())
            .await;
        assert!(matches!(err, Err(ConsensusError::SourceUnavailable { .. })));

        let perf = coordinator.region_performance();
        assert_eq!(perf[0].region, "AS");
        assert_eq!(perf[0].error_rate, 1.0);
        assert_eq!(coordinator.system_health().services[0].status, telemetry::ServiceState::Degraded);
    }

    #[tokio::test]
    async fn test_cost_report_counts_gateway_calls() {
        let (coordinator, _) = coordinator(three_agreeing());
        coordinator
            .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
            .await
            .unwrap();
        coordinator
            .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
            .await
            .unwrap();

        let cost = coordinator.cost_report();
        // one miss fanned out to the four Korean sources
        assert_eq!(cost.gateway_calls, 4);
        assert!((cost.projected_cost - cost.current_cost * 1.2).abs() < 1e-9);
        assert_eq!(cost.recommendations[0].action, "Optimize data retention policies");
    }

    #[tokio::test]
    async fn test_auto_scale_actions() {
        let (coordinator, _) = coordinator(three_agreeing());
        coordinator
            .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
            .await
            .unwrap();

        let actions = coordinator.auto_scale(92.0);
        assert!(matches!(actions[0], ScalingAction::ScaleUp { .. }));
        assert!(matches!(actions[1], ScalingAction::CacheOptimize { .. }));
        match actions.last().unwrap() {
            ScalingAction::LoadBalance { requests_by_region } => {
                assert_eq!(requests_by_region, &vec![("KR".to_string(), 1)]);
            }
            other => panic!("unexpected action: {:?}", other),
        }

        let idle = coordinator.auto_scale(50.0);
        assert!(!idle.iter().any(|a| matches!(a, ScalingAction::ScaleUp { .. } | ScalingAction::ScaleDown { .. })));
    }

    #[tokio::test]
    async fn test_auto_scale_reports_telemetry_hit_rate() {
        let (coordinator, _) = coordinator(three_agreeing());
        for _ in 0..2 {
            coordinator
                .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
                .await
                .unwrap();
        }

        // One miss then one hit
        let actions = coordinator.auto_scale(50.0);
        match &actions[0] {
            ScalingAction::CacheOptimize { hit_rate, purged_entries } => {
                assert!((hit_rate - 0.5).abs() < 1e-9);
                assert_eq!(*purged_entries, 0);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_override_result_served_to_plain_call() {
        let gov = Arc::new(MockGateway::answering(obs(SourceKind::Government, 37.5796, 126.9770)));
        let (coordinator, _) = coordinator(vec![
            gov.clone(),
            Arc::new(MockGateway::answering(obs(SourceKind::Naver, 37.5797, 126.9771))),
            Arc::new(MockGateway::answering(obs(SourceKind::Kakao, 37.5796, 126.9771))),
        ]);

        let overridden = coordinator
            .validate_global(
                "Gyeongbokgung",
                "KR",
                None,
                GlobalOptions {
                    region_override: Some("US".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(overridden.regional.as_ref().unwrap().region_code, "US");

        let plain = coordinator
            .validate_global("Gyeongbokgung", "KR", None, GlobalOptions::default())
            .await
            .unwrap();
        assert_eq!(gov.call_count(), 1);
        assert_eq!(plain, overridden);
    }
}
