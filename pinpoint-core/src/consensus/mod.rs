//! Multi-source coordinate consensus
//!
//! # Pipeline
//! 1. **Gather** - query every source concurrently, isolating failures
//! 2. **Weigh** - weight = static reliability × reported confidence
//! 3. **Cluster** - single-link clustering at the configured radius, keep the
//!    largest cluster (deterministic tie-break)
//! 4. **Locate** - weighted centroid of the kept cluster
//! 5. **Score** - quality score, tier, approval, reasoning
//! 6. **Cache** - by (location, region) for the configured TTL
//!
//! Only "no source answered at all" is an error. Weak or split answers come
//! back as unapproved results with reasoning.

pub mod cluster;
pub mod scoring;

pub use cluster::{BoundingBox, Cluster};
pub use scoring::ConsensusTier;

use crate::cache::TtlCache;
use crate::error::ConsensusError;
use crate::gateways::GatewayPool;
use crate::region::RegionalContext;
use crate::types::{LocationQuery, SourceFailure, SourceKind, WeightedObservation};
use chrono::{DateTime, Duration, Utc};
use pinpoint_common::config::ConsensusConfig;
use pinpoint_common::events::{EventBus, PinpointEvent};
use pinpoint_common::{Clock, Coordinate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Number of alternative coordinates reported
const MAX_ALTERNATIVES: usize = 3;

/// How a validation interacts with the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve from cache when fresh, store new results
    #[default]
    Use,
    /// Always recompute, store the new result
    Refresh,
    /// Always recompute, leave the cache untouched
    Bypass,
}

impl CachePolicy {
    fn reads(&self) -> bool {
        matches!(self, CachePolicy::Use)
    }

    fn writes(&self) -> bool {
        !matches!(self, CachePolicy::Bypass)
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Minimum cluster size for approval (config default when `None`)
    pub min_sources: Option<usize>,
    pub cache: CachePolicy,
    /// Preferred source order
    pub source_order: Option<Vec<SourceKind>>,
    pub language: Option<String>,
}

impl ValidationOptions {
    pub fn uncached() -> Self {
        Self {
            cache: CachePolicy::Bypass,
            ..Default::default()
        }
    }
}

/// Runner-up coordinate from an individual source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub source: SourceKind,
    pub coordinate: Coordinate,
    pub weight: f64,
}

/// Outcome of one consensus run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub location: String,
    pub region: String,
    pub approved: bool,
    pub coordinate: Coordinate,
    /// 0.0-1.0, 3 decimals
    pub quality_score: f64,
    /// Observations received (all clusters)
    pub source_count: usize,
    /// Observations in the kept cluster
    pub cluster_size: usize,
    pub tier: ConsensusTier,
    pub reasoning: String,
    /// Every observation received, in gather order
    pub sources: Vec<WeightedObservation>,
    /// Members of the kept cluster
    pub retained: Vec<WeightedObservation>,
    pub alternatives: Vec<Alternative>,
    pub failed_sources: Vec<SourceFailure>,
    pub validated_at: DateTime<Utc>,
    /// Set when a region policy was applied on top
    pub regional: Option<RegionalContext>,
}

impl ValidationResult {
    /// Timestamp of the freshest retained observation
    pub fn freshest_observation(&self) -> Option<DateTime<Utc>> {
        self.retained.iter().map(|w| w.observation.observed_at).max()
    }

    /// Bounding box of the retained cluster
    pub fn retained_bounds(&self) -> Option<BoundingBox> {
        BoundingBox::of(self.retained.iter().map(|w| w.observation.coordinate))
    }

    /// Observations dropped as outliers
    pub fn outlier_count(&self) -> usize {
        self.source_count.saturating_sub(self.cluster_size)
    }
}

/// Consensus engine
///
/// # Example
/// ```rust,ignore
/// let engine = ConsensusEngine::new(pool, config.consensus.clone(), clock);
/// let result = engine.validate("Gyeongbokgung", "KR", ValidationOptions::default()).await?;
/// if result.approved {
///     println!("{:?} ({})", result.coordinate, result.quality_score);
/// }
/// ```
pub struct ConsensusEngine {
    pool: GatewayPool,
    cache: TtlCache<(String, String), ValidationResult>,
    config: ConsensusConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl ConsensusEngine {
    pub fn new(pool: GatewayPool, config: ConsensusConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            cache: TtlCache::new(Arc::clone(&clock)),
            config,
            clock,
            events: None,
        }
    }

    /// Publish `ValidationCompleted` events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn pool(&self) -> &GatewayPool {
        &self.pool
    }

    /// Cached result without triggering a lookup
    pub fn cached(&self, location: &str, region: &str) -> Option<ValidationResult> {
        self.cache.get(&cache_key(location, region))
    }

    pub fn invalidate(&self, location: &str, region: &str) -> bool {
        self.cache.invalidate(&cache_key(location, region))
    }

    /// Validate a location against every source
    pub async fn validate(
        &self,
        location: &str,
        region: &str,
        options: ValidationOptions,
    ) -> Result<ValidationResult, ConsensusError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ConsensusError::InvalidInput(
                "location name must not be blank".to_string(),
            ));
        }

        let key = cache_key(location, region);
        if options.cache.reads() {
            if let Some(hit) = self.cache.get(&key) {
                debug!(location, region, "Consensus cache hit");
                return Ok(hit);
            }
        }

        let mut query = LocationQuery::new(location, region);
        query.language = options.language.clone();

        let outcome = self
            .pool
            .gather(&query, options.source_order.as_deref())
            .await;

        if outcome.observations.is_empty() {
            return Err(ConsensusError::SourceUnavailable {
                location: location.to_string(),
                failures: outcome.failures,
            });
        }

        let weighted: Vec<WeightedObservation> = outcome
            .observations
            .into_iter()
            .map(WeightedObservation::from_observation)
            .collect();

        let min_sources = options.min_sources.unwrap_or(self.config.min_sources);
        let result = self.build_result(location, region, weighted, outcome.failures, min_sources)?;

        if options.cache.writes() {
            self.cache.insert(
                key,
                result.clone(),
                Duration::hours(self.config.cache_ttl_hours),
            );
        }

        if let Some(bus) = &self.events {
            bus.emit_lossy(PinpointEvent::ValidationCompleted {
                location: result.location.clone(),
                region: result.region.clone(),
                approved: result.approved,
                quality_score: result.quality_score,
                source_count: result.source_count,
                timestamp: result.validated_at,
            });
        }

        info!(
            location,
            region,
            approved = result.approved,
            quality = result.quality_score,
            sources = result.source_count,
            cluster = result.cluster_size,
            failed = result.failed_sources.len(),
            "Consensus computed"
        );

        Ok(result)
    }

    fn build_result(
        &self,
        location: &str,
        region: &str,
        weighted: Vec<WeightedObservation>,
        failed_sources: Vec<SourceFailure>,
        min_sources: usize,
    ) -> Result<ValidationResult, ConsensusError> {
        let clusters = cluster::single_link_clusters(&weighted, self.config.cluster_radius_m);
        let chosen = cluster::select_cluster(&clusters, &weighted).ok_or_else(|| {
            ConsensusError::InvalidInput(format!("no cluster formed for '{}'", location))
        })?;

        let members: Vec<&WeightedObservation> =
            chosen.members.iter().map(|&i| &weighted[i]).collect();
        let coordinate = cluster::weighted_centroid(&members).ok_or_else(|| {
            ConsensusError::InvalidInput(format!("empty cluster for '{}'", location))
        })?;

        let source_count = weighted.len();
        let cluster_size = members.len();
        let authoritative_present = weighted.iter().any(|w| w.source().is_authoritative());

        let score = scoring::quality_score(&scoring::ScoreInputs::from_cluster(
            &members,
            source_count,
            source_count,
            authoritative_present,
        ));
        let has_majority = cluster_size * 2 > source_count;
        let tier = scoring::tier(score, has_majority);
        let approved = score > self.config.approval_threshold && cluster_size >= min_sources;

        if clusters.len() > 1 {
            debug!(
                location,
                clusters = clusters.len(),
                kept = cluster_size,
                "Discarded outlier clusters"
            );
        }

        let retained: Vec<WeightedObservation> = members.into_iter().cloned().collect();

        let mut by_weight: Vec<&WeightedObservation> = weighted.iter().collect();
        by_weight.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let alternatives = by_weight
            .into_iter()
            .take(MAX_ALTERNATIVES)
            .map(|w| Alternative {
                source: w.source(),
                coordinate: w.observation.coordinate,
                weight: w.weight,
            })
            .collect();

        Ok(ValidationResult {
            location: location.to_string(),
            region: region.to_string(),
            approved,
            coordinate,
            quality_score: score,
            source_count,
            cluster_size,
            tier,
            reasoning: scoring::reasoning(score, source_count, cluster_size),
            sources: weighted,
            retained,
            alternatives,
            failed_sources,
            validated_at: self.clock.now(),
            regional: None,
        })
    }
}

fn cache_key(location: &str, region: &str) -> (String, String) {
    (location.trim().to_string(), region.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::mock::MockGateway;
    use crate::types::{GatewayError, Observation, SourceGateway};
    use chrono::TimeZone;
    use pinpoint_common::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn obs(source: SourceKind, lat: f64, lng: f64, confidence: f64) -> Observation {
        Observation::new(source, Coordinate::new(lat, lng), confidence, 5.0, t0())
    }

    fn engine(gateways: Vec<Arc<dyn SourceGateway>>) -> (ConsensusEngine, ManualClock) {
        let clock = ManualClock::new(t0());
        let config = ConsensusConfig::default();
        let pool = GatewayPool::new(gateways, &config, Arc::new(clock.clone()));
        (ConsensusEngine::new(pool, config, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (engine, _) = engine(vec![]);
        let err = engine
            .validate("   ", "KR", ValidationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_unavailable() {
        let (engine, _) = engine(vec![
            Arc::new(MockGateway::failing(
                SourceKind::Google,
                GatewayError::Transport("down".into()),
            )),
            Arc::new(MockGateway::empty(SourceKind::Static)),
        ]);
        let err = engine
            .validate("Atlantis", "KR", ValidationOptions::default())
            .await
            .unwrap_err();
        match err {
            ConsensusError::SourceUnavailable { location, failures } => {
                assert_eq!(location, "Atlantis");
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outlier_excluded_from_consensus() {
        let (engine, _) = engine(vec![
            Arc::new(MockGateway::answering(obs(SourceKind::Google, 37.5796, 126.9770, 0.9))),
            Arc::new(MockGateway::answering(obs(SourceKind::Naver, 37.5797, 126.9771, 0.9))),
            Arc::new(MockGateway::answering(obs(SourceKind::Kakao, 37.5795, 126.9769, 0.9))),
            Arc::new(MockGateway::answering(obs(SourceKind::Osm, 37.6700, 126.9770, 0.9))),
        ]);

        let result = engine
            .validate("Gyeongbokgung", "KR", ValidationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.source_count, 4);
        assert_eq!(result.cluster_size, 3);
        assert_eq!(result.outlier_count(), 1);
        assert!(result.retained.iter().all(|w| w.source() != SourceKind::Osm));
        assert!(result.coordinate.lat < 37.58);
        assert!(result.reasoning.contains("1 outlier(s) detected and removed"));
        assert_eq!(result.alternatives.len(), 3);
    }

    #[tokio::test]
    async fn test_approval_requires_min_sources() {
        let (engine, _) = engine(vec![Arc::new(MockGateway::answering(obs(
            SourceKind::Government,
            37.5,
            127.0,
            1.0,
        )))]);

        let result = engine
            .validate("City Hall", "KR", ValidationOptions::default())
            .await
            .unwrap();

        // 0.3 + 0.3 + 0.2 + 0.04 + 0.1 = 0.94, but only one source
        assert!(result.quality_score > 0.6);
        assert!(!result.approved);

        let relaxed = engine
            .validate(
                "City Hall",
                "KR",
                ValidationOptions {
                    min_sources: Some(1),
                    cache: CachePolicy::Bypass,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(relaxed.approved);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_gateways_until_ttl() {
        let google = Arc::new(MockGateway::answering(obs(SourceKind::Google, 37.5, 127.0, 0.9)));
        let (engine, clock) = engine(vec![google.clone()]);

        let first = engine.validate("Namsan", "KR", ValidationOptions::default()).await.unwrap();
        let second = engine.validate("Namsan", "KR", ValidationOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(google.call_count(), 1);

        clock.advance(Duration::hours(25));
        engine.validate("Namsan", "KR", ValidationOptions::default()).await.unwrap();
        assert_eq!(google.call_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_policy_recomputes_and_stores() {
        let google = Arc::new(MockGateway::answering(obs(SourceKind::Google, 37.5, 127.0, 0.9)));
        let (engine, _) = engine(vec![google.clone()]);

        engine.validate("Namsan", "KR", ValidationOptions::default()).await.unwrap();
        let refreshed = engine
            .validate(
                "Namsan",
                "KR",
                ValidationOptions {
                    cache: CachePolicy::Refresh,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(google.call_count(), 2);
        assert_eq!(engine.cached("Namsan", "KR"), Some(refreshed));
    }

    #[tokio::test]
    async fn test_bypass_leaves_cache_empty() {
        let (engine, _) = engine(vec![Arc::new(MockGateway::answering(obs(
            SourceKind::Google,
            37.5,
            127.0,
            0.9,
        )))]);
        engine.validate("Namsan", "KR", ValidationOptions::uncached()).await.unwrap();
        assert!(engine.cached("Namsan", "KR").is_none());
    }

    #[tokio::test]
    async fn test_validation_event_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let (engine, _) = engine(vec![Arc::new(MockGateway::answering(obs(
            SourceKind::Google,
            37.5,
            127.0,
            0.9,
        )))]);
        let engine = engine.with_event_bus(bus);

        engine.validate("Namsan", "KR", ValidationOptions::default()).await.unwrap();
        match rx.try_recv().unwrap() {
            PinpointEvent::ValidationCompleted { location, .. } => assert_eq!(location, "Namsan"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
