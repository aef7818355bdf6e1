//! Source gateway fan-out
//!
//! Queries every registered [`SourceGateway`] concurrently and collects the
//! answers. Each call runs under its own time budget and behind a per-source
//! circuit breaker; failures are logged and reported per source but never
//! fail the gather.
//!
//! # Example
//! ```rust,ignore
//! use pinpoint_core::gateways::{GatewayPool, StaticTableGateway};
//!
//! let pool = GatewayPool::new(vec![Arc::new(table), Arc::new(provider)], &config, clock);
//! let outcome = pool.gather(&LocationQuery::new("Gyeongbokgung", "korea"), None).await;
//!
//! for failure in &outcome.failures {
//!     println!("{} failed: {:?}", failure.source, failure.class);
//! }
//! ```

pub mod breaker;
pub mod static_table;

pub use breaker::CircuitBreaker;
pub use static_table::StaticTableGateway;

use crate::types::{
    GatewayError, LocationQuery, Observation, SourceFailure, SourceGateway, SourceKind,
};
use futures::future::join_all;
use pinpoint_common::config::ConsensusConfig;
use pinpoint_common::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one fan-out
#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    /// Answers, in gateway order
    pub observations: Vec<Observation>,
    /// Sources that failed, classified
    pub failures: Vec<SourceFailure>,
    /// Sources that answered without a coordinate
    pub no_answer: Vec<SourceKind>,
}

impl GatherOutcome {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Concurrent gateway executor
pub struct GatewayPool {
    gateways: Vec<Arc<dyn SourceGateway>>,
    timeout: Duration,
    breaker: CircuitBreaker,
    clock: Arc<dyn Clock>,
}

impl GatewayPool {
    pub fn new(
        gateways: Vec<Arc<dyn SourceGateway>>,
        config: &ConsensusConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateways,
            timeout: Duration::from_millis(config.gateway_timeout_ms),
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                chrono::Duration::seconds(config.breaker_cooldown_secs),
            ),
            clock,
        }
    }

    /// Override the per-call time budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get gateway count
    pub fn count(&self) -> usize {
        self.gateways.len()
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.gateways.iter().map(|g| g.source()).collect()
    }

    /// Sources currently skipped by the breaker
    pub fn open_circuits(&self) -> Vec<SourceKind> {
        self.breaker.open_sources(self.clock.now())
    }

    /// Query all gateways concurrently
    ///
    /// With `preferred`, gateways are ordered by their position in that list;
    /// unlisted gateways follow in registration order. The order of the
    /// returned observations follows the gateway order.
    pub async fn gather(
        &self,
        query: &LocationQuery,
        preferred: Option<&[SourceKind]>,
    ) -> GatherOutcome {
        let ordered = self.ordered_gateways(preferred);
        let timeout_ms = self.timeout.as_millis() as u64;

        let futures = ordered.into_iter().map(|gateway| {
            let query = query.clone();
            async move {
                let source = gateway.source();
                if !self.breaker.allow(source, self.clock.now()) {
                    return (source, Err(GatewayError::CircuitOpen));
                }
                let result = match tokio::time::timeout(self.timeout, gateway.lookup(&query)).await
                {
                    Ok(inner) => inner,
                    Err(_) => Err(GatewayError::Timeout(timeout_ms)),
                };
                (source, result)
            }
        });

        let mut outcome = GatherOutcome::default();
        for (source, result) in join_all(futures).await {
            match result {
                Ok(Some(observation)) if observation.coordinate.is_valid() => {
                    self.breaker.record_success(source);
                    debug!(
                        source = %source,
                        location = %query.name,
                        lat = observation.coordinate.lat,
                        lng = observation.coordinate.lng,
                        "Source answered"
                    );
                    outcome.observations.push(observation);
                }
                Ok(Some(observation)) => {
                    self.breaker.record_success(source);
                    let error = GatewayError::Rejected(format!(
                        "invalid coordinate ({}, {})",
                        observation.coordinate.lat, observation.coordinate.lng
                    ));
                    warn!(source = %source, location = %query.name, error = %error, "Discarding observation");
                    outcome.failures.push(SourceFailure::from_error(source, &error));
                }
                Ok(None) => {
                    self.breaker.record_success(source);
                    debug!(source = %source, location = %query.name, "Source has no answer");
                    outcome.no_answer.push(source);
                }
                Err(error) => {
                    if error.counts_against_health() {
                        self.breaker.record_failure(source, self.clock.now());
                    } else if !matches!(error, GatewayError::CircuitOpen) {
                        self.breaker.release_trial(source);
                    }
                    warn!(
                        source = %source,
                        location = %query.name,
                        error = %error,
                        "Source lookup failed (per-source error isolation)"
                    );
                    outcome.failures.push(SourceFailure::from_error(source, &error));
                }
            }
        }

        outcome
    }

    fn ordered_gateways(&self, preferred: Option<&[SourceKind]>) -> Vec<Arc<dyn SourceGateway>> {
        let mut indexed: Vec<(usize, usize, Arc<dyn SourceGateway>)> = self
            .gateways
            .iter()
            .enumerate()
            .map(|(idx, g)| {
                let rank = preferred
                    .and_then(|order| order.iter().position(|s| *s == g.source()))
                    .unwrap_or(usize::MAX);
                (rank, idx, Arc::clone(g))
            })
            .collect();
        indexed.sort_by_key(|(rank, idx, _)| (*rank, *idx));
        indexed.into_iter().map(|(_, _, g)| g).collect()
    }
}

// ============================================================================
// Mock Gateway for Testing
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum MockBehaviour {
        Answer(Observation),
        Empty,
        Fail(GatewayError),
        Slow(Duration, Observation),
    }

    /// Mock gateway for testing
    pub struct MockGateway {
        pub source: SourceKind,
        pub behaviour: MockBehaviour,
        pub calls: AtomicUsize,
    }

    impl MockGateway {
        pub fn answering(observation: Observation) -> Self {
            Self {
                source: observation.source,
                behaviour: MockBehaviour::Answer(observation),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty(source: SourceKind) -> Self {
            Self {
                source,
                behaviour: MockBehaviour::Empty,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(source: SourceKind, error: GatewayError) -> Self {
            Self {
                source,
                behaviour: MockBehaviour::Fail(error),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn slow(delay: Duration, observation: Observation) -> Self {
            Self {
                source: observation.source,
                behaviour: MockBehaviour::Slow(delay, observation),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceGateway for MockGateway {
        fn source(&self) -> SourceKind {
            self.source
        }

        async fn lookup(&self, _query: &LocationQuery) -> Result<Option<Observation>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                MockBehaviour::Answer(obs) => Ok(Some(obs.clone())),
                MockBehaviour::Empty => Ok(None),
                MockBehaviour::Fail(err) => Err(err.clone()),
                MockBehaviour::Slow(delay, obs) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Some(obs.clone()))
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
