//! Core Types and Trait Definitions
//!
//! Shared vocabulary of the consensus pipeline:
//! - [`SourceKind`] with its static reliability calibration
//! - [`Observation`] / [`WeightedObservation`] produced per source per query
//! - [`SourceGateway`], the pluggable boundary to each coordinate provider
//! - [`GatewayError`] / [`SourceFailure`] keeping transport failures apart from
//!   provider refusals

use chrono::{DateTime, Utc};
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Sources
// ============================================================================

/// Coordinate provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// National mapping agency or other official registry
    Government,
    Google,
    Naver,
    Kakao,
    /// Curated in-process coordinate table
    Static,
    /// OpenStreetMap
    Osm,
    /// Hand-entered coordinate
    Manual,
    Bing,
    Here,
    /// Regional provider without a calibrated profile
    Local,
}

impl SourceKind {
    /// Static reliability calibration
    ///
    /// Sources without a calibrated value get a neutral 0.5.
    pub fn reliability(&self) -> f64 {
        match self {
            SourceKind::Government => 1.0,
            SourceKind::Google => 0.9,
            SourceKind::Static => 0.9,
            SourceKind::Naver => 0.85,
            SourceKind::Kakao => 0.8,
            SourceKind::Osm => 0.7,
            SourceKind::Manual => 0.3,
            SourceKind::Bing | SourceKind::Here | SourceKind::Local => 0.5,
        }
    }

    /// Authoritative sources earn the quality score bonus
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SourceKind::Government)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Government => "government",
            SourceKind::Google => "google",
            SourceKind::Naver => "naver",
            SourceKind::Kakao => "kakao",
            SourceKind::Static => "static",
            SourceKind::Osm => "osm",
            SourceKind::Manual => "manual",
            SourceKind::Bing => "bing",
            SourceKind::Here => "here",
            SourceKind::Local => "local",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Observations
// ============================================================================

/// One source's answer for one query
///
/// Immutable once produced by a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: SourceKind,
    pub coordinate: Coordinate,
    /// Provider-reported confidence (0.0-1.0)
    pub confidence: f64,
    /// Provider-reported accuracy radius in meters
    pub accuracy_m: f64,
    /// When the provider last verified this coordinate
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Observation {
    /// Create an observation, clamping confidence to [0, 1]
    pub fn new(
        source: SourceKind,
        coordinate: Coordinate,
        confidence: f64,
        accuracy_m: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            coordinate,
            confidence: clamp_unit(confidence),
            accuracy_m: if accuracy_m.is_finite() { accuracy_m.max(0.0) } else { 0.0 },
            observed_at,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Observation with its consensus weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedObservation {
    pub observation: Observation,
    /// Static reliability of the source
    pub reliability: f64,
    /// reliability × confidence
    pub weight: f64,
}

impl WeightedObservation {
    pub fn from_observation(observation: Observation) -> Self {
        let reliability = observation.source.reliability();
        let weight = reliability * observation.confidence;
        Self {
            observation,
            reliability,
            weight,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.observation.source
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.observation.coordinate
    }
}

/// Lookup request handed to every gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationQuery {
    pub name: String,
    pub region: String,
    pub language: Option<String>,
}

impl LocationQuery {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

// ============================================================================
// Gateway boundary
// ============================================================================

/// Pluggable coordinate provider
///
/// `Ok(None)` means the provider answered but has no coordinate for the query,
/// which is not a failure.
#[async_trait::async_trait]
pub trait SourceGateway: Send + Sync {
    /// Provider identity
    fn source(&self) -> SourceKind;

    /// Look up one location
    async fn lookup(&self, query: &LocationQuery) -> Result<Option<Observation>, GatewayError>;
}

/// Gateway call errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Call exceeded its time budget
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Network or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Source skipped while its breaker cools down
    #[error("Circuit open")]
    CircuitOpen,

    /// Provider refused the request (quota, policy, malformed query)
    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

/// Failure classification for operator reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Timeout,
    Transport,
    CircuitOpen,
    Rejected,
}

impl GatewayError {
    pub fn class(&self) -> FailureClass {
        match self {
            GatewayError::Timeout(_) => FailureClass::Timeout,
            GatewayError::Transport(_) => FailureClass::Transport,
            GatewayError::CircuitOpen => FailureClass::CircuitOpen,
            GatewayError::Rejected(_) => FailureClass::Rejected,
        }
    }

    /// Whether this failure says something about source health
    ///
    /// Business rejections do not trip the breaker.
    pub fn counts_against_health(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transport(_))
    }
}

/// Per-source failure recorded during a gather
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub class: FailureClass,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: SourceKind, error: &GatewayError) -> Self {
        Self {
            source,
            class: error.class(),
            message: error.to_string(),
        }
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_table() {
        assert_eq!(SourceKind::Government.reliability(), 1.0);
        assert_eq!(SourceKind::Google.reliability(), 0.9);
        assert_eq!(SourceKind::Naver.reliability(), 0.85);
        assert_eq!(SourceKind::Kakao.reliability(), 0.8);
        assert_eq!(SourceKind::Static.reliability(), 0.9);
        assert_eq!(SourceKind::Osm.reliability(), 0.7);
        assert_eq!(SourceKind::Manual.reliability(), 0.3);
        assert_eq!(SourceKind::Here.reliability(), 0.5);
    }

    #[test]
    fn test_only_government_is_authoritative() {
        assert!(SourceKind::Government.is_authoritative());
        assert!(!SourceKind::Google.is_authoritative());
        assert!(!SourceKind::Static.is_authoritative());
    }

    #[test]
    fn test_observation_clamps_confidence() {
        let obs = Observation::new(
            SourceKind::Google,
            Coordinate::new(37.0, 127.0),
            1.7,
            -3.0,
            Utc::now(),
        );
        assert_eq!(obs.confidence, 1.0);
        assert_eq!(obs.accuracy_m, 0.0);
    }

    #[test]
    fn test_weight_is_reliability_times_confidence() {
        let obs = Observation::new(
            SourceKind::Kakao,
            Coordinate::new(37.0, 127.0),
            0.5,
            10.0,
            Utc::now(),
        );
        let weighted = WeightedObservation::from_observation(obs);
        assert!((weighted.weight - 0.4).abs() < 1e-12);
        assert_eq!(weighted.reliability, 0.8);
    }

    #[test]
    fn test_failure_classes_are_distinct() {
        assert_eq!(GatewayError::Timeout(3000).class(), FailureClass::Timeout);
        assert_eq!(
            GatewayError::Rejected("quota".into()).class(),
            FailureClass::Rejected
        );
        assert!(GatewayError::Transport("reset".into()).counts_against_health());
        assert!(!GatewayError::Rejected("quota".into()).counts_against_health());
    }

    #[test]
    fn test_source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::Government).unwrap();
        assert_eq!(json, "\"government\"");
    }
}
