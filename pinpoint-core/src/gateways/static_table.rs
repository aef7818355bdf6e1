//! Curated coordinate table
//!
//! In-process gateway over hand-verified coordinates. Lookups match on a
//! canonical form of the name (case-folded, whitespace collapsed) so
//! "Namsan  Tower" and "namsan tower" hit the same entry.

use crate::types::{GatewayError, LocationQuery, Observation, SourceGateway, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinpoint_common::Coordinate;
use std::collections::HashMap;
use std::sync::RwLock;

/// Confidence assigned to curated entries unless overridden
pub const DEFAULT_TABLE_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone)]
struct TableEntry {
    coordinate: Coordinate,
    accuracy_m: f64,
    confidence: f64,
    verified_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct StaticTableGateway {
    entries: RwLock<HashMap<String, TableEntry>>,
}

impl StaticTableGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a curated entry
    pub fn insert(
        &self,
        name: &str,
        coordinate: Coordinate,
        accuracy_m: f64,
        verified_at: DateTime<Utc>,
    ) {
        self.insert_with_confidence(name, coordinate, accuracy_m, DEFAULT_TABLE_CONFIDENCE, verified_at);
    }

    pub fn insert_with_confidence(
        &self,
        name: &str,
        coordinate: Coordinate,
        accuracy_m: f64,
        confidence: f64,
        verified_at: DateTime<Utc>,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            canonical_name(name),
            TableEntry {
                coordinate,
                accuracy_m,
                confidence,
                verified_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SourceGateway for StaticTableGateway {
    fn source(&self) -> SourceKind {
        SourceKind::Static
    }

    async fn lookup(&self, query: &LocationQuery) -> Result<Option<Observation>, GatewayError> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(&canonical_name(&query.name)).map(|entry| {
            Observation::new(
                SourceKind::Static,
                entry.coordinate,
                entry.confidence,
                entry.accuracy_m,
                entry.verified_at,
            )
            .with_metadata("table", "curated")
        }))
    }
}

/// Case-fold and collapse whitespace
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
