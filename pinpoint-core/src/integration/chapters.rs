//! Chapter mapping boundary and per-chapter coordinate records

use crate::consensus::ValidationResult;
use crate::monitor::{QualityMetrics, QualityReport};
use crate::types::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};

/// A sub-item of a guide that needs its own map pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideChapter {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl GuideChapter {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
        }
    }
}

/// How the chapter mapper located a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Existing,
    AiExtracted,
    Geocoded,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Direct,
    AiExtracted,
    Keyword,
    Inferred,
}

impl From<ExtractionMethod> for MappingMethod {
    fn from(method: ExtractionMethod) -> Self {
        match method {
            ExtractionMethod::Existing => MappingMethod::Direct,
            ExtractionMethod::AiExtracted => MappingMethod::AiExtracted,
            ExtractionMethod::Geocoded => MappingMethod::Keyword,
            ExtractionMethod::Inferred => MappingMethod::Inferred,
        }
    }
}

/// Mapper output for one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedChapter {
    pub chapter_id: u32,
    pub title: String,
    pub coordinate: Coordinate,
    /// Mapper's own confidence, 0.0-1.0
    pub confidence: f64,
    pub extraction_method: ExtractionMethod,
}

/// External service that places chapters near a base location
#[async_trait]
pub trait ChapterMapper: Send + Sync {
    async fn map_chapters(
        &self,
        base_location: &str,
        chapters: &[GuideChapter],
    ) -> anyhow::Result<Vec<MappedChapter>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            QualityLevel::Excellent
        } else if score >= 0.7 {
            QualityLevel::Good
        } else if score >= 0.5 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStatus {
    Verified,
    Estimated,
    NeedsReview,
}

impl PinStatus {
    pub fn from_result(approved: bool, score: f64) -> Self {
        if approved && score >= 0.8 {
            PinStatus::Verified
        } else if score >= 0.5 {
            PinStatus::Estimated
        } else {
            PinStatus::NeedsReview
        }
    }
}

/// A coordinate ready to render, with its quality annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedCoordinate {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
    pub quality_score: f64,
    pub quality_level: QualityLevel,
    pub status: PinStatus,
    pub source_count: usize,
    pub primary_source: Option<SourceKind>,
    pub alternative_sources: Vec<SourceKind>,
    pub data_freshness_days: f64,
    pub region: String,
    pub last_updated: DateTime<Utc>,
}

impl PinnedCoordinate {
    /// Pin for a consensus result
    pub fn from_validation(result: &ValidationResult, now: DateTime<Utc>) -> Self {
        let metrics = QualityMetrics::assess(result, now);
        let region = result
            .regional
            .as_ref()
            .map(|r| r.region_code.clone())
            .unwrap_or_else(|| result.region.clone());
        Self {
            coordinate: result.coordinate,
            accuracy_m: metrics.accuracy_m,
            quality_score: result.quality_score,
            quality_level: QualityLevel::from_score(result.quality_score),
            status: PinStatus::from_result(result.approved, result.quality_score),
            source_count: result.source_count,
            primary_source: result.sources.first().map(|w| w.source()),
            alternative_sources: result.sources.iter().skip(1).map(|w| w.source()).collect(),
            data_freshness_days: metrics.freshness_days,
            region,
            last_updated: result.validated_at,
        }
    }

    /// Pin for a mapped chapter, backed by its monitoring report
    ///
    /// An approved consensus replaces the mapper's coordinate; otherwise the
    /// mapper's coordinate is kept and scored by its own confidence when no
    /// source answered.
    pub fn from_chapter(mapped: &MappedChapter, report: &QualityReport) -> Self {
        let validation = report.validation.as_ref();
        let approved = validation.map(|v| v.approved).unwrap_or(false);
        let score = validation
            .map(|v| v.quality_score)
            .unwrap_or(mapped.confidence.clamp(0.0, 1.0));
        let coordinate = match validation {
            Some(v) if v.approved => v.coordinate,
            _ => mapped.coordinate,
        };

        Self {
            coordinate,
            accuracy_m: report.current_quality.accuracy_m,
            quality_score: score,
            quality_level: QualityLevel::from_score(score),
            status: PinStatus::from_result(approved, score),
            source_count: validation.map(|v| v.source_count).unwrap_or(0),
            primary_source: validation.and_then(|v| v.sources.first().map(|w| w.source())),
            alternative_sources: validation
                .map(|v| v.sources.iter().skip(1).map(|w| w.source()).collect())
                .unwrap_or_default(),
            data_freshness_days: report.current_quality.freshness_days,
            region: validation.map(|v| v.region.clone()).unwrap_or_default(),
            last_updated: report.last_updated,
        }
    }
}

/// One chapter's entry in a coordinate package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterMapping {
    pub chapter_id: u32,
    pub chapter_title: String,
    pub pin: PinnedCoordinate,
    pub mapping_method: MappingMethod,
    pub mapping_confidence: f64,
    pub fallback_used: bool,
    /// Report was produced from live sources
    pub data_available: bool,
}

pub fn chapter_location_id(location_name: &str, chapter_id: u32) -> String {
    format!("{}-chapter-{}", location_name.trim(), chapter_id)
}
