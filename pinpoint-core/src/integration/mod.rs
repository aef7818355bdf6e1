//! Guide coordinate packages
//!
//! Turns a location plus its chapters into one ready-to-render package:
//! 1. Validate the main location under its region's policy
//! 2. Map chapters through the external [`ChapterMapper`] and monitor each
//!    chapter location concurrently
//! 3. Summarise quality, frame a viewport, derive recommendations
//! 4. Cache the package by name, track processing time, publish `PackageBuilt`
//!
//! User feedback with a low rating sends the chapter back through
//! verification and drops the cached package.

pub mod chapters;
pub mod viewport;

pub use chapters::{
    chapter_location_id, ChapterMapper, ChapterMapping, ExtractionMethod, GuideChapter,
    MappedChapter, MappingMethod, PinStatus, PinnedCoordinate, QualityLevel,
};
pub use viewport::Viewport;

use crate::error::IntegrationError;
use crate::monitor::{QualityMetrics, QualityMonitor, QualityReport, Severity};
use crate::region::{GlobalOptions, RegionCoordinator};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use pinpoint_common::config::IntegrationConfig;
use pinpoint_common::events::{EventBus, PinpointEvent};
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Processing samples kept for the performance report
const PERFORMANCE_WINDOW: usize = 100;
/// Share of inferred chapters above which a recommendation is raised
const FALLBACK_SHARE_LIMIT: f64 = 0.3;
/// Ratings at or below this trigger re-verification
const REVERIFY_RATING: u8 = 2;

#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// Country of the main location (config default when `None`)
    pub country_code: Option<String>,
    pub language: Option<String>,
    pub region_override: Option<String>,
    /// Serve and store packages in the package cache
    pub enable_caching: bool,
    /// Mark the package for fleet analytics
    pub enable_analytics: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            country_code: None,
            language: None,
            region_override: None,
            enable_caching: true,
            enable_analytics: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideQualityOverview {
    /// Mean quality over the main location and all chapters
    pub overall_score: f64,
    pub verified_count: usize,
    pub estimated_count: usize,
    pub needs_review_count: usize,
    /// Mean over locations with live data (meters)
    pub average_accuracy_m: f64,
    /// Mean over locations with live data (days)
    pub average_freshness_days: f64,
    pub last_quality_check: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatePackage {
    pub location_name: String,
    pub main: PinnedCoordinate,
    pub map_center: Coordinate,
    pub zoom: u8,
    pub chapters: Vec<ChapterMapping>,
    pub quality_overview: GuideQualityOverview,
    pub recommendations: Vec<String>,
    pub analytics_enabled: bool,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Accuracy,
    Missing,
    Outdated,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateIssue {
    pub kind: IssueKind,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFeedback {
    /// 1-5
    pub rating: u8,
    pub issue: Option<CoordinateIssue>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub location_name: String,
    pub chapter_id: u32,
    pub feedback: CoordinateFeedback,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub location_name: String,
    pub chapter_id: u32,
    pub reverification_triggered: bool,
    /// Fresh report when re-verification ran
    pub reverification: Option<QualityReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub location_name: String,
    pub processing_ms: u64,
    pub chapter_count: usize,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_requests: usize,
    pub average_processing_ms: f64,
    pub slowest_ms: Option<u64>,
    pub fastest_ms: Option<u64>,
}

/// Bounded log of package build times
pub struct PerformanceTracker {
    samples: Mutex<VecDeque<PerformanceSample>>,
    slow_ms: u64,
}

impl PerformanceTracker {
    pub fn new(slow_ms: u64) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(PERFORMANCE_WINDOW)),
            slow_ms,
        }
    }

    pub fn record(&self, sample: PerformanceSample) {
        if sample.processing_ms > self.slow_ms {
            warn!(
                location_name = %sample.location_name,
                processing_ms = sample.processing_ms,
                "Performance issue: slow package build"
            );
        }
        let mut samples = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        samples.push_back(sample);
        while samples.len() > PERFORMANCE_WINDOW {
            samples.pop_front();
        }
    }

    pub fn report(&self) -> PerformanceReport {
        let samples = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        let times: Vec<u64> = samples.iter().map(|s| s.processing_ms).collect();
        PerformanceReport {
            total_requests: times.len(),
            average_processing_ms: if times.is_empty() {
                0.0
            } else {
                times.iter().sum::<u64>() as f64 / times.len() as f64
            },
            slowest_ms: times.iter().max().copied(),
            fastest_ms: times.iter().min().copied(),
        }
    }
}

pub struct IntegrationFacade {
    coordinator: Arc<RegionCoordinator>,
    monitor: Arc<QualityMonitor>,
    mapper: Arc<dyn ChapterMapper>,
    config: IntegrationConfig,
    packages: RwLock<HashMap<String, CoordinatePackage>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
    performance: PerformanceTracker,
    events: Option<EventBus>,
}

impl IntegrationFacade {
    pub fn new(
        coordinator: Arc<RegionCoordinator>,
        monitor: Arc<QualityMonitor>,
        mapper: Arc<dyn ChapterMapper>,
        config: IntegrationConfig,
    ) -> Self {
        let performance = PerformanceTracker::new(config.slow_package_ms);
        Self {
            coordinator,
            monitor,
            mapper,
            config,
            packages: RwLock::new(HashMap::new()),
            feedback: Mutex::new(Vec::new()),
            performance,
            events: None,
        }
    }

    /// Publish package and re-verification events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.coordinator.engine().clock().now()
    }

    /// Build (or serve from cache) the coordinate package for a guide
    pub async fn build_package(
        &self,
        location_name: &str,
        chapters: &[GuideChapter],
        options: PackageOptions,
    ) -> Result<CoordinatePackage, IntegrationError> {
        let name = location_name.trim();
        if options.enable_caching {
            if let Some(cached) = self.cached_package(name) {
                debug!(location_name = name, "Package cache hit");
                return Ok(cached);
            }
        }

        let started = Instant::now();
        info!(location_name = name, chapters = chapters.len(), "Building coordinate package");

        let country = options
            .country_code
            .clone()
            .unwrap_or_else(|| self.config.default_country.clone());
        let main = self
            .coordinator
            .validate_global(
                name,
                &country,
                options.language.as_deref(),
                GlobalOptions {
                    cache_first: true,
                    region_override: options.region_override.clone(),
                },
            )
            .await?;
        let region_code = main
            .regional
            .as_ref()
            .map(|r| r.region_code.clone())
            .unwrap_or_else(|| main.region.clone());

        let mapped = self
            .mapper
            .map_chapters(name, chapters)
            .await
            .map_err(IntegrationError::Mapping)?;

        let monitored = join_all(mapped.iter().map(|chapter| {
            let id = chapter_location_id(name, chapter.chapter_id);
            let region = region_code.clone();
            async move {
                let report = self.monitor.monitor_in(&id, &chapter.title, &region).await;
                (chapter, report)
            }
        }))
        .await;

        let mut chapter_mappings = Vec::with_capacity(monitored.len());
        let mut chapter_reports = Vec::with_capacity(monitored.len());
        for (chapter, report) in monitored {
            match report {
                Ok(report) => {
                    chapter_mappings.push(ChapterMapping {
                        chapter_id: chapter.chapter_id,
                        chapter_title: chapter.title.clone(),
                        pin: PinnedCoordinate::from_chapter(chapter, &report),
                        mapping_method: chapter.extraction_method.into(),
                        mapping_confidence: chapter.confidence,
                        fallback_used: chapter.extraction_method == ExtractionMethod::Inferred,
                        data_available: report.data_available,
                    });
                    chapter_reports.push(report);
                }
                Err(e) => warn!(
                    location_name = name,
                    chapter_id = chapter.chapter_id,
                    "Chapter skipped: {}",
                    e
                ),
            }
        }

        let now = self.now();
        let main_pin = PinnedCoordinate::from_validation(&main, now);
        let main_metrics = QualityMetrics::assess(&main, now);

        let overview = quality_overview(
            &main_pin,
            main.approved,
            &main_metrics,
            &chapter_mappings,
            &chapter_reports,
            now,
        );

        let mut points = vec![main_pin.coordinate];
        points.extend(chapter_mappings.iter().map(|c| c.pin.coordinate));
        let frame = viewport::viewport(&points).unwrap_or(Viewport {
            center: main_pin.coordinate,
            zoom: viewport::SINGLE_POINT_ZOOM,
        });

        let package = CoordinatePackage {
            location_name: name.to_string(),
            main: main_pin,
            map_center: frame.center,
            zoom: frame.zoom,
            recommendations: recommendations(&overview, &chapter_mappings),
            chapters: chapter_mappings,
            quality_overview: overview,
            analytics_enabled: options.enable_analytics,
            built_at: now,
        };

        let processing_ms = started.elapsed().as_millis() as u64;
        self.performance.record(PerformanceSample {
            location_name: name.to_string(),
            processing_ms,
            chapter_count: package.chapters.len(),
            recorded_at: now,
        });

        if options.enable_caching {
            self.packages
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .insert(name.to_string(), package.clone());
        }

        if let Some(bus) = &self.events {
            bus.emit_lossy(PinpointEvent::PackageBuilt {
                location_name: name.to_string(),
                chapter_count: package.chapters.len(),
                overall_quality: package.quality_overview.overall_score,
                processing_ms,
                timestamp: now,
            });
        }

        info!(
            location_name = name,
            chapters = package.chapters.len(),
            overall = package.quality_overview.overall_score,
            zoom = package.zoom,
            processing_ms,
            "Coordinate package built"
        );
        Ok(package)
    }

    /// Record user feedback; low ratings re-verify the chapter
    pub async fn submit_feedback(
        &self,
        location_name: &str,
        chapter_id: u32,
        feedback: CoordinateFeedback,
    ) -> Result<FeedbackReceipt, IntegrationError> {
        if !(1..=5).contains(&feedback.rating) {
            return Err(IntegrationError::InvalidFeedback(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }

        let name = location_name.trim().to_string();
        let rating = feedback.rating;
        info!(location_name = %name, chapter_id, rating, "Feedback received");

        self.feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(FeedbackRecord {
                location_name: name.clone(),
                chapter_id,
                feedback,
                received_at: self.now(),
            });

        if rating > REVERIFY_RATING {
            return Ok(FeedbackReceipt {
                location_name: name,
                chapter_id,
                reverification_triggered: false,
                reverification: None,
            });
        }

        warn!(location_name = %name, chapter_id, rating, "Low rating, re-verifying chapter");
        self.packages
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&name);

        let location_id = chapter_location_id(&name, chapter_id);
        let reverification = match self.monitor.latest(&location_id) {
            Some(snapshot) => {
                match self
                    .monitor
                    .monitor_in(&location_id, &snapshot.location_name, &snapshot.region)
                    .await
                {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(location_id = %location_id, "Re-verification failed: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!(location_id = %location_id, "Chapter was never monitored; nothing to re-verify");
                None
            }
        };

        if let Some(bus) = &self.events {
            bus.emit_lossy(PinpointEvent::ReverificationRequested {
                location_name: name.clone(),
                chapter_id: chapter_id.to_string(),
                rating,
                timestamp: self.now(),
            });
        }

        Ok(FeedbackReceipt {
            location_name: name,
            chapter_id,
            reverification_triggered: true,
            reverification,
        })
    }

    pub fn cached_package(&self, location_name: &str) -> Option<CoordinatePackage> {
        self.packages
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(location_name.trim())
            .cloned()
    }

    pub fn feedback_log(&self) -> Vec<FeedbackRecord> {
        self.feedback.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.performance.report()
    }
}

fn quality_overview(
    main: &PinnedCoordinate,
    main_approved: bool,
    main_metrics: &QualityMetrics,
    chapters: &[ChapterMapping],
    reports: &[QualityReport],
    now: DateTime<Utc>,
) -> GuideQualityOverview {
    let mut verified = usize::from(main_approved);
    let (mut estimated, mut needs_review) = (0, 0);
    for chapter in chapters {
        match chapter.pin.status {
            PinStatus::Verified => verified += 1,
            PinStatus::Estimated => estimated += 1,
            PinStatus::NeedsReview => needs_review += 1,
        }
    }

    let total_quality = main.quality_score + chapters.iter().map(|c| c.pin.quality_score).sum::<f64>();
    let overall = total_quality / (chapters.len() + 1) as f64;

    let live: Vec<&QualityMetrics> = std::iter::once(main_metrics)
        .chain(reports.iter().filter(|r| r.data_available).map(|r| &r.current_quality))
        .collect();
    let n = live.len() as f64;

    GuideQualityOverview {
        overall_score: pinpoint_common::geo::round_to(overall, 3),
        verified_count: verified,
        estimated_count: estimated,
        needs_review_count: needs_review,
        average_accuracy_m: live.iter().map(|m| m.accuracy_m).sum::<f64>() / n,
        average_freshness_days: live.iter().map(|m| m.freshness_days).sum::<f64>() / n,
        last_quality_check: now,
    }
}

fn recommendations(overview: &GuideQualityOverview, chapters: &[ChapterMapping]) -> Vec<String> {
    let mut out = Vec::new();

    if overview.overall_score < 0.7 {
        out.push("Overall coordinate quality is low. Manual verification recommended.".to_string());
    }
    if overview.average_accuracy_m > 50.0 {
        out.push("Some coordinates have low accuracy. Re-check them against official sources.".to_string());
    }
    if overview.average_freshness_days > 90.0 {
        out.push("Coordinate data is outdated. Update it with current information.".to_string());
    }
    if overview.needs_review_count > 0 {
        out.push(format!(
            "{} chapter coordinates need review.",
            overview.needs_review_count
        ));
    }
    let fallback = chapters.iter().filter(|c| c.fallback_used).count();
    if fallback as f64 > chapters.len() as f64 * FALLBACK_SHARE_LIMIT {
        out.push("Many chapters use inferred coordinates. Add precise location details.".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview(overall: f64, accuracy: f64, freshness: f64, needs_review: usize) -> GuideQualityOverview {
        GuideQualityOverview {
            overall_score: overall,
            verified_count: 1,
            estimated_count: 0,
            needs_review_count: needs_review,
            average_accuracy_m: accuracy,
            average_freshness_days: freshness,
            last_quality_check: Utc::now(),
        }
    }

    fn sample(ms: u64) -> PerformanceSample {
        PerformanceSample {
            location_name: "Namsan".to_string(),
            processing_ms: ms,
            chapter_count: 2,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_recommendations_for_good_package() {
        assert!(recommendations(&overview(0.9, 10.0, 5.0, 0), &[]).is_empty());
    }

    #[test]
    fn test_recommendation_rules() {
        let recs = recommendations(&overview(0.5, 80.0, 120.0, 2), &[]);
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[3], "2 chapter coordinates need review.");
    }

    #[test]
    fn test_performance_window() {
        let tracker = PerformanceTracker::new(2_000);
        assert_eq!(tracker.report().slowest_ms, None);
        for ms in 1..=150 {
            tracker.record(sample(ms));
        }
        let report = tracker.report();
        assert_eq!(report.total_requests, 100);
        assert_eq!(report.fastest_ms, Some(51));
        assert_eq!(report.slowest_ms, Some(150));
        assert!((report.average_processing_ms - 100.5).abs() < 1e-9);
    }
}
