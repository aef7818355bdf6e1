//! Shared fixtures for the pinpoint-core integration tests
//!
//! `ScriptedGateway` answers from a per-name table (or a fallback answer for
//! every name) and can be re-scripted between calls. `FixedMapper` returns a
//! canned chapter layout.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pinpoint_common::config::{ConsensusConfig, IntegrationConfig, MonitorConfig};
use pinpoint_common::{Clock, Coordinate, ManualClock};
use pinpoint_core::integration::{ChapterMapper, ExtractionMethod, GuideChapter, MappedChapter};
use pinpoint_core::types::{GatewayError, LocationQuery, Observation, SourceGateway, SourceKind};
use pinpoint_core::{
    ConsensusEngine, GatewayPool, IntegrationFacade, QualityMonitor, RegionCoordinator,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

pub fn palace() -> Coordinate {
    Coordinate::new(37.5796, 126.9770)
}

/// Move `from` north by roughly `meters`
pub fn north_of(from: Coordinate, meters: f64) -> Coordinate {
    Coordinate::new(from.lat + meters / 111_195.0, from.lng)
}

#[derive(Clone)]
pub enum Script {
    Answer { coordinate: Coordinate, confidence: f64, accuracy_m: f64, observed_at: DateTime<Utc> },
    Empty,
    Fail,
}

pub struct ScriptedGateway {
    source: SourceKind,
    fallback: Mutex<Script>,
    by_name: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(source: SourceKind, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            source,
            fallback: Mutex::new(fallback),
            by_name: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers every name with `coordinate` at confidence 0.95, accuracy 3m, observed at t0
    pub fn answering(source: SourceKind, coordinate: Coordinate) -> Arc<Self> {
        Self::new(source, answer(coordinate, 0.95))
    }

    pub fn failing(source: SourceKind) -> Arc<Self> {
        Self::new(source, Script::Fail)
    }

    /// Answers only the names scripted with [`ScriptedGateway::script`]
    pub fn silent(source: SourceKind) -> Arc<Self> {
        Self::new(source, Script::Empty)
    }

    pub fn script(&self, name: &str, script: Script) {
        self.by_name.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn set_fallback(&self, script: Script) {
        *self.fallback.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn answer(coordinate: Coordinate, confidence: f64) -> Script {
    Script::Answer {
        coordinate,
        confidence,
        accuracy_m: 3.0,
        observed_at: t0(),
    }
}

#[async_trait]
impl SourceGateway for ScriptedGateway {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn lookup(&self, query: &LocationQuery) -> Result<Option<Observation>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .by_name
            .lock()
            .unwrap()
            .get(&query.name)
            .cloned()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        match script {
            Script::Answer { coordinate, confidence, accuracy_m, observed_at } => Ok(Some(
                Observation::new(self.source, coordinate, confidence, accuracy_m, observed_at),
            )),
            Script::Empty => Ok(None),
            Script::Fail => Err(GatewayError::Transport("connection refused".to_string())),
        }
    }
}

pub fn as_gateways(gateways: &[Arc<ScriptedGateway>]) -> Vec<Arc<dyn SourceGateway>> {
    gateways
        .iter()
        .map(|g| Arc::clone(g) as Arc<dyn SourceGateway>)
        .collect()
}

/// Wired components sharing one manual clock
pub struct Harness {
    pub clock: ManualClock,
    pub engine: Arc<ConsensusEngine>,
    pub monitor: Arc<QualityMonitor>,
    pub coordinator: Arc<RegionCoordinator>,
}

impl Harness {
    pub fn new(gateways: &[Arc<ScriptedGateway>]) -> Self {
        let clock = ManualClock::new(t0());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let config = ConsensusConfig::default();
        let pool = GatewayPool::new(as_gateways(gateways), &config, Arc::clone(&shared));
        let engine = Arc::new(ConsensusEngine::new(pool, config, shared));
        let monitor = Arc::new(QualityMonitor::new(Arc::clone(&engine), MonitorConfig::default()));
        let coordinator = Arc::new(RegionCoordinator::new(Arc::clone(&engine)));
        Self {
            clock,
            engine,
            monitor,
            coordinator,
        }
    }

    pub fn facade(&self, mapper: Arc<dyn ChapterMapper>) -> IntegrationFacade {
        IntegrationFacade::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.monitor),
            mapper,
            IntegrationConfig::default(),
        )
    }
}

/// Places each requested chapter at a canned coordinate
pub struct FixedMapper {
    placements: HashMap<u32, (Coordinate, ExtractionMethod)>,
    fail: bool,
}

impl FixedMapper {
    pub fn new(placements: &[(u32, Coordinate, ExtractionMethod)]) -> Arc<Self> {
        Arc::new(Self {
            placements: placements
                .iter()
                .map(|(id, coordinate, method)| (*id, (*coordinate, *method)))
                .collect(),
            fail: false,
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            placements: HashMap::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl ChapterMapper for FixedMapper {
    async fn map_chapters(
        &self,
        _base_location: &str,
        chapters: &[GuideChapter],
    ) -> anyhow::Result<Vec<MappedChapter>> {
        if self.fail {
            anyhow::bail!("chapter mapping service unavailable");
        }
        Ok(chapters
            .iter()
            .filter_map(|chapter| {
                let (coordinate, method) = self.placements.get(&chapter.id)?;
                Some(MappedChapter {
                    chapter_id: chapter.id,
                    title: chapter.title.clone(),
                    coordinate: *coordinate,
                    confidence: 0.7,
                    extraction_method: *method,
                })
            })
            .collect())
    }
}
