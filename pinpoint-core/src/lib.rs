//! Pinpoint core library
//!
//! Multi-source coordinate consensus with quality monitoring:
//! - [`consensus`] reconciles observations from several sources into one
//!   scored coordinate
//! - [`monitor`] tracks how that quality moves over time and raises alerts
//! - [`analytics`] aggregates, predicts and flags anomalies fleet-wide
//! - [`region`] applies per-region policy, caching and telemetry
//! - [`integration`] builds guide coordinate packages from all of the above
//!
//! # Wiring
//! ```rust,ignore
//! let config = PinpointConfig::load(None)?;
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let pool = GatewayPool::new(gateways, &config.consensus, clock.clone());
//! let engine = Arc::new(ConsensusEngine::new(pool, config.consensus.clone(), clock));
//! let coordinator = Arc::new(RegionCoordinator::new(engine.clone()));
//! let monitor = Arc::new(QualityMonitor::new(engine, config.monitor.clone()));
//! let facade = IntegrationFacade::new(coordinator, monitor, mapper, config.integration.clone());
//! ```

pub mod analytics;
pub mod cache;
pub mod consensus;
pub mod error;
pub mod gateways;
pub mod integration;
pub mod monitor;
pub mod region;
pub mod types;

pub use analytics::{AnalyticsEngine, Dashboard};
pub use consensus::{CachePolicy, ConsensusEngine, ValidationOptions, ValidationResult};
pub use error::{AnalyticsError, ConsensusError, IntegrationError};
pub use gateways::{GatewayPool, StaticTableGateway};
pub use integration::{CoordinatePackage, IntegrationFacade};
pub use monitor::{QualityMonitor, QualityReport};
pub use region::RegionCoordinator;
pub use types::{GatewayError, LocationQuery, Observation, SourceGateway, SourceKind};
