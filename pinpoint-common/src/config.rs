//! Configuration loading with graceful degradation
//!
//! Resolution priority:
//! 1. Explicit path passed by the embedding application (highest priority)
//! 2. `PINPOINT_CONFIG` environment variable
//! 3. Per-user TOML file (`<config dir>/pinpoint/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file is never fatal: it logs a warning and the compiled defaults
//! are used. A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PINPOINT_CONFIG";

/// Gateway timeouts outside this window are clamped
pub const GATEWAY_TIMEOUT_RANGE_MS: (u64, u64) = (2_000, 5_000);

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PinpointConfig {
    pub logging: LoggingConfig,
    pub consensus: ConsensusConfig,
    pub monitor: MonitorConfig,
    pub integration: IntegrationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Consensus engine tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    pub cluster_radius_m: f64,
    pub cache_ttl_hours: i64,
    pub min_sources: usize,
    pub approval_threshold: f64,
    pub gateway_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: i64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            cluster_radius_m: 100.0,         // Observations closer than this agree
            cache_ttl_hours: 24,
            min_sources: 2,
            approval_threshold: 0.6,          // Score must exceed this to approve
            gateway_timeout_ms: 3_000,
            breaker_failure_threshold: 3,     // Consecutive failures before skipping a source
            breaker_cooldown_secs: 60,
        }
    }
}

/// Quality monitor tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Region name or code used when a caller does not name one
    pub default_region: String,
    /// Snapshots kept per location
    pub history_cap: usize,
    /// Minimum seconds between repeated alerts of one type for one location (0 = off)
    pub alert_cooldown_secs: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_region: "korea".to_string(),
            history_cap: 100,
            alert_cooldown_secs: 0,
        }
    }
}

/// Integration facade tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegrationConfig {
    pub slow_package_ms: u64,
    pub default_country: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            slow_package_ms: 2_000,
            default_country: "KR".to_string(),
        }
    }
}

impl PinpointConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: PinpointConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Resolve and load configuration by priority, falling back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_config_path(explicit) else {
            info!("No configuration file found, using compiled defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                path = %path.display(),
                "Configuration file not found, using compiled defaults"
            );
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    /// Check ranges, clamping the soft ones with a warning
    pub fn validate(&mut self) -> Result<()> {
        let c = &mut self.consensus;

        if c.cluster_radius_m.is_nan() || c.cluster_radius_m <= 0.0 {
            return Err(Error::Config(format!(
                "consensus.cluster_radius_m must be positive, got {}",
                c.cluster_radius_m
            )));
        }
        if !(0.0..=1.0).contains(&c.approval_threshold) {
            return Err(Error::Config(format!(
                "consensus.approval_threshold must be within [0, 1], got {}",
                c.approval_threshold
            )));
        }
        if c.min_sources == 0 {
            return Err(Error::Config("consensus.min_sources must be at least 1".to_string()));
        }
        if c.cache_ttl_hours < 0 {
            return Err(Error::Config("consensus.cache_ttl_hours must not be negative".to_string()));
        }

        let (lo, hi) = GATEWAY_TIMEOUT_RANGE_MS;
        if c.gateway_timeout_ms < lo || c.gateway_timeout_ms > hi {
            let clamped = c.gateway_timeout_ms.clamp(lo, hi);
            warn!(
                configured = c.gateway_timeout_ms,
                clamped, "consensus.gateway_timeout_ms outside supported range, clamping"
            );
            c.gateway_timeout_ms = clamped;
        }

        if self.monitor.history_cap == 0 {
            warn!("monitor.history_cap of 0 would disable trends, using 1");
            self.monitor.history_cap = 1;
        }

        Ok(())
    }
}

/// Pick the config file path by priority without touching its contents
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: explicit path
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config file, only when present
    dirs::config_dir()
        .map(|d| d.join("pinpoint").join("config.toml"))
        .filter(|p| p.exists())
}
