//! Static region profile table

use crate::types::SourceKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Quality bar a region applies to consensus results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionThresholds {
    /// Target accuracy in meters
    pub min_accuracy_m: f64,
    pub min_sources: usize,
    /// Cached results older than this are revalidated
    pub max_staleness_days: i64,
    pub consensus_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateDisplay {
    Decimal,
    Dms,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Metric,
    Imperial,
}

/// Presentation conventions of a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalPreferences {
    pub address_format: String,
    pub coordinate_display: CoordinateDisplay,
    pub distance_unit: DistanceUnit,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProfile {
    pub code: String,
    pub name: String,
    pub countries: Vec<String>,
    pub preferred_sources: Vec<SourceKind>,
    pub thresholds: RegionThresholds,
    pub cultural: CulturalPreferences,
}

impl RegionProfile {
    pub fn covers(&self, country_code: &str) -> bool {
        self.countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country_code.trim()))
    }
}

#[allow(clippy::too_many_arguments)]
fn profile(
    code: &str,
    name: &str,
    countries: &[&str],
    preferred_sources: &[SourceKind],
    thresholds: RegionThresholds,
    address_format: &str,
    distance_unit: DistanceUnit,
    time_zone: &str,
) -> RegionProfile {
    RegionProfile {
        code: code.to_string(),
        name: name.to_string(),
        countries: countries.iter().map(|c| c.to_string()).collect(),
        preferred_sources: preferred_sources.to_vec(),
        thresholds,
        cultural: CulturalPreferences {
            address_format: address_format.to_string(),
            coordinate_display: CoordinateDisplay::Decimal,
            distance_unit,
            time_zone: time_zone.to_string(),
        },
    }
}

/// Region table; the first entry is the fallback for unknown countries
pub static REGION_PROFILES: Lazy<Vec<RegionProfile>> = Lazy::new(|| {
    use SourceKind::*;
    vec![
        profile(
            "KR",
            "South Korea",
            &["KR"],
            &[Government, Naver, Kakao, Google],
            RegionThresholds {
                min_accuracy_m: 5.0,
                min_sources: 3,
                max_staleness_days: 90,
                consensus_threshold: 0.8,
            },
            "korean",
            DistanceUnit::Metric,
            "Asia/Seoul",
        ),
        profile(
            "US",
            "United States",
            &["US"],
            &[Government, Google, Bing, Osm],
            RegionThresholds {
                min_accuracy_m: 10.0,
                min_sources: 2,
                max_staleness_days: 180,
                consensus_threshold: 0.7,
            },
            "us",
            DistanceUnit::Imperial,
            "America/New_York",
        ),
        profile(
            "EU",
            "European Union",
            &["DE", "FR", "IT", "ES", "NL", "BE"],
            &[Government, Google, Osm, Here],
            RegionThresholds {
                min_accuracy_m: 8.0,
                min_sources: 3,
                max_staleness_days: 120,
                consensus_threshold: 0.75,
            },
            "european",
            DistanceUnit::Metric,
            "Europe/Berlin",
        ),
        profile(
            "AS",
            "Asia Pacific",
            &["JP", "CN", "SG", "AU", "IN"],
            &[Google, Local, Osm, Government],
            RegionThresholds {
                min_accuracy_m: 15.0,
                min_sources: 2,
                max_staleness_days: 150,
                consensus_threshold: 0.7,
            },
            "local",
            DistanceUnit::Metric,
            "Asia/Tokyo",
        ),
    ]
});

/// Look up a profile by region code
pub fn by_code(code: &str) -> Option<&'static RegionProfile> {
    REGION_PROFILES
        .iter()
        .find(|p| p.code.eq_ignore_ascii_case(code.trim()))
}

/// Resolve the profile for a country, honoring an explicit region override
///
/// An override naming an unknown region is ignored; unknown countries fall
/// back to the first profile.
pub fn resolve(country_code: &str, region_override: Option<&str>) -> &'static RegionProfile {
    if let Some(profile) = region_override.and_then(by_code) {
        return profile;
    }
    REGION_PROFILES
        .iter()
        .find(|p| p.covers(country_code))
        .unwrap_or(&REGION_PROFILES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_resolution() {
        assert_eq!(resolve("FR", None).code, "EU");
        assert_eq!(resolve("jp", None).code, "AS");
        assert_eq!(resolve("US", None).code, "US");
    }

    #[test]
    fn test_unknown_country_falls_back_to_korea() {
        assert_eq!(resolve("BR", None).code, "KR");
    }

    #[test]
    fn test_override_wins_when_known() {
        assert_eq!(resolve("KR", Some("US")).code, "US");
        assert_eq!(resolve("DE", Some("XX")).code, "EU");
    }

    #[test]
    fn test_korea_thresholds() {
        let kr = by_code("KR").unwrap();
        assert_eq!(kr.thresholds.min_sources, 3);
        assert_eq!(kr.thresholds.max_staleness_days, 90);
        assert_eq!(kr.thresholds.consensus_threshold, 0.8);
        assert_eq!(kr.preferred_sources[0], SourceKind::Government);
        assert_eq!(kr.cultural.time_zone, "Asia/Seoul");
    }

    #[test]
    fn test_us_uses_imperial() {
        assert_eq!(by_code("US").unwrap().cultural.distance_unit, DistanceUnit::Imperial);
    }
}
