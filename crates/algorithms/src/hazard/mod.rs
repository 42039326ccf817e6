//! Hazard detectors
//!
//! Each detector turns a pre/post composite pair into a damage percentage,
//! a severity class and the affected-area mask:
//! - **flood**: Otsu on ΔMNDWI, refined by water gain and terrain context
//! - **wildfire**: dNBR above the USGS burn threshold
//! - **roof**: mean absolute RGB change at building scale

mod flood;
mod roof;
mod wildfire;

pub use flood::{detect_flood, FloodParams};
pub use roof::{detect_roof, RoofParams};
pub use wildfire::{detect_wildfire, WildfireParams};

use geoclaim_core::backend::{Composite, RasterBackend, ReduceParams};
use geoclaim_core::expr::{Image, Reducer};
use geoclaim_core::{Aoi, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Supported hazard types, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hazard {
    Flood,
    Wildfire,
    Roof,
}

impl Hazard {
    /// Evaluation order; ties in ranking resolve to the earlier entry
    pub const ALL: [Hazard; 3] = [Hazard::Flood, Hazard::Wildfire, Hazard::Roof];

    pub fn name(&self) -> &'static str {
        match self {
            Hazard::Flood => "flood",
            Hazard::Wildfire => "wildfire",
            Hazard::Roof => "roof",
        }
    }

    /// Nominal reduction scale in meters
    pub fn default_scale(&self) -> f64 {
        match self {
            Hazard::Flood | Hazard::Wildfire => 30.0,
            Hazard::Roof => 10.0,
        }
    }

    /// Run this hazard's detector.
    ///
    /// `reduce.scale` is the detection scale.
    pub fn detect(
        &self,
        backend: &dyn RasterBackend,
        pre: &Composite,
        post: &Composite,
        aoi: &Aoi,
        reduce: &ReduceParams,
        params: &HazardParams,
    ) -> Result<HazardDetection> {
        match self {
            Hazard::Flood => detect_flood(backend, pre, post, aoi, reduce, &params.flood),
            Hazard::Wildfire => detect_wildfire(backend, pre, post, aoi, reduce, &params.wildfire),
            Hazard::Roof => detect_roof(backend, pre, post, aoi, reduce, &params.roof),
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Hazard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "flood" => Ok(Hazard::Flood),
            "wildfire" => Ok(Hazard::Wildfire),
            "roof" => Ok(Hazard::Roof),
            _ => Err(Error::InvalidParameter {
                name: "hazard",
                value: s.to_string(),
                reason: "use flood, wildfire or roof".into(),
            }),
        }
    }
}

/// Ordered damage category. Which classes a hazard uses depends on its scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Moderate,
    High,
    Severe,
}

impl Severity {
    /// Flood scale: `<10` none, `<40` moderate, else severe
    pub fn flood(damage_pct: f64) -> Self {
        if damage_pct < 10.0 {
            Severity::None
        } else if damage_pct < 40.0 {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }

    /// Wildfire and roof scale: `<10` none, `<30` low, `<50` moderate, else high
    pub fn graded(damage_pct: f64) -> Self {
        if damage_pct < 10.0 {
            Severity::None
        } else if damage_pct < 30.0 {
            Severity::Low
        } else if damage_pct < 50.0 {
            Severity::Moderate
        } else {
            Severity::High
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Damage estimate for one hazard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardResult {
    pub hazard: Hazard,
    /// Affected share of the AOI, 0-100
    pub damage_pct: f64,
    pub severity: Severity,
}

impl HazardResult {
    /// Zero damage, used when no usable histogram exists
    pub fn undetected(hazard: Hazard) -> Self {
        Self {
            hazard,
            damage_pct: 0.0,
            severity: Severity::None,
        }
    }
}

/// Detector output: the estimate plus the affected-area mask, if any
#[derive(Debug, Clone)]
pub struct HazardDetection {
    pub result: HazardResult,
    pub mask: Option<Image>,
}

/// Per-hazard detector parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardParams {
    pub flood: FloodParams,
    pub wildfire: WildfireParams,
    pub roof: RoofParams,
}

/// `100 × mean(mask)` over the AOI; no valid pixel counts as no damage
fn damage_pct(
    backend: &dyn RasterBackend,
    mask: &Image,
    aoi: &Aoi,
    reduce: &ReduceParams,
) -> Result<f64> {
    match backend.reduce_region(mask, Reducer::Mean, aoi, reduce)? {
        Some(fraction) => Ok(fraction * 100.0),
        None => {
            warn!("{} has no valid pixels in the AOI; reporting 0% damage", mask.name());
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_severity_boundaries() {
        assert_eq!(Severity::flood(9.999), Severity::None);
        assert_eq!(Severity::flood(10.0), Severity::Moderate);
        assert_eq!(Severity::flood(39.99), Severity::Moderate);
        assert_eq!(Severity::flood(40.0), Severity::Severe);
    }

    #[test]
    fn test_graded_severity_boundaries() {
        assert_eq!(Severity::graded(0.0), Severity::None);
        assert_eq!(Severity::graded(10.0), Severity::Low);
        assert_eq!(Severity::graded(30.0), Severity::Moderate);
        assert_eq!(Severity::graded(49.9), Severity::Moderate);
        assert_eq!(Severity::graded(50.0), Severity::High);
    }

    #[test]
    fn test_hazard_parse_and_scale() {
        assert_eq!("Wildfire".parse::<Hazard>().unwrap(), Hazard::Wildfire);
        assert!("storm".parse::<Hazard>().is_err());
        assert_eq!(Hazard::Roof.default_scale(), 10.0);
        assert_eq!(Hazard::Flood.default_scale(), 30.0);
        assert_eq!(Hazard::ALL[0], Hazard::Flood);
    }
}
