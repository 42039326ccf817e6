//! Flood extent from MNDWI change
//!
//! ```text
//! mask = otsu(ΔMNDWI) AND ΔMNDWI > 0 AND (elevation < 40 m OR water occurrence > 30 %)
//! ```

use super::{damage_pct, Hazard, HazardDetection, HazardResult, Severity};
use crate::context::hydro_context;
use crate::imagery::{index_delta, SpectralIndex};
use crate::threshold::otsu_mask;
use geoclaim_core::backend::{Composite, RasterBackend, ReduceParams};
use geoclaim_core::{Aoi, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters for flood detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodParams {
    /// Terrain below this elevation (m) is flood-prone
    pub max_elevation_m: f64,
    /// Historical water occurrence (%) above which a pixel is flood-prone
    pub min_water_occurrence: f64,
}

impl Default for FloodParams {
    fn default() -> Self {
        Self {
            max_elevation_m: 40.0,
            min_water_occurrence: 30.0,
        }
    }
}

/// Detect newly flooded area.
///
/// Materializes one histogram (Otsu) and one region mean.
pub fn detect_flood(
    backend: &dyn RasterBackend,
    pre: &Composite,
    post: &Composite,
    aoi: &Aoi,
    reduce: &ReduceParams,
    params: &FloodParams,
) -> Result<HazardDetection> {
    let delta = index_delta(pre, post, SpectralIndex::Mndwi)?;
    let water = otsu_mask(backend, &delta, aoi, reduce.scale)?.rename("MNDWI_mask");
    let gain = delta.gt(0.0);
    let context = hydro_context(params.max_elevation_m, params.min_water_occurrence);
    let mask = water.and(&gain).and(&context);

    let damage_pct = damage_pct(backend, &mask, aoi, reduce)?;
    let severity = Severity::flood(damage_pct);
    info!("flood: {:.2}% flooded ({})", damage_pct, severity);

    Ok(HazardDetection {
        result: HazardResult {
            hazard: Hazard::Flood,
            damage_pct,
            severity,
        },
        mask: Some(mask),
    })
}
