//! Roof damage from RGB change

use super::{damage_pct, Hazard, HazardDetection, HazardResult, Severity};
use crate::imagery::{rgb_delta, RGB_DELTA};
use geoclaim_core::backend::{Composite, RasterBackend, ReduceParams};
use geoclaim_core::{Aoi, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters for roof damage detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoofParams {
    /// Mean absolute reflectance change above which a pixel counts as damaged
    pub rgb_delta_threshold: f64,
}

impl Default for RoofParams {
    fn default() -> Self {
        Self {
            rgb_delta_threshold: 0.2,
        }
    }
}

pub fn detect_roof(
    backend: &dyn RasterBackend,
    pre: &Composite,
    post: &Composite,
    aoi: &Aoi,
    reduce: &ReduceParams,
    params: &RoofParams,
) -> Result<HazardDetection> {
    let delta = rgb_delta(pre, post)?;
    let mask = delta.gt(params.rgb_delta_threshold).rename(RGB_DELTA);

    let damage_pct = damage_pct(backend, &mask, aoi, reduce)?;
    let severity = Severity::graded(damage_pct);
    info!("roof: {:.2}% changed ({})", damage_pct, severity);

    Ok(HazardDetection {
        result: HazardResult {
            hazard: Hazard::Roof,
            damage_pct,
            severity,
        },
        mask: Some(mask),
    })
}
