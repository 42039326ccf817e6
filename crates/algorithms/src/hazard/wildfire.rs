//! Burned area from dNBR

use super::{damage_pct, Hazard, HazardDetection, HazardResult, Severity};
use crate::imagery::{index_delta, SpectralIndex};
use geoclaim_core::backend::{Composite, RasterBackend, ReduceParams};
use geoclaim_core::{Aoi, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters for wildfire detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WildfireParams {
    /// dNBR above which a pixel counts as burned (USGS moderate-low severity)
    pub dnbr_threshold: f64,
}

impl Default for WildfireParams {
    fn default() -> Self {
        Self {
            dnbr_threshold: 0.27,
        }
    }
}

/// Detect burned area as `ΔNBR > threshold`.
///
/// The delta is `post - pre` as produced by the change engine.
pub fn detect_wildfire(
    backend: &dyn RasterBackend,
    pre: &Composite,
    post: &Composite,
    aoi: &Aoi,
    reduce: &ReduceParams,
    params: &WildfireParams,
) -> Result<HazardDetection> {
    let dnbr = index_delta(pre, post, SpectralIndex::Nbr)?;
    let mask = dnbr.gt(params.dnbr_threshold).rename("NBR_mask");

    let damage_pct = damage_pct(backend, &mask, aoi, reduce)?;
    let severity = Severity::graded(damage_pct);
    info!("wildfire: {:.2}% burned ({})", damage_pct, severity);

    Ok(HazardDetection {
        result: HazardResult {
            hazard: Hazard::Wildfire,
            damage_pct,
            severity,
        },
        mask: Some(mask),
    })
}
