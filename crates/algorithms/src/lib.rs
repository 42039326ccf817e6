//! # GeoClaim Algorithms
//!
//! Hazard assessment and claim decision algorithms for GeoClaim.
//!
//! ## Pipeline stages
//!
//! - **imagery**: NDWI, MNDWI, NBR with per-sensor band resolution; index and RGB deltas
//! - **threshold**: Otsu's automatic histogram threshold
//! - **hazard**: flood, wildfire and roof damage detectors
//! - **validation**: radar, rainfall and terrain corroboration
//! - **fusion**: confidence and severity/confidence fusion scores
//! - **decision**: approve / review / reject with rationale
//! - **orchestrator**: pre/post composites, per-hazard pipelines, ranking
//!
//! All stages build deferred [`Image`](geoclaim_core::Image) expressions and
//! only materialize them through a [`RasterBackend`](geoclaim_core::backend::RasterBackend).

pub mod context;
pub mod decision;
pub mod fusion;
pub mod hazard;
pub mod imagery;
pub mod orchestrator;
pub mod threshold;
pub mod validation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::decision::{decide_claim, ClaimDecision, ClaimStatus};
    pub use crate::fusion::{confidence_score, fused_score, Confidence, ConfidenceLabel, FusedLabel};
    pub use crate::hazard::{
        detect_flood, detect_roof, detect_wildfire, FloodParams, Hazard, HazardDetection,
        HazardParams, HazardResult, RoofParams, Severity, WildfireParams,
    };
    pub use crate::imagery::{
        delta, index_delta, mndwi, nbr, ndwi, rgb_delta, spectral_index, BandRole, SpectralIndex,
    };
    pub use crate::orchestrator::{
        rank_candidates, Assessment, AssessmentParams, AssessmentRequest, HazardEvaluation,
        ImageryOptions, Orchestrator, RankedCandidate,
    };
    pub use crate::threshold::{otsu_mask, otsu_threshold, OtsuThreshold};
    pub use crate::validation::{
        cross_sensor_check, meteorology_check, spatial_coherence_check, validate, CheckOutcome,
        ValidationInput, ValidationParams, ValidationResult,
    };
    pub use geoclaim_core::prelude::*;
}
