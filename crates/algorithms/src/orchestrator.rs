//! End-to-end assessment
//!
//! Builds the pre/post composites once, runs each hazard pipeline
//! (detect → validate → decide) in isolation, and ranks the decisions by
//! fused score. With the `parallel` feature the three hazards run on a fixed
//! three-worker pool; results are identical either way.

use crate::decision::{decide_claim, ClaimDecision};
use crate::fusion::ConfidenceLabel;
use crate::hazard::{Hazard, HazardDetection, HazardParams, HazardResult};
use crate::validation::{validate, ValidationInput, ValidationParams, ValidationResult};
use geoclaim_core::backend::{
    Composite, CompositeReducer, CompositeRequest, RasterBackend, ReduceParams, Satellite,
};
use geoclaim_core::{Aoi, DateWindow, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Composite construction options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageryOptions {
    pub satellite: Satellite,
    /// Maximum scene cloud percentage (Sentinel-2 only)
    pub max_cloud: f64,
    pub reducer: CompositeReducer,
}

impl Default for ImageryOptions {
    fn default() -> Self {
        Self {
            satellite: Satellite::Sentinel2,
            max_cloud: 30.0,
            reducer: CompositeReducer::Median,
        }
    }
}

/// All tunables of one assessment run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentParams {
    pub imagery: ImageryOptions,
    /// Pixel cap and best-effort flag for detector reductions
    pub reduce: ReduceParams,
    pub hazards: HazardParams,
    pub validation: ValidationParams,
}

/// What to assess
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub aoi: Aoi,
    pub pre: DateWindow,
    pub post: DateWindow,
    /// `None` evaluates every hazard and ranks them
    pub hazard: Option<Hazard>,
    /// Overrides every hazard's default scale (m)
    pub scale: Option<f64>,
}

/// Everything produced for one hazard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HazardEvaluation {
    pub hazard: HazardResult,
    pub validation: ValidationResult,
    pub claim: ClaimDecision,
}

/// Ranking entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub hazard: Hazard,
    pub fused_score: f64,
    pub damage_pct: f64,
    pub confidence_label: ConfidenceLabel,
}

impl From<&ClaimDecision> for RankedCandidate {
    fn from(claim: &ClaimDecision) -> Self {
        Self {
            hazard: claim.hazard,
            fused_score: claim.fused_score,
            damage_pct: claim.damage_pct,
            confidence_label: claim.confidence_label,
        }
    }
}

/// Hazard dropped from the ranking and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedHazard {
    pub hazard: Hazard,
    pub error: String,
}

/// Outcome of an assessment run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    /// Highest fused score; first in evaluation order on ties
    pub best: HazardEvaluation,
    /// Descending by fused score, stable
    pub ranked: Vec<RankedCandidate>,
    /// In evaluation order
    pub evaluations: Vec<HazardEvaluation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ExcludedHazard>,
}

/// Index of the first maximum and the stable descending ranking
pub fn rank_candidates(claims: &[ClaimDecision]) -> Option<(usize, Vec<RankedCandidate>)> {
    let mut best: Option<usize> = None;
    for (i, claim) in claims.iter().enumerate() {
        match best {
            Some(b) if claims[b].fused_score >= claim.fused_score => {}
            _ => best = Some(i),
        }
    }

    let mut ranked: Vec<RankedCandidate> = claims.iter().map(RankedCandidate::from).collect();
    ranked.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
    best.map(|b| (b, ranked))
}

/// Runs assessments against an injected backend
pub struct Orchestrator<'a> {
    backend: &'a dyn RasterBackend,
    params: AssessmentParams,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn RasterBackend, params: AssessmentParams) -> Self {
        Self { backend, params }
    }

    pub fn params(&self) -> &AssessmentParams {
        &self.params
    }

    fn composite(&self, aoi: &Aoi, window: &DateWindow, label: &str) -> Result<Composite> {
        let imagery = &self.params.imagery;
        let composite = self.backend.composite(&CompositeRequest {
            aoi: aoi.clone(),
            window: *window,
            satellite: imagery.satellite,
            max_cloud: imagery.max_cloud,
            reducer: imagery.reducer,
        })?;
        if composite.is_empty() {
            return Err(Error::NoImagery {
                label: label.to_string(),
                start: window.start.to_string(),
                end: window.end.to_string(),
            });
        }
        Ok(composite)
    }

    /// Pre- and post-event composites; fails on a window without imagery
    pub fn fetch_composites(&self, request: &AssessmentRequest) -> Result<(Composite, Composite)> {
        let pre = self.composite(&request.aoi, &request.pre, "pre-event")?;
        let post = self.composite(&request.aoi, &request.post, "post-event")?;
        Ok((pre, post))
    }

    /// Detect, validate and decide one hazard.
    ///
    /// An empty delta histogram degrades to zero damage without a mask, so
    /// validation reports `Unknown`. Other detector errors are returned.
    pub fn evaluate(
        &self,
        hazard: Hazard,
        pre: &Composite,
        post: &Composite,
        request: &AssessmentRequest,
    ) -> Result<HazardEvaluation> {
        let scale = request.scale.unwrap_or_else(|| hazard.default_scale());
        let reduce = ReduceParams {
            scale,
            ..self.params.reduce
        };

        let detection = match hazard.detect(
            self.backend,
            pre,
            post,
            &request.aoi,
            &reduce,
            &self.params.hazards,
        ) {
            Ok(detection) => detection,
            Err(e @ Error::EmptyHistogram { .. }) => {
                warn!("{}: {}; assuming no damage", hazard, e);
                HazardDetection {
                    result: HazardResult::undetected(hazard),
                    mask: None,
                }
            }
            Err(e) => return Err(e),
        };

        let validation = validate(
            self.backend,
            &ValidationInput {
                aoi: &request.aoi,
                pre_window: &request.pre,
                post_window: &request.post,
                hazard,
                mask: detection.mask.as_ref(),
                scale,
            },
            &self.params.validation,
        );
        let claim = decide_claim(&detection.result, Some(&validation));

        Ok(HazardEvaluation {
            hazard: detection.result,
            validation,
            claim,
        })
    }

    /// Run a full assessment.
    ///
    /// Missing imagery fails before any detector runs. With a specific hazard
    /// its errors are returned; otherwise failing hazards are excluded from
    /// the ranking and the run fails only if all of them do.
    pub fn assess(&self, request: &AssessmentRequest) -> Result<Assessment> {
        let (pre, post) = self.fetch_composites(request)?;
        info!(
            "assessing {} with pre {} and post {}",
            request
                .hazard
                .map_or_else(|| "all hazards".to_string(), |h| h.to_string()),
            pre.id(),
            post.id()
        );

        if let Some(hazard) = request.hazard {
            let evaluation = self.evaluate(hazard, &pre, &post, request)?;
            return Ok(Assessment {
                ranked: vec![RankedCandidate::from(&evaluation.claim)],
                best: evaluation.clone(),
                evaluations: vec![evaluation],
                excluded: Vec::new(),
            });
        }

        let outcomes = self.evaluate_all(&pre, &post, request)?;

        let mut evaluations = Vec::new();
        let mut excluded = Vec::new();
        for (hazard, outcome) in Hazard::ALL.into_iter().zip(outcomes) {
            match outcome {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(e) => {
                    warn!("{} excluded from ranking: {}", hazard, e);
                    excluded.push(ExcludedHazard {
                        hazard,
                        error: e.to_string(),
                    });
                }
            }
        }

        let claims: Vec<ClaimDecision> = evaluations.iter().map(|e| e.claim.clone()).collect();
        let Some((best, ranked)) = rank_candidates(&claims) else {
            let reasons: Vec<String> = excluded
                .iter()
                .map(|x| format!("{}: {}", x.hazard, x.error))
                .collect();
            return Err(Error::Other(format!(
                "no hazard could be evaluated ({})",
                reasons.join("; ")
            )));
        };
        info!(
            "best hazard: {} (fused {:.2})",
            evaluations[best].claim.hazard, evaluations[best].claim.fused_score
        );

        Ok(Assessment {
            best: evaluations[best].clone(),
            ranked,
            evaluations,
            excluded,
        })
    }

    #[cfg(feature = "parallel")]
    fn evaluate_all(
        &self,
        pre: &Composite,
        post: &Composite,
        request: &AssessmentRequest,
    ) -> Result<Vec<Result<HazardEvaluation>>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(Hazard::ALL.len())
            .build()
            .map_err(|e| Error::Other(format!("cannot start hazard workers: {}", e)))?;
        Ok(pool.install(|| {
            Hazard::ALL
                .par_iter()
                .map(|&hazard| self.evaluate(hazard, pre, post, request))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_all(
        &self,
        pre: &Composite,
        post: &Composite,
        request: &AssessmentRequest,
    ) -> Result<Vec<Result<HazardEvaluation>>> {
        Ok(Hazard::ALL
            .iter()
            .map(|&hazard| self.evaluate(hazard, pre, post, request))
            .collect())
    }
}
