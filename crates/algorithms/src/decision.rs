//! Claim decision
//!
//! Turns a damage estimate and its validation into an approve / review /
//! reject outcome with a readable rationale.

use crate::fusion::{fused_score, ConfidenceLabel, FusedLabel, HIGH_THRESHOLD, MODERATE_THRESHOLD};
use crate::hazard::{Hazard, HazardResult, Severity};
use crate::validation::ValidationResult;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Final claim outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClaimStatus {
    #[serde(rename = "Auto-Approve")]
    AutoApprove,
    #[serde(rename = "Manual Review")]
    ManualReview,
    Reject,
}

impl ClaimStatus {
    pub fn from_score(fused: f64) -> Self {
        if fused >= HIGH_THRESHOLD {
            ClaimStatus::AutoApprove
        } else if fused >= MODERATE_THRESHOLD {
            ClaimStatus::ManualReview
        } else {
            ClaimStatus::Reject
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClaimStatus::AutoApprove => "Auto-Approve",
            ClaimStatus::ManualReview => "Manual Review",
            ClaimStatus::Reject => "Reject",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decision record for one hazard evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimDecision {
    pub hazard: Hazard,
    pub damage_pct: f64,
    pub severity: Severity,
    pub confidence_score: f64,
    pub confidence_label: ConfidenceLabel,
    pub fused_score: f64,
    pub fused_label: FusedLabel,
    pub claim_status: ClaimStatus,
    pub reason: String,
}

/// Decide a claim. Missing validation counts as zero, `Unknown` confidence.
pub fn decide_claim(result: &HazardResult, validation: Option<&ValidationResult>) -> ClaimDecision {
    let (confidence_score, confidence_label, cross_sensor, coherence) = match validation {
        Some(v) => (
            v.confidence.confidence_score,
            v.confidence.label,
            v.cross_sensor / 100.0,
            v.spatial_coherence / 100.0,
        ),
        None => (0.0, ConfidenceLabel::Unknown, 0.0, 0.0),
    };

    let (fused, fused_label) = fused_score(result.damage_pct, confidence_score, cross_sensor, coherence);
    let claim_status = ClaimStatus::from_score(fused);

    let reason = format!(
        "Satellite imagery indicates {} {} damage (~{:.1}%), while validation confidence is {} ({:.2}). \
         Conditional fusion score {:.2} ({}) balances severity with corroboration, \
         leading to a {} decision.",
        result.severity,
        result.hazard,
        result.damage_pct,
        confidence_label.name().to_lowercase(),
        confidence_score,
        fused,
        fused_label,
        claim_status.name().to_lowercase(),
    );

    info!(
        "{} claim: fused {:.2} ({}), {}",
        result.hazard, fused, fused_label, claim_status
    );

    ClaimDecision {
        hazard: result.hazard,
        damage_pct: result.damage_pct,
        severity: result.severity,
        confidence_score,
        confidence_label,
        fused_score: fused,
        fused_label,
        claim_status,
        reason,
    }
}
