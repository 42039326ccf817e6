//! Confidence and fusion scoring
//!
//! Constants here decide claim outcomes and must not drift:
//! - confidence = 0.2 × cross-sensor + 0.4 × meteorology + 0.4 × coherence
//! - below a confidence of 0.45 severity is never consulted
//! - corroborated detections (radar ≥ 0.5 and coherence ≥ 0.7) weight
//!   severity 0.6 / confidence 0.4, otherwise 0.4 / 0.6

use serde::Serialize;
use std::fmt;

/// Sub-score weights: cross-sensor, meteorology, spatial coherence
pub const CONFIDENCE_WEIGHTS: [f64; 3] = [0.2, 0.4, 0.4];
/// Confidence below this fuses to zero
pub const CONFIDENCE_GATE: f64 = 0.45;
/// Cross-sensor fraction at which the detection counts as corroborated
pub const CROSS_SENSOR_SWITCH: f64 = 0.5;
/// Coherence fraction at which the detection counts as corroborated
pub const COHERENCE_SWITCH: f64 = 0.7;
/// (severity, confidence) weights for corroborated detections
pub const CORROBORATED_WEIGHTS: (f64, f64) = (0.6, 0.4);
/// (severity, confidence) weights otherwise
pub const DEFAULT_WEIGHTS: (f64, f64) = (0.4, 0.6);
/// Fused score for `High` / Auto-Approve
pub const HIGH_THRESHOLD: f64 = 0.7;
/// Fused score for `Moderate` / Manual Review
pub const MODERATE_THRESHOLD: f64 = 0.4;

/// Round half away from zero to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Qualitative validation confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
    /// Validation could not run
    Unknown,
}

impl ConfidenceLabel {
    pub fn name(&self) -> &'static str {
        match self {
            ConfidenceLabel::Low => "Low",
            ConfidenceLabel::Medium => "Medium",
            ConfidenceLabel::High => "High",
            ConfidenceLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation confidence in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    pub confidence_score: f64,
    pub label: ConfidenceLabel,
}

impl Confidence {
    pub fn unknown() -> Self {
        Self {
            confidence_score: 0.0,
            label: ConfidenceLabel::Unknown,
        }
    }
}

/// Weighted confidence from three 0-100 sub-scores.
///
/// The label is taken from the unrounded score; the reported score is
/// rounded to two decimals.
pub fn confidence_score(cross_sensor: f64, meteorology: f64, coherence: f64) -> Confidence {
    let [w_cross, w_met, w_coh] = CONFIDENCE_WEIGHTS;
    let score = w_cross * (cross_sensor / 100.0)
        + w_met * (meteorology / 100.0)
        + w_coh * (coherence / 100.0);
    let label = if score < 0.4 {
        ConfidenceLabel::Low
    } else if score < 0.7 {
        ConfidenceLabel::Medium
    } else {
        ConfidenceLabel::High
    };
    Confidence {
        confidence_score: round2(score),
        label,
    }
}

/// Qualitative fused score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FusedLabel {
    Low,
    Moderate,
    High,
}

impl FusedLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            FusedLabel::High
        } else if score >= MODERATE_THRESHOLD {
            FusedLabel::Moderate
        } else {
            FusedLabel::Low
        }
    }
}

impl fmt::Display for FusedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FusedLabel::Low => "Low",
            FusedLabel::Moderate => "Moderate",
            FusedLabel::High => "High",
        })
    }
}

/// Fuse damage severity with validation confidence.
///
/// # Arguments
/// * `damage_pct` - Damage percentage, clamped to `[0, 100]`
/// * `confidence` - Confidence score in `[0, 1]`
/// * `cross_sensor` - Cross-sensor sub-score as a fraction
/// * `coherence` - Spatial coherence sub-score as a fraction
///
/// # Returns
/// The fused score rounded to two decimals and its label
pub fn fused_score(
    damage_pct: f64,
    confidence: f64,
    cross_sensor: f64,
    coherence: f64,
) -> (f64, FusedLabel) {
    if confidence < CONFIDENCE_GATE {
        return (0.0, FusedLabel::Low);
    }

    let (w_severity, w_confidence) =
        if cross_sensor >= CROSS_SENSOR_SWITCH && coherence >= COHERENCE_SWITCH {
            CORROBORATED_WEIGHTS
        } else {
            DEFAULT_WEIGHTS
        };

    let severity = (damage_pct / 100.0).clamp(0.0, 1.0);
    let score = round2(w_severity * severity + w_confidence * confidence);
    (score, FusedLabel::from_score(score))
}
