//! Independent validation of a hazard detection
//!
//! Three 0-100 corroboration scores, each computed on its own:
//! - cross-sensor: Sentinel-1 VV backscatter change around the event
//! - meteorology: event rainfall against the preceding baseline
//! - spatial coherence: overlap of the detected mask with flood-prone terrain
//!
//! A failing check never aborts the others. It yields a
//! [`CheckOutcome::Fallback`] with a zero score and the reason.

use crate::context::hydro_context;
use crate::fusion::{confidence_score, round2, Confidence};
use crate::hazard::Hazard;
use chrono::{Duration, NaiveDate};
use geoclaim_core::backend::{RasterBackend, ReduceParams};
use geoclaim_core::expr::{CollectionQuery, Image, Reducer};
use geoclaim_core::{Aoi, DateWindow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Sentinel-1 ground range detected scenes
pub const RADAR_DATASET: &str = "COPERNICUS/S1_GRD";
pub const RADAR_BAND: &str = "VV";

/// GPM IMERG half-hourly precipitation
pub const PRECIPITATION_DATASET: &str = "NASA/GPM_L3/IMERG_V07";
pub const PRECIPITATION_BAND: &str = "precipitation";

/// Validation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Radar look-back before the pre date and look-ahead after the post date
    pub radar_window_days: i64,
    /// Length of the rainfall event window
    pub event_days: i64,
    /// Length of the rainfall baseline before the event
    pub baseline_days: i64,
    /// Reduction scale for precipitation (m)
    pub precipitation_scale_m: f64,
    /// Coherence context: elevation below this is flood-prone (m)
    pub coherence_max_elevation_m: f64,
    /// Coherence context: water occurrence above this is flood-prone (%)
    pub coherence_min_water_occurrence: f64,
    /// Pixel cap and best-effort flag; the scale is set per check
    pub reduce: ReduceParams,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            radar_window_days: 6,
            event_days: 3,
            baseline_days: 30,
            precipitation_scale_m: 10_000.0,
            coherence_max_elevation_m: 20.0,
            coherence_min_water_occurrence: 50.0,
            reduce: ReduceParams::default(),
        }
    }
}

impl ValidationParams {
    fn reduce_at(&self, scale: f64) -> ReduceParams {
        ReduceParams {
            scale,
            ..self.reduce
        }
    }
}

/// Result of one validation sub-check
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Measured(f64),
    /// The check could not measure anything; `score` stands in
    Fallback { score: f64, reason: String },
}

impl CheckOutcome {
    fn fallback(check: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("{} check fell back to 0: {}", check, reason);
        CheckOutcome::Fallback { score: 0.0, reason }
    }

    /// Run `f`, turning any error into a zero fallback
    fn guard(check: &str, f: impl FnOnce() -> Result<CheckOutcome>) -> Self {
        f().unwrap_or_else(|e| Self::fallback(check, e.to_string()))
    }

    pub fn score(&self) -> f64 {
        match self {
            CheckOutcome::Measured(score) | CheckOutcome::Fallback { score, .. } => *score,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CheckOutcome::Fallback { .. })
    }
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Radar backscatter change between the pre and post dates.
///
/// Pre window `[pre - 6d, pre + 1d)`, post window `[post, post + 6d)`.
/// `score = clamp(|mean(post) - mean(pre)| × 100, 0, 100)`.
pub fn cross_sensor_check(
    backend: &dyn RasterBackend,
    aoi: &Aoi,
    pre_date: NaiveDate,
    post_date: NaiveDate,
    scale: f64,
    params: &ValidationParams,
) -> CheckOutcome {
    CheckOutcome::guard("cross_sensor", || {
        let days = Duration::days(params.radar_window_days);
        let pre_window = DateWindow::new(pre_date - days, pre_date + Duration::days(1))?;
        let post_window = DateWindow::new(post_date, post_date + days)?;
        let radar = |window: DateWindow| {
            CollectionQuery::new(RADAR_DATASET, RADAR_BAND, window)
                .filter_eq("instrumentMode", "IW")
                .filter_eq("orbitProperties_pass", "DESCENDING")
        };
        let (pre_query, post_query) = (radar(pre_window), radar(post_window));

        let pre_count = backend.collection_size(&pre_query, aoi)?;
        let post_count = backend.collection_size(&post_query, aoi)?;
        debug!("radar scenes: {} pre, {} post", pre_count, post_count);
        if pre_count == 0 || post_count == 0 {
            return Ok(CheckOutcome::fallback(
                "cross_sensor",
                format!(
                    "no radar observations ({} pre, {} post)",
                    pre_count, post_count
                ),
            ));
        }

        let delta = Image::collection(post_query, Reducer::Mean)
            .subtract(&Image::collection(pre_query, Reducer::Mean));
        match backend.reduce_region(&delta, Reducer::Mean, aoi, &params.reduce_at(scale))? {
            Some(v) => Ok(CheckOutcome::Measured(clamp_pct(v.abs() * 100.0))),
            None => Ok(CheckOutcome::fallback(
                "cross_sensor",
                "no valid radar pixels in the area of interest",
            )),
        }
    })
}

/// Event rainfall anomaly against the preceding baseline.
///
/// The event sum covers `[start, min(start + 3d, end))` of `post_window`;
/// the baseline is the mean over the `baseline_days` before `start`.
pub fn meteorology_check(
    backend: &dyn RasterBackend,
    aoi: &Aoi,
    post_window: &DateWindow,
    hazard: Hazard,
    params: &ValidationParams,
) -> CheckOutcome {
    CheckOutcome::guard("meteorology", || {
        let start = post_window.start;
        let event_end = (start + Duration::days(params.event_days)).min(post_window.end);
        let event_window = DateWindow::new(start, event_end)?;
        let baseline_window = DateWindow::new(start - Duration::days(params.baseline_days), start)?;
        let reduce = params.reduce_at(params.precipitation_scale_m);

        let event_sum = Image::collection(
            CollectionQuery::new(PRECIPITATION_DATASET, PRECIPITATION_BAND, event_window),
            Reducer::Sum,
        );
        let baseline_mean = Image::collection(
            CollectionQuery::new(PRECIPITATION_DATASET, PRECIPITATION_BAND, baseline_window),
            Reducer::Mean,
        );
        let event = backend
            .reduce_region(&event_sum, Reducer::Mean, aoi, &reduce)?
            .unwrap_or(0.0);
        let base = backend
            .reduce_region(&baseline_mean, Reducer::Mean, aoi, &reduce)?
            .unwrap_or(0.0);
        debug!("precipitation: event {} vs baseline {}", event, base);

        Ok(CheckOutcome::Measured(rainfall_anomaly(event, base, hazard)))
    })
}

/// Score a rainfall anomaly for `hazard`.
///
/// Floods are corroborated by excess rain, wildfires by a deficit; roof
/// damage is neutral.
pub fn rainfall_anomaly(event: f64, base: f64, hazard: Hazard) -> f64 {
    if base <= 0.0 {
        return if hazard == Hazard::Flood && event > 0.0 {
            100.0
        } else {
            0.0
        };
    }
    let ratio = event / base;
    let score = match hazard {
        Hazard::Flood => (ratio - 1.0) * 100.0,
        Hazard::Wildfire => (1.0 - ratio) * 100.0,
        Hazard::Roof => 0.0,
    };
    clamp_pct(score)
}

/// Share of the AOI where the mask overlaps low-lying or historically wet terrain
pub fn spatial_coherence_check(
    backend: &dyn RasterBackend,
    aoi: &Aoi,
    mask: &Image,
    scale: f64,
    params: &ValidationParams,
) -> CheckOutcome {
    CheckOutcome::guard("spatial_coherence", || {
        let context = hydro_context(
            params.coherence_max_elevation_m,
            params.coherence_min_water_occurrence,
        );
        let overlap = context.and(mask).rename("hazard_overlap");
        match backend.reduce_region(&overlap, Reducer::Mean, aoi, &params.reduce_at(scale))? {
            Some(v) => Ok(CheckOutcome::Measured(clamp_pct(v * 100.0))),
            None => Ok(CheckOutcome::fallback(
                "spatial_coherence",
                "no valid pixels in the area of interest",
            )),
        }
    })
}

/// Validation sub-scores and the combined confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub cross_sensor: f64,
    pub meteorology: f64,
    pub spatial_coherence: f64,
    pub confidence: Confidence,
    /// Reasons of checks that fell back
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
}

impl ValidationResult {
    /// All-zero result with `Unknown` confidence
    pub fn unknown() -> Self {
        Self {
            cross_sensor: 0.0,
            meteorology: 0.0,
            spatial_coherence: 0.0,
            confidence: Confidence::unknown(),
            fallbacks: Vec::new(),
        }
    }

    /// Combine three outcomes; sub-scores are reported to two decimals
    pub fn from_outcomes(
        cross_sensor: CheckOutcome,
        meteorology: CheckOutcome,
        spatial_coherence: CheckOutcome,
    ) -> Self {
        let confidence = confidence_score(
            cross_sensor.score(),
            meteorology.score(),
            spatial_coherence.score(),
        );
        let fallbacks = [
            ("cross_sensor", &cross_sensor),
            ("meteorology", &meteorology),
            ("spatial_coherence", &spatial_coherence),
        ]
        .into_iter()
        .filter_map(|(name, outcome)| match outcome {
            CheckOutcome::Fallback { reason, .. } => Some(format!("{}: {}", name, reason)),
            CheckOutcome::Measured(_) => None,
        })
        .collect();

        Self {
            cross_sensor: round2(cross_sensor.score()),
            meteorology: round2(meteorology.score()),
            spatial_coherence: round2(spatial_coherence.score()),
            confidence,
            fallbacks,
        }
    }
}

/// Everything the validation engine needs about one detection
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub aoi: &'a Aoi,
    pub pre_window: &'a DateWindow,
    pub post_window: &'a DateWindow,
    pub hazard: Hazard,
    /// Detected mask; `None` when detection produced none
    pub mask: Option<&'a Image>,
    /// Detection scale (m)
    pub scale: f64,
}

/// Run all three checks and combine them.
///
/// Without a mask no backend call is made and the result is
/// [`ValidationResult::unknown`].
pub fn validate(
    backend: &dyn RasterBackend,
    input: &ValidationInput<'_>,
    params: &ValidationParams,
) -> ValidationResult {
    let Some(mask) = input.mask else {
        warn!("{}: no mask, validation skipped", input.hazard);
        return ValidationResult::unknown();
    };

    let cross = cross_sensor_check(
        backend,
        input.aoi,
        input.pre_window.start,
        input.post_window.start,
        input.scale,
        params,
    );
    let met = meteorology_check(backend, input.aoi, input.post_window, input.hazard, params);
    let coherence = spatial_coherence_check(backend, input.aoi, mask, input.scale, params);

    ValidationResult::from_outcomes(cross, met, coherence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::ConfidenceLabel;
    use approx::assert_relative_eq;

    #[test]
    fn test_rainfall_anomaly() {
        // Double the baseline: +100 % for floods, nothing for fires
        assert_relative_eq!(rainfall_anomaly(20.0, 10.0, Hazard::Flood), 100.0);
        assert_relative_eq!(rainfall_anomaly(15.0, 10.0, Hazard::Flood), 50.0);
        assert_relative_eq!(rainfall_anomaly(20.0, 10.0, Hazard::Wildfire), 0.0);
        assert_relative_eq!(rainfall_anomaly(2.5, 10.0, Hazard::Wildfire), 75.0);
        assert_relative_eq!(rainfall_anomaly(50.0, 10.0, Hazard::Roof), 0.0);
    }

    #[test]
    fn test_rainfall_zero_baseline() {
        assert_eq!(rainfall_anomaly(3.0, 0.0, Hazard::Flood), 100.0);
        assert_eq!(rainfall_anomaly(0.0, 0.0, Hazard::Flood), 0.0);
        assert_eq!(rainfall_anomaly(3.0, 0.0, Hazard::Wildfire), 0.0);
    }

    #[test]
    fn test_outcomes_rounded_but_confidence_unrounded() {
        let result = ValidationResult::from_outcomes(
            CheckOutcome::Measured(12.345),
            CheckOutcome::Fallback {
                score: 0.0,
                reason: "backend offline".into(),
            },
            CheckOutcome::Measured(99.999),
        );
        assert_eq!(result.cross_sensor, 12.35);
        assert_eq!(result.spatial_coherence, 100.0);
        // 0.2 * 0.12345 + 0.4 * 0.99999
        assert_relative_eq!(result.confidence.confidence_score, 0.42);
        assert_eq!(result.confidence.label, ConfidenceLabel::Medium);
        assert_eq!(result.fallbacks, vec!["meteorology: backend offline".to_string()]);
    }

    #[test]
    fn test_unknown() {
        let r = ValidationResult::unknown();
        assert_eq!(r.confidence.label, ConfidenceLabel::Unknown);
        assert_eq!(r.confidence.confidence_score, 0.0);
    }

    #[test]
    fn test_check_outcome_score() {
        assert_eq!(CheckOutcome::Measured(42.0).score(), 42.0);
        let fb = CheckOutcome::guard("test", || {
            Err(geoclaim_core::Error::Backend("down".into()))
        });
        assert!(fb.is_fallback());
        assert_eq!(fb.score(), 0.0);
    }
}
