//! End-to-end assessments over synthetic scenes on the in-memory backend.
//!
//! The scene is a 10×10 grid of 0.1° cells covering lon/lat 0..1. With 300 m
//! per degree the native resolution is 30 m, so detectors reduce at native
//! resolution and the 10 km rainfall reduction collapses to one block.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use geoclaim_algorithms::context::{ELEVATION_BAND, ELEVATION_DATASET, WATER_DATASET, WATER_OCCURRENCE_BAND};
use geoclaim_algorithms::prelude::*;
use geoclaim_algorithms::validation::{PRECIPITATION_BAND, PRECIPITATION_DATASET, RADAR_BAND, RADAR_DATASET};
use geoclaim_core::backend::{Acquisition, CacheParams, CachedBackend, LocalBackend};
use std::sync::atomic::{AtomicUsize, Ordering};

const SIZE: usize = 10;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn transform() -> GeoTransform {
    GeoTransform::new(0.0, 1.0, 0.1, -0.1)
}

fn flat(value: f64) -> Raster {
    Raster::filled(SIZE, SIZE, value).with_transform(transform())
}

/// `inside` on the first `cols` columns, `outside` elsewhere
fn split(cols: usize, inside: f64, outside: f64) -> Raster {
    let mut r = flat(outside);
    for row in 0..SIZE {
        for col in 0..cols {
            r.set(row, col, inside).unwrap();
        }
    }
    r
}

fn aoi() -> Aoi {
    Aoi::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap()
}

fn optical(date_str: &str, bands: &[(&str, Raster)]) -> Acquisition {
    bands.iter().fold(
        Acquisition::new(Satellite::Sentinel2.dataset(), date(date_str)).with_cloud_pct(5.0),
        |acq, (name, raster)| acq.with_band(*name, raster.clone()),
    )
}

fn radar(date_str: &str, vv: f64) -> Acquisition {
    Acquisition::new(RADAR_DATASET, date(date_str))
        .with_property("instrumentMode", "IW")
        .with_property("orbitProperties_pass", "DESCENDING")
        .with_band(RADAR_BAND, flat(vv))
}

fn rain(date_str: &str, mm: f64) -> Acquisition {
    Acquisition::new(PRECIPITATION_DATASET, date(date_str)).with_band(PRECIPITATION_BAND, flat(mm))
}

fn pre_bands() -> Vec<(&'static str, Raster)> {
    vec![
        ("B2", flat(0.1)),
        ("B3", flat(0.1)),
        ("B4", flat(0.1)),
        ("B8", flat(0.3)),
        ("B11", flat(0.25)),
        ("B12", flat(0.2)),
    ]
}

/// Flood on the 8 western columns: green up, SWIR1 down
fn flooded_bands() -> Vec<(&'static str, Raster)> {
    vec![
        ("B2", flat(0.1)),
        ("B3", split(8, 0.3, 0.1)),
        ("B4", flat(0.1)),
        ("B8", flat(0.3)),
        ("B11", split(8, 0.05, 0.25)),
        ("B12", flat(0.2)),
    ]
}

/// Context layers, radar and rainfall shared by every scene
fn context(backend: LocalBackend) -> LocalBackend {
    backend
        .with_meters_per_unit(300.0)
        .with_layer(ELEVATION_DATASET, ELEVATION_BAND, flat(10.0))
        .with_layer(WATER_DATASET, WATER_OCCURRENCE_BAND, flat(0.0))
        .with_acquisition(radar("2023-12-30", -0.1))
        .with_acquisition(radar("2024-02-03", -0.8))
        .with_acquisition(rain("2024-01-10", 2.0))
        .with_acquisition(rain("2024-01-20", 2.0))
        .with_acquisition(rain("2024-02-01", 5.0))
        .with_acquisition(rain("2024-02-02", 5.0))
}

fn flood_scene() -> LocalBackend {
    context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &pre_bands()))
        .with_acquisition(optical("2024-02-05", &flooded_bands()))
}

fn request(hazard: Option<Hazard>) -> AssessmentRequest {
    AssessmentRequest {
        aoi: aoi(),
        pre: DateWindow::parse("2024-01-01", "2024-01-15").unwrap(),
        post: DateWindow::parse("2024-02-01", "2024-02-15").unwrap(),
        hazard,
        scale: None,
    }
}

#[test]
fn flood_scene_auto_approves_flood() {
    let backend = flood_scene();
    let orchestrator = Orchestrator::new(&backend, AssessmentParams::default());
    let assessment = orchestrator.assess(&request(None)).unwrap();

    let best = &assessment.best;
    assert_eq!(best.claim.hazard, Hazard::Flood);
    assert_relative_eq!(best.hazard.damage_pct, 80.0, epsilon = 1e-9);
    assert_eq!(best.hazard.severity, Severity::Severe);

    // |(-0.8) - (-0.1)| × 100, rain 10 mm vs 2 mm baseline, 80 % overlap
    assert_relative_eq!(best.validation.cross_sensor, 70.0);
    assert_relative_eq!(best.validation.meteorology, 100.0);
    assert_relative_eq!(best.validation.spatial_coherence, 80.0);
    assert_relative_eq!(best.validation.confidence.confidence_score, 0.86);
    assert_eq!(best.validation.confidence.label, ConfidenceLabel::High);
    assert!(best.validation.fallbacks.is_empty());

    // Corroborated weights: 0.6 × 0.8 + 0.4 × 0.86
    assert_relative_eq!(best.claim.fused_score, 0.82);
    assert_eq!(best.claim.fused_label, FusedLabel::High);
    assert_eq!(best.claim.claim_status, ClaimStatus::AutoApprove);

    let order: Vec<Hazard> = assessment.ranked.iter().map(|r| r.hazard).collect();
    assert_eq!(order, vec![Hazard::Flood, Hazard::Wildfire, Hazard::Roof]);
    assert!(assessment.excluded.is_empty());
}

#[test]
fn unaffected_hazards_are_rejected() {
    let backend = flood_scene();
    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(None))
        .unwrap();

    for evaluation in &assessment.evaluations[1..] {
        assert_eq!(evaluation.hazard.damage_pct, 0.0);
        assert_eq!(evaluation.hazard.severity, Severity::None);
        // Radar alone: 0.2 × 0.7
        assert_relative_eq!(evaluation.validation.confidence.confidence_score, 0.14);
        assert_eq!(evaluation.claim.fused_score, 0.0);
        assert_eq!(evaluation.claim.claim_status, ClaimStatus::Reject);
    }
}

#[test]
fn specific_hazard_runs_alone() {
    let backend = flood_scene();
    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Wildfire)))
        .unwrap();
    assert_eq!(assessment.evaluations.len(), 1);
    assert_eq!(assessment.ranked.len(), 1);
    assert_eq!(assessment.best.claim.hazard, Hazard::Wildfire);
}

#[test]
fn terrain_and_water_context_limit_flood_extent() {
    // Western half is low ground; the rest sits at 100 m with no history of water
    let backend = flood_scene().with_layer(ELEVATION_DATASET, ELEVATION_BAND, split(5, 10.0, 100.0));
    let flood = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Flood)))
        .unwrap()
        .best;
    assert_relative_eq!(flood.hazard.damage_pct, 50.0, epsilon = 1e-9);
    assert_eq!(flood.hazard.severity, Severity::Severe);

    // Frequent surface water re-admits high cells in columns 5 and 6
    let backend = backend.with_layer(WATER_DATASET, WATER_OCCURRENCE_BAND, split(7, 50.0, 0.0));
    let flood = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Flood)))
        .unwrap()
        .best;
    assert_relative_eq!(flood.hazard.damage_pct, 70.0, epsilon = 1e-9);
}

#[test]
fn burn_scar_is_detected_as_wildfire() {
    // NBR rises from 0.2 to 2/3 on the 6 western columns: dNBR ≈ 0.47
    let burned: Vec<(&'static str, Raster)> = pre_bands()
        .into_iter()
        .map(|(name, raster)| match name {
            "B8" => (name, split(6, 0.5, 0.3)),
            "B12" => (name, split(6, 0.1, 0.2)),
            _ => (name, raster),
        })
        .collect();
    let backend = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &pre_bands()))
        .with_acquisition(optical("2024-02-05", &burned));

    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(None))
        .unwrap();
    let wildfire = &assessment.best;
    assert_eq!(wildfire.claim.hazard, Hazard::Wildfire);
    assert_relative_eq!(wildfire.hazard.damage_pct, 60.0, epsilon = 1e-9);
    assert_eq!(wildfire.hazard.severity, Severity::High);

    // A stricter threshold than the burn leaves nothing
    let mut params = AssessmentParams::default();
    params.hazards.wildfire.dnbr_threshold = 0.5;
    let strict = Orchestrator::new(&backend, params)
        .assess(&request(Some(Hazard::Wildfire)))
        .unwrap();
    assert_eq!(strict.best.hazard.damage_pct, 0.0);
}

#[test]
fn visible_change_is_detected_as_roof_damage() {
    // Mean absolute RGB change of 0.5 on the 4 western columns
    let changed: Vec<(&'static str, Raster)> = pre_bands()
        .into_iter()
        .map(|(name, raster)| match name {
            "B2" | "B3" | "B4" => (name, split(4, 0.6, 0.1)),
            _ => (name, raster),
        })
        .collect();
    let backend = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &pre_bands()))
        .with_acquisition(optical("2024-02-05", &changed));

    let roof = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Roof)))
        .unwrap()
        .best;
    assert_relative_eq!(roof.hazard.damage_pct, 40.0, epsilon = 1e-9);
    assert_eq!(roof.hazard.severity, Severity::Moderate);

    // The whole scene is low ground, so every changed cell overlaps the context
    assert_relative_eq!(roof.validation.spatial_coherence, 40.0, epsilon = 1e-9);
}

/// Counts materializations reaching the wrapped backend
struct Counting<'a> {
    inner: &'a LocalBackend,
    materialized: AtomicUsize,
}

impl RasterBackend for Counting<'_> {
    fn composite(&self, request: &CompositeRequest) -> Result<Composite> {
        self.inner.composite(request)
    }

    fn reduce_region(
        &self,
        image: &Image,
        reducer: Reducer,
        region: &Aoi,
        params: &ReduceParams,
    ) -> Result<Option<f64>> {
        self.materialized.fetch_add(1, Ordering::SeqCst);
        self.inner.reduce_region(image, reducer, region, params)
    }

    fn histogram(
        &self,
        image: &Image,
        region: &Aoi,
        scale: f64,
        max_buckets: usize,
    ) -> Result<Option<HistogramSummary>> {
        self.materialized.fetch_add(1, Ordering::SeqCst);
        self.inner.histogram(image, region, scale, max_buckets)
    }

    fn collection_size(&self, query: &CollectionQuery, region: &Aoi) -> Result<usize> {
        self.materialized.fetch_add(1, Ordering::SeqCst);
        self.inner.collection_size(query, region)
    }
}

#[test]
fn missing_post_imagery_fails_before_detection() {
    let local = context(LocalBackend::new()).with_acquisition(optical("2024-01-05", &pre_bands()));
    let backend = Counting {
        inner: &local,
        materialized: AtomicUsize::new(0),
    };

    let err = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(None))
        .unwrap_err();

    assert!(matches!(err, Error::NoImagery { .. }));
    assert_eq!(
        err.to_string(),
        "No usable imagery found for post-event window (2024-02-01..2024-02-15). \
         Try expanding the date range or increasing max_cloud."
    );
    assert_eq!(backend.materialized.load(Ordering::SeqCst), 0);
}

#[test]
fn cloudy_scenes_count_as_missing_imagery() {
    let local = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &pre_bands()).with_cloud_pct(80.0));
    let err = Orchestrator::new(&local, AssessmentParams::default())
        .assess(&request(Some(Hazard::Flood)))
        .unwrap_err();
    assert!(err.to_string().contains("pre-event window (2024-01-01..2024-01-15)"));
}

#[test]
fn missing_band_excludes_hazard_from_ranking() {
    let without_swir2 = |bands: Vec<(&'static str, Raster)>| {
        bands.into_iter().filter(|(n, _)| *n != "B12").collect::<Vec<_>>()
    };
    let backend = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &without_swir2(pre_bands())))
        .with_acquisition(optical("2024-02-05", &without_swir2(flooded_bands())));

    let orchestrator = Orchestrator::new(&backend, AssessmentParams::default());
    let assessment = orchestrator.assess(&request(None)).unwrap();
    assert_eq!(assessment.evaluations.len(), 2);
    assert_eq!(assessment.excluded.len(), 1);
    assert_eq!(assessment.excluded[0].hazard, Hazard::Wildfire);
    assert!(assessment.excluded[0].error.contains("swir2"));
    assert_eq!(assessment.best.claim.hazard, Hazard::Flood);

    // Asking for the broken hazard directly surfaces the error
    let err = orchestrator.assess(&request(Some(Hazard::Wildfire))).unwrap_err();
    assert!(matches!(err, Error::UnresolvedBand { .. }));
}

#[test]
fn all_hazards_failing_is_an_error() {
    let nir_only = vec![("B8", flat(0.3))];
    let backend = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &nir_only))
        .with_acquisition(optical("2024-02-05", &nir_only));
    let err = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(None))
        .unwrap_err();
    assert!(err.to_string().starts_with("no hazard could be evaluated"));
}

#[test]
fn masked_delta_falls_back_to_no_damage() {
    // Post scene fully masked in green and SWIR1: ΔMNDWI has no valid pixel
    let mut post = pre_bands();
    for (name, raster) in post.iter_mut() {
        if *name == "B3" || *name == "B11" {
            *raster = flat(f64::NAN);
        }
    }
    let backend = context(LocalBackend::new())
        .with_acquisition(optical("2024-01-05", &pre_bands()))
        .with_acquisition(optical("2024-02-05", &post));

    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Flood)))
        .unwrap();
    let flood = &assessment.best;
    assert_eq!(flood.hazard.damage_pct, 0.0);
    assert_eq!(flood.hazard.severity, Severity::None);
    assert_eq!(flood.validation.confidence.label, ConfidenceLabel::Unknown);
    assert_eq!(flood.claim.claim_status, ClaimStatus::Reject);
}

/// Radar service that is down
struct RadarOffline<'a>(&'a LocalBackend);

impl RasterBackend for RadarOffline<'_> {
    fn composite(&self, request: &CompositeRequest) -> Result<Composite> {
        self.0.composite(request)
    }

    fn reduce_region(
        &self,
        image: &Image,
        reducer: Reducer,
        region: &Aoi,
        params: &ReduceParams,
    ) -> Result<Option<f64>> {
        self.0.reduce_region(image, reducer, region, params)
    }

    fn histogram(
        &self,
        image: &Image,
        region: &Aoi,
        scale: f64,
        max_buckets: usize,
    ) -> Result<Option<HistogramSummary>> {
        self.0.histogram(image, region, scale, max_buckets)
    }

    fn collection_size(&self, _query: &CollectionQuery, _region: &Aoi) -> Result<usize> {
        Err(Error::Backend("radar offline".into()))
    }
}

#[test]
fn failing_subcheck_degrades_to_fallback() {
    let local = flood_scene();
    let backend = RadarOffline(&local);
    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(Some(Hazard::Flood)))
        .unwrap();
    let v = &assessment.best.validation;

    assert_eq!(v.cross_sensor, 0.0);
    assert_relative_eq!(v.meteorology, 100.0);
    assert_relative_eq!(v.spatial_coherence, 80.0);
    assert_eq!(v.fallbacks.len(), 1);
    assert!(v.fallbacks[0].starts_with("cross_sensor"));
    // 0.4 × 1.0 + 0.4 × 0.8
    assert_relative_eq!(v.confidence.confidence_score, 0.72);
    // Radar below 0.5: severity 0.4, confidence 0.6 → 0.32 + 0.432
    assert_relative_eq!(assessment.best.claim.fused_score, 0.75);
}

#[test]
fn cache_wrapper_gives_identical_results() {
    let plain = flood_scene();
    let direct = Orchestrator::new(&plain, AssessmentParams::default())
        .assess(&request(None))
        .unwrap();

    let cached = CachedBackend::new(flood_scene(), CacheParams::default());
    let orchestrator = Orchestrator::new(&cached, AssessmentParams::default());
    let first = orchestrator.assess(&request(None)).unwrap();
    let entries = cached.len();
    let second = orchestrator.assess(&request(None)).unwrap();

    assert_eq!(direct, first);
    assert_eq!(first, second);
    assert_eq!(cached.len(), entries);
}

#[test]
fn assessment_serializes_with_contract_labels() {
    let backend = flood_scene();
    let assessment = Orchestrator::new(&backend, AssessmentParams::default())
        .assess(&request(None))
        .unwrap();
    let json = serde_json::to_value(&assessment).unwrap();

    assert_eq!(json["best"]["claim"]["claim_status"], "Auto-Approve");
    assert_eq!(json["best"]["claim"]["hazard"], "flood");
    assert_eq!(json["best"]["hazard"]["severity"], "severe");
    assert_eq!(json["ranked"][1]["confidence_label"], "Low");
    assert!(json.get("excluded").is_none());
}
