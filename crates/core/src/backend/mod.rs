//! Raster-compute backend capability
//!
//! The decision pipeline never touches pixels. It builds [`Image`]
//! expressions and asks a backend to materialize them at a small set of
//! points:
//!
//! - composite construction (band-name introspection),
//! - [`RasterBackend::histogram`],
//! - [`RasterBackend::reduce_region`],
//! - [`RasterBackend::collection_size`].
//!
//! Implementations must be deterministic for identical inputs.

mod cache;
mod local;

pub use cache::{CacheParams, CachedBackend};
pub use local::{Acquisition, LocalBackend};

use crate::aoi::Aoi;
use crate::error::{Error, Result};
use crate::expr::{CollectionQuery, Image, Reducer};
use crate::temporal::DateWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of histogram buckets requested for thresholding
pub const MAX_HISTOGRAM_BUCKETS: usize = 256;

/// Optical sensor presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Satellite {
    #[default]
    Sentinel2,
    Landsat8,
    Landsat9,
    Modis,
}

impl Satellite {
    /// Dataset identifier of the surface-reflectance collection
    pub fn dataset(&self) -> &'static str {
        match self {
            Satellite::Sentinel2 => "COPERNICUS/S2_SR_HARMONIZED",
            Satellite::Landsat8 => "LANDSAT/LC08/C02/T1_L2",
            Satellite::Landsat9 => "LANDSAT/LC09/C02/T1_L2",
            Satellite::Modis => "MODIS/061/MOD09GA",
        }
    }

    /// Only Sentinel-2 scenes carry a usable scene-level cloud percentage
    pub fn filters_cloud(&self) -> bool {
        matches!(self, Satellite::Sentinel2)
    }
}

impl FromStr for Satellite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sentinel2" => Ok(Satellite::Sentinel2),
            "landsat8" => Ok(Satellite::Landsat8),
            "landsat9" => Ok(Satellite::Landsat9),
            "modis" => Ok(Satellite::Modis),
            _ => Err(Error::InvalidParameter {
                name: "satellite",
                value: s.to_string(),
                reason: "use sentinel2, landsat8, landsat9 or modis".into(),
            }),
        }
    }
}

/// How a filtered collection is flattened into one composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeReducer {
    /// Per-pixel median of valid observations
    #[default]
    Median,
    /// Most recent valid observation on top
    Mosaic,
}

impl fmt::Display for CompositeReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompositeReducer::Median => "median",
            CompositeReducer::Mosaic => "mosaic",
        })
    }
}

/// Request for a reduced multi-band image over a date window
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub aoi: Aoi,
    pub window: DateWindow,
    pub satellite: Satellite,
    /// Maximum scene cloud percentage (0-100)
    pub max_cloud: f64,
    pub reducer: CompositeReducer,
}

/// Read-only handle to a composite produced by the backend.
///
/// Band names were resolved when the backend built it.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    id: String,
    dataset: String,
    window: DateWindow,
    bands: Vec<String>,
}

impl Composite {
    pub fn new(id: String, dataset: String, window: DateWindow, bands: Vec<String>) -> Self {
        Self {
            id,
            dataset,
            window,
            bands,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    /// Ordered band names
    pub fn band_names(&self) -> &[String] {
        &self.bands
    }

    pub fn has_band(&self, band: &str) -> bool {
        self.bands.iter().any(|b| b == band)
    }

    /// Zero bands means no acquisition survived filtering
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Deferred handle to one band
    pub fn select(&self, band: &str) -> Result<Image> {
        if !self.has_band(band) {
            return Err(Error::UnknownBand {
                source_id: self.id.clone(),
                band: band.to_string(),
            });
        }
        Ok(Image::band(&self.id, band))
    }
}

/// Empirical distribution of a single band over a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value of each bucket, ascending
    pub bucket_means: Vec<f64>,
    pub counts: Vec<u64>,
}

impl HistogramSummary {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Check the summary is usable for thresholding
    pub fn validate(&self, band: &str) -> Result<()> {
        let empty = |reason: &str| Error::EmptyHistogram {
            band: band.to_string(),
            reason: reason.to_string(),
        };
        if self.bucket_means.is_empty() || self.counts.is_empty() {
            return Err(empty("histogram has no buckets"));
        }
        if self.bucket_means.len() != self.counts.len() {
            return Err(empty("bucket means and counts differ in length"));
        }
        if self.total() == 0 {
            return Err(empty("histogram has zero total count"));
        }
        Ok(())
    }
}

/// Region-reduction settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceParams {
    /// Nominal scale in meters per pixel
    pub scale: f64,
    /// Pixel cap for one reduction
    pub max_pixels: u64,
    /// Coarsen instead of failing when the cap is exceeded
    pub best_effort: bool,
}

impl ReduceParams {
    pub fn at_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }
}

impl Default for ReduceParams {
    fn default() -> Self {
        Self {
            scale: 30.0,
            max_pixels: 10_000_000,
            best_effort: true,
        }
    }
}

/// Capability interface of the raster-compute backend.
///
/// Every method is a materialization point; everything else is expression
/// building on [`Image`].
pub trait RasterBackend: Send + Sync {
    /// Build a composite and resolve its band names.
    ///
    /// Returns an empty composite (no bands) when nothing matched the filters.
    fn composite(&self, request: &CompositeRequest) -> Result<Composite>;

    /// Reduce `image` over `region`; `None` when no valid pixel was found.
    fn reduce_region(
        &self,
        image: &Image,
        reducer: Reducer,
        region: &Aoi,
        params: &ReduceParams,
    ) -> Result<Option<f64>>;

    /// Histogram of `image` over `region`; `None` when no valid pixel was found.
    fn histogram(
        &self,
        image: &Image,
        region: &Aoi,
        scale: f64,
        max_buckets: usize,
    ) -> Result<Option<HistogramSummary>>;

    /// Number of collection images matching `query` that overlap `region`.
    fn collection_size(&self, query: &CollectionQuery, region: &Aoi) -> Result<usize>;
}
