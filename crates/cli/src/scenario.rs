//! TOML scenario files
//!
//! A scenario names the area, both date windows, optional parameter
//! overrides, and the local GeoTIFF acquisitions and static layers the
//! in-memory backend serves. Relative paths resolve against the scenario's
//! own directory.
//!
//! ```toml
//! meters_per_unit = 111320.0
//!
//! [aoi]
//! bbox = [-0.1, 51.4, 0.1, 51.6]
//!
//! [pre]
//! start = "2024-01-01"
//! end = "2024-01-15"
//!
//! [post]
//! start = "2024-02-01"
//! end = "2024-02-15"
//!
//! [params.hazards.wildfire]
//! dnbr_threshold = 0.3
//!
//! [[acquisitions]]
//! dataset = "COPERNICUS/S2_SR_HARMONIZED"
//! date = "2024-01-05"
//! cloud_pct = 4.0
//! bands = { B3 = "pre/B3.tif", B11 = "pre/B11.tif" }
//!
//! [[layers]]
//! dataset = "USGS/SRTMGL1_003"
//! band = "elevation"
//! path = "dem.tif"
//! ```

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use geoclaim_algorithms::orchestrator::AssessmentParams;
use geoclaim_core::backend::{Acquisition, CacheParams, LocalBackend};
use geoclaim_core::io::read_geotiff;
use geoclaim_core::{Aoi, DateWindow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Degrees to meters at the equator
const DEFAULT_METERS_PER_UNIT: f64 = 111_320.0;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub aoi: AoiConfig,
    pub pre: WindowConfig,
    pub post: WindowConfig,
    #[serde(default)]
    pub params: AssessmentParams,
    #[serde(default)]
    pub cache: CacheParams,
    /// Ground size of one CRS unit, for scale handling
    #[serde(default = "default_meters_per_unit")]
    pub meters_per_unit: f64,
    #[serde(default)]
    pub acquisitions: Vec<AcquisitionConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

fn default_meters_per_unit() -> f64 {
    DEFAULT_METERS_PER_UNIT
}

/// Either a bounding box or a polygon ring
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AoiConfig {
    pub bbox: Option<[f64; 4]>,
    pub ring: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionConfig {
    pub dataset: String,
    pub date: String,
    pub cloud_pct: Option<f64>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Band name to GeoTIFF path
    pub bands: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub dataset: String,
    pub band: String,
    pub path: PathBuf,
}

impl Scenario {
    /// Read and parse a scenario file
    pub fn load(path: &Path) -> Result<(Self, PathBuf)> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let scenario: Scenario = toml::from_str(&text)
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok((scenario, base))
    }

    pub fn aoi(&self) -> Result<Aoi> {
        match (&self.aoi.bbox, &self.aoi.ring) {
            (Some(bbox), None) => Ok(Aoi::from_bbox(*bbox)?),
            (None, Some(ring)) => {
                let ring: Vec<(f64, f64)> = ring.iter().map(|[x, y]| (*x, *y)).collect();
                Ok(Aoi::from_ring(&ring)?)
            }
            _ => bail!("[aoi] needs exactly one of `bbox` or `ring`"),
        }
    }

    pub fn windows(&self) -> Result<(DateWindow, DateWindow)> {
        let pre = DateWindow::parse(&self.pre.start, &self.pre.end).context("Invalid [pre] window")?;
        let post =
            DateWindow::parse(&self.post.start, &self.post.end).context("Invalid [post] window")?;
        Ok((pre, post))
    }

    /// Load every referenced raster into an in-memory backend
    pub fn backend(&self, base: &Path) -> Result<LocalBackend> {
        let mut backend = LocalBackend::new().with_meters_per_unit(self.meters_per_unit);

        for entry in &self.acquisitions {
            let date = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d")
                .with_context(|| format!("Invalid acquisition date '{}'", entry.date))?;
            let mut acquisition = Acquisition::new(entry.dataset.as_str(), date);
            if let Some(pct) = entry.cloud_pct {
                acquisition = acquisition.with_cloud_pct(pct);
            }
            for (key, value) in &entry.properties {
                acquisition = acquisition.with_property(key.as_str(), value.as_str());
            }
            for (band, path) in &entry.bands {
                acquisition = acquisition.with_band(band.as_str(), read_raster(base, path)?);
            }
            debug!(
                "acquisition {} {} with {} bands",
                entry.dataset,
                entry.date,
                entry.bands.len()
            );
            backend = backend.with_acquisition(acquisition);
        }

        for layer in &self.layers {
            backend = backend.with_layer(
                layer.dataset.as_str(),
                layer.band.as_str(),
                read_raster(base, &layer.path)?,
            );
        }
        Ok(backend)
    }
}

fn read_raster(base: &Path, path: &Path) -> Result<geoclaim_core::Raster> {
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    read_geotiff(&full).with_context(|| format!("Failed to read raster {}", full.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoclaim_core::backend::Satellite;

    const SCENARIO: &str = r#"
        [aoi]
        bbox = [0.0, 0.0, 1.0, 1.0]

        [pre]
        start = "2024-01-01"
        end = "2024-01-15"

        [post]
        start = "2024-02-01"
        end = "2024-02-15"

        [params.imagery]
        satellite = "landsat9"

        [cache]
        capacity = 16

        [[acquisitions]]
        dataset = "COPERNICUS/S1_GRD"
        date = "2024-02-03"
        properties = { instrumentMode = "IW" }
        bands = { VV = "s1/vv.tif" }
    "#;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.params.imagery.satellite, Satellite::Landsat9);
        assert_eq!(scenario.params.imagery.max_cloud, 30.0);
        assert_eq!(scenario.cache.capacity, 16);
        assert_eq!(scenario.meters_per_unit, DEFAULT_METERS_PER_UNIT);
        assert_eq!(scenario.acquisitions[0].properties["instrumentMode"], "IW");
        assert!(scenario.aoi().is_ok());

        let (pre, post) = scenario.windows().unwrap();
        assert!(pre.end <= post.start);
    }

    #[test]
    fn test_aoi_needs_one_shape() {
        let mut scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        scenario.aoi.ring = Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(scenario.aoi().is_err());
        scenario.aoi.bbox = None;
        assert!(scenario.aoi().is_ok());
    }

    #[test]
    fn test_missing_raster_is_reported() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        let err = scenario.backend(Path::new("/nonexistent")).unwrap_err();
        assert!(format!("{:#}", err).contains("vv.tif"));
    }
}
