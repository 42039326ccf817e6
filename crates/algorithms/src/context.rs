//! Static context layers shared by flood detection and validation

use geoclaim_core::expr::Image;

/// SRTM 1 arc-second digital elevation model
pub const ELEVATION_DATASET: &str = "USGS/SRTMGL1_003";
pub const ELEVATION_BAND: &str = "elevation";

/// JRC Global Surface Water, percentage of time water was observed
pub const WATER_DATASET: &str = "JRC/GSW1_4/GlobalSurfaceWater";
pub const WATER_OCCURRENCE_BAND: &str = "occurrence";

/// Elevation in meters
pub fn elevation() -> Image {
    Image::band(ELEVATION_DATASET, ELEVATION_BAND)
}

/// Historical water occurrence (0-100)
pub fn water_occurrence() -> Image {
    Image::band(WATER_DATASET, WATER_OCCURRENCE_BAND)
}

/// `elevation < max_elevation_m OR occurrence > min_occurrence`
pub fn hydro_context(max_elevation_m: f64, min_occurrence: f64) -> Image {
    elevation()
        .lt(max_elevation_m)
        .or(&water_occurrence().gt(min_occurrence))
}
