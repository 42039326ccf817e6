//! Imagery analysis algorithms
//!
//! Expression builders for remote sensing change detection:
//! - Spectral indices: NDWI, MNDWI, NBR with per-sensor band resolution
//! - Change images: index deltas and the RGB magnitude delta

mod change_detection;
mod indices;

pub use change_detection::{delta, index_delta, rgb_delta, RGB_DELTA};
pub use indices::{
    mndwi, nbr, ndwi, resolve_band, resolve_rgb, spectral_index, BandRole, SpectralIndex,
};
