//! Spectral water and burn indices
//!
//! Band names differ between Sentinel-2, Landsat 8/9 and MODIS. Each index
//! asks for canonical band roles, which are resolved against the composite's
//! band list by a fixed priority order (first present name wins).

use geoclaim_core::backend::Composite;
use geoclaim_core::expr::Image;
use geoclaim_core::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Canonical spectral band roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandRole {
    Green,
    Nir,
    Swir1,
    Swir2,
}

impl BandRole {
    /// Candidate band names in priority order: Sentinel-2, Landsat 8/9, MODIS
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            BandRole::Green => &["B3", "SR_B3", "sur_refl_b04"],
            BandRole::Nir => &["B8", "SR_B5", "sur_refl_b02"],
            BandRole::Swir1 => &["B11", "SR_B6", "sur_refl_b06"],
            BandRole::Swir2 => &["B12", "SR_B7", "sur_refl_b07"],
        }
    }
}

impl fmt::Display for BandRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BandRole::Green => "green",
            BandRole::Nir => "nir",
            BandRole::Swir1 => "swir1",
            BandRole::Swir2 => "swir2",
        })
    }
}

/// RGB triples in priority order
const RGB_TRIPLES: [[&str; 3]; 3] = [
    ["B4", "B3", "B2"],
    ["SR_B4", "SR_B3", "SR_B2"],
    ["sur_refl_b01", "sur_refl_b04", "sur_refl_b03"],
];

/// Enumeration of supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralIndex {
    /// Normalized Difference Water Index (McFeeters)
    Ndwi,
    /// Modified NDWI (Xu, uses SWIR)
    Mndwi,
    /// Normalized Burn Ratio
    Nbr,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Mndwi => "MNDWI",
            SpectralIndex::Nbr => "NBR",
        }
    }

    /// Band roles `(a, b)` of `(a - b) / (a + b)`
    pub fn roles(&self) -> (BandRole, BandRole) {
        match self {
            SpectralIndex::Ndwi => (BandRole::Green, BandRole::Nir),
            SpectralIndex::Mndwi => (BandRole::Green, BandRole::Swir1),
            SpectralIndex::Nbr => (BandRole::Nir, BandRole::Swir2),
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First candidate of `role` present in the composite
pub fn resolve_band(composite: &Composite, role: BandRole) -> Result<&'static str> {
    role.candidates()
        .iter()
        .copied()
        .find(|name| composite.has_band(name))
        .ok_or_else(|| Error::UnresolvedBand {
            role: role.to_string(),
            candidates: role.candidates().iter().map(|s| s.to_string()).collect(),
            available: composite.band_names().to_vec(),
        })
}

/// First RGB triple fully present in the composite
pub fn resolve_rgb(composite: &Composite) -> Result<[&'static str; 3]> {
    RGB_TRIPLES
        .iter()
        .copied()
        .find(|triple| triple.iter().all(|b| composite.has_band(b)))
        .ok_or_else(|| Error::UnresolvedBand {
            role: "rgb".to_string(),
            candidates: RGB_TRIPLES.iter().map(|t| t.join(",")).collect(),
            available: composite.band_names().to_vec(),
        })
}

/// Normalized difference of two resolved band roles, tagged with the index name.
///
/// Builds the expression only; nothing is evaluated.
pub fn spectral_index(composite: &Composite, index: SpectralIndex) -> Result<Image> {
    let (role_a, role_b) = index.roles();
    let a = composite.select(resolve_band(composite, role_a)?)?;
    let b = composite.select(resolve_band(composite, role_b)?)?;
    Ok(a.normalized_difference(&b).rename(index.name()))
}

/// `NDWI = (Green - NIR) / (Green + NIR)`
pub fn ndwi(composite: &Composite) -> Result<Image> {
    spectral_index(composite, SpectralIndex::Ndwi)
}

/// `MNDWI = (Green - SWIR1) / (Green + SWIR1)`
pub fn mndwi(composite: &Composite) -> Result<Image> {
    spectral_index(composite, SpectralIndex::Mndwi)
}

/// `NBR = (NIR - SWIR2) / (NIR + SWIR2)`
pub fn nbr(composite: &Composite) -> Result<Image> {
    spectral_index(composite, SpectralIndex::Nbr)
}
