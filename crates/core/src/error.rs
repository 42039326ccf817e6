//! Error types for GeoClaim

use thiserror::Error;

/// Main error type for GeoClaim operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A spectral band role could not be matched against the composite's bands.
    #[error("Could not resolve {role} band: none of {candidates:?} present (bands: {available:?})")]
    UnresolvedBand {
        role: String,
        candidates: Vec<String>,
        available: Vec<String>,
    },

    /// Histogram missing, without buckets, or with zero total count.
    #[error("Empty histogram for band '{band}': {reason}")]
    EmptyHistogram { band: String, reason: String },

    #[error(
        "No usable imagery found for {label} window ({start}..{end}). \
         Try expanding the date range or increasing max_cloud."
    )]
    NoImagery {
        label: String,
        start: String,
        end: String,
    },

    #[error("Unknown image source: {0}")]
    UnknownSource(String),

    #[error("Band '{band}' not available in source '{source_id}'")]
    UnknownBand { source_id: String, band: String },

    #[error("Too many pixels in region: {count} > maxPixels {max}")]
    TooManyPixels { count: u64, max: u64 },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for GeoClaim operations
pub type Result<T> = std::result::Result<T, Error>;
