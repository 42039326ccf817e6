//! # GeoClaim Core
//!
//! Core types, traits and I/O for the GeoClaim hazard-assessment pipeline.
//!
//! This crate provides:
//! - `Raster`: georeferenced `f64` grid with NaN masking
//! - `Aoi` and `DateWindow`: the region and time span under assessment
//! - `Image`: deferred band-algebra expressions
//! - `RasterBackend`: the materialization capability, with an in-memory
//!   implementation and an LRU-caching wrapper
//! - Algorithm traits for a consistent API

pub mod aoi;
pub mod backend;
pub mod error;
pub mod expr;
pub mod io;
pub mod raster;
pub mod temporal;

pub use aoi::Aoi;
pub use error::{Error, Result};
pub use expr::Image;
pub use raster::{GeoTransform, Raster};
pub use temporal::DateWindow;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aoi::Aoi;
    pub use crate::backend::{
        Composite, CompositeReducer, CompositeRequest, HistogramSummary, RasterBackend,
        ReduceParams, Satellite,
    };
    pub use crate::error::{Error, Result};
    pub use crate::expr::{CollectionQuery, Image, Reducer};
    pub use crate::raster::{GeoTransform, Raster};
    pub use crate::temporal::DateWindow;
    pub use crate::Algorithm;
}

/// Core trait for pipeline algorithms.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
