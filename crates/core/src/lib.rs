//! # ZoI Core
//!
//! Core types, traits and grid primitives for zone-of-influence analysis.
//!
//! This crate provides:
//! - `Raster`: georeferenced 2D grid of `f64` cells with a no-data sentinel
//! - `GeoTransform` / `Extent`: georeferencing and cropping windows
//! - `Grid` / `DistanceTransform`: the capabilities the ZoI engines rely on
//! - `NoDataPolicy`: the two-axis missing-data policy of windowed reduction
//! - Algorithm trait for consistent API

pub mod error;
pub mod grid;
pub mod maybe_rayon;
pub mod raster;

pub use error::{Error, Result};
pub use grid::{CenterPolicy, DistanceTransform, Grid, MissingNeighbors, NoDataPolicy};
pub use raster::{Extent, GeoTransform, Raster};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::grid::{CenterPolicy, DistanceTransform, Grid, MissingNeighbors, NoDataPolicy};
    pub use crate::raster::{Extent, GeoTransform, Raster};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in the ZoI crates.
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
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
