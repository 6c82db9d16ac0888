//! Grid capabilities consumed by the ZoI engines
//!
//! The engines never touch a concrete raster library directly. They work
//! through [`Grid`] (cell access, cropping and the windowed weighted sum)
//! and [`DistanceTransform`] (distance to the nearest feature cell). The
//! in-process adapter for [`Raster`](crate::Raster) lives in
//! `raster::focal` and `raster::distance`.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::Extent;

/// Which center cells a windowed reduction computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterPolicy {
    /// Compute every cell
    #[default]
    All,
    /// Compute only cells whose input is missing; other cells keep their input value
    OnlyMissing,
    /// Leave cells whose input is missing as missing
    SkipMissing,
}

/// How missing neighbours enter the weighted sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingNeighbors {
    /// Missing neighbours contribute zero
    #[default]
    Zero,
    /// Missing neighbours are skipped; a footprint with no valid weighted
    /// neighbour yields a missing cell
    Exclude,
}

/// Two-axis no-data policy for windowed reduction.
///
/// The axes are independent: `centers` decides which cells are computed,
/// `neighbors` decides how missing cells inside a footprint are summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoDataPolicy {
    pub centers: CenterPolicy,
    pub neighbors: MissingNeighbors,
}

impl NoDataPolicy {
    pub fn new(centers: CenterPolicy, neighbors: MissingNeighbors) -> Self {
        Self { centers, neighbors }
    }
}

/// Raster capability interface.
///
/// One adapter exists per concrete raster representation; the engines are
/// generic over this trait. Missing cells are reported as `None`.
pub trait Grid: Sized + Send + Sync {
    /// Cell size in map units (square cells)
    fn resolution(&self) -> f64;

    /// Geographic extent of the grid
    fn extent(&self) -> Extent;

    /// Dimensions as (rows, cols)
    fn dims(&self) -> (usize, usize);

    /// Value at (row, col), `None` when missing or out of bounds
    fn cell(&self, row: usize, col: usize) -> Option<f64>;

    /// Sub-grid covering `extent`
    fn crop(&self, extent: &Extent) -> Result<Self>;

    /// New grid of the same geometry with `f` applied to every cell
    fn map_cells<F>(&self, f: F) -> Self
    where
        F: Fn(Option<f64>) -> Option<f64> + Sync;

    /// Sliding-window weighted sum of the grid under `weights`.
    ///
    /// `weights` must be square with odd side; its center cell is aligned
    /// with the cell being computed and `weights[(i, j)]` multiplies the
    /// neighbour at offset `(i - h, j - h)`.
    fn windowed_reduce(&self, weights: ArrayView2<'_, f64>, policy: NoDataPolicy) -> Result<Self>;
}

/// Euclidean distance transform primitive
pub trait DistanceTransform: Grid {
    /// Per-cell distance (map units) to the nearest non-missing cell
    fn distance_to_nearest(&self) -> Result<Self>;
}
