//! `Grid` adapter for [`Raster`]: weighted moving-window sums
//!
//! The window is a correlation: weight `(i, j)` of a `(2h+1)²` matrix
//! multiplies the neighbour at offset `(i - h, j - h)`. Cells beyond the
//! raster edge are treated as missing.

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::error::{Error, Result};
use crate::grid::{CenterPolicy, Grid, MissingNeighbors, NoDataPolicy};
use crate::maybe_rayon::*;
use crate::raster::{Extent, Raster};

/// Non-zero weights of a kernel as (row offset, col offset, weight)
fn taps(weights: ArrayView2<'_, f64>) -> Result<Vec<(isize, isize, f64)>> {
    let (rows, cols) = weights.dim();
    if rows != cols || rows % 2 == 0 {
        return Err(Error::DimensionMismatch { rows, cols });
    }

    let h = (rows / 2) as isize;
    let mut out = Vec::new();
    for ((i, j), &w) in weights.indexed_iter() {
        if !w.is_finite() {
            return Err(Error::invalid(
                "weights",
                w,
                format!("non-finite weight at ({}, {})", i, j),
            ));
        }
        if w != 0.0 {
            out.push((i as isize - h, j as isize - h, w));
        }
    }
    Ok(out)
}

impl Grid for Raster {
    fn resolution(&self) -> f64 {
        self.cell_size()
    }

    fn extent(&self) -> Extent {
        self.bounds()
    }

    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.value_at(row, col)
    }

    fn crop(&self, extent: &Extent) -> Result<Self> {
        self.crop_to(extent)
    }

    fn map_cells<F>(&self, f: F) -> Self
    where
        F: Fn(Option<f64>) -> Option<f64> + Sync,
    {
        let data = self.data().map(|&v| {
            let input = if self.is_missing(v) { None } else { Some(v) };
            f(input).unwrap_or(f64::NAN)
        });

        let mut out = Raster::from_array(data);
        out.set_transform(*self.transform());
        out.set_nodata(Some(f64::NAN));
        out
    }

    fn windowed_reduce(&self, weights: ArrayView2<'_, f64>, policy: NoDataPolicy) -> Result<Self> {
        let taps = taps(weights)?;
        let (rows, cols) = self.shape();
        debug!(
            side = weights.nrows(),
            taps = taps.len(),
            ?policy,
            "windowed reduction over {}x{} grid",
            rows,
            cols
        );

        let output_data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];

                for (col, out) in row_data.iter_mut().enumerate() {
                    let center = self.value_at(row, col);
                    match (policy.centers, center) {
                        (CenterPolicy::OnlyMissing, Some(v)) => {
                            *out = v;
                            continue;
                        }
                        (CenterPolicy::SkipMissing, None) => continue,
                        _ => {}
                    }

                    let mut sum = 0.0;
                    let mut valid = 0usize;
                    for &(dr, dc, w) in &taps {
                        let nr = row as isize + dr;
                        let nc = col as isize + dc;
                        if nr < 0 || nc < 0 {
                            continue;
                        }
                        if let Some(v) = self.value_at(nr as usize, nc as usize) {
                            sum += w * v;
                            valid += 1;
                        }
                    }

                    *out = match policy.neighbors {
                        MissingNeighbors::Exclude if valid == 0 => f64::NAN,
                        _ => sum,
                    };
                }

                row_data
            })
            .collect();

        let data = Array2::from_shape_vec((rows, cols), output_data)
            .map_err(|e| Error::Other(e.to_string()))?;
        self.with_data(data)
    }
}
