//! Exact Euclidean distance transform
//!
//! Separable lower-envelope-of-parabolas algorithm (Felzenszwalb &
//! Huttenlocher, 2012): a column pass followed by a row pass over squared
//! distances, O(rows·cols).
//!
//! Reference:
//! Felzenszwalb, P.F., Huttenlocher, D.P. (2012). Distance Transforms of
//!   Sampled Functions. Theory of Computing 8, 415-428.

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::grid::DistanceTransform;
use crate::maybe_rayon::*;
use crate::raster::Raster;

/// 1D squared distance transform of `f` (infinite entries are not sources).
fn squared_edt_1d(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let sources: Vec<usize> = (0..n).filter(|&q| f[q].is_finite()).collect();
    if sources.is_empty() {
        return vec![f64::INFINITY; n];
    }

    let parabola = |q: usize| f[q] + (q * q) as f64;
    let mut v = vec![0usize; sources.len()];
    let mut z = vec![0.0f64; sources.len() + 1];
    let mut k = 0usize;
    v[0] = sources[0];
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for &q in &sources[1..] {
        let mut s;
        loop {
            let p = v[k];
            s = (parabola(q) - parabola(p)) / (2.0 * (q as f64 - p as f64));
            if s > z[k] {
                break;
            }
            k -= 1;
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    let mut d = vec![0.0; n];
    k = 0;
    for (q, dq) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let delta = q as f64 - v[k] as f64;
        *dq = delta * delta + f[v[k]];
    }
    d
}

impl DistanceTransform for Raster {
    fn distance_to_nearest(&self) -> Result<Self> {
        let (rows, cols) = self.shape();
        let res = self.cell_size();
        if !(res.is_finite() && res > 0.0) {
            return Err(Error::invalid("resolution", res, "cell size must be positive"));
        }

        // Column pass
        let columns: Vec<Vec<f64>> = (0..cols)
            .into_par_iter()
            .map(|col| {
                let f: Vec<f64> = (0..rows)
                    .map(|row| match self.value_at(row, col) {
                        Some(_) => 0.0,
                        None => f64::INFINITY,
                    })
                    .collect();
                squared_edt_1d(&f)
            })
            .collect();

        // Row pass
        let output_data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let f: Vec<f64> = (0..cols).map(|col| columns[col][row]).collect();
                squared_edt_1d(&f)
                    .into_iter()
                    .map(|d2| d2.sqrt() * res)
                    .collect::<Vec<f64>>()
            })
            .collect();

        let data = Array2::from_shape_vec((rows, cols), output_data)
            .map_err(|e| Error::Other(e.to_string()))?;
        self.with_data(data)
    }
}
