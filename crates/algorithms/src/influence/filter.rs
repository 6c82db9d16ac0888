//! Discrete weight matrices (filters) approximating decay shapes
//!
//! A filter is a square, odd-sided matrix centred on the cell being
//! computed. Cell `(i, j)` holds the decay evaluated at the Euclidean
//! distance `res * sqrt((i - h)² + (j - h)²)` from the centre.
//!
//! ## Half-width
//!
//! - Vanishing shapes: `ceil(radius / res)` cells.
//! - Exponential / Gaussian: the smallest `h` with `φ(h * res) <= min_intensity`,
//!   capped at `floor(max_distance / res)`.
//!
//! ## Normalization
//!
//! - [`OutputMode::CumulativeZoi`]: divided by the centre value (centre = 1).
//! - [`OutputMode::Density`]: divided by the sum of all cells (sum = 1).
//!
//! Filters can be exported in the GRASS GIS `r.mfilter` text format.

use std::fmt::Write as _;
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zoi_core::{Error, Result};

use super::decay::{Decay, DecayParameters, DecayShape};

/// How the windowed sum is scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Filter centre equals 1: sum of decayed influence of all features
    #[default]
    CumulativeZoi,
    /// Filter sums to 1: weighted density of features
    Density,
}

impl OutputMode {
    /// Prefix used in layer names
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputMode::CumulativeZoi => "zoi_cumulative",
            OutputMode::Density => "density",
        }
    }
}

/// Truncation limits for non-vanishing shapes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterLimits {
    /// Hard cap on the filter half-width, in map units
    pub max_distance: f64,
    /// Influence below which the filter is truncated
    pub min_intensity: f64,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            max_distance: 50_000.0,
            min_intensity: 0.01,
        }
    }
}

impl FilterLimits {
    fn validate(&self) -> Result<()> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(Error::invalid("max_distance", self.max_distance, "must be a positive finite number"));
        }
        if !(self.min_intensity.is_finite() && self.min_intensity > 0.0) {
            return Err(Error::invalid("min_intensity", self.min_intensity, "must be a positive finite number"));
        }
        Ok(())
    }
}

/// Normalized, immutable filter matrix
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    weights: Array2<f64>,
    shape: DecayShape,
    radius: Option<f64>,
    rate: Option<f64>,
    resolution: f64,
    mode: OutputMode,
}

impl WeightMatrix {
    /// Cells between the centre and the edge
    pub fn half_width(&self) -> usize {
        self.weights.nrows() / 2
    }

    /// Side length (always odd)
    pub fn side(&self) -> usize {
        self.weights.nrows()
    }

    pub fn center(&self) -> f64 {
        let h = self.half_width();
        self.weights[(h, h)]
    }

    /// Sum of all finite cells
    pub fn sum(&self) -> f64 {
        self.weights.iter().filter(|v| v.is_finite()).sum()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn shape(&self) -> DecayShape {
        self.shape
    }

    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    /// Decay rate of exponential / Gaussian filters centred on the feature
    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Render in the `r.mfilter` text format.
    ///
    /// Values use the shortest representation that parses back to the
    /// same `f64`, so a round trip through [`parse_mfilter`] is exact.
    pub fn to_mfilter_text(&self, title: &str) -> String {
        let n = self.side();
        let mut out = String::with_capacity(n * n * 12 + 64);
        let _ = writeln!(out, "TITLE {}", title);
        let _ = writeln!(out, "MATRIX {}", n);
        for row in self.weights.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{}", v)).collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        let _ = writeln!(out, "DIVISOR 1");
        let _ = writeln!(out, "TYPE P");
        out
    }

    /// Write the `r.mfilter` text form to `path`
    pub fn write_mfilter<P: AsRef<Path>>(&self, path: P, title: &str) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_mfilter_text(title))?;
        debug!(path = %path.as_ref().display(), side = self.side(), "wrote filter file");
        Ok(())
    }
}

/// Parsed `r.mfilter` filter file
#[derive(Debug, Clone, PartialEq)]
pub struct MFilterText {
    pub title: Option<String>,
    pub weights: Array2<f64>,
    pub divisor: f64,
}

/// Parse the `r.mfilter` text format.
///
/// Only the first MATRIX block is read; `TYPE` is ignored.
pub fn parse_mfilter(text: &str) -> Result<MFilterText> {
    let mut title = None;
    let mut divisor = 1.0;
    let mut weights: Option<Array2<f64>> = None;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let bad = |reason: String| Error::invalid("filter_text", "r.mfilter", reason);

    while let Some(line) = lines.next() {
        let (key, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match key.to_ascii_uppercase().as_str() {
            "TITLE" => title = Some(rest.trim().to_string()),
            "DIVISOR" => {
                divisor = rest
                    .trim()
                    .parse()
                    .map_err(|_| bad(format!("invalid DIVISOR '{}'", rest.trim())))?;
            }
            "TYPE" => {}
            "MATRIX" if weights.is_none() => {
                let n: usize = rest
                    .trim()
                    .parse()
                    .map_err(|_| bad(format!("invalid MATRIX size '{}'", rest.trim())))?;
                let mut data = Vec::with_capacity(n * n);
                for r in 0..n {
                    let row = lines
                        .next()
                        .ok_or_else(|| bad(format!("expected {} matrix rows, found {}", n, r)))?;
                    let values = row
                        .split_whitespace()
                        .map(|v| v.parse::<f64>())
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| bad(format!("row {}: {}", r, e)))?;
                    if values.len() != n {
                        return Err(Error::DimensionMismatch { rows: n, cols: values.len() });
                    }
                    data.extend(values);
                }
                weights = Some(
                    Array2::from_shape_vec((n, n), data).map_err(|e| Error::Other(e.to_string()))?,
                );
            }
            "MATRIX" => {}
            other => return Err(bad(format!("unexpected keyword '{}'", other))),
        }
    }

    let weights = weights.ok_or_else(|| bad("missing MATRIX block".to_string()))?;
    Ok(MFilterText { title, weights, divisor })
}

/// Largest half-width a filter may have, in cells
pub const MAX_HALF_WIDTH: usize = 2048;

fn cells(h: f64, resolution: f64) -> Result<usize> {
    if h <= MAX_HALF_WIDTH as f64 {
        Ok(h as usize)
    } else {
        Err(Error::invalid(
            "radius",
            h * resolution,
            format!(
                "filter would span {} cells from its centre at resolution {}; the limit is {}",
                h, resolution, MAX_HALF_WIDTH
            ),
        ))
    }
}

/// Filter half-width in cells for `decay` at `resolution`.
///
/// Fails when the half-width exceeds [`MAX_HALF_WIDTH`].
pub fn half_width(resolution: f64, decay: &Decay, limits: &FilterLimits) -> Result<usize> {
    check_resolution(resolution)?;
    limits.validate()?;

    if decay.shape().is_vanishing() {
        let radius = decay.radius().unwrap_or(0.0);
        return cells((radius / resolution - 1e-9).ceil().max(0.0), resolution);
    }

    let cutoff = decay.cutoff_distance(limits.min_intensity);
    let natural = (cutoff / resolution - 1e-9).ceil().max(0.0);
    let cap = (limits.max_distance / resolution).floor();
    if natural > cap {
        warn!(
            shape = %decay.shape(),
            natural_distance = cutoff,
            max_distance = limits.max_distance,
            "filter truncated at max_distance; influence at the edge exceeds min_intensity"
        );
        return cells(cap, resolution);
    }
    cells(natural, resolution)
}

fn check_resolution(resolution: f64) -> Result<()> {
    if resolution.is_finite() && resolution > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid("resolution", resolution, "grid resolution must be positive"))
    }
}

fn normalize(weights: &mut Array2<f64>, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::CumulativeZoi => {
            let h = weights.nrows() / 2;
            let center = weights[(h, h)];
            if !(center.is_finite() && center > 0.0) {
                return Err(Error::invalid(
                    "filter",
                    center,
                    "cumulative ZoI needs a positive filter centre",
                ));
            }
            if center != 1.0 {
                weights.mapv_inplace(|v| v / center);
            }
        }
        OutputMode::Density => {
            let total: f64 = weights.iter().filter(|v| v.is_finite()).sum();
            if !(total.is_finite() && total > 0.0) {
                return Err(Error::invalid("filter", total, "density needs a positive filter sum"));
            }
            weights.mapv_inplace(|v| v / total);
        }
    }
    Ok(())
}

/// Build the filter for `shape` at `resolution`.
///
/// `params.radius` is the radius of this filter; batches over several
/// radii call this once per radius (see [`build_filters`]).
pub fn build_filter(
    resolution: f64,
    shape: DecayShape,
    params: &DecayParameters,
    mode: OutputMode,
    limits: &FilterLimits,
) -> Result<WeightMatrix> {
    let decay = Decay::new(shape, params)?;
    let h = half_width(resolution, &decay, limits)?;
    let side = 2 * h + 1;
    let hf = h as f64;

    let mut weights = if shape == DecayShape::Rectangular {
        Array2::from_elem((side, side), decay.amplitude())
    } else {
        Array2::from_shape_fn((side, side), |(i, j)| {
            let di = i as f64 - hf;
            let dj = j as f64 - hf;
            decay.value(resolution * (di * di + dj * dj).sqrt())
        })
    };
    normalize(&mut weights, mode)?;

    debug!(%shape, radius = ?params.radius, resolution, side, ?mode, "built filter");

    Ok(WeightMatrix {
        weights,
        shape,
        radius: params.radius,
        rate: decay.rate().filter(|_| decay.origin() == 0.0),
        resolution,
        mode,
    })
}

/// One filter per radius, in the given order.
///
/// An empty `radii` builds a single filter from `params` as is.
pub fn build_filters(
    resolution: f64,
    shape: DecayShape,
    params: &DecayParameters,
    radii: &[f64],
    mode: OutputMode,
    limits: &FilterLimits,
) -> Result<Vec<WeightMatrix>> {
    if radii.is_empty() {
        return Ok(vec![build_filter(resolution, shape, params, mode, limits)?]);
    }
    radii
        .iter()
        .map(|&r| {
            let p = DecayParameters {
                radius: Some(r),
                ..params.clone()
            };
            build_filter(resolution, shape, &p, mode, limits)
        })
        .collect()
}

/// Wrap a caller-supplied matrix as a filter.
///
/// The matrix must be square with odd side and hold finite, non-negative
/// weights; it is normalized like the built-in shapes.
pub fn custom_filter(matrix: Array2<f64>, resolution: f64, mode: OutputMode) -> Result<WeightMatrix> {
    check_resolution(resolution)?;
    let (rows, cols) = matrix.dim();
    if rows != cols || rows % 2 == 0 {
        return Err(Error::DimensionMismatch { rows, cols });
    }
    if let Some(bad) = matrix.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(Error::invalid("user_filter", bad, "weights must be finite and non-negative"));
    }

    let mut weights = matrix;
    normalize(&mut weights, mode)?;
    Ok(WeightMatrix {
        weights,
        shape: DecayShape::UserDefined,
        radius: None,
        rate: None,
        resolution,
        mode,
    })
}
