//! Main Raster type

use ndarray::{s, Array2};

use crate::error::{Error, Result};
use crate::raster::{Extent, GeoTransform};

/// A georeferenced 2D grid of `f64` cells.
///
/// A cell is missing when it is `NaN` or equals the configured no-data
/// sentinel. Outputs produced by the grid primitives always encode missing
/// cells as `NaN`.
///
/// # Example
///
/// ```ignore
/// use zoi_core::{GeoTransform, Raster};
///
/// let mut raster = Raster::filled(10, 10, f64::NAN);
/// raster.set_transform(GeoTransform::square(0.0, 1000.0, 100.0));
/// raster.set(5, 5, 1.0)?;
/// assert_eq!(raster.value_at(5, 5), Some(1.0));
/// ```
#[derive(Debug, Clone)]
pub struct Raster {
    /// Raster data stored in row-major order (row, col)
    data: Array2<f64>,
    /// Affine transformation
    transform: GeoTransform,
    /// No-data sentinel (NaN is always missing)
    nodata: Option<f64>,
}

impl Raster {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            nodata: None,
        }
    }

    /// Same georeferencing, new cell values; missing cells are `NaN`
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self> {
        if data.dim() != self.data.dim() {
            let (rows, cols) = data.dim();
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self {
            data,
            transform: self.transform,
            nodata: Some(f64::NAN),
        })
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    // Data access

    /// Get raw value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Value at (row, col), `None` when missing or out of bounds
    pub fn value_at(&self, row: usize, col: usize) -> Option<f64> {
        self.data
            .get((row, col))
            .copied()
            .filter(|&v| !self.is_missing(v))
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic extent of the whole grid
    pub fn bounds(&self) -> Extent {
        self.transform.extent(self.cols(), self.rows())
    }

    /// Whether a raw value counts as missing for this raster
    pub fn is_missing(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nd) if !nd.is_nan() => (value - nd).abs() < f64::EPSILON * 100.0 * nd.abs().max(1.0),
            _ => false,
        }
    }

    /// Sub-raster of the cells whose centers fall inside `extent`
    pub fn crop_to(&self, extent: &Extent) -> Result<Self> {
        if !extent.is_valid() {
            return Err(Error::invalid(
                "extent",
                format!("{:?}", extent),
                "extent must have positive width and height",
            ));
        }

        let tol = self.cell_size() * 1e-9;
        let inner = Extent::new(
            extent.xmin - tol,
            extent.xmax + tol,
            extent.ymin - tol,
            extent.ymax + tol,
        );

        let row_range: Vec<usize> = (0..self.rows())
            .filter(|&r| {
                let (_, y) = self.transform.pixel_to_geo(0, r);
                y >= inner.ymin && y <= inner.ymax
            })
            .collect();
        let col_range: Vec<usize> = (0..self.cols())
            .filter(|&c| {
                let (x, _) = self.transform.pixel_to_geo(c, 0);
                x >= inner.xmin && x <= inner.xmax
            })
            .collect();

        let (Some(&r0), Some(&r1), Some(&c0), Some(&c1)) = (
            row_range.first(),
            row_range.last(),
            col_range.first(),
            col_range.last(),
        ) else {
            return Err(Error::invalid(
                "extent",
                format!("{:?}", extent),
                "extent does not overlap any cell center of the raster",
            ));
        };

        let (ox, oy) = self.transform.pixel_to_geo_corner(c0, r0);
        let mut transform = self.transform;
        transform.origin_x = ox;
        transform.origin_y = oy;

        Ok(Self {
            data: self.data.slice(s![r0..=r1, c0..=c1]).to_owned(),
            transform,
            nodata: self.nodata,
        })
    }
}
