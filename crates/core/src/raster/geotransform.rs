//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

use super::Extent;

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// ZoI filters assume square, north-up cells: `pixel_height == -pixel_width`
/// and no rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// North-up transform with square cells whose upper-left corner is
    /// (`xmin`, `ymax`)
    pub fn square(xmin: f64, ymax: f64, resolution: f64) -> Self {
        Self::new(xmin, ymax, resolution, -resolution)
    }

    /// Geographic coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo_corner_f(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic coordinates of the pixel's upper-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo_corner_f(col as f64, row as f64)
    }

    fn pixel_to_geo_corner_f(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Get the cell size (assumes square pixels and no rotation)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding extent for a raster of given dimensions
    pub fn extent(&self, cols: usize, rows: usize) -> Extent {
        let corners = [
            self.pixel_to_geo_corner(0, 0),
            self.pixel_to_geo_corner(cols, 0),
            self.pixel_to_geo_corner(0, rows),
            self.pixel_to_geo_corner(cols, rows),
        ];

        let mut ext = Extent::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            ext.xmin = ext.xmin.min(x);
            ext.xmax = ext.xmax.max(x);
            ext.ymin = ext.ymin.min(y);
            ext.ymax = ext.ymax.max(y);
        }
        ext
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_center() {
        let gt = GeoTransform::square(100.0, 200.0, 10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        assert_relative_eq!(x, 155.0, epsilon = 1e-10);
        assert_relative_eq!(y, 95.0, epsilon = 1e-10);
    }

    #[test]
    fn test_extent() {
        let gt = GeoTransform::square(0.0, 1000.0, 100.0);
        let ext = gt.extent(10, 10);

        assert_relative_eq!(ext.xmin, 0.0, epsilon = 1e-10);
        assert_relative_eq!(ext.xmax, 1000.0, epsilon = 1e-10);
        assert_relative_eq!(ext.ymin, 0.0, epsilon = 1e-10);
        assert_relative_eq!(ext.ymax, 1000.0, epsilon = 1e-10);
    }
}
