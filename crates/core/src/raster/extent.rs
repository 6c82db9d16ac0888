//! Rectangular map extents

use serde::{Deserialize, Serialize};

/// Axis-aligned extent in map units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self { xmin, xmax, ymin, ymax }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether both spans are positive and finite
    pub fn is_valid(&self) -> bool {
        self.width().is_finite() && self.height().is_finite() && self.width() > 0.0 && self.height() > 0.0
    }

}
