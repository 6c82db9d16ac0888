//! Raster data structures and the in-process grid adapter

mod distance;
mod extent;
mod focal;
mod geotransform;
mod grid;

pub use extent::Extent;
pub use geotransform::GeoTransform;
pub use grid::Raster;
