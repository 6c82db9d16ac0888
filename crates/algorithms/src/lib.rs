//! # ZoI Algorithms
//!
//! Zone-of-influence analysis over raster grids.
//!
//! ## Modules
//!
//! - **influence::decay**: decay functions (threshold, linear, exponential,
//!   Gaussian, rectangle, circle) and their parameterization
//! - **influence::filter**: discrete weight matrices and `r.mfilter` export
//! - **influence::cumulative**: windowed-sum ZoI, in-process or external
//! - **influence::nearest**: decayed distance to the nearest feature
//! - **influence::backend**: GRASS GIS module invocation

pub mod influence;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::influence::{
        compute_cumulative, compute_cumulative_external, compute_nearest, cumulative_zoi, nearest_zoi,
        BackendKind, CumulativeZoi, Decay, DecayParameters, DecayShape, ExternalModule, FilterBackend,
        GrassCli, LayerHandle, NearestZoi, OutputMode, Session, ZoiConfig, ZoiLayer,
    };
    pub use zoi_core::prelude::*;
}
