//! Zone-of-influence (ZoI) analysis
//!
//! Two strategies derive influence surfaces from a map of features:
//!
//! - **Nearest**: decay applied to the distance to the closest feature
//!   ([`compute_nearest`], [`nearest_zoi`]).
//! - **Cumulative**: decay-weighted moving-window sum over all features
//!   ([`compute_cumulative`]), optionally run by an external GIS module
//!   ([`compute_cumulative_external`]).
//!
//! Both share the decay library ([`Decay`], [`DecayShape`]) and the
//! configuration record [`ZoiConfig`], so a shape name such as
//! `"exp_decay"` behaves the same on either path.

pub mod backend;
pub mod config;
pub mod cumulative;
pub mod decay;
pub mod filter;
pub mod nearest;

pub use backend::{
    ExternalModule, FilterBackend, GrassCli, LayerHandle, ModuleRequest, NeighborMethod, PreparedRequest,
    ResampKernel, Session,
};
pub use config::{BackendKind, RadiusSpec, ZoiConfig};
pub use cumulative::{
    compute_cumulative, compute_cumulative_external, cumulative_zoi, CumulativeOutput, CumulativeSource,
    CumulativeZoi, ZoiLayer,
};
pub use decay::{Decay, DecayParameters, DecayShape, RateSource};
pub use filter::{
    build_filter, build_filters, custom_filter, half_width, parse_mfilter, FilterLimits, MFilterText, OutputMode,
    WeightMatrix,
};
pub use nearest::{compute_nearest, nearest_zoi, NearestZoi, NEAREST_PREFIX};
