//! Configuration record for the ZoI engines

use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use zoi_core::{Error, Extent, NoDataPolicy, Result};

use super::backend::ExternalModule;
use super::decay::{Decay, DecayParameters, DecayShape};
use super::filter::{FilterLimits, OutputMode};

/// One radius or an ordered batch of radii
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RadiusSpec {
    Single(f64),
    Multiple(Vec<f64>),
}

impl RadiusSpec {
    pub fn values(&self) -> &[f64] {
        match self {
            RadiusSpec::Single(r) => std::slice::from_ref(r),
            RadiusSpec::Multiple(rs) => rs,
        }
    }
}

impl From<f64> for RadiusSpec {
    fn from(r: f64) -> Self {
        RadiusSpec::Single(r)
    }
}

impl From<Vec<f64>> for RadiusSpec {
    fn from(rs: Vec<f64>) -> Self {
        RadiusSpec::Multiple(rs)
    }
}

/// Where windowed sums are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process, through the `Grid` adapter
    #[default]
    Local,
    /// Delegated to an external GIS module
    External(ExternalModule),
}

/// Parameters for cumulative and nearest ZoI computations.
///
/// Every field has a default; JSON configs may set any subset:
///
/// ```json
/// { "shape": "bartlett", "radii": [100, 500, 1000], "output_mode": "density" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoiConfig {
    /// Decay shape (any alias)
    pub shape: DecayShape,
    /// Radius or radii; `None` uses half_life / sigma / rate instead
    pub radii: Option<RadiusSpec>,
    pub zoi_limit: f64,
    pub half_life: Option<f64>,
    pub zoi_hl_ratio: Option<f64>,
    pub sigma: Option<f64>,
    pub amplitude: f64,
    pub rate: f64,
    pub origin: f64,
    pub one_sided: bool,
    pub output_mode: OutputMode,
    pub no_data_policy: NoDataPolicy,
    /// Replace missing input cells by 0 before filtering
    pub nodata_as_zero: bool,
    /// Nearest engine only: zero cells are background, not features
    pub zero_as_missing: bool,
    pub backend: BackendKind,
    pub max_distance: f64,
    pub min_intensity: f64,
    /// Crop outputs to this extent (in-process only)
    pub crop_extent: Option<Extent>,
    /// Weight matrix for the user-defined shape
    #[serde(skip)]
    pub user_filter: Option<Array2<f64>>,
    /// Directory for exported filter files (external backend)
    pub filter_dir: Option<PathBuf>,
}

impl Default for ZoiConfig {
    fn default() -> Self {
        let decay = DecayParameters::default();
        let limits = FilterLimits::default();
        Self {
            shape: DecayShape::Exponential,
            radii: None,
            zoi_limit: decay.zoi_limit,
            half_life: None,
            zoi_hl_ratio: None,
            sigma: None,
            amplitude: decay.amplitude,
            rate: decay.rate,
            origin: decay.origin,
            one_sided: decay.one_sided,
            output_mode: OutputMode::default(),
            no_data_policy: NoDataPolicy::default(),
            nodata_as_zero: false,
            zero_as_missing: false,
            backend: BackendKind::Local,
            max_distance: limits.max_distance,
            min_intensity: limits.min_intensity,
            crop_extent: None,
            user_filter: None,
            filter_dir: None,
        }
    }
}

impl ZoiConfig {
    pub fn new(shape: DecayShape, radii: impl Into<RadiusSpec>) -> Self {
        Self {
            shape,
            radii: Some(radii.into()),
            ..Default::default()
        }
    }

    /// Configuration for a user-supplied weight matrix
    pub fn with_user_filter(matrix: Array2<f64>) -> Self {
        Self {
            shape: DecayShape::UserDefined,
            user_filter: Some(matrix),
            ..Default::default()
        }
    }

    /// Load a configuration from JSON; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid("config", "json", e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    /// Requested radii in order (empty when no radius is set)
    pub fn radius_values(&self) -> &[f64] {
        self.radii.as_ref().map(RadiusSpec::values).unwrap_or(&[])
    }

    /// One entry per output layer: each radius, or a single `None`
    pub fn layer_radii(&self) -> Vec<Option<f64>> {
        let values = self.radius_values();
        if values.is_empty() || self.shape == DecayShape::UserDefined {
            vec![None]
        } else {
            values.iter().copied().map(Some).collect()
        }
    }

    /// Decay parameters for one layer
    pub fn decay_parameters(&self, radius: Option<f64>) -> DecayParameters {
        DecayParameters {
            radius,
            zoi_limit: self.zoi_limit,
            half_life: self.half_life,
            zoi_hl_ratio: self.zoi_hl_ratio,
            sigma: self.sigma,
            amplitude: self.amplitude,
            rate: self.rate,
            origin: self.origin,
            one_sided: self.one_sided,
        }
    }

    pub fn limits(&self) -> FilterLimits {
        FilterLimits {
            max_distance: self.max_distance,
            min_intensity: self.min_intensity,
        }
    }

    /// Deterministic layer label for `radius`, e.g. `zoi_cumulative_exp_decay1000`
    pub fn layer_name(&self, prefix: &str, radius: Option<f64>) -> String {
        let suffix = match (radius, self.half_life, self.sigma) {
            _ if self.shape == DecayShape::UserDefined => String::new(),
            (Some(r), _, _) => format!("{}", r),
            (None, Some(hl), _) => format!("hl{}", hl),
            (None, None, Some(s)) => format!("sd{}", s),
            (None, None, None) => String::new(),
        };
        format!("{}_{}{}", prefix, self.shape.canonical_name(), suffix)
    }

    /// Eager validation of every parameter, before any numeric work
    pub fn validate(&self) -> Result<()> {
        if let Some(spec) = &self.radii {
            if spec.values().is_empty() {
                return Err(Error::invalid("radii", "[]", "at least one radius is required"));
            }
        }
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(Error::invalid("max_distance", self.max_distance, "must be a positive finite number"));
        }
        if !(self.min_intensity.is_finite() && self.min_intensity > 0.0) {
            return Err(Error::invalid("min_intensity", self.min_intensity, "must be a positive finite number"));
        }
        if let Some(ext) = &self.crop_extent
            && !ext.is_valid()
        {
            return Err(Error::invalid("crop_extent", format!("{:?}", ext), "extent must have positive width and height"));
        }

        if self.shape == DecayShape::UserDefined {
            let Some(matrix) = &self.user_filter else {
                return Err(Error::invalid("user_filter", "none", "required for the mfilter shape"));
            };
            let (rows, cols) = matrix.dim();
            if rows != cols || rows % 2 == 0 {
                return Err(Error::DimensionMismatch { rows, cols });
            }
            return Ok(());
        }

        for radius in self.layer_radii() {
            Decay::new(self.shape, &self.decay_parameters(radius))?;
        }
        Ok(())
    }
}
