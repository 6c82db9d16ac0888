//! Decay functions: influence as a function of distance
//!
//! Every shape maps a distance `d` (map units) to an influence value. The
//! rate of the non-vanishing shapes is derived from exactly one of the
//! user-facing parameterizations, in this order:
//!
//! | shape       | 1st                         | 2nd                      | 3rd              | 4th             | last          |
//! |-------------|-----------------------------|--------------------------|------------------|-----------------|---------------|
//! | exponential | radius + zoi_hl_ratio       | radius (+ zoi_limit)     | half_life        | -               | explicit rate |
//! | gaussian    | radius + zoi_hl_ratio       | radius (+ zoi_limit)     | half_life        | sigma           | explicit rate |
//!
//! Threshold, circle, rectangle and linear shapes vanish at the radius and
//! always require one.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};
use zoi_core::{Error, Result};

/// Closed set of supported decay shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DecayShape {
    /// Constant inside the radius (open interval), zero outside
    Threshold,
    /// Linear (Bartlett / tent) decay reaching zero at the radius
    Linear,
    /// Exponential decay
    Exponential,
    /// Gaussian (half-normal) decay
    Gaussian,
    /// Constant over the whole square footprint of the filter
    Rectangular,
    /// Constant inside the radius (closed disc), zero outside
    Circular,
    /// Caller-supplied weight matrix
    UserDefined,
}

static ALIASES: LazyLock<HashMap<&'static str, DecayShape>> = LazyLock::new(|| {
    use DecayShape::*;
    let table: [(&[&'static str], DecayShape); 7] = [
        (&["threshold", "step", "threshold_decay", "step_decay"][..], Threshold),
        (
            &["linear", "bartlett", "tent", "linear_decay", "bartlett_decay", "tent_decay"][..],
            Linear,
        ),
        (&["exponential", "exp", "exp_decay", "exponential_decay"][..], Exponential),
        (
            &["gaussian", "gauss", "gaussian_decay", "gauss_decay", "half_norm", "half_norm_decay"][..],
            Gaussian,
        ),
        (&["rectangle", "rectangular", "box"][..], Rectangular),
        (&["circle", "circular"][..], Circular),
        (&["mfilter", "user", "user_defined", "custom"][..], UserDefined),
    ];
    table
        .into_iter()
        .flat_map(|(names, shape)| names.iter().map(move |&n| (n, shape)))
        .collect()
});

impl DecayShape {
    /// Resolve a shape name or alias (case-insensitive)
    pub fn resolve(name: &str) -> Result<Self> {
        let key = name.trim().to_ascii_lowercase();
        ALIASES
            .get(key.as_str())
            .copied()
            .ok_or_else(|| Error::UnknownShape(name.to_string()))
    }

    /// Name used in layer labels and serialized configs
    pub fn canonical_name(&self) -> &'static str {
        match self {
            DecayShape::Threshold => "threshold",
            DecayShape::Linear => "linear",
            DecayShape::Exponential => "exp_decay",
            DecayShape::Gaussian => "gaussian",
            DecayShape::Rectangular => "rectangle",
            DecayShape::Circular => "circle",
            DecayShape::UserDefined => "mfilter",
        }
    }

    /// Shapes that reach exactly zero at a finite radius
    pub fn is_vanishing(&self) -> bool {
        matches!(
            self,
            DecayShape::Threshold | DecayShape::Linear | DecayShape::Rectangular | DecayShape::Circular
        )
    }
}

impl FromStr for DecayShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl TryFrom<String> for DecayShape {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::resolve(&s)
    }
}

impl From<DecayShape> for String {
    fn from(shape: DecayShape) -> Self {
        shape.canonical_name().to_string()
    }
}

impl fmt::Display for DecayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Parameters fully determining a decay shape instance
#[derive(Debug, Clone, PartialEq)]
pub struct DecayParameters {
    /// ZoI radius (map units)
    pub radius: Option<f64>,
    /// Influence at the radius for exponential/Gaussian shapes, in (0, 1)
    pub zoi_limit: f64,
    /// Distance at which influence halves
    pub half_life: Option<f64>,
    /// Ratio radius / half_life
    pub zoi_hl_ratio: Option<f64>,
    /// Gaussian standard deviation
    pub sigma: Option<f64>,
    /// Value at the origin (threshold constant, linear intercept)
    pub amplitude: f64,
    /// Explicit rate, used when no other parameterization is given
    pub rate: f64,
    /// Distance offset
    pub origin: f64,
    /// Use `d - origin` instead of `|d - origin|`
    pub one_sided: bool,
}

impl Default for DecayParameters {
    fn default() -> Self {
        Self {
            radius: None,
            zoi_limit: 0.05,
            half_life: None,
            zoi_hl_ratio: None,
            sigma: None,
            amplitude: 1.0,
            rate: 0.01,
            origin: 0.0,
            one_sided: true,
        }
    }
}

impl DecayParameters {
    /// Default parameters with the given radius
    pub fn with_radius(radius: f64) -> Self {
        Self {
            radius: Some(radius),
            ..Default::default()
        }
    }
}

/// Which parameter the rate of a non-vanishing shape came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    RadiusRatio,
    Radius,
    HalfLife,
    Sigma,
    Explicit,
}

fn check_positive(name: &'static str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => {
            Err(Error::invalid(name, v, "must be a positive finite number"))
        }
        _ => Ok(()),
    }
}

/// A validated decay shape with its rate resolved.
///
/// Construction validates every parameter once; [`Decay::value`] is then
/// infallible and pure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decay {
    shape: DecayShape,
    amplitude: f64,
    origin: f64,
    one_sided: bool,
    radius: Option<f64>,
    lambda: f64,
    source: Option<RateSource>,
}

impl Decay {
    pub fn new(shape: DecayShape, params: &DecayParameters) -> Result<Self> {
        if !(params.zoi_limit > 0.0 && params.zoi_limit < 1.0) {
            return Err(Error::invalid(
                "zoi_limit",
                params.zoi_limit,
                "must lie in the open interval (0, 1)",
            ));
        }
        check_positive("radius", params.radius)?;
        check_positive("half_life", params.half_life)?;
        check_positive("zoi_hl_ratio", params.zoi_hl_ratio)?;
        check_positive("sigma", params.sigma)?;
        if !params.amplitude.is_finite() {
            return Err(Error::invalid("amplitude", params.amplitude, "must be finite"));
        }
        if !params.origin.is_finite() {
            return Err(Error::invalid("origin", params.origin, "must be finite"));
        }

        let mut decay = Decay {
            shape,
            amplitude: params.amplitude,
            origin: params.origin,
            one_sided: params.one_sided,
            radius: params.radius,
            lambda: 0.0,
            source: None,
        };

        match shape {
            DecayShape::UserDefined => {
                return Err(Error::invalid(
                    "shape",
                    shape,
                    "user-defined filters have no analytic decay function",
                ));
            }
            DecayShape::Threshold | DecayShape::Linear | DecayShape::Rectangular | DecayShape::Circular => {
                if params.radius.is_none() {
                    return Err(Error::invalid(
                        "radius",
                        "none",
                        format!("required for the {} shape", shape),
                    ));
                }
            }
            DecayShape::Exponential => {
                let (lambda, source) = exponential_rate(params)?;
                decay.lambda = lambda;
                decay.source = Some(source);
            }
            DecayShape::Gaussian => {
                let (lambda, source) = gaussian_rate(params)?;
                decay.lambda = lambda;
                decay.source = Some(source);
                decay.one_sided = false;
            }
        }

        Ok(decay)
    }

    pub fn shape(&self) -> DecayShape {
        self.shape
    }

    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Decay rate of exponential/Gaussian shapes
    pub fn rate(&self) -> Option<f64> {
        self.source.map(|_| self.lambda)
    }

    pub fn rate_source(&self) -> Option<RateSource> {
        self.source
    }

    fn offset(&self, d: f64) -> f64 {
        if self.one_sided {
            d - self.origin
        } else {
            (d - self.origin).abs()
        }
    }

    /// Influence at distance `d`
    pub fn value(&self, d: f64) -> f64 {
        let dist = self.offset(d);
        // Vanishing shapes always carry a radius (checked in `new`)
        let r = self.radius.unwrap_or(0.0);
        match self.shape {
            DecayShape::Threshold => {
                if dist < r { self.amplitude } else { 0.0 }
            }
            DecayShape::Circular => {
                if dist <= r { self.amplitude } else { 0.0 }
            }
            DecayShape::Rectangular => {
                if dist.abs() <= r { self.amplitude } else { 0.0 }
            }
            DecayShape::Linear => {
                if dist < r { self.amplitude * (1.0 - dist / r) } else { 0.0 }
            }
            DecayShape::Exponential => self.amplitude * (-self.lambda * dist).exp(),
            DecayShape::Gaussian => self.amplitude * (-self.lambda * dist * dist).exp(),
            DecayShape::UserDefined => 0.0,
        }
    }

    /// Elementwise influence over an array of distances
    pub fn apply<D: Dimension>(&self, distances: &Array<f64, D>) -> Array<f64, D> {
        distances.mapv(|d| self.value(d))
    }

    /// Smallest non-negative distance beyond which influence stays at or
    /// below `min_intensity`.
    pub fn cutoff_distance(&self, min_intensity: f64) -> f64 {
        let span = match self.shape {
            DecayShape::Exponential | DecayShape::Gaussian => {
                let ratio = self.amplitude / min_intensity;
                if ratio <= 1.0 {
                    0.0
                } else if self.shape == DecayShape::Exponential {
                    ratio.ln() / self.lambda
                } else {
                    (ratio.ln() / self.lambda).sqrt()
                }
            }
            _ => self.radius.unwrap_or(0.0),
        };
        (self.origin + span).max(0.0)
    }
}

fn explicit_rate(params: &DecayParameters) -> Result<(f64, RateSource)> {
    if !(params.rate.is_finite() && params.rate > 0.0) {
        return Err(Error::invalid("rate", params.rate, "must be a positive finite number"));
    }
    Ok((params.rate, RateSource::Explicit))
}

fn exponential_rate(params: &DecayParameters) -> Result<(f64, RateSource)> {
    match (params.radius, params.zoi_hl_ratio, params.half_life) {
        (Some(r), Some(k), _) => Ok((std::f64::consts::LN_2 / (r / k), RateSource::RadiusRatio)),
        (Some(r), None, _) => Ok(((1.0 / params.zoi_limit).ln() / r, RateSource::Radius)),
        (None, _, Some(hl)) => Ok((std::f64::consts::LN_2 / hl, RateSource::HalfLife)),
        (None, _, None) => explicit_rate(params),
    }
}

fn gaussian_rate(params: &DecayParameters) -> Result<(f64, RateSource)> {
    match (params.radius, params.zoi_hl_ratio, params.half_life, params.sigma) {
        (Some(r), Some(k), _, _) => {
            let hl = r / k;
            Ok((std::f64::consts::LN_2 / (hl * hl), RateSource::RadiusRatio))
        }
        (Some(r), None, _, _) => Ok(((1.0 / params.zoi_limit).ln() / (r * r), RateSource::Radius)),
        (None, _, Some(hl), _) => Ok((std::f64::consts::LN_2 / (hl * hl), RateSource::HalfLife)),
        (None, _, None, Some(s)) => Ok((1.0 / (2.0 * s * s), RateSource::Sigma)),
        (None, _, None, None) => explicit_rate(params),
    }
}

/// Threshold (step) decay: `amplitude` where the offset distance is below the radius
pub fn threshold(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Threshold, params)?.value(d))
}

/// Linear (Bartlett / tent) decay
pub fn linear(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Linear, params)?.value(d))
}

/// Exponential decay
pub fn exponential(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Exponential, params)?.value(d))
}

/// Gaussian (half-normal) decay; symmetric around the origin
pub fn gaussian(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Gaussian, params)?.value(d))
}

/// Rectangular (box) decay
pub fn rectangular(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Rectangular, params)?.value(d))
}

/// Circular (closed disc) decay
pub fn circular(d: f64, params: &DecayParameters) -> Result<f64> {
    Ok(Decay::new(DecayShape::Circular, params)?.value(d))
}

/// Evaluate the decay named `shape_name` (any alias) at distance `d`
pub fn dispatch(shape_name: &str, d: f64, params: &DecayParameters) -> Result<f64> {
    let shape = DecayShape::resolve(shape_name)?;
    Ok(Decay::new(shape, params)?.value(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(DecayShape::resolve("tent").unwrap(), DecayShape::Linear);
        assert_eq!(DecayShape::resolve("Bartlett").unwrap(), DecayShape::Linear);
        assert_eq!(DecayShape::resolve("STEP").unwrap(), DecayShape::Threshold);
        assert_eq!(DecayShape::resolve("half_norm").unwrap(), DecayShape::Gaussian);
        assert_eq!(DecayShape::resolve("Gauss").unwrap(), DecayShape::Gaussian);
        assert_eq!(DecayShape::resolve("exp_decay").unwrap(), DecayShape::Exponential);
        assert_eq!(DecayShape::resolve("box").unwrap(), DecayShape::Rectangular);
        assert_eq!(DecayShape::resolve("mfilter").unwrap(), DecayShape::UserDefined);
        assert!(matches!(DecayShape::resolve("sigmoid"), Err(Error::UnknownShape(_))));
    }

    #[test]
    fn test_canonical_names_resolve_to_themselves() {
        for shape in [
            DecayShape::Threshold,
            DecayShape::Linear,
            DecayShape::Exponential,
            DecayShape::Gaussian,
            DecayShape::Rectangular,
            DecayShape::Circular,
            DecayShape::UserDefined,
        ] {
            assert_eq!(DecayShape::resolve(shape.canonical_name()).unwrap(), shape);
        }
    }

    #[test]
    fn test_threshold_open_boundary() {
        let p = DecayParameters::with_radius(100.0);
        assert_eq!(threshold(0.0, &p).unwrap(), 1.0);
        assert_eq!(threshold(99.9, &p).unwrap(), 1.0);
        assert_eq!(threshold(100.0, &p).unwrap(), 0.0);
        assert_eq!(circular(100.0, &p).unwrap(), 1.0);
        assert_eq!(circular(100.1, &p).unwrap(), 0.0);
    }

    #[test]
    fn test_threshold_constant_and_origin() {
        let p = DecayParameters {
            radius: Some(10.0),
            amplitude: 3.0,
            origin: 5.0,
            one_sided: false,
            ..Default::default()
        };
        assert_eq!(threshold(0.0, &p).unwrap(), 3.0);
        assert_eq!(threshold(14.0, &p).unwrap(), 3.0);
        assert_eq!(threshold(15.0, &p).unwrap(), 0.0);
        assert_eq!(threshold(-5.0, &p).unwrap(), 0.0);
    }

    #[test]
    fn test_linear() {
        let p = DecayParameters::with_radius(200.0);
        assert_relative_eq!(linear(0.0, &p).unwrap(), 1.0);
        assert_relative_eq!(linear(50.0, &p).unwrap(), 0.75);
        assert_eq!(linear(200.0, &p).unwrap(), 0.0);
        assert_eq!(linear(500.0, &p).unwrap(), 0.0);
    }

    #[test]
    fn test_linear_rejects_bad_radius() {
        for r in [0.0, -10.0] {
            let p = DecayParameters::with_radius(r);
            assert!(matches!(linear(1.0, &p), Err(Error::InvalidParameter { name: "radius", .. })));
        }
        assert!(linear(1.0, &DecayParameters::default()).is_err());
    }

    #[test]
    fn test_exponential_radius() {
        let p = DecayParameters::with_radius(1000.0);
        assert_relative_eq!(exponential(0.0, &p).unwrap(), 1.0);
        assert_relative_eq!(exponential(1000.0, &p).unwrap(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_half_life_ratio() {
        for (r, k) in [(1000.0, 6.0), (250.0, 2.0), (3000.0, 4.5)] {
            let p = DecayParameters {
                radius: Some(r),
                zoi_hl_ratio: Some(k),
                ..Default::default()
            };
            assert_relative_eq!(exponential(r / k, &p).unwrap(), 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_exponential_precedence() {
        // radius wins over half_life
        let p = DecayParameters {
            radius: Some(1000.0),
            half_life: Some(10.0),
            ..Default::default()
        };
        let d = Decay::new(DecayShape::Exponential, &p).unwrap();
        assert_eq!(d.rate_source(), Some(RateSource::Radius));

        let p = DecayParameters {
            half_life: Some(100.0),
            ..Default::default()
        };
        assert_relative_eq!(exponential(100.0, &p).unwrap(), 0.5, epsilon = 1e-12);

        let p = DecayParameters {
            amplitude: 2.0,
            rate: 0.5,
            ..Default::default()
        };
        let d = Decay::new(DecayShape::Exponential, &p).unwrap();
        assert_eq!(d.rate_source(), Some(RateSource::Explicit));
        assert_relative_eq!(d.value(2.0), 2.0 * (-1.0f64).exp());
    }

    #[test]
    fn test_gaussian_parameterizations() {
        let p = DecayParameters::with_radius(500.0);
        assert_relative_eq!(gaussian(0.0, &p).unwrap(), 1.0);
        assert_relative_eq!(gaussian(500.0, &p).unwrap(), 0.05, epsilon = 1e-12);

        let p = DecayParameters {
            sigma: Some(10.0),
            ..Default::default()
        };
        let expected = (-(15.0f64 * 15.0) / (2.0 * 100.0)).exp();
        assert_relative_eq!(gaussian(15.0, &p).unwrap(), expected, epsilon = 1e-12);

        let p = DecayParameters {
            radius: Some(600.0),
            zoi_hl_ratio: Some(3.0),
            ..Default::default()
        };
        assert_relative_eq!(gaussian(200.0, &p).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_is_symmetric() {
        let p = DecayParameters {
            radius: Some(100.0),
            origin: 50.0,
            ..Default::default()
        };
        assert_relative_eq!(gaussian(20.0, &p).unwrap(), gaussian(80.0, &p).unwrap());
    }

    #[test]
    fn test_zoi_limit_bounds() {
        for limit in [0.0, 1.0, -0.1, 1.5] {
            let p = DecayParameters {
                radius: Some(100.0),
                zoi_limit: limit,
                ..Default::default()
            };
            assert!(matches!(
                exponential(0.0, &p),
                Err(Error::InvalidParameter { name: "zoi_limit", .. })
            ));
        }
        let p = DecayParameters {
            radius: Some(100.0),
            zoi_limit: 0.999,
            ..Default::default()
        };
        assert!(exponential(0.0, &p).is_ok());
    }

    #[test]
    fn test_zero_radius_invalid_for_all_shapes() {
        let p = DecayParameters::with_radius(0.0);
        for name in ["threshold", "linear", "exp_decay", "gaussian", "rectangle", "circle"] {
            assert!(dispatch(name, 1.0, &p).is_err(), "{} accepted radius 0", name);
        }
    }

    #[test]
    fn test_dispatch_aliases_agree() {
        let p = DecayParameters::with_radius(300.0);
        let d = 120.0;
        let a = dispatch("tent", d, &p).unwrap();
        let b = dispatch("bartlett", d, &p).unwrap();
        let c = dispatch("linear_decay", d, &p).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(matches!(dispatch("cubic", d, &p), Err(Error::UnknownShape(_))));
    }

    #[test]
    fn test_apply_over_array() {
        let decay = Decay::new(DecayShape::Linear, &DecayParameters::with_radius(10.0)).unwrap();
        let out = decay.apply(&array![[0.0, 5.0], [10.0, 20.0]]);
        assert_eq!(out, array![[1.0, 0.5], [0.0, 0.0]]);
    }

    #[test]
    fn test_cutoff_distance() {
        let decay = Decay::new(DecayShape::Exponential, &DecayParameters::with_radius(1000.0)).unwrap();
        let cut = decay.cutoff_distance(0.01);
        assert_relative_eq!(decay.value(cut), 0.01, epsilon = 1e-12);

        let decay = Decay::new(DecayShape::Gaussian, &DecayParameters::with_radius(1000.0)).unwrap();
        let cut = decay.cutoff_distance(0.01);
        assert_relative_eq!(decay.value(cut), 0.01, epsilon = 1e-12);
    }
}
