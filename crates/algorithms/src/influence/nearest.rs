//! Nearest-feature ZoI
//!
//! The distance from every cell to the closest feature (any non-missing
//! input cell) is computed once and passed through the decay function.
//! This is a cell-by-cell transform, not a windowed sum.

use tracing::info;
use zoi_core::{Algorithm, DistanceTransform, Error, Grid, Raster, Result};

use super::config::ZoiConfig;
use super::cumulative::ZoiLayer;
use super::decay::{Decay, DecayParameters, DecayShape};

/// Layer prefix of nearest-feature outputs
pub const NEAREST_PREFIX: &str = "zoi_nearest";

/// Decayed distance to the nearest feature of `input`.
///
/// Every non-missing cell is a feature, zeros included; a 0/1 presence
/// map needs its zeros masked first (see [`ZoiConfig::zero_as_missing`]).
/// Cells farther than any feature (a grid without features) get the
/// decay's limit at infinity, which is 0 for every built-in shape.
pub fn compute_nearest<G: DistanceTransform>(
    input: &G,
    shape: DecayShape,
    params: &DecayParameters,
) -> Result<G> {
    let decay = Decay::new(shape, params)?;
    let distance = input.distance_to_nearest()?;
    Ok(distance.map_cells(|d| d.map(|d| decay.value(d))))
}

/// Nearest-feature ZoI for every radius of `config`.
///
/// The distance field is shared by all layers. Names use the
/// `zoi_nearest` prefix, e.g. `zoi_nearest_gaussian500`.
pub fn nearest_zoi<G: DistanceTransform>(input: &G, config: &ZoiConfig) -> Result<Vec<ZoiLayer<G>>> {
    if config.shape == DecayShape::UserDefined {
        return Err(Error::invalid(
            "shape",
            config.shape,
            "user-defined filters only apply to cumulative ZoI",
        ));
    }
    config.validate()?;

    let decays = config
        .layer_radii()
        .into_iter()
        .map(|radius| Decay::new(config.shape, &config.decay_parameters(radius)).map(|d| (radius, d)))
        .collect::<Result<Vec<_>>>()?;

    let distance = if config.zero_as_missing {
        input.map_cells(|v| v.filter(|&x| x != 0.0)).distance_to_nearest()?
    } else {
        input.distance_to_nearest()?
    };
    let distance = match &config.crop_extent {
        Some(extent) => distance.crop(extent)?,
        None => distance,
    };

    let layers = decays
        .into_iter()
        .map(|(radius, decay)| {
            let name = config.layer_name(NEAREST_PREFIX, radius);
            info!(layer = %name, "computed nearest-feature ZoI");
            ZoiLayer {
                name,
                radius,
                grid: distance.map_cells(|d| d.map(|d| decay.value(d))),
            }
        })
        .collect();
    Ok(layers)
}

/// Nearest-feature ZoI algorithm
#[derive(Debug, Clone, Default)]
pub struct NearestZoi;

impl Algorithm for NearestZoi {
    type Input = Raster;
    type Output = Vec<ZoiLayer<Raster>>;
    type Params = ZoiConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "NearestZoi"
    }

    fn description(&self) -> &'static str {
        "Decay function applied to the distance to the nearest feature"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        nearest_zoi(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use zoi_core::GeoTransform;

    fn features(points: &[(usize, usize)]) -> Raster {
        let mut r = Raster::filled(10, 10, f64::NAN);
        r.set_transform(GeoTransform::square(0.0, 1000.0, 100.0));
        for &(row, col) in points {
            r.set(row, col, 1.0).unwrap();
        }
        r
    }

    #[test]
    fn test_threshold_nearest() {
        let r = features(&[(5, 5)]);
        let out = compute_nearest(&r, DecayShape::Threshold, &DecayParameters::with_radius(250.0)).unwrap();
        assert_relative_eq!(out.get(5, 5).unwrap(), 1.0);
        assert_relative_eq!(out.get(5, 7).unwrap(), 1.0);
        assert_relative_eq!(out.get(5, 8).unwrap(), 0.0);
        // Diagonal (2, 2) offset: 282.8 m
        assert_relative_eq!(out.get(7, 7).unwrap(), 0.0);
    }

    #[test]
    fn test_exponential_zoi_limit() {
        let r = features(&[(0, 0)]);
        let out = compute_nearest(&r, DecayShape::Exponential, &DecayParameters::with_radius(500.0)).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(out.get(0, 5).unwrap(), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_alias_reaches_same_decay() {
        let r = features(&[(2, 3), (8, 8)]);
        let params = DecayParameters::with_radius(400.0);
        let a = compute_nearest(&r, DecayShape::resolve("exp_decay").unwrap(), &params).unwrap();
        let b = compute_nearest(&r, DecayShape::resolve("exponential").unwrap(), &params).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_no_features_gives_zero() {
        let r = features(&[]);
        let out = compute_nearest(&r, DecayShape::Gaussian, &DecayParameters::with_radius(300.0)).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nearest_zoi_layers() {
        let r = features(&[(5, 5)]);
        let cfg = ZoiConfig::new(DecayShape::Linear, vec![300.0, 100.0]);
        let layers = nearest_zoi(&r, &cfg).unwrap();
        assert_eq!(layers[0].name, "zoi_nearest_linear300");
        assert_eq!(layers[1].name, "zoi_nearest_linear100");
        assert_relative_eq!(layers[0].grid.get(5, 6).unwrap(), 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(layers[1].grid.get(5, 6).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_background_needs_masking() {
        let mut r = Raster::filled(5, 5, 0.0);
        r.set_transform(GeoTransform::square(0.0, 500.0, 100.0));
        r.set(2, 2, 1.0).unwrap();
        let cfg = ZoiConfig::new(DecayShape::Threshold, 150.0);

        // Zeros are valid cells, so every cell is its own nearest feature
        let layers = nearest_zoi(&r, &cfg).unwrap();
        assert_relative_eq!(layers[0].grid.get(0, 0).unwrap(), 1.0);

        let cfg = ZoiConfig {
            zero_as_missing: true,
            ..cfg
        };
        let layers = nearest_zoi(&r, &cfg).unwrap();
        let g = &layers[0].grid;
        assert_relative_eq!(g.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(g.get(2, 3).unwrap(), 1.0);
        assert_relative_eq!(g.get(3, 3).unwrap(), 1.0);
        assert_relative_eq!(g.get(2, 4).unwrap(), 0.0);
    }

    #[test]
    fn test_nearest_rejects_user_filter() {
        let r = features(&[(5, 5)]);
        let cfg = ZoiConfig::with_user_filter(ndarray::Array2::ones((3, 3)));
        assert!(nearest_zoi(&r, &cfg).is_err());
    }
}
