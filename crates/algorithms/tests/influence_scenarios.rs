//! End-to-end ZoI scenarios over small synthetic grids.
//!
//! A feature map is a grid where features hold 1 and everything else is
//! either 0 or missing.

use approx::assert_relative_eq;
use std::cell::RefCell;
use zoi_algorithms::influence::{
    build_filter, compute_cumulative, compute_cumulative_external, compute_nearest, cumulative_zoi,
    decay, BackendKind, CumulativeOutput, CumulativeSource, DecayParameters, DecayShape, ExternalModule,
    FilterBackend, FilterLimits, GrassCli, LayerHandle, ModuleRequest, OutputMode, Session, ZoiConfig,
};
use zoi_core::{CenterPolicy, Error, GeoTransform, MissingNeighbors, NoDataPolicy, Raster, Result};

/// 10×10 grid at 100 m with a single feature at (5, 5); other cells missing
fn single_feature() -> Raster {
    let mut r = Raster::filled(10, 10, f64::NAN);
    r.set_transform(GeoTransform::square(0.0, 1000.0, 100.0));
    r.set(5, 5, 1.0).unwrap();
    r
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn threshold_footprint_around_single_feature() {
    init_tracing();
    let r = single_feature();
    let cfg = ZoiConfig::new(DecayShape::Threshold, 250.0);
    let layers = compute_cumulative(&r, &cfg).unwrap();
    assert_eq!(layers.len(), 1);

    let g = &layers[0].grid;
    for row in 0..10 {
        for col in 0..10 {
            let dr = row as f64 - 5.0;
            let dc = col as f64 - 5.0;
            let dist = 100.0 * (dr * dr + dc * dc).sqrt();
            let expected = if dist <= 250.0 { 1.0 } else { 0.0 };
            assert_relative_eq!(g.get(row, col).unwrap(), expected);
        }
    }
}

#[test]
fn exponential_reaches_zoi_limit_at_radius() {
    let params = DecayParameters::with_radius(1000.0);
    assert_relative_eq!(decay::exponential(0.0, &params).unwrap(), 1.0);
    assert_relative_eq!(decay::exponential(1000.0, &params).unwrap(), 0.05, epsilon = 1e-12);
}

#[test]
fn exponential_half_life_from_ratio() {
    let params = DecayParameters {
        zoi_hl_ratio: Some(4.0),
        amplitude: 2.0,
        ..DecayParameters::with_radius(1000.0)
    };
    assert_relative_eq!(decay::exponential(250.0, &params).unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn linear_aliases_agree() {
    let params = DecayParameters::with_radius(800.0);
    for d in [0.0, 120.0, 400.0, 799.0, 800.0, 1500.0] {
        let tent = decay::dispatch("tent", d, &params).unwrap();
        let bartlett = decay::dispatch("bartlett", d, &params).unwrap();
        let linear = decay::dispatch("linear_decay", d, &params).unwrap();
        assert_eq!(tent, bartlett);
        assert_eq!(tent, linear);
    }
    assert!(matches!(
        decay::dispatch("sigmoid", 1.0, &params),
        Err(Error::UnknownShape(_))
    ));
}

#[test]
fn batch_preserves_radius_order() {
    let r = single_feature();
    let cfg = ZoiConfig::new(DecayShape::Exponential, vec![100.0, 500.0, 1000.0]);
    let layers = compute_cumulative(&r, &cfg).unwrap();

    let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "zoi_cumulative_exp_decay100",
            "zoi_cumulative_exp_decay500",
            "zoi_cumulative_exp_decay1000"
        ]
    );
    // Wider radius, slower decay
    assert!(layers[2].grid.get(5, 8).unwrap() > layers[1].grid.get(5, 8).unwrap());
    for layer in &layers {
        assert_relative_eq!(layer.grid.get(5, 5).unwrap(), 1.0);
    }
}

#[test]
fn batch_fails_as_a_whole() {
    let r = single_feature();
    let cfg = ZoiConfig::new(DecayShape::Exponential, vec![100.0, -1.0, 1000.0]);
    assert!(compute_cumulative(&r, &cfg).is_err());
}

#[test]
fn density_filter_sums_to_one() {
    let limits = FilterLimits::default();
    for shape in [DecayShape::Gaussian, DecayShape::Linear, DecayShape::Rectangular] {
        let f = build_filter(30.0, shape, &DecayParameters::with_radius(300.0), OutputMode::Density, &limits)
            .unwrap();
        assert_relative_eq!(f.sum(), 1.0, epsilon = 1e-9);
        assert_eq!(f.side() % 2, 1);
    }
}

#[test]
fn filter_build_is_deterministic() {
    let limits = FilterLimits::default();
    let params = DecayParameters::with_radius(750.0);
    let a = build_filter(25.0, DecayShape::Gaussian, &params, OutputMode::CumulativeZoi, &limits).unwrap();
    let b = build_filter(25.0, DecayShape::Gaussian, &params, OutputMode::CumulativeZoi, &limits).unwrap();
    assert_eq!(a.weights(), b.weights());
    assert_relative_eq!(a.center(), 1.0);
}

#[test]
fn density_of_uniform_features_is_one_in_the_interior() {
    let mut r = Raster::filled(15, 15, 1.0);
    r.set_transform(GeoTransform::square(0.0, 150.0, 10.0));
    let cfg = ZoiConfig {
        output_mode: OutputMode::Density,
        ..ZoiConfig::new(DecayShape::Gaussian, 30.0)
    };
    let layers = compute_cumulative(&r, &cfg).unwrap();
    assert_eq!(layers[0].name, "density_gaussian30");
    assert_relative_eq!(layers[0].grid.get(7, 7).unwrap(), 1.0, epsilon = 1e-9);
}

#[test]
fn exclude_keeps_isolated_cells_missing() {
    let r = single_feature();
    let cfg = ZoiConfig {
        no_data_policy: NoDataPolicy::new(CenterPolicy::All, MissingNeighbors::Exclude),
        ..ZoiConfig::new(DecayShape::Threshold, 150.0)
    };
    let layers = compute_cumulative(&r, &cfg).unwrap();
    let g = &layers[0].grid;
    assert_relative_eq!(g.get(5, 6).unwrap(), 1.0);
    assert!(g.value_at(0, 0).is_none());
}

#[test]
fn nearest_and_cumulative_share_shape_resolution() {
    let r = single_feature();
    let params = DecayParameters::with_radius(400.0);
    let near = compute_nearest(&r, DecayShape::resolve("exp_decay").unwrap(), &params).unwrap();
    let f = build_filter(
        100.0,
        DecayShape::resolve("exponential").unwrap(),
        &params,
        OutputMode::CumulativeZoi,
        &FilterLimits::default(),
    )
    .unwrap();
    // With a single feature both strategies read the same decay curve
    let h = f.half_width();
    assert_relative_eq!(near.get(5, 7).unwrap(), f.weights()[(h, h + 2)], epsilon = 1e-12);
}

#[test]
fn config_from_json_drives_engine() {
    let r = single_feature();
    let cfg = ZoiConfig::from_json(r#"{ "shape": "step", "radii": [150, 250] }"#).unwrap();
    let layers = compute_cumulative(&r, &cfg).unwrap();
    assert_eq!(layers[0].name, "zoi_cumulative_threshold150");
    assert_eq!(layers[1].name, "zoi_cumulative_threshold250");
}

/// Backend that records requests instead of running them
#[derive(Default)]
struct Recording {
    available: bool,
    calls: RefCell<Vec<String>>,
}

impl FilterBackend for Recording {
    fn is_available(&self, _session: &Session) -> bool {
        self.available
    }

    fn invoke(&self, _session: &Session, request: &ModuleRequest) -> Result<LayerHandle> {
        self.calls.borrow_mut().push(request.module_name().to_string());
        Ok(LayerHandle::new(request.output()))
    }

    fn remove(&self, _session: &Session, _handles: &[LayerHandle]) -> Result<()> {
        Ok(())
    }
}

#[test]
fn external_backend_unavailable() {
    let cfg = ZoiConfig {
        backend: BackendKind::External(ExternalModule::MFilter),
        ..ZoiConfig::new(DecayShape::Exponential, 500.0)
    };
    let session = Session::new("/nonexistent/grassdata", "loc", "PERMANENT", 100.0);
    assert!(matches!(
        compute_cumulative_external("roads", &cfg, &GrassCli, &session),
        Err(Error::BackendUnavailable(_))
    ));
}

#[test]
fn external_mfilter_through_dispatcher() {
    let scratch = tempfile::tempdir().unwrap();
    let backend = Recording {
        available: true,
        ..Default::default()
    };
    let session = Session::new("/tmp/grassdata", "loc", "PERMANENT", 100.0).with_scratch_dir(scratch.path());
    let cfg = ZoiConfig {
        backend: BackendKind::External(ExternalModule::MFilter),
        no_data_policy: NoDataPolicy::new(CenterPolicy::All, MissingNeighbors::Exclude),
        ..ZoiConfig::new(DecayShape::Exponential, vec![500.0, 1000.0])
    };

    let out = cumulative_zoi::<Raster, _>(CumulativeSource::Layer("roads"), &cfg, Some((&backend, &session)))
        .unwrap();
    let CumulativeOutput::External(handles) = out else {
        panic!("expected external output");
    };
    assert_eq!(handles[0].name(), "zoi_cumulative_exp_decay500");
    assert_eq!(handles[1].name(), "zoi_cumulative_exp_decay1000");
    assert_eq!(
        *backend.calls.borrow(),
        vec!["r.mfilter", "r.mapcalc", "r.mfilter", "r.mapcalc"]
    );
    // Exported filter files are cleaned up
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
