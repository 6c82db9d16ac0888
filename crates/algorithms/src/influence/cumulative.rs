//! Cumulative ZoI: windowed weighted sums of feature maps
//!
//! For each requested radius a filter is built at the grid resolution and
//! applied as a moving-window sum. The in-process path runs over any
//! [`Grid`]; the external path delegates to a [`FilterBackend`] and works on
//! layer names inside a [`Session`].

use tracing::{info, warn};
use zoi_core::maybe_rayon::*;
use zoi_core::{Algorithm, CenterPolicy, Error, Grid, MissingNeighbors, Raster, Result};

use super::backend::{discard_filter_file, ExternalModule, FilterBackend, LayerHandle, ModuleRequest, Session};
use super::config::{BackendKind, ZoiConfig};
use super::decay::DecayShape;
use super::filter::{build_filter, custom_filter, WeightMatrix};

/// One output layer of a ZoI computation
#[derive(Debug, Clone)]
pub struct ZoiLayer<G> {
    /// Deterministic label, e.g. `zoi_cumulative_exp_decay1000`
    pub name: String,
    /// Radius this layer was computed for
    pub radius: Option<f64>,
    pub grid: G,
}

/// Filter for one layer at `resolution`
fn layer_filter(config: &ZoiConfig, resolution: f64, radius: Option<f64>) -> Result<WeightMatrix> {
    if config.shape == DecayShape::UserDefined {
        let matrix = config
            .user_filter
            .clone()
            .ok_or_else(|| Error::invalid("user_filter", "none", "required for the mfilter shape"))?;
        return custom_filter(matrix, resolution, config.output_mode);
    }
    build_filter(
        resolution,
        config.shape,
        &config.decay_parameters(radius),
        config.output_mode,
        &config.limits(),
    )
}

/// Cumulative ZoI of `input`, computed in-process.
///
/// Returns one layer per radius, in the order the radii were given. All
/// parameters are validated before any layer is computed.
pub fn compute_cumulative<G: Grid>(input: &G, config: &ZoiConfig) -> Result<Vec<ZoiLayer<G>>> {
    config.validate()?;
    if let BackendKind::External(module) = config.backend {
        return Err(Error::invalid(
            "backend",
            module.name(),
            "external backends run through compute_cumulative_external",
        ));
    }

    let resolution = input.resolution();
    let filled = config
        .nodata_as_zero
        .then(|| input.map_cells(|v| Some(v.unwrap_or(0.0))));
    let source = filled.as_ref().unwrap_or(input);
    let prefix = config.output_mode.prefix();

    config
        .layer_radii()
        .into_par_iter()
        .map(|radius| -> Result<ZoiLayer<G>> {
            let filter = layer_filter(config, resolution, radius)?;
            let mut grid = source.windowed_reduce(filter.view(), config.no_data_policy)?;
            if let Some(extent) = &config.crop_extent {
                grid = grid.crop(extent)?;
            }
            let name = config.layer_name(prefix, radius);
            info!(layer = %name, side = filter.side(), "computed cumulative ZoI");
            Ok(ZoiLayer { name, radius, grid })
        })
        .collect()
}

/// Cumulative ZoI of raster `input` inside an external session.
///
/// Returns handles of the output rasters, one per radius and in order.
/// On failure every raster created by this call is removed again.
pub fn compute_cumulative_external<B: FilterBackend>(
    input: &str,
    config: &ZoiConfig,
    backend: &B,
    session: &Session,
) -> Result<Vec<LayerHandle>> {
    config.validate()?;
    let BackendKind::External(module) = config.backend else {
        return Err(Error::invalid("backend", "local", "select an external module"));
    };
    if config.crop_extent.is_some() {
        return Err(Error::invalid(
            "crop_extent",
            "set",
            "cropping is only available in-process; set the session region instead",
        ));
    }
    module.check_shape(config.shape)?;
    if !backend.is_available(session) {
        return Err(Error::BackendUnavailable(format!(
            "no session at {}",
            session.mapset_path().display()
        )));
    }

    let session = match &config.filter_dir {
        Some(dir) => session.clone().with_scratch_dir(dir),
        None => session.clone(),
    };

    // Build every filter before touching the session
    let filters = config
        .layer_radii()
        .into_iter()
        .map(|radius| layer_filter(config, session.resolution, radius).map(|f| (radius, f)))
        .collect::<Result<Vec<_>>>()?;

    let mut intermediates = Vec::new();
    let mut produced = Vec::new();
    let outcome = run_external(
        input,
        module,
        config,
        backend,
        &session,
        &filters,
        &mut intermediates,
        &mut produced,
    );

    if let Err(e) = backend.remove(&session, &intermediates) {
        warn!(error = %e, "could not remove intermediate layers");
    }
    match outcome {
        Ok(()) => Ok(produced),
        Err(err) => {
            if let Err(e) = backend.remove(&session, &produced) {
                warn!(error = %e, "could not remove partial outputs");
            }
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_external<B: FilterBackend>(
    input: &str,
    module: ExternalModule,
    config: &ZoiConfig,
    backend: &B,
    session: &Session,
    filters: &[(Option<f64>, WeightMatrix)],
    intermediates: &mut Vec<LayerHandle>,
    produced: &mut Vec<LayerHandle>,
) -> Result<()> {
    let policy = config.no_data_policy;

    // Modules skip null cells; zero-filling makes missing neighbours count as 0
    let filled = config.nodata_as_zero || policy.neighbors == MissingNeighbors::Zero;
    let source = if filled {
        let handle = backend.invoke(
            session,
            &ModuleRequest::MapCalc {
                output: format!("{}_zoi_filled_tmp", unqualified(input)),
                expression: format!("if(isnull({0}), 0, {0})", input),
            },
        )?;
        intermediates.push(handle.clone());
        handle.name().to_string()
    } else {
        input.to_string()
    };
    let reference = if config.nodata_as_zero { source.as_str() } else { input };
    let prefix = config.output_mode.prefix();

    for (radius, filter) in filters {
        let name = config.layer_name(prefix, *radius);
        let raw_name = format!("{}_raw_tmp", name);
        let prepared = module.prepare(&source, &raw_name, filter, session)?;

        let result = backend.invoke(session, &prepared.request);
        if let Some(path) = &prepared.filter_file {
            discard_filter_file(path);
        }
        intermediates.push(result?);

        let raw = match prepared.rescale {
            Some(factor) => format!("({} * {})", raw_name, factor),
            None => raw_name,
        };
        let expression = match policy.centers {
            CenterPolicy::All => raw,
            CenterPolicy::OnlyMissing => format!("if(isnull({0}), {1}, {0})", reference, raw),
            CenterPolicy::SkipMissing => format!("if(isnull({0}), null(), {1})", reference, raw),
        };
        let handle = backend.invoke(session, &ModuleRequest::MapCalc { output: name, expression })?;
        info!(layer = %handle, module = module.name(), "computed cumulative ZoI");
        produced.push(handle);
    }
    Ok(())
}

/// Layer name without its `@mapset` qualifier; outputs always go to the
/// session's current mapset.
fn unqualified(layer: &str) -> &str {
    layer.split_once('@').map_or(layer, |(name, _)| name)
}

/// Input of [`cumulative_zoi`]: an in-memory grid or an external layer
#[derive(Debug)]
pub enum CumulativeSource<'a, G> {
    Grid(&'a G),
    Layer(&'a str),
}

/// Output of [`cumulative_zoi`], matching the selected backend
#[derive(Debug, Clone)]
pub enum CumulativeOutput<G> {
    Local(Vec<ZoiLayer<G>>),
    External(Vec<LayerHandle>),
}

/// Run the cumulative engine on the backend selected by `config.backend`.
///
/// `external` supplies the backend and session; it is required for
/// external backends and ignored otherwise.
pub fn cumulative_zoi<G: Grid, B: FilterBackend>(
    source: CumulativeSource<'_, G>,
    config: &ZoiConfig,
    external: Option<(&B, &Session)>,
) -> Result<CumulativeOutput<G>> {
    match (config.backend, source) {
        (BackendKind::Local, CumulativeSource::Grid(grid)) => {
            compute_cumulative(grid, config).map(CumulativeOutput::Local)
        }
        (BackendKind::External(module), CumulativeSource::Layer(name)) => {
            let (backend, session) = external.ok_or_else(|| {
                Error::invalid("backend", module.name(), "an external backend needs a session")
            })?;
            compute_cumulative_external(name, config, backend, session).map(CumulativeOutput::External)
        }
        (BackendKind::Local, CumulativeSource::Layer(name)) => Err(Error::invalid(
            "input",
            name,
            "the local backend needs an in-memory grid",
        )),
        (BackendKind::External(module), CumulativeSource::Grid(_)) => Err(Error::invalid(
            "input",
            module.name(),
            "external backends work on layer names",
        )),
    }
}

/// Cumulative ZoI algorithm (in-process)
#[derive(Debug, Clone, Default)]
pub struct CumulativeZoi;

impl Algorithm for CumulativeZoi {
    type Input = Raster;
    type Output = Vec<ZoiLayer<Raster>>;
    type Params = ZoiConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "CumulativeZoi"
    }

    fn description(&self) -> &'static str {
        "Decay-weighted moving-window sum of features, one layer per radius"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        compute_cumulative(&input, &params)
    }
}
