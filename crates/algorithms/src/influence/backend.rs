//! External GIS backend for windowed sums
//!
//! Filters can be applied by a GRASS GIS module instead of in-process.
//! The contract is explicit: a [`Session`] describes the GRASS database,
//! mapset and region the caller has prepared; a typed [`ModuleRequest`]
//! describes one module call; a [`FilterBackend`] executes requests and
//! returns [`LayerHandle`]s naming rasters inside that mapset.
//!
//! Supported modules:
//!
//! | module            | shapes                                   |
//! |-------------------|------------------------------------------|
//! | `r.mfilter`       | all                                      |
//! | `r.resamp.filter` | gaussian (gauss,box), rectangle (box)     |
//! | `r.neighbors`     | threshold, circle, rectangle             |

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;
use zoi_core::{Error, Result};

use super::decay::DecayShape;
use super::filter::{OutputMode, WeightMatrix};

/// External module applying a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalModule {
    /// `r.mfilter` with an exported filter file
    #[serde(rename = "mfilter", alias = "r.mfilter")]
    MFilter,
    /// `r.resamp.filter` with a named analytic kernel
    #[serde(rename = "resamp_filter", alias = "r.resamp.filter")]
    ResampFilter,
    /// `r.neighbors` sum/average over a square or circular window
    #[serde(rename = "neighbors", alias = "r.neighbors")]
    Neighbors,
}

impl ExternalModule {
    pub fn name(&self) -> &'static str {
        match self {
            ExternalModule::MFilter => "r.mfilter",
            ExternalModule::ResampFilter => "r.resamp.filter",
            ExternalModule::Neighbors => "r.neighbors",
        }
    }

    pub fn supports(&self, shape: DecayShape) -> bool {
        match self {
            ExternalModule::MFilter => true,
            ExternalModule::ResampFilter => matches!(shape, DecayShape::Gaussian | DecayShape::Rectangular),
            ExternalModule::Neighbors => matches!(
                shape,
                DecayShape::Threshold | DecayShape::Circular | DecayShape::Rectangular
            ),
        }
    }

    /// Fail with [`Error::InvalidShape`] when `shape` is not supported
    pub fn check_shape(&self, shape: DecayShape) -> Result<()> {
        if self.supports(shape) {
            Ok(())
        } else {
            Err(Error::InvalidShape {
                module: self.name().to_string(),
                shape: shape.to_string(),
            })
        }
    }

    /// Request applying `filter` to raster `input`, writing raster `output`.
    ///
    /// For `r.mfilter` the filter is exported to the session's scratch
    /// directory first; the returned [`PreparedRequest`] owns that file.
    pub fn prepare(
        &self,
        input: &str,
        output: &str,
        filter: &WeightMatrix,
        session: &Session,
    ) -> Result<PreparedRequest> {
        self.check_shape(filter.shape())?;

        match self {
            ExternalModule::MFilter => {
                let path = session.scratch_dir().join(format!("{}.filter", output));
                filter.write_mfilter(&path, output)?;
                Ok(PreparedRequest {
                    request: ModuleRequest::MFilter {
                        input: input.to_string(),
                        output: output.to_string(),
                        filter: path.clone(),
                    },
                    filter_file: Some(path),
                    rescale: None,
                })
            }
            ExternalModule::ResampFilter => {
                let kernels = resamp_kernels(filter)?;
                // r.resamp.filter always returns a weighted mean
                let rescale = match filter.mode() {
                    OutputMode::Density => None,
                    OutputMode::CumulativeZoi => Some(filter.sum()),
                };
                Ok(PreparedRequest {
                    request: ModuleRequest::ResampFilter {
                        input: input.to_string(),
                        output: output.to_string(),
                        kernels,
                    },
                    filter_file: None,
                    rescale,
                })
            }
            ExternalModule::Neighbors => {
                let method = match filter.mode() {
                    OutputMode::CumulativeZoi => NeighborMethod::Sum,
                    OutputMode::Density => NeighborMethod::Average,
                };
                Ok(PreparedRequest {
                    request: ModuleRequest::Neighbors {
                        input: input.to_string(),
                        output: output.to_string(),
                        method,
                        size: filter.side(),
                        circular: filter.shape() != DecayShape::Rectangular,
                    },
                    filter_file: None,
                    rescale: None,
                })
            }
        }
    }
}

/// Kernels understood by `r.resamp.filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampKernel {
    Gauss,
    Box,
}

impl ResampKernel {
    pub fn name(&self) -> &'static str {
        match self {
            ResampKernel::Gauss => "gauss",
            ResampKernel::Box => "box",
        }
    }
}

/// `r.resamp.filter` kernels reproducing `filter` over its own square.
///
/// The module evaluates `gauss` as `exp(-x²/2)` with `x = d / radius`, so
/// the radius is the standard deviation `1/sqrt(2λ)` of the filter's
/// `exp(-λd²)`. A `box` kernel reaching the outer ring of cells and no
/// further bounds the window to the filter's `(2h+1)²` square.
fn resamp_kernels(filter: &WeightMatrix) -> Result<Vec<(ResampKernel, f64)>> {
    let window = (filter.half_width() as f64 + 0.5) * filter.resolution();
    match filter.shape() {
        DecayShape::Gaussian => {
            let rate = filter.rate().ok_or_else(|| {
                Error::invalid("origin", "non-zero", "r.resamp.filter needs a Gaussian centred on the feature")
            })?;
            let sigma = 1.0 / (2.0 * rate).sqrt();
            Ok(vec![(ResampKernel::Gauss, sigma), (ResampKernel::Box, window)])
        }
        DecayShape::Rectangular => Ok(vec![(ResampKernel::Box, window)]),
        shape => Err(Error::InvalidShape {
            module: ExternalModule::ResampFilter.name().to_string(),
            shape: shape.to_string(),
        }),
    }
}

/// Aggregates of `r.neighbors`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborMethod {
    Sum,
    Average,
}

impl NeighborMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NeighborMethod::Sum => "sum",
            NeighborMethod::Average => "average",
        }
    }
}

/// One module invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleRequest {
    MFilter {
        input: String,
        output: String,
        filter: PathBuf,
    },
    ResampFilter {
        input: String,
        output: String,
        /// Kernels with their radii, multiplied together by the module
        kernels: Vec<(ResampKernel, f64)>,
    },
    Neighbors {
        input: String,
        output: String,
        method: NeighborMethod,
        size: usize,
        circular: bool,
    },
    MapCalc {
        output: String,
        expression: String,
    },
}

impl ModuleRequest {
    pub fn module_name(&self) -> &'static str {
        match self {
            ModuleRequest::MFilter { .. } => "r.mfilter",
            ModuleRequest::ResampFilter { .. } => "r.resamp.filter",
            ModuleRequest::Neighbors { .. } => "r.neighbors",
            ModuleRequest::MapCalc { .. } => "r.mapcalc",
        }
    }

    /// Raster written by the request
    pub fn output(&self) -> &str {
        match self {
            ModuleRequest::MFilter { output, .. }
            | ModuleRequest::ResampFilter { output, .. }
            | ModuleRequest::Neighbors { output, .. }
            | ModuleRequest::MapCalc { output, .. } => output,
        }
    }

    /// Command-line arguments (`key=value` pairs, then flags)
    pub fn to_args(&self) -> Vec<String> {
        let mut args = match self {
            ModuleRequest::MFilter { input, output, filter } => vec![
                format!("input={}", input),
                format!("output={}", output),
                format!("filter={}", filter.display()),
            ],
            ModuleRequest::ResampFilter { input, output, kernels } => {
                let names: Vec<&str> = kernels.iter().map(|(k, _)| k.name()).collect();
                let radii: Vec<String> = kernels.iter().map(|(_, r)| r.to_string()).collect();
                vec![
                    format!("input={}", input),
                    format!("output={}", output),
                    format!("filter={}", names.join(",")),
                    format!("radius={}", radii.join(",")),
                ]
            }
            ModuleRequest::Neighbors {
                input,
                output,
                method,
                size,
                circular,
            } => {
                let mut a = vec![
                    format!("input={}", input),
                    format!("output={}", output),
                    format!("method={}", method.name()),
                    format!("size={}", size),
                ];
                if *circular {
                    a.push("-c".to_string());
                }
                a
            }
            ModuleRequest::MapCalc { output, expression } => {
                vec![format!("expression={} = {}", output, expression)]
            }
        };
        args.push("--overwrite".to_string());
        args
    }
}

/// A request plus the artefacts it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub request: ModuleRequest,
    /// Exported filter file to delete after the call
    pub filter_file: Option<PathBuf>,
    /// Factor turning the module's weighted mean into a cumulative sum
    pub rescale: Option<f64>,
}

/// Name of a raster inside the external session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerHandle(String);

impl LayerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit external session context.
///
/// The caller prepares the mapset and its computational region; the
/// session only records where it is and at which resolution it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub gisdbase: PathBuf,
    pub location: String,
    pub mapset: String,
    /// Cell size of the active region (map units)
    pub resolution: f64,
    /// Directory for exported filter files
    pub scratch_dir: Option<PathBuf>,
    /// Per-call time limit; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// GRASS launcher
    pub executable: PathBuf,
}

impl Session {
    pub fn new(
        gisdbase: impl Into<PathBuf>,
        location: impl Into<String>,
        mapset: impl Into<String>,
        resolution: f64,
    ) -> Self {
        Self {
            gisdbase: gisdbase.into(),
            location: location.into(),
            mapset: mapset.into(),
            resolution,
            scratch_dir: None,
            timeout: None,
            executable: PathBuf::from("grass"),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_executable(mut self, exe: impl Into<PathBuf>) -> Self {
        self.executable = exe.into();
        self
    }

    pub fn mapset_path(&self) -> PathBuf {
        self.gisdbase.join(&self.location).join(&self.mapset)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Executes module requests against an external session
pub trait FilterBackend {
    /// Whether `session` can accept calls
    fn is_available(&self, session: &Session) -> bool;

    /// Run one request synchronously; returns the handle of its output
    fn invoke(&self, session: &Session, request: &ModuleRequest) -> Result<LayerHandle>;

    /// Delete rasters from the session
    fn remove(&self, session: &Session, handles: &[LayerHandle]) -> Result<()>;
}

/// Backend running modules through the `grass --exec` launcher
#[derive(Debug, Clone, Copy, Default)]
pub struct GrassCli;

impl GrassCli {
    fn run(&self, session: &Session, module: &str, args: &[String]) -> Result<()> {
        let mut cmd = Command::new(&session.executable);
        cmd.arg(session.mapset_path())
            .arg("--exec")
            .arg(module)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(module, ?args, "invoking external module");

        let mut child = cmd.spawn().map_err(|e| {
            Error::BackendUnavailable(format!("cannot launch {}: {}", session.executable.display(), e))
        })?;

        let stderr = child.stderr.take();
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut s) = stderr {
                let _ = s.read_to_string(&mut buf);
            }
            buf
        });

        let status = match session.timeout {
            Some(limit) => wait_with_timeout(&mut child, limit, module)?,
            None => child.wait()?,
        };
        let message = reader.join().unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let reason = match message.trim() {
                "" => status.to_string(),
                msg => msg.to_string(),
            };
            Err(Error::BackendFailed {
                module: module.to_string(),
                reason,
            })
        }
    }
}

fn wait_with_timeout(child: &mut Child, limit: Duration, module: &str) -> Result<ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::BackendTimeout {
                module: module.to_string(),
                seconds: limit.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

impl FilterBackend for GrassCli {
    fn is_available(&self, session: &Session) -> bool {
        session.mapset_path().is_dir()
    }

    fn invoke(&self, session: &Session, request: &ModuleRequest) -> Result<LayerHandle> {
        self.run(session, request.module_name(), &request.to_args())?;
        Ok(LayerHandle::new(request.output()))
    }

    fn remove(&self, session: &Session, handles: &[LayerHandle]) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = handles.iter().map(LayerHandle::name).collect();
        let args = vec![
            "type=raster".to_string(),
            format!("name={}", names.join(",")),
            "-f".to_string(),
        ];
        self.run(session, "g.remove", &args)
    }
}

/// Delete an exported filter file, logging instead of failing
pub(crate) fn discard_filter_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "could not remove filter file");
    }
}
