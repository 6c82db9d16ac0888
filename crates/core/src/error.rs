//! Error types for zone-of-influence computations

use thiserror::Error;

/// Main error type for ZoI operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown decay shape: {0}")]
    UnknownShape(String),

    #[error("Shape '{shape}' is not supported by external module {module}")]
    InvalidShape { module: String, shape: String },

    #[error("External backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("External module {module} failed: {reason}")]
    BackendFailed { module: String, reason: String },

    #[error("External module {module} did not finish within {seconds} s")]
    BackendTimeout { module: String, seconds: u64 },

    #[error("Filter matrix must be square with odd side length, got {rows}x{cols}")]
    DimensionMismatch { rows: usize, cols: usize },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for ZoI operations
pub type Result<T> = std::result::Result<T, Error>;
