//! Error types for SurfWAT

use thiserror::Error;

/// Main error type for SurfWAT operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Time dimension mismatch: expected {expected} steps, got {actual}")]
    TimeMismatch { expected: usize, actual: usize },

    #[error("Malformed flow network: {reason}")]
    MalformedFlowNetwork { reason: String },

    #[error("No river network found: {0}")]
    NoRiverNetworkFound(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::MalformedFlowNetwork`]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedFlowNetwork {
            reason: reason.into(),
        }
    }
}

/// Result type alias for SurfWAT operations
pub type Result<T> = std::result::Result<T, Error>;
