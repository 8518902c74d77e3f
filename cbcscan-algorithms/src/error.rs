//! Error types for binning and fitting.

use thiserror::Error;

/// Result type for cbcscan-algorithms operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the binning and fitting algorithms.
#[derive(Error, Debug)]
pub enum Error {
    /// No sample thresholds were given.
    #[error("cannot compute binning for zero samples")]
    NoSamples,

    /// A sample threshold is NaN or infinite.
    #[error("sample {index} is not finite: {value}")]
    NonFiniteSample {
        /// Position of the offending sample.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// Sample thresholds are not strictly increasing.
    #[error("sample {index} is not greater than the sample before it")]
    NotStrictlyIncreasing {
        /// Position of the first out-of-order sample.
        index: usize,
    },

    /// Bin edges that do not describe at least one ordered bin.
    #[error("invalid bin edges: {0}")]
    InvalidEdges(String),

    /// A curve with no recorded thresholds cannot be binned or fit.
    #[error("curve has no entries")]
    EmptyCurve,

    /// Fit configuration rejected by the solver.
    #[error("invalid fit configuration: {0}")]
    InvalidConfig(String),
}
