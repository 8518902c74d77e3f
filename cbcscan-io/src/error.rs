//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Invalid analysis configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parse or write error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Curve storage or dump error.
    #[error("core error: {0}")]
    CoreError(#[from] cbcscan_core::Error),

    /// Raw data decoding error.
    #[error("decode error: {0}")]
    DecodeError(#[from] cbcscan_cbc::Error),

    /// Binning or fitting error.
    #[error("analysis error: {0}")]
    AnalysisError(#[from] cbcscan_algorithms::Error),
}
