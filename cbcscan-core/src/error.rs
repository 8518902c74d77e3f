//! Error types for cbcscan-core.

use thiserror::Error;

/// Result type alias for cbcscan-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for curve storage and serialization.
#[derive(Error, Debug)]
pub enum Error {
    /// Read-only lookup of a threshold that was never recorded.
    #[error("no entry for threshold {0}")]
    ThresholdNotFound(f64),

    /// Read-only lookup of an index that was never populated.
    #[error("no {level} at index {index}")]
    IndexNotFound { level: &'static str, index: usize },

    /// Strip index beyond what a single chip channel can hold.
    #[error("strip index {index} out of range (maximum {max})")]
    StripOutOfRange { index: usize, max: usize },

    /// Threshold value that cannot be stored (NaN).
    #[error("invalid threshold value: {0}")]
    InvalidThreshold(f64),

    /// Leading type tag of a dump did not match the expected level.
    #[error("format error: expected tag {expected:?}, found {found:?}")]
    TagMismatch {
        expected: &'static str,
        found: String,
    },

    /// Malformed or truncated dump text.
    #[error("format error: {0}")]
    Format(String),

    /// I/O error while reading or writing a dump.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for lookups of never-created indices or thresholds.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ThresholdNotFound(_) | Error::IndexNotFound { .. }
        )
    }

    /// Returns true for errors raised while restoring a dump.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(self, Error::TagMismatch { .. } | Error::Format(_))
    }
}
