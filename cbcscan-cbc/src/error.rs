//! CBC decoding error types.

use thiserror::Error;

/// Result type for CBC decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding raw CBC data.
///
/// Apart from [`Error::IoError`], these are scoped to the record or channel
/// being decoded; callers skip that unit and carry on with the next.
#[derive(Error, Debug)]
pub enum Error {
    /// Byte range reaches past the end of the buffer.
    #[error("byte range {first}..={last} outside buffer of {len} bytes")]
    ByteRangeOutOfBounds {
        first: usize,
        last: usize,
        len: usize,
    },

    /// Byte range does not fit in a 64-bit value.
    #[error("byte range {first}..={last} is wider than 8 bytes")]
    ByteRangeTooWide { first: usize, last: usize },

    /// Bit range reaches past the end of the buffer.
    #[error("bit range {first}..={last} outside buffer of {len} bytes")]
    BitRangeOutOfBounds {
        first: usize,
        last: usize,
        len: usize,
    },

    /// Buffer cannot be split into whole words for endian reversal.
    #[error("buffer of {len} bytes is not a multiple of the {word_size}-byte word size")]
    WordSizeMismatch { len: usize, word_size: usize },

    /// Record slice of the wrong length.
    #[error("record has {0} bytes, expected {expected}", expected = crate::RECORD_SIZE)]
    RecordSize(usize),

    /// Zero-suppressed sample addressed outside the channel.
    #[error("sample index {index} outside channel of {len} strips")]
    SampleOutOfRange { index: usize, len: usize },

    /// Zero-suppressed cluster header or body runs past the payload.
    #[error("cluster at payload offset {offset} runs past end of {len}-byte payload")]
    TruncatedCluster { offset: usize, len: usize },

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
