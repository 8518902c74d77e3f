//! Byte and bit field extraction from raw buffers.
//!
//! Bytes compose big-endian; bits are numbered most-significant first
//! within each byte, continuing across byte boundaries.

use crate::{Error, Result};

/// Reads the inclusive byte range `first..=last` as a big-endian integer.
///
/// The bounds are swapped if `first > last`.
///
/// # Errors
/// Returns [`Error::ByteRangeOutOfBounds`] if the range leaves the buffer and
/// [`Error::ByteRangeTooWide`] if it spans more than 8 bytes.
pub fn byte_range(buffer: &[u8], first: usize, last: usize) -> Result<u64> {
    let (first, last) = if first > last {
        (last, first)
    } else {
        (first, last)
    };
    let bytes = buffer
        .get(first..=last)
        .ok_or(Error::ByteRangeOutOfBounds {
            first,
            last,
            len: buffer.len(),
        })?;
    if bytes.len() > 8 {
        return Err(Error::ByteRangeTooWide { first, last });
    }
    Ok(bytes
        .iter()
        .fold(0u64, |value, &byte| (value << 8) | u64::from(byte)))
}

/// Reads the inclusive bit range `first_bit..=last_bit`, bit 0 being the
/// most significant bit of `buffer[0]`.
///
/// The bounds are swapped if `first_bit > last_bit`.
///
/// # Errors
/// Returns [`Error::BitRangeOutOfBounds`] if the range leaves the buffer.
pub fn bit_range(buffer: &[u8], first_bit: usize, last_bit: usize) -> Result<Vec<bool>> {
    let (first, last) = if first_bit > last_bit {
        (last_bit, first_bit)
    } else {
        (first_bit, last_bit)
    };
    if last / 8 >= buffer.len() {
        return Err(Error::BitRangeOutOfBounds {
            first,
            last,
            len: buffer.len(),
        });
    }
    Ok((first..=last)
        .map(|bit| buffer[bit / 8] & (0x80 >> (bit % 8)) != 0)
        .collect())
}

/// Optional fixed-size word reversal applied to a buffer before fields are
/// extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndianOrderer {
    word_size: usize,
    enabled: bool,
}

impl EndianOrderer {
    /// Creates an orderer that reverses each `word_size`-byte word.
    #[must_use]
    pub fn new(word_size: usize) -> Self {
        Self {
            word_size,
            enabled: true,
        }
    }

    /// Creates an orderer that leaves buffers untouched.
    #[must_use]
    pub fn disabled(word_size: usize) -> Self {
        Self {
            word_size,
            enabled: false,
        }
    }

    /// Switches reversal on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if [`reorder`](Self::reorder) changes buffers.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Word size in bytes.
    #[must_use]
    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Reverses the byte order of every word in place. Does nothing when
    /// disabled.
    ///
    /// # Errors
    /// Returns [`Error::WordSizeMismatch`] if the buffer is not a whole
    /// number of words (or the word size is zero).
    pub fn reorder(&self, data: &mut [u8]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.word_size == 0 || data.len() % self.word_size != 0 {
            return Err(Error::WordSizeMismatch {
                len: data.len(),
                word_size: self.word_size,
            });
        }
        data.chunks_exact_mut(self.word_size)
            .for_each(<[u8]>::reverse);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(byte_range(&data, 0, 0).unwrap(), 0x12);
        assert_eq!(byte_range(&data, 1, 3).unwrap(), 0x34_5678);
        assert_eq!(byte_range(&data, 0, 3).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_byte_range_swapped_bounds() {
        let data = [0xAB, 0xCD, 0xEF];
        assert_eq!(
            byte_range(&data, 2, 0).unwrap(),
            byte_range(&data, 0, 2).unwrap()
        );
    }

    #[test]
    fn test_byte_range_out_of_bounds() {
        let data = [0u8; 4];
        assert!(matches!(
            byte_range(&data, 2, 4),
            Err(Error::ByteRangeOutOfBounds { len: 4, .. })
        ));
        assert!(byte_range(&[], 0, 0).is_err());
    }

    #[test]
    fn test_byte_range_too_wide() {
        let data = [0u8; 16];
        assert!(byte_range(&data, 0, 7).is_ok());
        assert!(matches!(
            byte_range(&data, 0, 8),
            Err(Error::ByteRangeTooWide { .. })
        ));
    }

    #[test]
    fn test_bit_range_msb_first() {
        let data = [0b1010_0000, 0b0000_0001];
        assert_eq!(bit_range(&data, 0, 3).unwrap(), vec![true, false, true, false]);
        assert_eq!(bit_range(&data, 15, 15).unwrap(), vec![true]);
    }

    #[test]
    fn test_bit_range_spans_bytes() {
        let data = [0b0000_0011, 0b1100_0000];
        assert_eq!(
            bit_range(&data, 5, 10).unwrap(),
            vec![false, true, true, true, true, false]
        );
        assert_eq!(bit_range(&data, 10, 5).unwrap(), bit_range(&data, 5, 10).unwrap());
    }

    #[test]
    fn test_bit_range_out_of_bounds() {
        let data = [0xFFu8; 2];
        assert!(bit_range(&data, 0, 15).is_ok());
        assert!(matches!(
            bit_range(&data, 8, 16),
            Err(Error::BitRangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_endian_reorder() {
        let mut data: Vec<u8> = (0..16).collect();
        EndianOrderer::new(8).reorder(&mut data).unwrap();
        assert_eq!(&data[..8], &[7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(&data[8..], &[15, 14, 13, 12, 11, 10, 9, 8]);
    }

    #[test]
    fn test_endian_disabled_is_noop() {
        let mut data = vec![1, 2, 3];
        EndianOrderer::disabled(8).reorder(&mut data).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert!(!EndianOrderer::new(8).with_enabled(false).is_enabled());
    }

    #[test]
    fn test_endian_partial_word_rejected() {
        let mut data = vec![0u8; 12];
        assert!(matches!(
            EndianOrderer::new(8).reorder(&mut data),
            Err(Error::WordSizeMismatch { len: 12, word_size: 8 })
        ));
        assert!(EndianOrderer::new(0).reorder(&mut data).is_err());
    }
}
