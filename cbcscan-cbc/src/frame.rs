//! Fixed-size raw event records and the stream decoder that reads them.
//!
//! Record layout (168 bytes, after optional 8-byte word reversal):
//!
//! | Bytes     | Field          |
//! |-----------|----------------|
//! | 1..=3     | bunch counter  |
//! | 5..=7     | orbit counter  |
//! | 9..=11    | lumisection    |
//! | 13..=15   | L1A counter    |
//! | 17..=19   | CBC counter    |
//! | 20, 56, 92, 128 | 36-byte chip blocks 0..=3 |
//!
//! Inside a chip block, bits 0-1 are error bits, the low 14 bits of the
//! first two bytes are the status word, channel bits start at bit 2 of
//! byte 1, and byte 34 carries the stub data.

use crate::bits::{bit_range, byte_range, EndianOrderer};
use crate::{ChipGeneration, DecoderConfig, Error, Result};
use std::io::{ErrorKind, Read};

/// Size of one raw event record in bytes.
pub const RECORD_SIZE: usize = 168;
/// Chip blocks per record.
pub const CHIPS_PER_RECORD: usize = 4;
/// Size of one chip block in bytes.
pub const CHIP_BLOCK_SIZE: usize = 36;
/// Word size used for the optional endian reversal.
pub const ENDIAN_WORD_SIZE: usize = 8;

const CHIP_BLOCK_OFFSETS: [usize; CHIPS_PER_RECORD] = [20, 56, 92, 128];
const STATUS_MASK: u64 = 0x3FFF;
const STUB_BYTE: usize = 34;

/// Decoded contents of one chip block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipEventRecord {
    /// The two error bits.
    pub error_bits: [bool; 2],
    /// 14-bit status word.
    pub status: u16,
    /// One hit flag per strip.
    pub channel_data: Vec<bool>,
    /// Stub byte.
    pub stub_data: u8,
}

impl ChipEventRecord {
    /// Decodes a 36-byte chip block.
    ///
    /// # Errors
    /// Returns a bounds error if `block` is shorter than a chip block.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(block: &[u8], generation: ChipGeneration) -> Result<Self> {
        let errors = bit_range(block, 0, 1)?;
        let status = (byte_range(block, 0, 1)? & STATUS_MASK) as u16;
        // Channel bits are addressed relative to byte 1 of the block.
        let channel_bytes = block.get(1..).unwrap_or_default();
        let mut channel_data = bit_range(channel_bytes, 2, 255)?;
        channel_data.truncate(generation.channel_count());
        let stub_data = byte_range(block, STUB_BYTE, STUB_BYTE)? as u8;

        Ok(Self {
            error_bits: [errors[0], errors[1]],
            status,
            channel_data,
            stub_data,
        })
    }

    /// The 8-bit status code carried in the upper part of the status word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn status_code(&self) -> u8 {
        (self.status >> 6) as u8
    }

    /// Number of strips that fired.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.channel_data.iter().filter(|&&hit| hit).count()
    }
}

/// One decoded raw event: header counters plus four chip blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRecord {
    pub bunch_counter: u32,
    pub orbit_counter: u32,
    pub lumisection: u32,
    pub l1a_counter: u32,
    pub cbc_counter: u32,
    pub chips: [ChipEventRecord; CHIPS_PER_RECORD],
}

impl RawEventRecord {
    /// Decodes one 168-byte record.
    ///
    /// # Errors
    /// Returns [`Error::RecordSize`] if `record` has the wrong length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(record: &[u8], config: &DecoderConfig) -> Result<Self> {
        if record.len() != RECORD_SIZE {
            return Err(Error::RecordSize(record.len()));
        }
        let mut data = [0u8; RECORD_SIZE];
        data.copy_from_slice(record);
        EndianOrderer::disabled(ENDIAN_WORD_SIZE)
            .with_enabled(config.swap_endianness)
            .reorder(&mut data)?;

        // Three-byte fields always fit in 32 bits.
        let counter = |first, last| byte_range(&data, first, last).map(|v| v as u32);

        let chip = |index: usize| {
            let offset = CHIP_BLOCK_OFFSETS[index];
            ChipEventRecord::decode(
                &data[offset..offset + CHIP_BLOCK_SIZE],
                config.chip_generation,
            )
        };

        Ok(Self {
            bunch_counter: counter(1, 3)?,
            orbit_counter: counter(5, 7)?,
            lumisection: counter(9, 11)?,
            l1a_counter: counter(13, 15)?,
            cbc_counter: counter(17, 19)?,
            chips: [chip(0)?, chip(1)?, chip(2)?, chip(3)?],
        })
    }

    /// Returns the chip block at `index`, if it exists.
    #[must_use]
    pub fn chip(&self, index: usize) -> Option<&ChipEventRecord> {
        self.chips.get(index)
    }
}

/// Sequential reader of raw event records.
///
/// The decoder owns its stream and only keeps the stream position between
/// calls. Once a full record can no longer be read it stays exhausted.
pub struct FrameDecoder<R> {
    reader: R,
    config: DecoderConfig,
    exhausted: bool,
    records_read: u64,
}

impl<R: Read> FrameDecoder<R> {
    /// Creates a decoder with the default configuration.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            config: DecoderConfig::default(),
            exhausted: false,
            records_read: 0,
        }
    }

    /// Sets the decoder configuration.
    #[must_use]
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns true once the stream has run out of full records.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of full records consumed so far, including ones that failed
    /// to decode.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Reads and decodes the next record.
    ///
    /// Returns `Ok(None)` at end of stream, including when only a partial
    /// record remains.
    ///
    /// # Errors
    /// An I/O error from the stream exhausts the decoder. A decode error
    /// only affects the current record; the next call continues with the
    /// following one.
    pub fn next_event(&mut self) -> Result<Option<RawEventRecord>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut buffer = [0u8; RECORD_SIZE];
        match read_record(&mut self.reader, &mut buffer) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("end of stream after {} records", self.records_read);
                self.exhausted = true;
                return Ok(None);
            }
            Err(err) => {
                self.exhausted = true;
                return Err(err.into());
            }
        }
        self.records_read += 1;
        RawEventRecord::decode(&buffer, &self.config).map(Some)
    }
}

impl<R: Read> Iterator for FrameDecoder<R> {
    type Item = Result<RawEventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Fills `buffer` completely. Returns `Ok(false)` if the stream ends first.
fn read_record<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds a record with the given header counters and, for each chip, a
    /// list of strips that fired.
    fn build_record(counters: [u32; 5], fired: [&[usize]; 4]) -> Vec<u8> {
        let mut data = vec![0u8; RECORD_SIZE];
        for (field, value) in counters.iter().enumerate() {
            let first = 1 + field * 4;
            data[first..first + 3].copy_from_slice(&value.to_be_bytes()[1..]);
        }
        for (chip, strips) in fired.iter().enumerate() {
            let block = CHIP_BLOCK_OFFSETS[chip];
            for &strip in *strips {
                // Channel bit n lives at block bit 10 + n.
                let bit = 10 + strip;
                data[block + bit / 8] |= 0x80 >> (bit % 8);
            }
        }
        data
    }

    #[test]
    fn test_header_counters() {
        let record = build_record([0x01_0203, 7, 0xFF_FFFF, 12, 99], [&[]; 4]);
        let event = RawEventRecord::decode(&record, &DecoderConfig::default()).unwrap();
        assert_eq!(event.bunch_counter, 0x01_0203);
        assert_eq!(event.orbit_counter, 7);
        assert_eq!(event.lumisection, 0xFF_FFFF);
        assert_eq!(event.l1a_counter, 12);
        assert_eq!(event.cbc_counter, 99);
    }

    #[test]
    fn test_channel_bits_per_chip() {
        let record = build_record([0; 5], [&[0, 5], &[253], &[], &[127, 128]]);
        let event = RawEventRecord::decode(&record, &DecoderConfig::default()).unwrap();

        assert_eq!(event.chips[0].channel_data.len(), 254);
        assert!(event.chips[0].channel_data[0]);
        assert!(event.chips[0].channel_data[5]);
        assert_eq!(event.chips[0].hit_count(), 2);
        assert!(event.chips[1].channel_data[253]);
        assert_eq!(event.chips[2].hit_count(), 0);
        assert_eq!(event.chips[3].hit_count(), 2);
    }

    #[test]
    fn test_cbc1_truncates_channels() {
        let record = build_record([0; 5], [&[127, 128], &[], &[], &[]]);
        let config = DecoderConfig::default().with_chip_generation(ChipGeneration::Cbc1);
        let event = RawEventRecord::decode(&record, &config).unwrap();
        assert_eq!(event.chips[0].channel_data.len(), 128);
        assert_eq!(event.chips[0].hit_count(), 1);
    }

    #[test]
    fn test_error_bits_status_and_stub() {
        let mut record = build_record([0; 5], [&[]; 4]);
        let block = CHIP_BLOCK_OFFSETS[2];
        // error bits 1,0 then status 0b10_1100_1100_0011
        record[block] = 0b1010_1100;
        record[block + 1] = 0b1100_0011;
        record[block + STUB_BYTE] = 0x5A;

        let event = RawEventRecord::decode(&record, &DecoderConfig::default()).unwrap();
        let chip = &event.chips[2];
        assert_eq!(chip.error_bits, [true, false]);
        assert_eq!(chip.status, 0b10_1100_1100_0011);
        assert_eq!(chip.status_code(), 0b1011_0011);
        assert_eq!(chip.stub_data, 0x5A);
    }

    #[test]
    fn test_endian_swap() {
        let plain = build_record([0x00_1234, 0, 0, 0, 0], [&[3]; 4]);
        let mut swapped = plain.clone();
        for word in swapped.chunks_exact_mut(ENDIAN_WORD_SIZE) {
            word.reverse();
        }
        let config = DecoderConfig::default().with_swap_endianness(true);
        let a = RawEventRecord::decode(&plain, &DecoderConfig::default()).unwrap();
        let b = RawEventRecord::decode(&swapped, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_record_size() {
        assert!(matches!(
            RawEventRecord::decode(&[0u8; 100], &DecoderConfig::default()),
            Err(Error::RecordSize(100))
        ));
    }

    #[test]
    fn test_decoder_reads_until_exhausted() {
        let mut stream = build_record([1, 0, 0, 0, 0], [&[]; 4]);
        stream.extend(build_record([2, 0, 0, 0, 0], [&[]; 4]));
        stream.extend([0u8; 40]);

        let mut decoder = FrameDecoder::new(Cursor::new(stream));
        assert_eq!(decoder.next_event().unwrap().unwrap().bunch_counter, 1);
        assert_eq!(decoder.next_event().unwrap().unwrap().bunch_counter, 2);
        assert!(decoder.next_event().unwrap().is_none());
        assert!(decoder.is_exhausted());
        assert!(decoder.next_event().unwrap().is_none());
        assert_eq!(decoder.records_read(), 2);
    }

    #[test]
    fn test_empty_and_truncated_streams() {
        let mut empty = FrameDecoder::new(Cursor::new(Vec::<u8>::new()));
        assert!(empty.next_event().unwrap().is_none());

        let mut short = FrameDecoder::new(Cursor::new(vec![0u8; RECORD_SIZE - 1]));
        assert!(short.next_event().unwrap().is_none());
        assert_eq!(short.count(), 0);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_io_error_fails_fast() {
        let mut decoder = FrameDecoder::new(FailingReader);
        assert!(matches!(decoder.next_event(), Err(Error::IoError(_))));
        assert!(decoder.is_exhausted());
        assert!(decoder.next().is_none());
    }
}
