//! cbcscan-cbc: CBC raw data decoding.
//!
//! This crate turns raw test-stand dumps and zero-suppressed channel
//! payloads into per-strip hit flags for CBC readout chips.
//!
//! # Key Components
//!
//! - [`bits`] - byte and bit field extraction with optional word reversal
//! - [`ChannelUnpacker`] - sparse `(sample, amplitude)` payload to hit vector
//! - [`FrameDecoder`] - sequential reader of 168-byte event records
//!
//! # Processing Pipeline
//!
//! 1. Read one fixed-size record from the stream
//! 2. Optionally reverse 8-byte words
//! 3. Extract header counters and the four chip blocks

pub mod bits;
mod error;
mod frame;
mod unpacker;

pub use error::{Error, Result};
pub use frame::{
    ChipEventRecord, FrameDecoder, RawEventRecord, CHIPS_PER_RECORD, CHIP_BLOCK_SIZE,
    ENDIAN_WORD_SIZE, RECORD_SIZE,
};
pub use unpacker::{ChannelHits, ChannelSample, ChannelUnpacker, ZeroSuppressedSamples};

use serde::{Deserialize, Serialize};

/// CBC chip generation, which fixes the number of strips per chip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipGeneration {
    /// First generation, 128 strips.
    Cbc1,
    /// Second generation, 254 strips.
    #[default]
    Cbc2,
}

impl ChipGeneration {
    /// Number of strips read out per chip.
    #[must_use]
    pub fn channel_count(self) -> usize {
        match self {
            ChipGeneration::Cbc1 => 128,
            ChipGeneration::Cbc2 => 254,
        }
    }
}

/// Decoder settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Chip generation of every chip in the record.
    pub chip_generation: ChipGeneration,
    /// Reverse each 8-byte word before extracting fields.
    pub swap_endianness: bool,
}

impl DecoderConfig {
    /// Sets the chip generation.
    #[must_use]
    pub fn with_chip_generation(mut self, generation: ChipGeneration) -> Self {
        self.chip_generation = generation;
        self
    }

    /// Enables or disables 8-byte word reversal.
    #[must_use]
    pub fn with_swap_endianness(mut self, swap: bool) -> Self {
        self.swap_endianness = swap;
        self
    }

    /// Channel unpacker matching this configuration.
    #[must_use]
    pub fn unpacker(&self) -> ChannelUnpacker {
        ChannelUnpacker::new(self.chip_generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.chip_generation, ChipGeneration::Cbc2);
        assert!(!config.swap_endianness);
        assert_eq!(config.unpacker().channel_count(), 254);
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(ChipGeneration::Cbc1.channel_count(), 128);
        assert_eq!(ChipGeneration::Cbc2.channel_count(), 254);
    }

    #[test]
    fn test_json_partial_config() {
        let config: DecoderConfig = serde_json::from_str(r#"{ "chip_generation": "cbc1" }"#)
            .expect("Should parse partial config");
        assert_eq!(config.chip_generation, ChipGeneration::Cbc1);
        assert!(!config.swap_endianness);
    }

    #[test]
    fn test_json_unknown_generation_rejected() {
        let result: std::result::Result<DecoderConfig, _> =
            serde_json::from_str(r#"{ "chip_generation": "cbc9" }"#);
        assert!(result.is_err());
    }
}
