//! Per-strip threshold trim values.
//!
//! Trim files list chip register settings, one per line:
//!
//! ```text
//! # name     page  address  value
//! Channel5   0x01  0x05     0x7F
//! VCth       0x00  0x0C     0x78   * not a strip register, ignored
//! ```
//!
//! Only `ChannelN` rows are used. Text after `#` or `*` is a comment.

use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Number of strips carrying a trim value.
pub const TRIM_CHANNELS: usize = 128;

const CHANNEL_PREFIX: &str = "Channel";

/// Threshold offset for each strip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrimOffsets {
    offsets: Vec<u8>,
}

impl Default for TrimOffsets {
    fn default() -> Self {
        Self {
            offsets: vec![0; TRIM_CHANNELS],
        }
    }
}

/// Outcome of applying a trim file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimSummary {
    /// Channel rows applied.
    pub applied: usize,
    /// Lines that could not be parsed.
    pub rejected: usize,
}

impl TrimOffsets {
    /// All offsets zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds offsets from stored values, padding with zeros.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for more than [`TRIM_CHANNELS`] values.
    pub fn from_values(mut offsets: Vec<u8>) -> Result<Self> {
        if offsets.len() > TRIM_CHANNELS {
            return Err(Error::InvalidFormat(format!(
                "{} trim offsets, at most {TRIM_CHANNELS} allowed",
                offsets.len()
            )));
        }
        offsets.resize(TRIM_CHANNELS, 0);
        Ok(Self { offsets })
    }

    /// Offset for `channel`, if it is a trimmed strip.
    #[must_use]
    pub fn get(&self, channel: usize) -> Option<u8> {
        self.offsets.get(channel).copied()
    }

    /// All offsets in strip order.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.offsets
    }

    /// Applies every `ChannelN` row of `text`.
    ///
    /// Malformed lines are logged and skipped; the rest still apply.
    pub fn apply_text(&mut self, text: &str) -> TrimSummary {
        let mut summary = TrimSummary::default();
        for (number, line) in text.lines().enumerate() {
            match parse_line(line) {
                Ok(Some((channel, value))) => {
                    self.offsets[channel] = value;
                    summary.applied += 1;
                }
                Ok(None) => {}
                Err(reason) => {
                    log::warn!("trim line {}: {reason}: {line:?}", number + 1);
                    summary.rejected += 1;
                }
            }
        }
        summary
    }

    /// Reads a trim file and applies it.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read. Bad lines are not
    /// errors, see [`apply_text`](Self::apply_text).
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<TrimSummary> {
        let text = fs::read_to_string(path)?;
        Ok(self.apply_text(&text))
    }
}

/// Parses one line. `Ok(None)` for blank lines and non-channel registers.
fn parse_line(line: &str) -> std::result::Result<Option<(usize, u8)>, String> {
    let content = line.split(['#', '*']).next().unwrap_or_default();
    let columns: Vec<&str> = content.split_whitespace().collect();
    if columns.is_empty() {
        return Ok(None);
    }
    if columns.len() != 4 {
        return Err(format!("expected 4 columns, found {}", columns.len()));
    }
    let Some(number) = columns[0].strip_prefix(CHANNEL_PREFIX) else {
        return Ok(None);
    };
    let channel: usize = number
        .parse()
        .map_err(|_| format!("invalid channel number {number:?}"))?;
    if channel >= TRIM_CHANNELS {
        return Err(format!("unknown channel number {channel}"));
    }
    let value = parse_hex(columns[3]).ok_or_else(|| format!("invalid value {:?}", columns[3]))?;
    Ok(Some((channel, value)))
}

fn parse_hex(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_rows() {
        let text = "\
# register dump
Channel0   0x01 0x01 0x50
Channel127 0x01 0x80 FF   * last strip

VCth       0x00 0x0C 0x78
";
        let mut trim = TrimOffsets::new();
        let summary = trim.apply_text(text);
        assert_eq!(summary, TrimSummary { applied: 2, rejected: 0 });
        assert_eq!(trim.get(0), Some(0x50));
        assert_eq!(trim.get(127), Some(0xFF));
        assert_eq!(trim.get(1), Some(0));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let text = "\
Channel3 0x01 0x03 0x10
Channel128 0x01 0x80 0x10
Channel4 0x01 0x04
Channelx 0x01 0x04 0x10
Channel5 0x01 0x05 0x1FF
Channel6 0x01 0x06 0x22
";
        let mut trim = TrimOffsets::new();
        let summary = trim.apply_text(text);
        assert_eq!(summary, TrimSummary { applied: 2, rejected: 4 });
        assert_eq!(trim.get(3), Some(0x10));
        assert_eq!(trim.get(6), Some(0x22));
        assert_eq!(trim.get(5), Some(0));
    }

    #[test]
    fn test_from_values_pads() {
        let trim = TrimOffsets::from_values(vec![1, 2, 3]).unwrap();
        assert_eq!(trim.as_slice().len(), TRIM_CHANNELS);
        assert_eq!(&trim.as_slice()[..4], &[1, 2, 3, 0]);
        assert!(TrimOffsets::from_values(vec![0; TRIM_CHANNELS + 1]).is_err());
    }

    #[test]
    fn test_missing_file() {
        let mut trim = TrimOffsets::new();
        assert!(matches!(
            trim.load_file("/nonexistent/cbcscan/trim.txt"),
            Err(Error::Io(_))
        ));
    }
}
