//! Session state files.
//!
//! A state file is the detector dump followed by the trim offsets and the
//! event and run counters:
//!
//! ```text
//! DetectorSCurves 1 42 FedSCurves ... stripThresholdOffsets_ 128 0 0 ... 1200 3
//! ```

use crate::trim::TrimOffsets;
use crate::{Error, Result};
use cbcscan_core::{DetectorCurves, Dump, TokenReader};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

const OFFSETS_TAG: &str = "stripThresholdOffsets_";

/// Everything a session persists between runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    /// Accumulated curves.
    pub curves: DetectorCurves,
    /// Per-strip threshold offsets.
    pub trim_offsets: TrimOffsets,
    /// Events analysed since the counters were last cleared.
    pub events_processed: u64,
    /// Completed runs.
    pub runs_processed: u64,
}

impl SessionState {
    /// Returns the text representation.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Formatting into a String does not fail.
        self.write_text(&mut out).map(|()| out).unwrap_or_default()
    }

    /// Writes the text representation to `out`.
    ///
    /// # Errors
    /// Returns the sink's error if a write is rejected.
    pub fn write_text<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.curves.write_dump(out)?;
        let offsets = self.trim_offsets.as_slice();
        write!(out, "{OFFSETS_TAG} {} ", offsets.len())?;
        for offset in offsets {
            write!(out, "{offset} ")?;
        }
        write!(out, "{} {} ", self.events_processed, self.runs_processed)
    }

    /// Parses a state file's text.
    ///
    /// # Errors
    /// Returns a format error if any section is missing or malformed.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut tokens = TokenReader::new(text);
        let curves = DetectorCurves::read_dump(&mut tokens)?;

        tokens.expect_tag(OFFSETS_TAG)?;
        let count: usize = tokens.parse("offset count")?;
        let mut offsets = Vec::with_capacity(count.min(crate::TRIM_CHANNELS));
        for _ in 0..count {
            offsets.push(tokens.parse::<u8>("threshold offset")?);
        }
        let trim_offsets = TrimOffsets::from_values(offsets)?;

        let events_processed = tokens.parse("events processed")?;
        let runs_processed = tokens.parse("runs processed")?;
        Ok(Self {
            curves,
            trim_offsets,
            events_processed,
            runs_processed,
        })
    }

    /// Writes the state to `path`, replacing any previous contents.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Reads the state from `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist or holds only
    /// whitespace, which is how a finished job leaves it.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a format error
    /// if it is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Io(err)),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        Self::from_text(&text).map(Some)
    }

    /// Truncates the state file so the next job starts fresh.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be truncated.
    pub fn truncate<P: AsRef<Path>>(path: P) -> Result<()> {
        fs::write(path, "")?;
        Ok(())
    }
}
