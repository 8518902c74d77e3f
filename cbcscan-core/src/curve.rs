//! Threshold-indexed efficiency curves.

use crate::dump::{Dump, TokenReader};
use crate::{Error, Result, ThresholdCurveEntry};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Threshold value usable as an ordered map key.
///
/// Ordering follows [`f64::total_cmp`] with `-0.0` folded onto `0.0`, so
/// two thresholds are the same key exactly when they compare equal by value.
#[derive(Debug, Clone, Copy)]
struct ThresholdKey(f64);

impl ThresholdKey {
    fn new(threshold: f64) -> Self {
        // Adding 0.0 maps -0.0 to +0.0 and leaves every other value alone.
        Self(threshold + 0.0)
    }
}

impl PartialEq for ThresholdKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ThresholdKey {}

impl PartialOrd for ThresholdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ThresholdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sparse mapping from threshold to on/off counters for one strip.
///
/// Entries are created on first mutable access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdCurve {
    entries: BTreeMap<ThresholdKey, ThresholdCurveEntry>,
}

impl ThresholdCurve {
    /// Creates an empty curve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `threshold`, creating an empty one if absent.
    pub fn entry_mut(&mut self, threshold: f64) -> &mut ThresholdCurveEntry {
        self.entries.entry(ThresholdKey::new(threshold)).or_default()
    }

    /// Returns the entry for `threshold`.
    ///
    /// # Errors
    /// Returns [`Error::ThresholdNotFound`] if nothing was recorded there.
    pub fn entry(&self, threshold: f64) -> Result<&ThresholdCurveEntry> {
        self.get(threshold)
            .ok_or(Error::ThresholdNotFound(threshold))
    }

    /// Returns the entry for `threshold` if it exists.
    #[must_use]
    pub fn get(&self, threshold: f64) -> Option<&ThresholdCurveEntry> {
        self.entries.get(&ThresholdKey::new(threshold))
    }

    /// Records one event at `threshold`.
    pub fn record(&mut self, threshold: f64, hit: bool) {
        self.entry_mut(threshold).record(hit);
    }

    /// Populated thresholds in ascending order.
    #[must_use]
    pub fn valid_thresholds(&self) -> Vec<f64> {
        self.entries.keys().map(|key| key.0).collect()
    }

    /// Iterates `(threshold, entry)` pairs in ascending threshold order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &ThresholdCurveEntry)> {
        self.entries.iter().map(|(key, entry)| (key.0, entry))
    }

    /// Number of populated thresholds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no threshold was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of events recorded across all thresholds.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.entries.values().map(ThresholdCurveEntry::total).sum()
    }
}

impl Dump for ThresholdCurveEntry {
    const TAG: &'static str = "SCE";

    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{} {} {} ",
            Self::TAG,
            self.events_on(),
            self.events_off()
        )
    }

    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self> {
        tokens.expect_tag(Self::TAG)?;
        let events_on = tokens.parse("events on")?;
        let events_off = tokens.parse("events off")?;
        Ok(Self::new(events_on, events_off))
    }
}

impl Dump for ThresholdCurve {
    const TAG: &'static str = "SCurve";

    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "{} {} ", Self::TAG, self.entries.len())?;
        for (threshold, entry) in self.iter() {
            // Display for f64 prints the shortest text that parses back exactly.
            write!(out, "{threshold} ")?;
            entry.write_dump(out)?;
        }
        Ok(())
    }

    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self> {
        tokens.expect_tag(Self::TAG)?;
        let count: usize = tokens.parse("entry count")?;
        let mut curve = Self::new();
        for _ in 0..count {
            let threshold: f64 = tokens.parse("threshold")?;
            let entry = ThresholdCurveEntry::read_dump(tokens)?;
            if curve
                .entries
                .insert(ThresholdKey::new(threshold), entry)
                .is_some()
            {
                return Err(Error::Format(format!(
                    "duplicate threshold {threshold} in {}",
                    Self::TAG
                )));
            }
        }
        Ok(curve)
    }
}
