//! Nested curve containers: strips within a chip channel, channels within a
//! FED, FEDs within the detector.
//!
//! Only touched indices exist. Every level lists its populated indices in
//! ascending order without duplicates.

use crate::dump::{read_indexed, write_indexed, Dump, TokenReader};
use crate::{Error, Result, ThresholdCurve};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of strips a single chip channel can hold.
pub const MAX_STRIPS: usize = 256;

/// Curves for the strips of one chip, keyed by strip index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCurves {
    strips: BTreeMap<usize, ThresholdCurve>,
}

impl ChannelCurves {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the curve for `strip`, creating it if absent.
    ///
    /// # Errors
    /// Returns [`Error::StripOutOfRange`] if `strip >= MAX_STRIPS`.
    pub fn strip_mut(&mut self, strip: usize) -> Result<&mut ThresholdCurve> {
        if strip >= MAX_STRIPS {
            return Err(Error::StripOutOfRange {
                index: strip,
                max: MAX_STRIPS,
            });
        }
        Ok(self.strips.entry(strip).or_default())
    }

    /// Returns the curve for `strip`.
    ///
    /// # Errors
    /// Returns [`Error::IndexNotFound`] if the strip was never touched.
    pub fn strip(&self, strip: usize) -> Result<&ThresholdCurve> {
        self.strips.get(&strip).ok_or(Error::IndexNotFound {
            level: "strip",
            index: strip,
        })
    }

    /// Populated strip indices in ascending order.
    #[must_use]
    pub fn valid_strip_indices(&self) -> Vec<usize> {
        self.strips.keys().copied().collect()
    }

    /// Iterates `(strip, curve)` pairs in ascending strip order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ThresholdCurve)> {
        self.strips.iter().map(|(&strip, curve)| (strip, curve))
    }

    /// Number of populated strips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strips.len()
    }

    /// Returns true if no strip was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}

/// Channel containers of one FED, keyed by FED channel index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChipCurves {
    channels: BTreeMap<usize, ChannelCurves>,
}

impl ChipCurves {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the container for `channel`, creating it if absent.
    pub fn channel_mut(&mut self, channel: usize) -> &mut ChannelCurves {
        self.channels.entry(channel).or_default()
    }

    /// Returns the container for `channel`.
    ///
    /// # Errors
    /// Returns [`Error::IndexNotFound`] if the channel was never touched.
    pub fn channel(&self, channel: usize) -> Result<&ChannelCurves> {
        self.channels.get(&channel).ok_or(Error::IndexNotFound {
            level: "FED channel",
            index: channel,
        })
    }

    /// Populated channel indices in ascending order.
    #[must_use]
    pub fn valid_channel_indices(&self) -> Vec<usize> {
        self.channels.keys().copied().collect()
    }

    /// Iterates `(channel, curves)` pairs in ascending channel order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChannelCurves)> {
        self.channels.iter().map(|(&channel, curves)| (channel, curves))
    }

    /// Number of populated channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no channel was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Root of the curve tree, keyed by FED index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorCurves {
    feds: BTreeMap<usize, ChipCurves>,
}

impl DetectorCurves {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the container for `fed`, creating it if absent.
    pub fn fed_mut(&mut self, fed: usize) -> &mut ChipCurves {
        self.feds.entry(fed).or_default()
    }

    /// Returns the container for `fed`.
    ///
    /// # Errors
    /// Returns [`Error::IndexNotFound`] if the FED was never touched.
    pub fn fed(&self, fed: usize) -> Result<&ChipCurves> {
        self.feds.get(&fed).ok_or(Error::IndexNotFound {
            level: "FED",
            index: fed,
        })
    }

    /// Shortcut for `fed_mut(fed).channel_mut(channel)`.
    pub fn channel_mut(&mut self, fed: usize, channel: usize) -> &mut ChannelCurves {
        self.fed_mut(fed).channel_mut(channel)
    }

    /// Returns the curve at `(fed, channel, strip)`.
    ///
    /// # Errors
    /// Returns [`Error::IndexNotFound`] for the first missing level.
    pub fn curve(&self, fed: usize, channel: usize, strip: usize) -> Result<&ThresholdCurve> {
        self.fed(fed)?.channel(channel)?.strip(strip)
    }

    /// Records a single event for one strip at `threshold`.
    ///
    /// # Errors
    /// Returns [`Error::StripOutOfRange`] if `strip >= MAX_STRIPS`.
    pub fn increment(
        &mut self,
        fed: usize,
        channel: usize,
        strip: usize,
        threshold: f64,
        hit: bool,
    ) -> Result<()> {
        self.channel_mut(fed, channel)
            .strip_mut(strip)?
            .record(threshold, hit);
        Ok(())
    }

    /// Records one event for every strip of a channel, `hits[strip]` giving
    /// the on/off state.
    ///
    /// # Errors
    /// Returns [`Error::StripOutOfRange`] if `hits` is longer than
    /// `MAX_STRIPS`. Nothing is recorded in that case.
    pub fn record_hits(
        &mut self,
        fed: usize,
        channel: usize,
        hits: &[bool],
        threshold: f64,
    ) -> Result<()> {
        if hits.len() > MAX_STRIPS {
            return Err(Error::StripOutOfRange {
                index: hits.len() - 1,
                max: MAX_STRIPS,
            });
        }
        let curves = self.channel_mut(fed, channel);
        for (strip, &hit) in hits.iter().enumerate() {
            curves.strip_mut(strip)?.record(threshold, hit);
        }
        Ok(())
    }

    /// Populated FED indices in ascending order.
    #[must_use]
    pub fn valid_fed_indices(&self) -> Vec<usize> {
        self.feds.keys().copied().collect()
    }

    /// Iterates `(fed, curves)` pairs in ascending FED order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChipCurves)> {
        self.feds.iter().map(|(&fed, curves)| (fed, curves))
    }

    /// Iterates every populated curve as `(fed, channel, strip, curve)`,
    /// ordered by FED, then channel, then strip.
    pub fn curves(&self) -> impl Iterator<Item = (usize, usize, usize, &ThresholdCurve)> {
        self.iter().flat_map(|(fed, chip)| {
            chip.iter().flat_map(move |(channel, strips)| {
                strips
                    .iter()
                    .map(move |(strip, curve)| (fed, channel, strip, curve))
            })
        })
    }

    /// Number of populated FEDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.feds.len()
    }

    /// Returns true if the tree holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feds.is_empty()
    }

    /// Discards the whole tree.
    pub fn clear(&mut self) {
        self.feds.clear();
    }
}

impl Dump for ChannelCurves {
    const TAG: &'static str = "FedChannelSCurves";

    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write_indexed(out, Self::TAG, &self.strips)
    }

    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self> {
        Ok(Self {
            strips: read_indexed(tokens, Self::TAG, Some(MAX_STRIPS))?,
        })
    }
}

impl Dump for ChipCurves {
    const TAG: &'static str = "FedSCurves";

    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write_indexed(out, Self::TAG, &self.channels)
    }

    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self> {
        Ok(Self {
            channels: read_indexed(tokens, Self::TAG, None)?,
        })
    }
}

impl Dump for DetectorCurves {
    const TAG: &'static str = "DetectorSCurves";

    fn write_dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write_indexed(out, Self::TAG, &self.feds)
    }

    fn read_dump(tokens: &mut TokenReader<'_>) -> Result<Self> {
        Ok(Self {
            feds: read_indexed(tokens, Self::TAG, None)?,
        })
    }
}
