//! Zero-suppressed channel payload decoding.
//!
//! A channel payload is a run of clusters, each
//! `[first_sample, width, amplitude * width]`. Samples that did not pass
//! the firmware threshold are simply absent.

use crate::{ChipGeneration, Error, Result};

/// One `(sampleIndex, amplitude)` pair from a sparse payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSample {
    /// Strip the sample belongs to.
    pub index: usize,
    /// Raw amplitude; nonzero marks a hit.
    pub amplitude: u8,
}

impl ChannelSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(index: usize, amplitude: u8) -> Self {
        Self { index, amplitude }
    }
}

/// Iterator over the samples of a zero-suppressed cluster payload.
///
/// Yields one error and then stops if a cluster runs past the payload.
#[derive(Debug, Clone)]
pub struct ZeroSuppressedSamples<'a> {
    payload: &'a [u8],
    position: usize,
    next_index: usize,
    remaining_in_cluster: usize,
    failed: bool,
}

impl<'a> ZeroSuppressedSamples<'a> {
    /// Creates an iterator over `payload`.
    #[must_use]
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            position: 0,
            next_index: 0,
            remaining_in_cluster: 0,
            failed: false,
        }
    }

    fn truncated(&mut self, offset: usize) -> Option<Result<ChannelSample>> {
        self.failed = true;
        Some(Err(Error::TruncatedCluster {
            offset,
            len: self.payload.len(),
        }))
    }
}

impl Iterator for ZeroSuppressedSamples<'_> {
    type Item = Result<ChannelSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.remaining_in_cluster == 0 {
            let header_offset = self.position;
            if header_offset >= self.payload.len() {
                return None;
            }
            let Some(&[first, width]) = self.payload.get(header_offset..header_offset + 2) else {
                return self.truncated(header_offset);
            };
            let width = usize::from(width);
            if header_offset + 2 + width > self.payload.len() {
                return self.truncated(header_offset);
            }
            self.position = header_offset + 2;
            self.next_index = usize::from(first);
            self.remaining_in_cluster = width;
        }

        let amplitude = self.payload[self.position];
        let sample = ChannelSample::new(self.next_index, amplitude);
        self.position += 1;
        self.next_index += 1;
        self.remaining_in_cluster -= 1;
        Some(Ok(sample))
    }
}

/// Fixed-length hit vector for one chip channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHits {
    hits: Vec<bool>,
    has_data: bool,
}

impl ChannelHits {
    /// Per-strip hit flags.
    #[must_use]
    pub fn hits(&self) -> &[bool] {
        &self.hits
    }

    /// False if the channel reported no data at all, as opposed to
    /// reporting data with zero hits.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Number of strips that fired.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.iter().filter(|&&hit| hit).count()
    }

    /// Consumes the value and returns the hit flags.
    #[must_use]
    pub fn into_hits(self) -> Vec<bool> {
        self.hits
    }
}

/// Decodes sparse channel payloads into [`ChannelHits`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelUnpacker {
    generation: ChipGeneration,
}

impl ChannelUnpacker {
    /// Creates an unpacker for the given chip generation.
    #[must_use]
    pub fn new(generation: ChipGeneration) -> Self {
        Self { generation }
    }

    /// Channel length produced by this unpacker.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.generation.channel_count()
    }

    /// Builds a hit vector from a sample stream. The stream being empty on
    /// the first read means the channel carries no data.
    ///
    /// # Errors
    /// Returns [`Error::SampleOutOfRange`] for an index past the channel
    /// length, or the first error yielded by `samples`.
    pub fn unpack_samples<I>(&self, samples: I) -> Result<ChannelHits>
    where
        I: IntoIterator<Item = Result<ChannelSample>>,
    {
        let mut samples = samples.into_iter().peekable();
        let has_data = samples.peek().is_some();
        self.collect(samples, has_data)
    }

    /// Decodes a zero-suppressed cluster payload.
    ///
    /// Any non-empty payload counts as data, including one whose clusters
    /// are all zero-width.
    ///
    /// # Errors
    /// See [`unpack_samples`](Self::unpack_samples); truncated clusters give
    /// [`Error::TruncatedCluster`].
    pub fn unpack(&self, payload: &[u8]) -> Result<ChannelHits> {
        self.collect(ZeroSuppressedSamples::new(payload), !payload.is_empty())
    }

    fn collect<I>(&self, samples: I, has_data: bool) -> Result<ChannelHits>
    where
        I: Iterator<Item = Result<ChannelSample>>,
    {
        let len = self.channel_count();
        let mut hits = vec![false; len];
        for sample in samples {
            let sample = sample?;
            let slot = hits.get_mut(sample.index).ok_or(Error::SampleOutOfRange {
                index: sample.index,
                len,
            })?;
            // A hit shows up as a large amplitude (243); zero means no hit.
            if sample.amplitude > 0 {
                *slot = true;
            }
        }

        Ok(ChannelHits { hits, has_data })
    }
}
