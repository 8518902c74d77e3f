//! Adaptive bin edges centred on non-uniformly spaced samples.
//!
//! Every sample gets its own bin with the sample exactly at the centre.
//! Half-widths are assigned smallest gap first: each gap between neighbours
//! offers half its length to both bins, and once a bin is fixed the
//! remaining gap on its far side shrinks to whatever the fixed bin did not
//! cover. Where two neighbouring bins still do not touch, an empty spacer
//! bin fills the hole instead of stretching either bin asymmetrically.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`AdaptiveBinner`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinningConfig {
    /// Relative tolerance under which two bin edges count as the same edge.
    pub edge_tolerance: f64,
    /// Width of the single bin produced for a single sample.
    pub single_sample_width: f64,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            edge_tolerance: 1e-4,
            single_sample_width: 1.0,
        }
    }
}

impl BinningConfig {
    /// Sets the edge coincidence tolerance.
    #[must_use]
    pub fn with_edge_tolerance(mut self, tolerance: f64) -> Self {
        self.edge_tolerance = tolerance;
        self
    }

    /// Sets the width used when only one sample is present.
    #[must_use]
    pub fn with_single_sample_width(mut self, width: f64) -> Self {
        self.single_sample_width = width;
        self
    }
}

/// Computes centred bin edges for strictly increasing samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveBinner {
    config: BinningConfig,
}

/// Gap between samples `left` and `left + 1`, still able to size whichever
/// of the two bins is unfixed.
#[derive(Debug, Clone, Copy)]
struct Gap {
    half_width: f64,
    active: bool,
}

impl AdaptiveBinner {
    /// Creates a binner with the given configuration.
    #[must_use]
    pub fn new(config: BinningConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    /// Computes bin edges for `samples`.
    ///
    /// The result has one more edge than there are bins; bins are the real
    /// sample bins plus any spacer bins. Gaps of equal width are processed
    /// lowest sample index first.
    ///
    /// # Errors
    /// Returns [`Error::NoSamples`] for an empty slice,
    /// [`Error::NonFiniteSample`] for NaN or infinite values and
    /// [`Error::NotStrictlyIncreasing`] for unsorted or repeated values.
    pub fn bin_edges(&self, samples: &[f64]) -> Result<Vec<f64>> {
        validate(samples)?;
        if let [only] = samples {
            let half = 0.5 * self.config.single_sample_width;
            return Ok(vec![only - half, only + half]);
        }

        let half_widths = half_widths(samples);
        let mut edges = Vec::with_capacity(2 * samples.len() + 1);
        edges.push(samples[0] - half_widths[0]);
        let mut previous_half = half_widths[0];
        for (&centre, &half) in samples.iter().zip(&half_widths) {
            let low = centre - half;
            let previous = edges[edges.len() - 1];
            if !self.same_edge(previous, low, previous_half.max(half)) {
                edges.push(low);
            }
            edges.push(centre + half);
            previous_half = half;
        }
        Ok(edges)
    }

    /// Whether `low` starts where the previous bin ended. The tolerance is
    /// relative to the bin widths as well as the edge values, so edges that
    /// meet near zero still coincide. A `low` below `previous` can only come
    /// from rounding and is never emitted.
    fn same_edge(&self, previous: f64, low: f64, half_width: f64) -> bool {
        let scale = half_width.max(previous.abs()).max(low.abs());
        low - previous <= self.config.edge_tolerance * scale
    }
}

/// Convenience wrapper using the default configuration.
///
/// # Errors
/// See [`AdaptiveBinner::bin_edges`].
pub fn adaptive_bin_edges(samples: &[f64]) -> Result<Vec<f64>> {
    AdaptiveBinner::default().bin_edges(samples)
}

fn validate(samples: &[f64]) -> Result<()> {
    if samples.is_empty() {
        return Err(Error::NoSamples);
    }
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(Error::NonFiniteSample { index, value });
    }
    if let Some(index) = samples.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(Error::NotStrictlyIncreasing { index: index + 1 });
    }
    Ok(())
}

/// Assigns a half-width to every sample. Requires at least two samples.
fn half_widths(samples: &[f64]) -> Vec<f64> {
    let mut gaps: Vec<Gap> = samples
        .windows(2)
        .map(|pair| Gap {
            half_width: 0.5 * (pair[1] - pair[0]),
            active: true,
        })
        .collect();
    let mut fixed: Vec<Option<f64>> = vec![None; samples.len()];

    while let Some(k) = narrowest_gap(&gaps) {
        let half = gaps[k].half_width;
        gaps[k].active = false;

        // Left bin of this gap, then the gap further left.
        if fixed[k].is_none() {
            fixed[k] = Some(half);
            if k > 0 {
                shrink(&mut gaps[k - 1], fixed[k - 1], samples[k] - samples[k - 1], half);
            }
        }
        // Right bin of this gap, then the gap further right.
        if fixed[k + 1].is_none() {
            fixed[k + 1] = Some(half);
            if k + 1 < gaps.len() {
                shrink(
                    &mut gaps[k + 1],
                    fixed[k + 2],
                    samples[k + 2] - samples[k + 1],
                    half,
                );
            }
        }
    }

    // Every bin borders at least one gap, and a gap is only retired once
    // both of its bins are fixed.
    fixed.into_iter().map(Option::unwrap_or_default).collect()
}

/// Active gap with the smallest half-width; ties go to the lowest index.
fn narrowest_gap(gaps: &[Gap]) -> Option<usize> {
    gaps.iter()
        .enumerate()
        .filter(|(_, gap)| gap.active)
        .min_by(|(i, a), (j, b)| a.half_width.total_cmp(&b.half_width).then(i.cmp(j)))
        .map(|(index, _)| index)
}

/// Updates a neighbouring gap after one of its bins was fixed to `half`.
/// `other` is the state of the gap's other bin.
fn shrink(gap: &mut Gap, other: Option<f64>, distance: f64, half: f64) {
    if !gap.active {
        return;
    }
    if other.is_some() {
        gap.active = false;
    } else {
        gap.half_width = distance - half;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_edges(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "edges {actual:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_uneven_gap_inserts_spacer() {
        let edges = adaptive_bin_edges(&[3.0, 5.0, 8.0, 9.0]).unwrap();
        assert_edges(&edges, &[2.0, 4.0, 6.0, 7.5, 8.5, 9.5]);
    }

    #[test]
    fn test_shrunk_gap_reordered() {
        let edges = adaptive_bin_edges(&[3.0, 5.0, 8.0, 9.0, 9.5]).unwrap();
        assert_edges(&edges, &[2.0, 4.0, 6.0, 7.25, 8.75, 9.25, 9.75]);
    }

    #[test]
    fn test_single_sample() {
        let edges = adaptive_bin_edges(&[4.2]).unwrap();
        assert_edges(&edges, &[3.7, 4.7]);
    }

    #[test]
    fn test_uniform_samples_have_no_spacers() {
        let samples: Vec<f64> = (0..10).map(|i| f64::from(i) * 0.1).collect();
        let edges = adaptive_bin_edges(&samples).unwrap();
        assert_eq!(edges.len(), samples.len() + 1);
        for (i, &centre) in samples.iter().enumerate() {
            assert_relative_eq!(0.5 * (edges[i] + edges[i + 1]), centre, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_two_samples() {
        let edges = adaptive_bin_edges(&[1.0, 2.0]).unwrap();
        assert_edges(&edges, &[0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_equal_gaps_deterministic() {
        // Gaps 1, 2, 1: both narrow gaps tie.
        let edges = adaptive_bin_edges(&[0.0, 1.0, 3.0, 4.0]).unwrap();
        assert_edges(&edges, &[-0.5, 0.5, 1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_every_sample_centred_and_no_overlap() {
        let samples = [0.0, 0.1, 0.15, 0.6, 0.62, 2.0, 2.5, 2.55, 2.6, 7.0];
        let edges = adaptive_bin_edges(&samples).unwrap();
        assert!(edges.windows(2).all(|w| w[0] < w[1]), "edges {edges:?}");
        for &centre in &samples {
            let bin = edges.partition_point(|&e| e <= centre) - 1;
            assert_relative_eq!(0.5 * (edges[bin] + edges[bin + 1]), centre, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bins_meeting_at_zero() {
        // -0.3 + 0.3 and 0.1 - 0.1 round to different values around 0.0.
        let edges = adaptive_bin_edges(&[-0.3, 0.1, 0.3]).unwrap();
        assert!(edges.windows(2).all(|w| w[0] < w[1]), "edges {edges:?}");
        assert_edges(&edges, &[-0.6, 0.0, 0.2, 0.4]);
    }

    #[test]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn test_mixed_sign_edges_strictly_increasing() {
        let mut state = 0x0123_4567_89AB_CDEFu64;
        let mut next_unit = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..2000 {
            let count = 2 + (next_unit() * 12.0) as usize;
            let mut value = -1.0 + next_unit();
            let mut samples = Vec::with_capacity(count);
            for _ in 0..count {
                samples.push((value * 100.0).round() / 100.0);
                value += 0.01 + 0.4 * next_unit();
            }
            samples.dedup();
            if samples.windows(2).any(|w| w[0] >= w[1]) {
                continue;
            }
            let edges = adaptive_bin_edges(&samples).unwrap();
            assert!(
                edges.windows(2).all(|w| w[0] < w[1]),
                "samples {samples:?} edges {edges:?}"
            );
        }
    }

    #[test]
    fn test_errors() {
        assert!(matches!(adaptive_bin_edges(&[]), Err(Error::NoSamples)));
        assert!(matches!(
            adaptive_bin_edges(&[1.0, f64::NAN]),
            Err(Error::NonFiniteSample { index: 1, .. })
        ));
        assert!(matches!(
            adaptive_bin_edges(&[1.0, 2.0, 2.0]),
            Err(Error::NotStrictlyIncreasing { index: 2 })
        ));
        assert!(matches!(
            adaptive_bin_edges(&[3.0, 1.0]),
            Err(Error::NotStrictlyIncreasing { index: 1 })
        ));
    }

    #[test]
    fn test_custom_single_width() {
        let binner = AdaptiveBinner::new(BinningConfig::default().with_single_sample_width(0.2));
        let edges = binner.bin_edges(&[1.0]).unwrap();
        assert_edges(&edges, &[0.9, 1.1]);
    }
}
