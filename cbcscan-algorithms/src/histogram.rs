//! Passed/total histograms built from threshold curves.

use crate::{AdaptiveBinner, Error, Result};
use cbcscan_core::ThresholdCurve;

/// One bin of an [`EfficiencyHistogram`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficiencyBin {
    /// Lower edge (inclusive).
    pub low: f64,
    /// Upper edge (exclusive).
    pub high: f64,
    /// Events in which the strip fired.
    pub passed: u64,
    /// All events.
    pub total: u64,
}

impl EfficiencyBin {
    /// Bin centre.
    #[must_use]
    pub fn center(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    /// Passed fraction, or 0 for an empty bin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn efficiency(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }

    /// Returns true if nothing was filled into this bin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Efficiency histogram over explicit, possibly uneven, bin edges.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyHistogram {
    edges: Vec<f64>,
    passed: Vec<u64>,
    total: Vec<u64>,
}

impl EfficiencyHistogram {
    /// Creates an empty histogram over `edges`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidEdges`] unless there are at least two
    /// strictly increasing, finite edges.
    pub fn with_edges(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidEdges(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::InvalidEdges(
                "edges must be finite and strictly increasing".to_string(),
            ));
        }
        let bins = edges.len() - 1;
        Ok(Self {
            edges,
            passed: vec![0; bins],
            total: vec![0; bins],
        })
    }

    /// Bins the curve's thresholds with `binner` and fills every entry.
    /// Spacer bins stay empty.
    ///
    /// # Errors
    /// Returns [`Error::EmptyCurve`] if the curve has no entries.
    pub fn from_curve(curve: &ThresholdCurve, binner: &AdaptiveBinner) -> Result<Self> {
        if curve.is_empty() {
            return Err(Error::EmptyCurve);
        }
        let edges = binner.bin_edges(&curve.valid_thresholds())?;
        let mut histogram = Self::with_edges(edges)?;
        for (threshold, entry) in curve.iter() {
            if histogram
                .fill(threshold, entry.events_on(), entry.total())
                .is_none()
            {
                log::warn!("threshold {threshold} fell outside its own binning");
            }
        }
        Ok(histogram)
    }

    /// Index of the bin containing `x`.
    #[must_use]
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let upper = self.edges.partition_point(|&edge| edge <= x);
        (upper >= 1 && upper < self.edges.len()).then(|| upper - 1)
    }

    /// Adds counts to the bin containing `x`. Returns the bin index, or
    /// `None` if `x` lies outside the histogram.
    pub fn fill(&mut self, x: f64, passed: u64, total: u64) -> Option<usize> {
        let bin = self.find_bin(x)?;
        self.passed[bin] += passed;
        self.total[bin] += total;
        Some(bin)
    }

    /// Number of bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin edges.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower edge of the first bin.
    #[must_use]
    pub fn low_edge(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    #[must_use]
    pub fn high_edge(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Returns bin `index`.
    #[must_use]
    pub fn bin(&self, index: usize) -> Option<EfficiencyBin> {
        Some(EfficiencyBin {
            low: *self.edges.get(index)?,
            high: *self.edges.get(index + 1)?,
            passed: self.passed[index],
            total: self.total[index],
        })
    }

    /// Iterates all bins in order.
    pub fn bins(&self) -> impl Iterator<Item = EfficiencyBin> + '_ {
        (0..self.bin_count()).filter_map(|index| self.bin(index))
    }

    /// Passed fraction of bin `index`, or 0 if the bin is empty or absent.
    #[must_use]
    pub fn efficiency(&self, index: usize) -> f64 {
        self.bin(index).map_or(0.0, |bin| bin.efficiency())
    }

    /// Number of bins holding at least one event.
    #[must_use]
    pub fn populated_bins(&self) -> usize {
        self.total.iter().filter(|&&total| total > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(points: &[(f64, u64, u64)]) -> ThresholdCurve {
        let mut curve = ThresholdCurve::new();
        for &(threshold, on, off) in points {
            let entry = curve.entry_mut(threshold);
            for _ in 0..on {
                entry.increment_on();
            }
            for _ in 0..off {
                entry.increment_off();
            }
        }
        curve
    }

    #[test]
    fn test_from_curve_fills_own_bins() {
        let curve = curve(&[(3.0, 0, 4), (5.0, 1, 3), (8.0, 3, 1), (9.0, 4, 0)]);
        let histogram = EfficiencyHistogram::from_curve(&curve, &AdaptiveBinner::default()).unwrap();

        assert_eq!(histogram.bin_count(), 5);
        assert_eq!(histogram.populated_bins(), 4);
        let bins: Vec<_> = histogram.bins().collect();
        assert_relative_eq!(bins[0].center(), 3.0);
        assert_relative_eq!(bins[1].efficiency(), 0.25);
        // Spacer between 6 and 7.5.
        assert!(bins[2].is_empty());
        assert_relative_eq!(bins[3].center(), 8.0);
        assert_relative_eq!(bins[4].efficiency(), 1.0);
    }

    #[test]
    fn test_empty_curve_rejected() {
        let result = EfficiencyHistogram::from_curve(&ThresholdCurve::new(), &AdaptiveBinner::default());
        assert!(matches!(result, Err(Error::EmptyCurve)));
    }

    #[test]
    fn test_find_bin_edges() {
        let histogram = EfficiencyHistogram::with_edges(vec![0.0, 1.0, 3.0]).unwrap();
        assert_eq!(histogram.find_bin(-0.1), None);
        assert_eq!(histogram.find_bin(0.0), Some(0));
        assert_eq!(histogram.find_bin(0.99), Some(0));
        assert_eq!(histogram.find_bin(1.0), Some(1));
        assert_eq!(histogram.find_bin(3.0), None);
    }

    #[test]
    fn test_invalid_edges() {
        assert!(EfficiencyHistogram::with_edges(vec![1.0]).is_err());
        assert!(EfficiencyHistogram::with_edges(vec![1.0, 1.0]).is_err());
        assert!(EfficiencyHistogram::with_edges(vec![0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_efficiency_of_missing_bin() {
        let histogram = EfficiencyHistogram::with_edges(vec![0.0, 1.0]).unwrap();
        assert_eq!(histogram.efficiency(0), 0.0);
        assert_eq!(histogram.efficiency(5), 0.0);
        assert!(histogram.bin(1).is_none());
    }
}
