//! Per-threshold on/off counters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Hit/no-hit counters recorded for one strip at one threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdCurveEntry {
    events_on: u64,
    events_off: u64,
}

impl ThresholdCurveEntry {
    /// Creates an entry with the given counters.
    #[must_use]
    pub fn new(events_on: u64, events_off: u64) -> Self {
        Self {
            events_on,
            events_off,
        }
    }

    /// Number of events in which the strip fired.
    #[inline]
    #[must_use]
    pub fn events_on(&self) -> u64 {
        self.events_on
    }

    /// Number of events in which the strip stayed quiet.
    #[inline]
    #[must_use]
    pub fn events_off(&self) -> u64 {
        self.events_off
    }

    /// Total number of events recorded.
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.events_on + self.events_off
    }

    /// Adds one "on" event.
    #[inline]
    pub fn increment_on(&mut self) {
        self.events_on += 1;
    }

    /// Adds one "off" event.
    #[inline]
    pub fn increment_off(&mut self) {
        self.events_off += 1;
    }

    /// Adds one event, "on" if `hit` is set.
    #[inline]
    pub fn record(&mut self, hit: bool) {
        if hit {
            self.increment_on();
        } else {
            self.increment_off();
        }
    }

    /// Fraction of events that were "on", or 0 if nothing was recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.events_on as f64 / total as f64
    }

    /// Poisson approximation of the error on [`fraction`](Self::fraction).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction_error(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.events_on as f64).sqrt() / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_entry_fraction_is_zero() {
        let entry = ThresholdCurveEntry::default();
        assert_eq!(entry.total(), 0);
        assert_eq!(entry.fraction(), 0.0);
        assert_eq!(entry.fraction_error(), 0.0);
    }

    #[test]
    fn test_fraction_tracks_increments() {
        let mut entry = ThresholdCurveEntry::default();
        let pattern = [true, false, true, true, false, false, false, true, true];
        let mut on = 0u64;
        for (i, &hit) in pattern.iter().enumerate() {
            entry.record(hit);
            if hit {
                on += 1;
            }
            let total = (i + 1) as f64;
            assert_relative_eq!(entry.fraction(), on as f64 / total);
        }
        assert_eq!(entry.events_on(), 5);
        assert_eq!(entry.events_off(), 4);
    }

    #[test]
    fn test_fraction_error_poisson() {
        let entry = ThresholdCurveEntry::new(16, 4);
        assert_relative_eq!(entry.fraction(), 0.8);
        assert_relative_eq!(entry.fraction_error(), 4.0 / 20.0);
    }

    #[test]
    fn test_only_off_events() {
        let mut entry = ThresholdCurveEntry::default();
        entry.increment_off();
        entry.increment_off();
        assert_eq!(entry.fraction(), 0.0);
        assert_eq!(entry.total(), 2);
    }
}
