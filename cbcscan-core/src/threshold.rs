//! Global comparator threshold shared between control and decode.

use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lower bound accepted for the global threshold.
pub const MIN_THRESHOLD: f64 = 0.0;
/// Upper bound accepted for the global threshold.
pub const MAX_THRESHOLD: f64 = 1.0;

/// Clamps a threshold into `[MIN_THRESHOLD, MAX_THRESHOLD]`.
#[must_use]
pub fn clamp_threshold(value: f64) -> f64 {
    value.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
}

/// The current global threshold, readable and writable from any thread.
///
/// Writes are clamped to `[0, 1]`. The decode side should read the value
/// once per event so every strip of that event sees the same threshold.
#[derive(Debug, Clone)]
pub struct ThresholdControl {
    bits: Arc<AtomicU64>,
}

impl Default for ThresholdControl {
    fn default() -> Self {
        Self::new(MIN_THRESHOLD)
    }
}

impl ThresholdControl {
    /// Creates a control holding `initial`, clamped. NaN becomes 0.
    #[must_use]
    pub fn new(initial: f64) -> Self {
        let initial = if initial.is_nan() {
            MIN_THRESHOLD
        } else {
            clamp_threshold(initial)
        };
        Self {
            bits: Arc::new(AtomicU64::new(initial.to_bits())),
        }
    }

    /// Current threshold.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Stores `value` clamped to `[0, 1]` and returns the previous value.
    ///
    /// # Errors
    /// Returns [`Error::InvalidThreshold`] for NaN; the stored value is kept.
    pub fn set(&self, value: f64) -> Result<f64> {
        if value.is_nan() {
            return Err(Error::InvalidThreshold(value));
        }
        let clamped = clamp_threshold(value);
        if clamped != value {
            log::warn!("threshold {value} clamped to {clamped}");
        }
        let previous = self.bits.swap(clamped.to_bits(), Ordering::AcqRel);
        Ok(f64::from_bits(previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_previous() {
        let control = ThresholdControl::new(0.25);
        assert_eq!(control.set(0.5).unwrap(), 0.25);
        assert_eq!(control.get(), 0.5);
    }

    #[test]
    fn test_writes_are_clamped() {
        let control = ThresholdControl::default();
        control.set(3.2).unwrap();
        assert_eq!(control.get(), 1.0);
        control.set(-0.7).unwrap();
        assert_eq!(control.get(), 0.0);
        assert_eq!(ThresholdControl::new(7.0).get(), 1.0);
    }

    #[test]
    fn test_nan_rejected() {
        let control = ThresholdControl::new(0.4);
        assert!(control.set(f64::NAN).is_err());
        assert_eq!(control.get(), 0.4);
        assert_eq!(ThresholdControl::new(f64::NAN).get(), 0.0);
    }

    #[test]
    fn test_clones_share_value() {
        let control = ThresholdControl::default();
        let remote = control.clone();
        remote.set(0.8).unwrap();
        assert_eq!(control.get(), 0.8);
    }
}
