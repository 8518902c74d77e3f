//! Curve tree shared between the decode worker and control requests.

use crate::dump::Dump;
use crate::{DetectorCurves, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A [`DetectorCurves`] tree behind a single lock.
///
/// Structural mutation and multi-level traversal both take the lock, so a
/// reader walking the valid-index lists never observes a half-inserted
/// level. Cloning shares the same tree.
#[derive(Debug, Clone, Default)]
pub struct SharedCurves {
    inner: Arc<Mutex<DetectorCurves>>,
}

impl SharedCurves {
    /// Creates an empty shared tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing tree.
    #[must_use]
    pub fn from_curves(curves: DetectorCurves) -> Self {
        Self {
            inner: Arc::new(Mutex::new(curves)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DetectorCurves> {
        // Every mutation leaves the tree consistent, so a poisoned lock
        // still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a single event for one strip.
    ///
    /// # Errors
    /// See [`DetectorCurves::increment`].
    pub fn increment(
        &self,
        fed: usize,
        channel: usize,
        strip: usize,
        threshold: f64,
        hit: bool,
    ) -> Result<()> {
        self.lock().increment(fed, channel, strip, threshold, hit)
    }

    /// Records one event for every strip of a channel under one lock.
    ///
    /// # Errors
    /// See [`DetectorCurves::record_hits`].
    pub fn record_hits(
        &self,
        fed: usize,
        channel: usize,
        hits: &[bool],
        threshold: f64,
    ) -> Result<()> {
        self.lock().record_hits(fed, channel, hits, threshold)
    }

    /// Runs `f` with read access to the tree while holding the lock.
    pub fn with_curves<R>(&self, f: impl FnOnce(&DetectorCurves) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` with write access to the tree while holding the lock.
    pub fn with_curves_mut<R>(&self, f: impl FnOnce(&mut DetectorCurves) -> R) -> R {
        f(&mut self.lock())
    }

    /// Returns a deep copy of the current tree.
    #[must_use]
    pub fn snapshot(&self) -> DetectorCurves {
        self.lock().clone()
    }

    /// Replaces the whole tree.
    pub fn replace(&self, curves: DetectorCurves) {
        *self.lock() = curves;
    }

    /// Serializes the tree.
    #[must_use]
    pub fn dump(&self) -> String {
        self.lock().to_dump()
    }

    /// Restores the tree from dump text.
    ///
    /// Parsing happens before the lock is taken; the live tree is only
    /// swapped once the text parsed completely.
    ///
    /// # Errors
    /// Returns a format error if `input` is not a valid detector dump.
    pub fn restore(&self, input: &str) -> Result<()> {
        let restored = DetectorCurves::from_dump(input)?;
        self.replace(restored);
        Ok(())
    }

    /// Discards the whole tree.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns true if the tree holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
