//! cbcscan-core: Threshold curve data model for CBC threshold scans.
//!
//! This crate provides the per-strip efficiency curves, their aggregation
//! into a detector-wide tree, and the tagged text format used to persist
//! that tree between runs.
//!
//! # Key Components
//!
//! - [`ThresholdCurveEntry`] - on/off counters at one threshold
//! - [`ThresholdCurve`] - sparse threshold to entry map for one strip
//! - [`ChannelCurves`], [`ChipCurves`], [`DetectorCurves`] - the tree
//! - [`Dump`] - tagged text serialization with atomic restore
//! - [`SharedCurves`], [`ThresholdControl`] - state shared with control requests

pub mod curve;
pub mod dump;
pub mod entry;
pub mod error;
pub mod hierarchy;
pub mod shared;
pub mod threshold;

pub use curve::ThresholdCurve;
pub use dump::{Dump, TokenReader};
pub use entry::ThresholdCurveEntry;
pub use error::{Error, Result};
pub use hierarchy::{ChannelCurves, ChipCurves, DetectorCurves, MAX_STRIPS};
pub use shared::SharedCurves;
pub use threshold::{clamp_threshold, ThresholdControl, MAX_THRESHOLD, MIN_THRESHOLD};
