//! cbcscan-algorithms: Binning and S-curve fitting for threshold scans.
//!
//! - **Adaptive binning** - one bin centred on every probed threshold, with
//!   explicit empty spacer bins filling uneven gaps
//! - **Efficiency histogram** - passed/total counts per bin
//! - **S-curve fit** - erf turn-on model fitted by chi-square minimisation
//!
#![warn(missing_docs)]

mod binning;
mod error;
mod fit;
mod histogram;

pub use binning::{adaptive_bin_edges, AdaptiveBinner, BinningConfig};
pub use error::{Error, Result};
pub use fit::{
    initial_mean, s_curve, CurveFit, CurveFitter, FitConfig, FitConvergenceWarning, FitOutcome,
    FitParameters,
};
pub use histogram::{EfficiencyBin, EfficiencyHistogram};
