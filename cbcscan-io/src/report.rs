//! Text and JSON reports over a curve tree.

use crate::Result;
use cbcscan_algorithms::CurveFit;
use cbcscan_core::DetectorCurves;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

const STRIPS_PER_LINE: usize = 16;

/// Per-strip `on:off` counts at `threshold`, one block per FED channel.
///
/// Strips with no entry at `threshold` print as `0:0`.
#[must_use]
pub fn occupancy_report(curves: &DetectorCurves, threshold: f64) -> String {
    let mut out = String::new();
    // Formatting into a String does not fail.
    write_occupancy_report(&mut out, curves, threshold)
        .map(|()| out)
        .unwrap_or_default()
}

/// Writes the [`occupancy_report`] text to `out`.
///
/// # Errors
/// Returns the sink's error if a write is rejected.
pub fn write_occupancy_report<W: fmt::Write>(
    out: &mut W,
    curves: &DetectorCurves,
    threshold: f64,
) -> fmt::Result {
    for (fed, chip) in curves.iter() {
        for (channel, strips) in chip.iter() {
            writeln!(out, "FED {fed}, FED channel {channel}, threshold={threshold} -")?;
            let mut line_open = false;
            for (strip, curve) in strips.iter() {
                let (on, off) = curve
                    .get(threshold)
                    .map_or((0, 0), |entry| (entry.events_on(), entry.events_off()));
                write!(out, "{on:>3}:{off:<3} ")?;
                line_open = strip % STRIPS_PER_LINE != STRIPS_PER_LINE - 1;
                if !line_open {
                    out.write_char('\n')?;
                }
            }
            if line_open {
                out.write_char('\n')?;
            }
        }
    }
    Ok(())
}

/// Fit parameters of one strip as written to the JSON report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitParametersRecord {
    pub chi2: f64,
    #[serde(rename = "NDF")]
    pub ndf: u32,
    pub max_efficiency: f64,
    pub standard_deviation: f64,
    pub mean: f64,
}

/// One strip's entry in the JSON report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripFitRecord {
    pub fed: usize,
    pub fed_channel: usize,
    pub cbc_channel: usize,
    pub fit_parameters: FitParametersRecord,
    pub converged: bool,
}

/// The S-curve fit report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub scurves: Vec<StripFitRecord>,
}

impl FitReport {
    /// Builds the report from fit results.
    #[must_use]
    pub fn from_fits(fits: &[CurveFit]) -> Self {
        let scurves = fits
            .iter()
            .map(|fit| {
                let p = &fit.outcome.parameters;
                StripFitRecord {
                    fed: fit.fed,
                    fed_channel: fit.channel,
                    cbc_channel: fit.strip,
                    fit_parameters: FitParametersRecord {
                        chi2: p.chi2,
                        ndf: p.ndf,
                        max_efficiency: p.max_efficiency,
                        standard_deviation: p.std_dev,
                        mean: p.mean,
                    },
                    converged: fit.outcome.is_converged(),
                }
            })
            .collect();
        Self { scurves }
    }

    /// Number of strips whose fit did not converge.
    #[must_use]
    pub fn unconverged(&self) -> usize {
        self.scurves.iter().filter(|s| !s.converged).count()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// Returns a JSON error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes pretty-printed JSON to `writer`.
    ///
    /// # Errors
    /// Returns a JSON or I/O error if writing fails.
    pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
