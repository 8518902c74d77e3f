//! Analysis configuration loaded from JSON.
//!
//! ```json
//! {
//!   "analysis": {
//!     "fed_id": 0,
//!     "decoder": { "chip_generation": "cbc2", "swap_endianness": false },
//!     "fit": { "max_iterations": 1000, "initial_std_dev": 0.1667 },
//!     "binning": { "edge_tolerance": 0.0001 },
//!     "state_file": "cbcscan.state",
//!     "trim_file": "trim.txt"
//!   }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::{Error, Result};
use cbcscan_algorithms::{BinningConfig, FitConfig};
use cbcscan_cbc::DecoderConfig;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Settings for an [`AnalysisSession`](crate::AnalysisSession).
#[derive(Clone, Debug, Default)]
pub struct AnalysisConfig {
    /// FED index recorded for events read from raw files.
    pub fed_id: usize,
    /// Raw record decoding.
    pub decoder: DecoderConfig,
    /// S-curve fitting.
    pub fit: FitConfig,
    /// Histogram binning.
    pub binning: BinningConfig,
    /// File the session state is restored from and saved to.
    pub state_file: Option<PathBuf>,
    /// Per-strip threshold trim values read at start of run.
    pub trim_file: Option<PathBuf>,
}

// Intermediate structs for the JSON schema
#[derive(Deserialize)]
struct JsonConfig {
    analysis: JsonAnalysis,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonAnalysis {
    fed_id: usize,
    decoder: DecoderConfig,
    fit: JsonFit,
    binning: JsonBinning,
    state_file: Option<PathBuf>,
    trim_file: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonFit {
    max_iterations: u64,
    tolerance: f64,
    initial_std_dev: f64,
    initial_max_efficiency: f64,
    float_max_efficiency: bool,
}

impl Default for JsonFit {
    fn default() -> Self {
        let fit = FitConfig::default();
        Self {
            max_iterations: fit.max_iterations,
            tolerance: fit.tolerance,
            initial_std_dev: fit.initial_std_dev,
            initial_max_efficiency: fit.initial_max_efficiency,
            float_max_efficiency: fit.float_max_efficiency,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonBinning {
    edge_tolerance: f64,
    single_sample_width: f64,
}

impl Default for JsonBinning {
    fn default() -> Self {
        let binning = BinningConfig::default();
        Self {
            edge_tolerance: binning.edge_tolerance,
            single_sample_width: binning.single_sample_width,
        }
    }
}

impl AnalysisConfig {
    /// Sets the FED index.
    #[must_use]
    pub fn with_fed_id(mut self, fed_id: usize) -> Self {
        self.fed_id = fed_id;
        self
    }

    /// Sets the decoder configuration.
    #[must_use]
    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    /// Sets the fit configuration.
    #[must_use]
    pub fn with_fit(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    /// Sets the state file.
    #[must_use]
    pub fn with_state_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Sets the trim file.
    #[must_use]
    pub fn with_trim_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.trim_file = Some(path.into());
        self
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let json_config: JsonConfig = serde_json::from_reader(reader)?;
        Self::from_json_config(json_config)
    }

    /// Loads configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the text is not valid JSON or holds out-of-range
    /// values.
    pub fn from_json(json: &str) -> Result<Self> {
        let json_config: JsonConfig = serde_json::from_str(json)?;
        Self::from_json_config(json_config)
    }

    fn from_json_config(config: JsonConfig) -> Result<Self> {
        let analysis = config.analysis;

        let fit = analysis.fit;
        if fit.max_iterations == 0 {
            return Err(Error::Config("fit.max_iterations must be positive".into()));
        }
        if !is_positive(fit.tolerance) {
            return Err(Error::Config(format!(
                "fit.tolerance must be positive, got {}",
                fit.tolerance
            )));
        }
        if !is_positive(fit.initial_std_dev) {
            return Err(Error::Config(format!(
                "fit.initial_std_dev must be positive, got {}",
                fit.initial_std_dev
            )));
        }
        let binning = &analysis.binning;
        if !(binning.edge_tolerance.is_finite() && binning.edge_tolerance >= 0.0)
            || !is_positive(binning.single_sample_width)
        {
            return Err(Error::Config(
                "binning.edge_tolerance must be non-negative and single_sample_width positive"
                    .into(),
            ));
        }

        Ok(Self {
            fed_id: analysis.fed_id,
            decoder: analysis.decoder,
            fit: FitConfig {
                max_iterations: fit.max_iterations,
                tolerance: fit.tolerance,
                initial_std_dev: fit.initial_std_dev,
                initial_max_efficiency: fit.initial_max_efficiency,
                float_max_efficiency: fit.float_max_efficiency,
            },
            binning: BinningConfig::default()
                .with_edge_tolerance(analysis.binning.edge_tolerance)
                .with_single_sample_width(analysis.binning.single_sample_width),
            state_file: analysis.state_file,
            trim_file: analysis.trim_file,
        })
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
