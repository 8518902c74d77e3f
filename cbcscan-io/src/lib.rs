//! cbcscan-io: Files and sessions for cbcscan.
//!
//! This crate connects the decoder, the curve tree and the fitter to the
//! file system: memory-mapped raw data files (via memmap2), the persisted
//! session state, trim files, JSON configuration and reports.
//!

mod config;
mod error;
mod reader;
mod report;
mod session;
mod state;
mod trim;

pub use config::AnalysisConfig;
pub use error::{Error, Result};
pub use reader::{MappedFileReader, RawDataFile};
pub use report::{
    occupancy_report, write_occupancy_report, FitParametersRecord, FitReport, StripFitRecord,
};
pub use session::{fake_data, AnalysisSession, AnalysisSummary};
pub use state::SessionState;
pub use trim::{TrimOffsets, TrimSummary, TRIM_CHANNELS};
