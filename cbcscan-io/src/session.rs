//! Analysis session: the curve tree plus everything a run needs around it.
//!
//! A session is driven by two lifecycle calls. [`AnalysisSession::start_of_run`]
//! reloads persisted state and trim values, [`AnalysisSession::end_of_run`]
//! saves state. Between them events are recorded from raw files or
//! zero-suppressed channel payloads at the current global threshold.

use crate::report::{occupancy_report, FitReport};
use crate::state::SessionState;
use crate::trim::TrimOffsets;
use crate::{AnalysisConfig, Error, RawDataFile, Result};
use cbcscan_algorithms::{
    s_curve, AdaptiveBinner, CurveFitter, EfficiencyHistogram,
};
use cbcscan_cbc::{FrameDecoder, RawEventRecord};
use cbcscan_core::{SharedCurves, ThresholdControl, ThresholdCurveEntry};
use std::io::Read;
use std::path::Path;

/// Counters from analysing one raw stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    /// Records decoded and recorded.
    pub records: u64,
    /// Chip blocks recorded.
    pub chips_recorded: u64,
    /// Records skipped because they failed to decode.
    pub decode_errors: u64,
}

/// Parameters of the synthetic scan written by
/// [`AnalysisSession::create_fake_data`].
pub mod fake_data {
    /// FED the synthetic curves are stored under.
    pub const FED: usize = 42;
    /// FED channel the synthetic curves are stored under.
    pub const CHANNEL: usize = 6;
    /// Strips filled.
    pub const STRIPS: usize = 128;
    /// Thresholds per strip.
    pub const THRESHOLDS: usize = 100;
    /// Events per threshold.
    pub const EVENTS: u64 = 100;
    /// First threshold.
    pub const FIRST_THRESHOLD: f64 = 0.0;
    /// Last threshold.
    pub const LAST_THRESHOLD: f64 = 5.0;
    /// Turn-on mean before fluctuation.
    pub const MEAN: f64 = (FIRST_THRESHOLD + LAST_THRESHOLD) * 0.45;
    /// Inverse width before fluctuation.
    pub const SLOPE: f64 = 30.0 / (LAST_THRESHOLD - FIRST_THRESHOLD);
}

/// Deterministic multiplier in [0.95, 1.05).
struct Fluctuation(u64);

impl Fluctuation {
    #[allow(clippy::cast_precision_loss)]
    fn next_factor(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let unit = (self.0 >> 11) as f64 / (1u64 << 53) as f64;
        0.95 + 0.1 * unit
    }
}

/// State of one analyser instance.
pub struct AnalysisSession {
    config: AnalysisConfig,
    curves: SharedCurves,
    threshold: ThresholdControl,
    trim_offsets: TrimOffsets,
    events_processed: u64,
    runs_processed: u64,
    modified: bool,
}

impl AnalysisSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            curves: SharedCurves::new(),
            threshold: ThresholdControl::default(),
            trim_offsets: TrimOffsets::new(),
            events_processed: 0,
            runs_processed: 0,
            modified: false,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The shared curve tree. Clones share the same tree.
    #[must_use]
    pub fn curves(&self) -> &SharedCurves {
        &self.curves
    }

    /// The shared global threshold. Clones share the same value.
    #[must_use]
    pub fn threshold_control(&self) -> &ThresholdControl {
        &self.threshold
    }

    /// Current global threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold.get()
    }

    /// Sets the global threshold, clamped to [0, 1]. Returns the previous value.
    ///
    /// # Errors
    /// Returns an error for NaN; the threshold is left unchanged.
    pub fn set_threshold(&self, value: f64) -> Result<f64> {
        let previous = self.threshold.set(value)?;
        log::info!(
            "global threshold set to {} (previous value {previous})",
            self.threshold.get()
        );
        Ok(previous)
    }

    /// Per-strip threshold offsets.
    #[must_use]
    pub fn trim_offsets(&self) -> &TrimOffsets {
        &self.trim_offsets
    }

    /// Events recorded since the counters were last cleared.
    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Completed runs.
    #[must_use]
    pub fn runs_processed(&self) -> u64 {
        self.runs_processed
    }

    /// Snapshot of everything the session persists.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            curves: self.curves.snapshot(),
            trim_offsets: self.trim_offsets.clone(),
            events_processed: self.events_processed,
            runs_processed: self.runs_processed,
        }
    }

    fn apply_state(&mut self, state: SessionState) {
        self.curves.replace(state.curves);
        self.trim_offsets = state.trim_offsets;
        self.events_processed = state.events_processed;
        self.runs_processed = state.runs_processed;
    }

    /// Reloads the configured state file and trim file.
    ///
    /// State is only restored into a session that has not recorded or
    /// changed anything yet, and only from a non-empty file. Returns true
    /// if state was restored. A trim file that cannot be read is logged.
    ///
    /// # Errors
    /// Returns an error if the state file exists but cannot be read or
    /// parsed. The session is unchanged in that case.
    pub fn start_of_run(&mut self) -> Result<bool> {
        let mut restored = false;
        if self.events_processed == 0 && !self.modified {
            if let Some(path) = &self.config.state_file {
                if let Some(state) = SessionState::load(path)? {
                    log::info!(
                        "restored state from {}: {} events in {} runs",
                        path.display(),
                        state.events_processed,
                        state.runs_processed
                    );
                    self.apply_state(state);
                    restored = true;
                }
            }
        }

        if let Some(path) = &self.config.trim_file {
            match self.trim_offsets.load_file(path) {
                Ok(summary) => log::debug!(
                    "trim file {}: {} channels applied, {} lines rejected",
                    path.display(),
                    summary.applied,
                    summary.rejected
                ),
                Err(err) => log::warn!("could not read trim file {}: {err}", path.display()),
            }
        }
        Ok(restored)
    }

    /// Finishes a run and saves state if anything changed.
    ///
    /// Returns true if the state file was written.
    ///
    /// # Errors
    /// Returns an I/O error if the state file cannot be written.
    pub fn end_of_run(&mut self) -> Result<bool> {
        self.runs_processed += 1;
        log::debug!(
            "end of run: {} events in {} runs",
            self.events_processed,
            self.runs_processed
        );
        let Some(path) = self.config.state_file.clone() else {
            return Ok(false);
        };
        if self.events_processed == 0 && !self.modified {
            return Ok(false);
        }
        self.save_state(&path)?;
        self.modified = false;
        Ok(true)
    }

    /// Writes the session state to `path`.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.state().save(&path)?;
        log::info!("saved state to {}", path.as_ref().display());
        Ok(())
    }

    /// Replaces the session state with the contents of `path`.
    ///
    /// # Errors
    /// Returns an error if the file is missing, empty, or malformed. The
    /// session is unchanged in that case.
    pub fn restore_state<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let state = SessionState::load(path)?.ok_or_else(|| {
            Error::InvalidFormat(format!("{} holds no saved state", path.display()))
        })?;
        self.apply_state(state);
        self.modified = true;
        Ok(())
    }

    /// Decodes every record of a raw data file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read. Records that
    /// fail to decode are logged and skipped.
    pub fn analyse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<AnalysisSummary> {
        let raw = RawDataFile::open(&path)?.with_config(self.config.decoder.clone());
        if raw.trailing_bytes() != 0 {
            log::warn!(
                "{}: ignoring {} trailing bytes",
                raw.path().display(),
                raw.trailing_bytes()
            );
        }
        let summary = self.analyse_stream(raw.events())?;
        log::info!(
            "{}: {} records, {} chips recorded, {} decode errors",
            raw.path().display(),
            summary.records,
            summary.chips_recorded,
            summary.decode_errors
        );
        Ok(summary)
    }

    /// Records every event a decoder yields.
    ///
    /// # Errors
    /// Returns an error if the stream fails. Records that fail to decode
    /// are logged and skipped.
    pub fn analyse_stream<R: Read>(
        &mut self,
        mut decoder: FrameDecoder<R>,
    ) -> Result<AnalysisSummary> {
        let mut summary = AnalysisSummary::default();
        loop {
            match decoder.next_event() {
                Ok(Some(event)) => {
                    summary.records += 1;
                    summary.chips_recorded += self.record_event(&event);
                }
                Ok(None) => break,
                Err(err) if decoder.is_exhausted() => return Err(err.into()),
                Err(err) => {
                    log::warn!("record {}: {err}", decoder.records_read());
                    summary.decode_errors += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Records the hits of every chip in `event` at the current threshold,
    /// chip `i` as FED channel `i`. Returns the number of chips recorded.
    pub fn record_event(&mut self, event: &RawEventRecord) -> u64 {
        // One threshold for the whole event even if it changes meanwhile.
        let threshold = self.threshold.get();
        let fed = self.config.fed_id;
        let mut recorded = 0;
        for (channel, chip) in event.chips.iter().enumerate() {
            match self
                .curves
                .record_hits(fed, channel, &chip.channel_data, threshold)
            {
                Ok(()) => recorded += 1,
                Err(err) => log::warn!("FED {fed} channel {channel}: {err}"),
            }
        }
        self.events_processed += 1;
        self.modified = true;
        recorded
    }

    /// Unpacks one zero-suppressed channel payload and records its hits at
    /// the current threshold.
    ///
    /// Returns false if the channel reported no data; nothing is recorded
    /// then.
    ///
    /// # Errors
    /// Returns a decode error for a malformed payload. Nothing is recorded.
    pub fn record_zero_suppressed(
        &mut self,
        fed: usize,
        channel: usize,
        payload: &[u8],
    ) -> Result<bool> {
        let hits = self.config.decoder.unpacker().unpack(payload)?;
        if !hits.has_data() {
            return Ok(false);
        }
        self.curves
            .record_hits(fed, channel, hits.hits(), self.threshold.get())?;
        self.modified = true;
        Ok(true)
    }

    /// Discards every curve and the event counter.
    pub fn reset(&mut self) {
        self.curves.clear();
        self.events_processed = 0;
        self.modified = true;
        log::info!("curves reset");
    }

    /// Fills a synthetic threshold scan for testing fits and reports.
    ///
    /// Strips of [`fake_data::FED`] / [`fake_data::CHANNEL`] get
    /// [`fake_data::THRESHOLDS`] points between the first and last
    /// threshold, each with [`fake_data::EVENTS`] events following the
    /// S-curve model. The mean and width fluctuate by up to 5% per point,
    /// from a fixed seed. Existing entries at those thresholds are
    /// overwritten. Returns the number of thresholds written per strip.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn create_fake_data(&mut self) -> usize {
        use fake_data::{
            CHANNEL, EVENTS, FED, FIRST_THRESHOLD, LAST_THRESHOLD, MEAN, SLOPE, STRIPS,
            THRESHOLDS,
        };

        let mut fluctuation = Fluctuation(0x5EED_CBC2);
        let step = (LAST_THRESHOLD - FIRST_THRESHOLD) / (THRESHOLDS - 1) as f64;
        self.curves.with_curves_mut(|curves| {
            let strips = curves.channel_mut(FED, CHANNEL);
            for strip in 0..STRIPS {
                let Ok(curve) = strips.strip_mut(strip) else {
                    continue;
                };
                for index in 0..THRESHOLDS {
                    let threshold = FIRST_THRESHOLD + step * index as f64;
                    let mean = MEAN * fluctuation.next_factor();
                    let slope = SLOPE * fluctuation.next_factor();
                    let efficiency = s_curve(threshold, 1.0, 1.0 / slope, mean);
                    let on = ((efficiency * EVENTS as f64 + 0.5) as u64).min(EVENTS);
                    *curve.entry_mut(threshold) = ThresholdCurveEntry::new(on, EVENTS - on);
                }
            }
        });
        self.modified = true;
        log::info!(
            "fake data created for {THRESHOLDS} thresholds between {FIRST_THRESHOLD} and {LAST_THRESHOLD}"
        );
        THRESHOLDS
    }

    /// Occupancy at the current threshold, see [`occupancy_report`].
    #[must_use]
    pub fn occupancy_report(&self) -> String {
        let threshold = self.threshold.get();
        self.curves
            .with_curves(|curves| occupancy_report(curves, threshold))
    }

    /// Fitter built from the session configuration.
    #[must_use]
    pub fn fitter(&self) -> CurveFitter {
        CurveFitter::new(self.config.fit.clone())
            .with_binner(AdaptiveBinner::new(self.config.binning))
    }

    /// Fits every populated curve and builds the JSON report.
    ///
    /// Fitting works on a snapshot so recording is not blocked meanwhile.
    #[must_use]
    pub fn fit_report(&self) -> FitReport {
        let snapshot = self.curves.snapshot();
        let fits = self.fitter().fit_tree(&snapshot);
        let report = FitReport::from_fits(&fits);
        if report.unconverged() > 0 {
            log::warn!(
                "{} of {} fits did not converge",
                report.unconverged(),
                report.scurves.len()
            );
        }
        report
    }

    /// Efficiency histogram of one strip with the configured binning.
    ///
    /// # Errors
    /// Returns a not-found error for an unknown strip, or an analysis error
    /// for a strip without entries.
    pub fn histogram(
        &self,
        fed: usize,
        channel: usize,
        strip: usize,
    ) -> Result<EfficiencyHistogram> {
        let binner = AdaptiveBinner::new(self.config.binning);
        self.curves.with_curves(|curves| {
            let curve = curves.curve(fed, channel, strip)?;
            Ok(EfficiencyHistogram::from_curve(curve, &binner)?)
        })
    }
}
