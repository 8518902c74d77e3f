#![allow(clippy::cast_possible_truncation, clippy::float_cmp)]
use approx::assert_abs_diff_eq;
use cbcscan_algorithms::s_curve;
use cbcscan_cbc::RECORD_SIZE;
use cbcscan_core::ThresholdCurveEntry;
use cbcscan_io::{fake_data, AnalysisConfig, AnalysisSession, RawDataFile, SessionState};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

const CHIP_BLOCKS: [usize; 4] = [20, 56, 92, 128];

/// A record in which chip `c` has strip `strips[c]` set, if any.
fn record(strips: [Option<usize>; 4]) -> Vec<u8> {
    let mut data = vec![0u8; RECORD_SIZE];
    for (block, strip) in CHIP_BLOCKS.iter().zip(strips) {
        if let Some(strip) = strip {
            let bit = 10 + strip;
            data[block + bit / 8] |= 0x80 >> (bit % 8);
        }
    }
    data
}

fn write_raw(path: &Path, records: &[Vec<u8>]) {
    let mut file = fs::File::create(path).unwrap();
    for record in records {
        file.write_all(record).unwrap();
    }
}

#[test]
fn test_analyse_file_records_every_chip() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("run.dat");
    write_raw(
        &raw,
        &[
            record([Some(0), None, Some(100), None]),
            record([Some(0), Some(253), None, None]),
            record([None, None, None, None]),
        ],
    );

    let mut session = AnalysisSession::new(AnalysisConfig::default().with_fed_id(51));
    session.set_threshold(0.3).unwrap();
    let summary = session.analyse_file(&raw).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.chips_recorded, 12);
    assert_eq!(summary.decode_errors, 0);
    assert_eq!(session.events_processed(), 3);

    let curves = session.curves().snapshot();
    let on_off = |channel, strip| {
        let entry = curves.curve(51, channel, strip).unwrap().entry(0.3).unwrap();
        (entry.events_on(), entry.events_off())
    };
    assert_eq!(on_off(0, 0), (2, 1));
    assert_eq!(on_off(0, 1), (0, 3));
    assert_eq!(on_off(1, 253), (1, 2));
    assert_eq!(on_off(2, 100), (1, 2));
    assert_eq!(curves.fed(51).unwrap().channel(3).unwrap().len(), 254);
    assert_eq!(curves.valid_fed_indices(), vec![51]);

    let report = session.occupancy_report();
    assert!(report.starts_with("FED 51, FED channel 0, threshold=0.3 -\n"));
    assert!(report.contains("  2:1   "));
}

#[test]
fn test_state_carries_across_runs() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("cbcscan.state");
    let raw = dir.path().join("run.dat");
    write_raw(&raw, &vec![record([Some(7), None, None, None]); 4]);
    let config = AnalysisConfig::default().with_state_file(&state_path);

    for run in 1..=3u64 {
        let mut session = AnalysisSession::new(config.clone());
        assert_eq!(session.start_of_run().unwrap(), run > 1);
        session.analyse_file(&raw).unwrap();
        assert!(session.end_of_run().unwrap());
        assert_eq!(session.runs_processed(), run);
    }

    let state = SessionState::load(&state_path).unwrap().unwrap();
    assert_eq!(state.events_processed, 12);
    assert_eq!(state.runs_processed, 3);
    let entry = state.curves.curve(0, 0, 7).unwrap().entry(0.0).unwrap();
    assert_eq!((entry.events_on(), entry.events_off()), (12, 0));
}

#[test]
fn test_corrupt_state_file_is_left_alone() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("cbcscan.state");
    fs::write(&state_path, "DetectorSCurves 1 0 FedSCurves 1").unwrap();

    let mut session =
        AnalysisSession::new(AnalysisConfig::default().with_state_file(&state_path));
    assert!(session.start_of_run().is_err());
    assert!(session.curves().is_empty());
    assert_eq!(
        fs::read_to_string(&state_path).unwrap(),
        "DetectorSCurves 1 0 FedSCurves 1"
    );
}

#[test]
fn test_reset_is_persisted() {
    let dir = tempdir().unwrap();
    let state_path = dir.path().join("cbcscan.state");
    let config = AnalysisConfig::default().with_state_file(&state_path);

    let mut session = AnalysisSession::new(config.clone());
    session.create_fake_data();
    session.end_of_run().unwrap();

    let mut session = AnalysisSession::new(config.clone());
    assert!(session.start_of_run().unwrap());
    session.reset();
    assert!(session.end_of_run().unwrap());

    let mut session = AnalysisSession::new(config);
    session.start_of_run().unwrap();
    assert!(session.curves().is_empty());
}

#[test]
fn test_fake_data_fits_converge() {
    // Every fake point carries its own jitter on mean and slope, so the
    // fitted width only lands near the generating one.
    let mut session = AnalysisSession::new(AnalysisConfig::default());
    session.create_fake_data();
    let report = session.fit_report();

    assert_eq!(report.scurves.len(), fake_data::STRIPS);
    assert_eq!(report.unconverged(), 0);
    let width = 1.0 / fake_data::SLOPE;
    for strip in &report.scurves {
        assert_eq!((strip.fed, strip.fed_channel), (fake_data::FED, fake_data::CHANNEL));
        let p = &strip.fit_parameters;
        assert_abs_diff_eq!(p.max_efficiency, 1.0);
        assert_abs_diff_eq!(p.mean, fake_data::MEAN, epsilon = 0.05 * fake_data::MEAN);
        assert!(
            p.standard_deviation > 0.4 * width && p.standard_deviation < 1.2 * width,
            "strip {} width {}",
            strip.cbc_channel,
            p.standard_deviation
        );
        assert_eq!(p.ndf, fake_data::THRESHOLDS as u32 - 2);
    }
}

#[test]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn test_model_curves_fit_to_generating_parameters() {
    let session = AnalysisSession::new(AnalysisConfig::default());
    let width = 1.0 / fake_data::SLOPE;
    let step = (fake_data::LAST_THRESHOLD - fake_data::FIRST_THRESHOLD)
        / (fake_data::THRESHOLDS - 1) as f64;
    session.curves().with_curves_mut(|curves| {
        let channel = curves.channel_mut(fake_data::FED, fake_data::CHANNEL);
        for strip in 0..4 {
            let curve = channel.strip_mut(strip).unwrap();
            for index in 0..fake_data::THRESHOLDS {
                let threshold = fake_data::FIRST_THRESHOLD + step * index as f64;
                let efficiency = s_curve(threshold, 1.0, width, fake_data::MEAN);
                let on = (efficiency * fake_data::EVENTS as f64).round() as u64;
                *curve.entry_mut(threshold) = ThresholdCurveEntry::new(on, fake_data::EVENTS - on);
            }
        }
    });

    let report = session.fit_report();
    assert_eq!(report.scurves.len(), 4);
    assert_eq!(report.unconverged(), 0);
    for strip in &report.scurves {
        let p = &strip.fit_parameters;
        assert_abs_diff_eq!(p.mean, fake_data::MEAN, epsilon = 0.02 * fake_data::MEAN);
        assert_abs_diff_eq!(p.standard_deviation, width, epsilon = 0.05 * width);
    }
}

#[test]
fn test_histogram_of_fake_strip() {
    let mut session = AnalysisSession::new(AnalysisConfig::default());
    session.create_fake_data();
    let histogram = session.histogram(fake_data::FED, fake_data::CHANNEL, 3).unwrap();
    assert_eq!(histogram.bin_count(), fake_data::THRESHOLDS);
    assert_abs_diff_eq!(histogram.low_edge(), -2.5 / 99.0, epsilon = 1e-9);

    assert!(session.histogram(fake_data::FED, fake_data::CHANNEL, 200).is_err());
}

#[test]
fn test_raw_file_info() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&record([Some(1), None, None, None])).unwrap();
    file.write_all(&[0u8; 5]).unwrap();
    file.flush().unwrap();

    let raw = RawDataFile::open(file.path()).unwrap();
    assert_eq!(raw.record_count(), 1);
    let event = raw.first_event().unwrap().unwrap();
    assert!(event.chips[0].channel_data[1]);
}
