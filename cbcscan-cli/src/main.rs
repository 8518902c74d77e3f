//! cbcscan command-line interface.
//!
//! Every invocation is one control request against a persisted analysis
//! session: the state file is restored at start of run and saved again at
//! end of run.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use cbcscan_io::{AnalysisConfig, AnalysisSession, RawDataFile};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    CbcscanIo(#[from] cbcscan_io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] cbcscan_cbc::Error),
}

/// Threshold-scan analyser for CBC silicon-strip readout.
#[derive(Parser)]
#[command(name = "cbcscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Analysis configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// State file restored at start and saved at end (overrides the config)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Global comparator threshold for this request, clamped to [0, 1]
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    threshold: Option<f64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record every event of raw data file(s) at the current threshold
    #[command(alias = "analyze")]
    Analyse {
        /// Raw data file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Print on:off counts of every strip at the current threshold
    Occupancy,

    /// Fit every populated curve and print the JSON report
    Fit {
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the adaptive binning of one strip's curve
    Binning {
        /// FED index
        #[arg(long)]
        fed: usize,

        /// FED channel index
        #[arg(long)]
        channel: usize,

        /// Strip index
        #[arg(long)]
        strip: usize,
    },

    /// Write a snapshot of the session state
    Dump {
        /// Snapshot file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the session state with a snapshot
    Restore {
        /// Snapshot file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Discard all curves
    Reset,

    /// Fill a synthetic threshold scan
    FakeData,

    /// Show information about a raw data file
    Info {
        /// Raw data file
        input: PathBuf,
    },

    /// Print version and default settings
    Version,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(state) = &cli.state {
        config.state_file = Some(state.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Info { input } => return info(&input, &config),
        Commands::Version => {
            println!("cbcscan {}", env!("CARGO_PKG_VERSION"));
            println!("Chip generation: {:?}", config.decoder.chip_generation);
            println!("Fit: {:?}", config.fit);
            return Ok(());
        }
        _ => {}
    }

    let mut session = AnalysisSession::new(config);
    session.start_of_run()?;
    if let Some(threshold) = cli.threshold {
        let previous = session.set_threshold(threshold)?;
        println!(
            "Setting threshold to {} previous value was {}",
            session.threshold(),
            previous
        );
    }

    match cli.command {
        Commands::Analyse { input } => {
            let start = Instant::now();
            let mut records = 0u64;
            let mut errors = 0u64;
            for path in &input {
                log::debug!("Reading: {}", path.display());
                let summary = session.analyse_file(path)?;
                records += summary.records;
                errors += summary.decode_errors;
            }
            println!(
                "Analysed {} records from {} files in {:.2}s at threshold {}",
                records,
                input.len(),
                start.elapsed().as_secs_f64(),
                session.threshold()
            );
            if errors > 0 {
                println!("Skipped {} records that failed to decode", errors);
            }
            println!(
                "Total: {} events in {} runs",
                session.events_processed(),
                session.runs_processed()
            );
        }

        Commands::Occupancy => {
            print!("{}", session.occupancy_report());
        }

        Commands::Fit { output } => {
            let report = session.fit_report();
            match &output {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(path)?);
                    report.write_json(&mut writer)?;
                    writer.flush()?;
                    println!(
                        "Wrote {} fits to {} ({} not converged)",
                        report.scurves.len(),
                        path.display(),
                        report.unconverged()
                    );
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    report.write_json(&mut lock)?;
                }
            }
        }

        Commands::Binning {
            fed,
            channel,
            strip,
        } => {
            let histogram = session.histogram(fed, channel, strip)?;
            println!(
                "FED {}, FED channel {}, strip {}: {} bins over [{}, {})",
                fed,
                channel,
                strip,
                histogram.bin_count(),
                histogram.low_edge(),
                histogram.high_edge()
            );
            println!(
                "{:<12} | {:<12} | {:<12} | {:<10}",
                "Low", "High", "On/Total", "Efficiency"
            );
            println!("{:-<54}", "");
            for bin in histogram.bins() {
                if bin.is_empty() {
                    println!("{:<12.6} | {:<12.6} | {:<12} |", bin.low, bin.high, "-");
                } else {
                    println!(
                        "{:<12.6} | {:<12.6} | {:<12} | {:<10.4}",
                        bin.low,
                        bin.high,
                        format!("{}/{}", bin.passed, bin.total),
                        bin.efficiency()
                    );
                }
            }
        }

        Commands::Dump { output } => {
            session.save_state(&output)?;
            println!("Saved state to {}", output.display());
        }

        Commands::Restore { input } => {
            session.restore_state(&input)?;
            println!(
                "Restored {} events in {} runs from {}",
                session.events_processed(),
                session.runs_processed(),
                input.display()
            );
        }

        Commands::Reset => {
            session.reset();
            println!("All curves discarded");
        }

        Commands::FakeData => {
            let thresholds = session.create_fake_data();
            println!(
                "Fake data created for {} thresholds between {} and {}",
                thresholds,
                cbcscan_io::fake_data::FIRST_THRESHOLD,
                cbcscan_io::fake_data::LAST_THRESHOLD
            );
        }

        Commands::Info { .. } | Commands::Version => {}
    }

    if session.end_of_run()? {
        log::debug!("state saved");
    }
    Ok(())
}

fn info(input: &Path, config: &AnalysisConfig) -> Result<()> {
    let raw = RawDataFile::open(input)?.with_config(config.decoder.clone());
    let file_size = raw.file_size();

    println!("File: {}", input.display());
    println!(
        "Size: {} bytes ({:.2} MB)",
        file_size,
        file_size as f64 / 1_000_000.0
    );
    println!("Records: {}", raw.record_count());
    if raw.trailing_bytes() > 0 {
        println!("Trailing bytes: {}", raw.trailing_bytes());
    }

    if let Some(event) = raw.events().next_event()? {
        println!("First event:");
        println!("  Bunch counter: {}", event.bunch_counter);
        println!("  Orbit counter: {}", event.orbit_counter);
        println!("  Lumisection: {}", event.lumisection);
        println!("  L1A counter: {}", event.l1a_counter);
        println!("  CBC counter: {}", event.cbc_counter);
        for (index, chip) in event.chips.iter().enumerate() {
            println!(
                "  Chip {}: status code {:#04x}, error bits {:?}, {} hits, stub {:#04x}",
                index,
                chip.status_code(),
                chip.error_bits,
                chip.hit_count(),
                chip.stub_data
            );
        }
    }
    Ok(())
}
