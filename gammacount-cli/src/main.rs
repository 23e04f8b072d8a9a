//! gammacount CLI.
//!
//! Counting-time estimates, counting-schedule optimisation and photopeak
//! fitting of `.Spe` spectra from the command line.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use gammacount_algorithms::{
    analyze_spectrum, compute_windows, detect_peaks, AnalysisConfig, CountTimeRequest,
    CountTimeSolver, PeakFitConfig, ScheduleConfig, ScheduleOptimizer, WindowConfig,
};
use gammacount_core::{ActivityUnit, Spectrum};
use gammacount_io::{read_channel_table, read_spe, ResultWriter};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    GammacountIo(#[from] gammacount_io::Error),

    #[error("{0}")]
    Core(#[from] gammacount_core::Error),
}

/// Gamma counting plans and photopeak fits.
#[derive(Parser)]
#[command(name = "gammacount")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (info-level logging; `RUST_LOG` overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Peak detection and window sizing.
#[derive(Args, Debug)]
struct DetectionArgs {
    /// Ignore channels below this one
    #[arg(long, default_value = "0")]
    cut_channel: u32,

    /// Detection threshold relative to the counts range
    #[arg(long, default_value = "0.5")]
    threshold: f64,

    /// Minimum separation of detected peaks (channels)
    #[arg(long, default_value = "10")]
    min_distance: usize,

    /// Half-width of an unobstructed window (channels)
    #[arg(long, default_value = "100")]
    max_window: i64,

    /// Clearance kept from a neighbouring peak (channels)
    #[arg(long, default_value = "15")]
    peak_width: i64,

    /// Smallest half-width on either side (channels)
    #[arg(long, default_value = "20")]
    min_window: i64,
}

impl DetectionArgs {
    fn config(&self) -> AnalysisConfig {
        AnalysisConfig::default()
            .with_cut_channel(self.cut_channel)
            .with_detection(self.threshold, self.min_distance)
            .with_windows(
                WindowConfig::default()
                    .with_max_window(self.max_window)
                    .with_peak_width(self.peak_width)
                    .with_min_window(self.min_window),
            )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Live time needed to reach a relative precision on one gamma line
    CountTime {
        /// Target relative uncertainty, e.g. 0.01
        #[arg(long, default_value = "0.01")]
        sigma: f64,

        /// Half-life (s)
        #[arg(long)]
        half_life: f64,

        /// Activity (or atoms) at the start of the count
        #[arg(long)]
        activity: f64,

        /// Absolute full-energy-peak efficiency
        #[arg(long)]
        efficiency: f64,

        /// Background rate under the peak (cps)
        #[arg(long, default_value = "0.001")]
        background: f64,

        /// Activity units: uCi, Ci, Bq or atoms
        #[arg(long, default_value = "Bq")]
        units: String,
    },

    /// Optimise the counting order of the foil groups in a channel table
    Schedule {
        /// JSON channel table
        table: PathBuf,

        /// CSV output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample change time between counts (s)
        #[arg(long, default_value = "60")]
        handle_time: f64,

        /// Detector crystal radius (cm)
        #[arg(long, default_value = "5")]
        detector_radius: f64,

        /// Background rate under each peak (cps)
        #[arg(long, default_value = "0.001")]
        background: f64,

        /// Override the table's activity units
        #[arg(long)]
        units: Option<String>,

        /// Round count times up to whole minutes
        #[arg(long)]
        round_to_minute: bool,

        /// Largest number of foil groups to search
        #[arg(long, default_value = "10")]
        max_groups: usize,

        /// Evaluate orders on a single thread
        #[arg(long)]
        serial: bool,
    },

    /// Detect peaks in a spectrum and print their fitting windows
    Windows {
        /// Input .Spe file
        input: PathBuf,

        /// CSV output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        detection: DetectionArgs,
    },

    /// Fit every detected photopeak in a spectrum
    Fit {
        /// Input .Spe file
        input: PathBuf,

        /// CSV output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Samples either side of the seed used for the gaussian pre-fit
        #[arg(long, default_value = "20")]
        fit_width: usize,

        /// Fit windows on a single thread
        #[arg(long)]
        serial: bool,
    },

    /// Show information about a spectrum file
    Info {
        /// Input .Spe file
        input: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn output_writer(path: Option<&Path>) -> Result<ResultWriter<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    Ok(ResultWriter::new(writer))
}

fn print_spectrum_info(path: &Path, spectrum: &Spectrum) {
    println!("File: {}", path.display());
    println!("Channels: {}", spectrum.len());
    if let (Some(first), Some(last)) = (spectrum.channels.first(), spectrum.channels.last()) {
        println!("Channel range: {first} - {last}");
    }
    println!("Total counts: {:.0}", spectrum.total_counts());
    println!("Live time: {} s", spectrum.live_time);
    println!("Real time: {} s", spectrum.real_time);
    if spectrum.real_time > 0.0 {
        let dead = (1.0 - spectrum.live_time / spectrum.real_time) * 100.0;
        println!("Dead time: {dead:.2}%");
    }
    match spectrum.timestamp {
        Some(timestamp) => println!("Start: {timestamp}"),
        None => println!("Start: unknown"),
    }
    let cal = spectrum.calibration;
    println!("Calibration: E = {:e}·ch² + {}·ch + {} keV", cal.a, cal.b, cal.c);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::CountTime {
            sigma,
            half_life,
            activity,
            efficiency,
            background,
            units,
        } => {
            let request = CountTimeRequest::new(sigma, half_life, activity, efficiency)
                .with_background(background)
                .with_units(ActivityUnit::parse(&units));
            let solution = CountTimeSolver::default().solve(&request)?;

            if solution.feasible {
                println!("Live time: {:.1} s", solution.live_time);
                println!("Background time: {:.1} s", solution.background_time);
                println!("Mean count rate: {:.4} cps", solution.mean_rate);
                println!("Iterations: {}", solution.iterations);
            } else {
                println!("Precision target cannot be reached in finite time");
            }
        }

        Commands::Schedule {
            table,
            output,
            handle_time,
            detector_radius,
            background,
            units,
            round_to_minute,
            max_groups,
            serial,
        } => {
            let table = read_channel_table(&table)?;
            let units = units.map_or(table.units, |u| ActivityUnit::parse(&u));
            let config = ScheduleConfig::default()
                .with_handle_time(handle_time)
                .with_detector_radius(detector_radius)
                .with_background(background)
                .with_units(units)
                .with_round_to_minute(round_to_minute)
                .with_max_groups(max_groups)
                .with_parallel(!serial);

            let start = Instant::now();
            let optimizer = ScheduleOptimizer::new(config);
            let schedule = optimizer.optimize(&table.channels, &table.efficiency)?;
            let elapsed = start.elapsed();

            output_writer(output.as_deref())?.write_schedule(&schedule)?;

            eprintln!(
                "Searched {} orders in {:.2}s",
                schedule.permutations_evaluated,
                elapsed.as_secs_f64()
            );
            eprintln!("Order: {}", schedule.order.join(" -> "));
            if schedule.is_feasible() {
                eprintln!(
                    "Total count time: {:.1} s ({:.2} h)",
                    schedule.total_time,
                    schedule.total_time / 3600.0
                );
                eprintln!(
                    "Elapsed including handling: {:.1} s",
                    schedule.elapsed_time()
                );
            } else {
                let failing: Vec<&str> = schedule
                    .assignments
                    .iter()
                    .filter(|a| !a.is_feasible())
                    .map(|a| a.name.as_str())
                    .collect();
                eprintln!("Infeasible channels: {}", failing.join(", "));
            }
        }

        Commands::Windows {
            input,
            output,
            detection,
        } => {
            let spectrum = read_spe(&input)?;
            let config = detection.config();
            let peaks = detect_peaks(&spectrum, &config);
            let windows = compute_windows(&peaks, &config.windows)?;
            output_writer(output.as_deref())?.write_windows(&windows)?;
            log::info!("{} peaks in {}", peaks.len(), input.display());
        }

        Commands::Fit {
            input,
            output,
            detection,
            fit_width,
            serial,
        } => {
            let spectrum = read_spe(&input)?;
            let config = detection
                .config()
                .with_fit(PeakFitConfig::default().with_peak_width(fit_width))
                .with_parallel(!serial);

            let start = Instant::now();
            let reports = analyze_spectrum(&spectrum, &config)?;
            let elapsed = start.elapsed();

            output_writer(output.as_deref())?.write_peak_reports(&reports)?;

            let fitted = reports.iter().filter(|r| r.outcome.is_ok()).count();
            eprintln!(
                "Fitted {}/{} peaks in {:.2}s",
                fitted,
                reports.len(),
                elapsed.as_secs_f64()
            );
        }

        Commands::Info { input } => {
            let spectrum = read_spe(&input)?;
            print_spectrum_info(&input, &spectrum);
        }
    }

    Ok(())
}
