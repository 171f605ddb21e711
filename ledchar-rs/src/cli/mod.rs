//! Command-line interface for the LED characterization pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{BreakpointGuess, PeakLocation, RenameRule};
use crate::core::loaders::{load_iv_csv, load_spectrum};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "ledchar")]
#[command(about = "LED characterization: IV breakpoint and emission peak fitting", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename raw IV workbooks to led<N>-a<M>-iv.xlsx
    RenameIv {
        /// Directory containing the IV workbooks
        directory: PathBuf,
        /// Preview changes without renaming files
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename raw spectra to led<N>-<x><M>-espectro.txt
    RenameSpectra {
        /// Directory containing the spectrum exports
        directory: PathBuf,
        /// Preview changes without renaming files
        #[arg(long)]
        dry_run: bool,
    },

    /// Convert every workbook in a directory to CSV
    Convert {
        /// Directory containing .xlsx/.xls/.ods files
        directory: PathBuf,
    },

    /// Fit every IV/spectrum pair and write the results table
    Characterize {
        /// Directory containing the IV tables
        iv_dir: PathBuf,
        /// Directory containing the spectra
        spectrum_dir: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Initial guess for the breakpoint fit (overrides config)
        #[arg(long, value_enum)]
        initial_guess: Option<BreakpointGuess>,
        /// Reported peak position (overrides config)
        #[arg(long, value_enum)]
        peak_location: Option<PeakLocation>,
    },

    /// Fit a single IV table and print the breakpoint
    Breakpoint {
        /// IV table
        iv_file: PathBuf,
    },

    /// Fit a single spectrum and print the peak
    Peak {
        /// Spectrum export
        spectrum_file: PathBuf,
    },
}

/// Create a progress bar over `len` items.
///
/// Work that logs should run inside `pb.suspend` so log lines and the bar do
/// not interleave on stderr.
fn create_progress_bar(len: usize, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::RenameIv { directory, dry_run } => {
            cmd_rename("IV", &directory, &config.renaming.iv, dry_run);
        }
        Commands::RenameSpectra { directory, dry_run } => {
            cmd_rename("Spectrum", &directory, &config.renaming.spectrum, dry_run);
        }
        Commands::Convert { directory } => {
            cmd_convert(&directory);
        }
        Commands::Characterize {
            iv_dir,
            spectrum_dir,
            output,
            initial_guess,
            peak_location,
        } => {
            let mut config = config;
            if let Some(guess) = initial_guess {
                config.fitting.initial_guess = guess;
            }
            if let Some(location) = peak_location {
                config.fitting.peak_location = location;
            }
            cmd_characterize(&iv_dir, &spectrum_dir, &output, &config);
        }
        Commands::Breakpoint { iv_file } => {
            cmd_breakpoint(&iv_file, &config);
        }
        Commands::Peak { spectrum_file } => {
            cmd_peak(&spectrum_file, &config);
        }
    }
}

fn cmd_rename(kind: &str, directory: &Path, rule: &RenameRule, dry_run: bool) {
    use crate::processors::renaming::{self, RenameOutcome};

    let start = Instant::now();

    if dry_run {
        println!("DRY RUN: No files will be renamed");
    }

    let outcomes = match renaming::rename_files(directory, rule, dry_run) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("Renaming failed: {}", e);
            std::process::exit(1);
        }
    };

    let (mut renamed, mut unmatched, mut unchanged, mut conflicts, mut failed) = (0, 0, 0, 0, 0);
    for outcome in &outcomes {
        match outcome {
            RenameOutcome::Renamed { .. } => renamed += 1,
            RenameOutcome::Unmatched(_) => unmatched += 1,
            RenameOutcome::Unchanged(_) => unchanged += 1,
            RenameOutcome::Conflict { .. } => conflicts += 1,
            RenameOutcome::Failed { .. } => failed += 1,
        }
    }

    print_summary(
        &format!("{} Renaming Complete", kind),
        &[
            ("Directory", directory.display().to_string()),
            ("Renamed", renamed.to_string()),
            ("Already normalized", unchanged.to_string()),
            ("Unmatched", unmatched.to_string()),
            ("Conflicts", conflicts.to_string()),
            ("Failed", failed.to_string()),
            ("Dry run", dry_run.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_convert(directory: &Path) {
    use crate::processors::conversion::{self, ConversionOutcome};

    let start = Instant::now();

    let workbooks = match conversion::find_workbooks(directory) {
        Ok(workbooks) => workbooks,
        Err(e) => {
            error!("Conversion failed: {}", e);
            std::process::exit(1);
        }
    };

    let pb = create_progress_bar(workbooks.len(), "Converting workbooks to CSV");
    let outcomes: Vec<ConversionOutcome> = workbooks
        .into_iter()
        .map(|source| {
            let outcome = pb.suspend(|| conversion::convert_to_sibling_csv(source));
            pb.inc(1);
            outcome
        })
        .collect();
    pb.finish_and_clear();

    let converted = outcomes
        .iter()
        .filter(|o| matches!(o, ConversionOutcome::Converted { .. }))
        .count();
    let rows: usize = outcomes
        .iter()
        .map(|o| match o {
            ConversionOutcome::Converted { rows, .. } => *rows,
            ConversionOutcome::Failed { .. } => 0,
        })
        .sum();

    print_summary(
        "Conversion Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Workbooks", outcomes.len().to_string()),
            ("Converted", converted.to_string()),
            ("Failed", (outcomes.len() - converted).to_string()),
            ("Rows written", rows.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_characterize(iv_dir: &Path, spectrum_dir: &Path, output: &Path, config: &PipelineConfig) {
    use crate::processors::pairing;

    let start = Instant::now();

    println!("Characterizing LEDs...");
    println!("IV directory: {}", iv_dir.display());
    println!("Spectrum directory: {}", spectrum_dir.display());
    println!("Output: {}", output.display());
    println!("Initial guess: {:?}", config.fitting.initial_guess);
    println!("Peak location: {:?}", config.fitting.peak_location);

    let candidates = match pairing::find_pairs(iv_dir, spectrum_dir, config) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Characterization failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let pb = create_progress_bar(candidates.len(), "Fitting IV curves and spectra");
    let outcomes = candidates
        .into_iter()
        .map(|candidate| {
            let outcome = pb.suspend(|| pairing::process_candidate(candidate, config));
            pb.inc(1);
            outcome
        })
        .collect();
    pb.finish_and_clear();

    let report = pairing::BatchReport { outcomes };
    let written = match pairing::write_results(output, &report) {
        Ok(true) => output.display().to_string(),
        Ok(false) => "nothing written".to_string(),
        Err(e) => {
            error!("Characterization failed: {:#}", e);
            std::process::exit(1);
        }
    };

    print_summary(
        "Characterization Complete",
        &[
            ("IV directory", iv_dir.display().to_string()),
            ("Pairs found", report.outcomes.len().to_string()),
            ("Succeeded", report.succeeded().to_string()),
            ("Skipped", report.skipped().to_string()),
            ("Failed", report.failed().to_string()),
            ("Results", written),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_breakpoint(iv_file: &Path, config: &PipelineConfig) {
    use crate::processors::breakpoint;

    let start = Instant::now();

    let series = match load_iv_csv(iv_file, Some(&config.iv)) {
        Ok(series) => series,
        Err(e) => {
            error!("Failed to load IV file: {}", e);
            std::process::exit(1);
        }
    };

    match breakpoint::fit_breakpoint(&series, &config.fitting) {
        Ok(fit) => {
            print_summary(
                "Breakpoint Fit",
                &[
                    ("IV file", iv_file.display().to_string()),
                    ("Samples", series.len().to_string()),
                    ("x0", format!("{:.6}", fit.x0)),
                    ("y0", format!("{:.6}", fit.y0)),
                    ("k1", format!("{:.6}", fit.k1)),
                    ("k2", format!("{:.6}", fit.k2)),
                    ("Residual", format!("{:.6e}", fit.cost)),
                    ("Iterations", fit.iterations.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Breakpoint fit failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_peak(spectrum_file: &Path, config: &PipelineConfig) {
    use crate::processors::peak;

    let start = Instant::now();

    let series = match load_spectrum(spectrum_file, Some(&config.spectrum)) {
        Ok(series) => series,
        Err(e) => {
            error!("Failed to load spectrum: {}", e);
            std::process::exit(1);
        }
    };

    match peak::fit_peak(&series, &config.fitting) {
        Ok(fit) => {
            print_summary(
                "Peak Fit",
                &[
                    ("Spectrum", spectrum_file.display().to_string()),
                    ("Samples", series.len().to_string()),
                    ("Observed peak", format!("{:.4}", fit.x_max)),
                    ("Fitted center", format!("{:.4}", fit.mu)),
                    ("FWHM", format!("{:.4}", fit.fwhm)),
                    ("Sigma", format!("{:.4}", fit.sigma)),
                    ("Variance", format!("{:.4}", fit.variance())),
                    ("Iterations", fit.iterations.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Peak fit failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_characterize_overrides() {
        let cli = Cli::try_parse_from([
            "ledchar",
            "-vv",
            "characterize",
            "IV-A-1",
            "Espectro-A-1",
            "out.csv",
            "--initial-guess",
            "regression",
            "--peak-location",
            "fitted",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Characterize {
                output,
                initial_guess,
                peak_location,
                ..
            } => {
                assert_eq!(output, PathBuf::from("out.csv"));
                assert_eq!(initial_guess, Some(BreakpointGuess::Regression));
                assert_eq!(peak_location, Some(PeakLocation::Fitted));
            }
            _ => panic!("expected characterize"),
        }
    }

    #[test]
    fn test_progress_bar_wraps_logging_work() {
        let pb = create_progress_bar(3, "Fitting");
        assert_eq!(pb.length(), Some(3));

        // Work run while the bar is suspended still returns its value
        let value = pb.suspend(|| {
            warn!("logged while the bar is hidden");
            42
        });
        pb.inc(1);

        assert_eq!(value, 42);
        assert_eq!(pb.position(), 1);
        pb.finish_and_clear();
    }

    #[test]
    fn test_parse_rename_dry_run() {
        let cli = Cli::try_parse_from(["ledchar", "rename-spectra", "raw", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::RenameSpectra { dry_run: true, .. }
        ));
    }
}
