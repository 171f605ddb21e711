//! Pairing of IV and spectrum files and batch characterization.
//!
//! IV files are recognized by their suffix (`-iv.csv`, `-iv.txt`). Stripping
//! the suffix gives the LED base name, and `<base>-espectro.txt` in the
//! spectrum directory is its emission spectrum. Each pair yields one
//! [`CharacterizationRecord`]; a pair that cannot be processed is reported and
//! the batch moves on.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::{load_iv_csv, load_spectrum, LoaderError};
use crate::core::writers::write_records_csv;

use super::breakpoint::find_breakpoint;
use super::curve_fit::FitError;
use super::peak::find_peak;

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizationRecord {
    /// LED base name, e.g. `led1-a2`
    pub led: String,
    /// Breakpoint of the IV curve
    pub x0: f64,
    /// Peak position of the spectrum
    pub x_max: f64,
    /// Variance of the fitted Gaussian
    pub var_fit: f64,
}

/// Errors that stop a single pair from being characterized.
#[derive(Debug, Error)]
pub enum PairError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("breakpoint fit failed for {path}: {source}")]
    Breakpoint {
        path: PathBuf,
        #[source]
        source: FitError,
    },

    #[error("peak fit failed for {path}: {source}")]
    Peak {
        path: PathBuf,
        #[source]
        source: FitError,
    },
}

/// An IV file and the spectrum it should be paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCandidate {
    pub base_name: String,
    pub iv_path: PathBuf,
    /// Expected spectrum location; it may not exist.
    pub spectrum_path: PathBuf,
}

impl PairCandidate {
    #[inline]
    pub fn has_spectrum(&self) -> bool {
        self.spectrum_path.is_file()
    }
}

/// Why a pair was not processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The expected spectrum file does not exist.
    MissingSpectrum(PathBuf),
}

/// Result for one pair.
#[derive(Debug)]
pub enum PairStatus {
    Succeeded(CharacterizationRecord),
    Skipped(SkipReason),
    Failed(PairError),
}

#[derive(Debug)]
pub struct PairOutcome {
    pub base_name: String,
    pub status: PairStatus,
}

/// Outcomes of a batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PairOutcome>,
}

impl BatchReport {
    /// Records of all successful pairs.
    pub fn records(&self) -> Vec<CharacterizationRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                PairStatus::Succeeded(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Succeeded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&PairStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Strip one of `suffixes` (case-insensitive) from a file name.
///
/// Returns the base name, or `None` if the name has none of the suffixes.
pub fn strip_suffix_ignore_case<'a>(name: &'a str, suffixes: &[String]) -> Option<&'a str> {
    suffixes.iter().find_map(|suffix| {
        let split = name.len().checked_sub(suffix.len())?;
        let tail = name.get(split..)?;
        tail.eq_ignore_ascii_case(suffix).then(|| &name[..split])
    })
}

/// Find the IV files in `iv_dir` and the spectrum each one pairs with.
///
/// Candidates are returned sorted by IV file name, whether or not their
/// spectrum exists.
pub fn find_pairs(
    iv_dir: &Path,
    spectrum_dir: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PairCandidate>> {
    let mut iv_files: Vec<PathBuf> = fs::read_dir(iv_dir)
        .with_context(|| format!("Failed to read IV directory: {}", iv_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    iv_files.sort();

    let candidates = iv_files
        .into_iter()
        .filter_map(|iv_path| {
            let file_name = iv_path.file_name()?.to_str()?;
            let base_name = strip_suffix_ignore_case(file_name, &config.iv.suffixes)?.to_string();
            let spectrum_path =
                spectrum_dir.join(format!("{}{}", base_name, config.spectrum.suffix));
            Some(PairCandidate {
                base_name,
                iv_path,
                spectrum_path,
            })
        })
        .collect();

    Ok(candidates)
}

/// Load both files of a pair and run both fits.
pub fn characterize_pair(
    candidate: &PairCandidate,
    config: &PipelineConfig,
) -> std::result::Result<CharacterizationRecord, PairError> {
    let iv = load_iv_csv(&candidate.iv_path, Some(&config.iv)).map_err(|source| PairError::Load {
        path: candidate.iv_path.clone(),
        source,
    })?;
    let spectrum = load_spectrum(&candidate.spectrum_path, Some(&config.spectrum)).map_err(
        |source| PairError::Load {
            path: candidate.spectrum_path.clone(),
            source,
        },
    )?;

    let x0 = find_breakpoint(&iv, &config.fitting).map_err(|source| PairError::Breakpoint {
        path: candidate.iv_path.clone(),
        source,
    })?;
    let (x_max, var_fit) =
        find_peak(&spectrum, &config.fitting).map_err(|source| PairError::Peak {
            path: candidate.spectrum_path.clone(),
            source,
        })?;

    Ok(CharacterizationRecord {
        led: candidate.base_name.clone(),
        x0,
        x_max,
        var_fit,
    })
}

/// Characterize one candidate, logging the outcome.
///
/// A missing spectrum is a skip, not a failure.
pub fn process_candidate(candidate: PairCandidate, config: &PipelineConfig) -> PairOutcome {
    let status = if !candidate.has_spectrum() {
        warn!(
            "Spectrum not found for {}, skipping ({})",
            candidate.base_name,
            candidate.spectrum_path.display()
        );
        PairStatus::Skipped(SkipReason::MissingSpectrum(candidate.spectrum_path.clone()))
    } else {
        info!("Processing {}...", candidate.base_name);
        match characterize_pair(&candidate, config) {
            Ok(record) => {
                info!(
                    "{}: x0={:.4} x_max={:.4} var_fit={:.4}",
                    record.led, record.x0, record.x_max, record.var_fit
                );
                PairStatus::Succeeded(record)
            }
            Err(e) => {
                warn!("{}: {}", candidate.base_name, e);
                PairStatus::Failed(e)
            }
        }
    };

    PairOutcome {
        base_name: candidate.base_name,
        status,
    }
}

/// Characterize every pair found in the two directories.
///
/// A missing spectrum or a failing pair is recorded in the report; only an
/// unreadable IV directory is an error.
pub fn process_pairs(
    iv_dir: &Path,
    spectrum_dir: &Path,
    config: &PipelineConfig,
) -> Result<BatchReport> {
    let outcomes = find_pairs(iv_dir, spectrum_dir, config)?
        .into_iter()
        .map(|candidate| process_candidate(candidate, config))
        .collect();

    Ok(BatchReport { outcomes })
}

/// Write the successful records of `report` to `output`.
///
/// Nothing is written when no pair succeeded. Returns whether the file was
/// written.
pub fn write_results(output: &Path, report: &BatchReport) -> Result<bool> {
    let records = report.records();

    if records.is_empty() {
        warn!("No results produced, check the file names and separators");
        return Ok(false);
    }

    write_records_csv(output, &records)
        .with_context(|| format!("Failed to write results to {}", output.display()))?;
    info!("Results saved to {}", output.display());

    Ok(true)
}

/// Characterize all pairs and write the results table to `output`.
///
/// The table is written only when at least one pair succeeded.
///
/// # Arguments
///
/// * `iv_dir` - Directory with IV tables
/// * `spectrum_dir` - Directory with spectrum exports
/// * `output` - Results CSV path (parent directories are created)
/// * `config` - Pipeline configuration
pub fn run_characterization(
    iv_dir: &Path,
    spectrum_dir: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<BatchReport> {
    let report = process_pairs(iv_dir, spectrum_dir, config)?;
    write_results(output, &report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// IV table with a knee at 2.4 V.
    fn create_iv_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "\"tensao (V) (0,001)\",\"corrente (mA) (0,0001)\"").unwrap();
        for i in 0..=60 {
            let v = i as f64 * 0.05;
            let current = if v < 2.4 { 0.2 * v } else { 0.48 + 40.0 * (v - 2.4) };
            writeln!(file, "{:.3},{:.4}", v, current).unwrap();
        }
        path
    }

    /// Tab separated, comma decimal spectrum with a line at 455 nm, sigma 10.
    fn create_spectrum_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for i in 0..400 {
            let wavelength = 350.0 + i as f64 * 0.5;
            let intensity = 20.0 + 1500.0 * (-(wavelength - 455.0_f64).powi(2) / 200.0).exp();
            let line = format!("{:.2}\t{:.6}", wavelength, intensity).replace('.', ",");
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn setup_dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let iv_dir = temp_dir.path().join("IV-A-1");
        let spectrum_dir = temp_dir.path().join("Espectro-A-1");
        fs::create_dir_all(&iv_dir).unwrap();
        fs::create_dir_all(&spectrum_dir).unwrap();
        (temp_dir, iv_dir, spectrum_dir)
    }

    #[test]
    fn test_strip_suffix_ignore_case() {
        let suffixes = vec!["-iv.txt".to_string(), "-iv.csv".to_string()];
        assert_eq!(strip_suffix_ignore_case("led1-a2-iv.csv", &suffixes), Some("led1-a2"));
        assert_eq!(strip_suffix_ignore_case("LED3-A1-IV.TXT", &suffixes), Some("LED3-A1"));
        assert_eq!(strip_suffix_ignore_case("led1-a2-espectro.txt", &suffixes), None);
        assert_eq!(strip_suffix_ignore_case("iv.csv", &suffixes), None);
    }

    #[test]
    fn test_find_pairs() {
        let (_temp, iv_dir, spectrum_dir) = setup_dirs();
        create_iv_file(&iv_dir, "led2-a1-iv.csv");
        create_iv_file(&iv_dir, "led1-a1-iv.txt");
        File::create(iv_dir.join("notes.txt")).unwrap();
        create_spectrum_file(&spectrum_dir, "led1-a1-espectro.txt");

        let pairs = find_pairs(&iv_dir, &spectrum_dir, &PipelineConfig::default()).unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].base_name, "led1-a1");
        assert_eq!(pairs[0].spectrum_path, spectrum_dir.join("led1-a1-espectro.txt"));
        assert!(pairs[0].has_spectrum());
        assert_eq!(pairs[1].base_name, "led2-a1");
        assert!(!pairs[1].has_spectrum());
    }

    #[test]
    fn test_find_pairs_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = find_pairs(
            &temp_dir.path().join("nope"),
            temp_dir.path(),
            &PipelineConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_characterize_pair() {
        let (_temp, iv_dir, spectrum_dir) = setup_dirs();
        let candidate = PairCandidate {
            base_name: "led1-a1".to_string(),
            iv_path: create_iv_file(&iv_dir, "led1-a1-iv.csv"),
            spectrum_path: create_spectrum_file(&spectrum_dir, "led1-a1-espectro.txt"),
        };

        let record = characterize_pair(&candidate, &PipelineConfig::default()).unwrap();

        assert_eq!(record.led, "led1-a1");
        assert_abs_diff_eq!(record.x0, 2.4, epsilon = 1e-6);
        assert_abs_diff_eq!(record.x_max, 455.0, epsilon = 1e-9);
        assert_abs_diff_eq!(record.var_fit, 100.0, epsilon = 0.1);
    }

    #[test]
    fn test_process_pairs_keeps_going() {
        let (_temp, iv_dir, spectrum_dir) = setup_dirs();

        // good pair
        create_iv_file(&iv_dir, "led1-a1-iv.csv");
        create_spectrum_file(&spectrum_dir, "led1-a1-espectro.txt");

        // malformed IV cell
        let bad = iv_dir.join("led2-a1-iv.csv");
        fs::write(
            &bad,
            "\"tensao (V) (0,001)\",\"corrente (mA) (0,0001)\"\n0.1,0.2\n0.2,oops\n",
        )
        .unwrap();
        create_spectrum_file(&spectrum_dir, "led2-a1-espectro.txt");

        // flat spectrum
        create_iv_file(&iv_dir, "led3-a1-iv.csv");
        fs::write(spectrum_dir.join("led3-a1-espectro.txt"), "400,0\t5,0\n401,0\t5,0\n402,0\t5,0\n")
            .unwrap();

        // no spectrum at all
        create_iv_file(&iv_dir, "led4-a1-iv.csv");

        let report =
            process_pairs(&iv_dir, &spectrum_dir, &PipelineConfig::default()).unwrap();

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.skipped(), 1);

        match &report.outcomes[1].status {
            PairStatus::Failed(PairError::Load {
                path,
                source: LoaderError::Parse { line, .. },
            }) => {
                assert_eq!(path, &bad);
                assert_eq!(*line, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            report.outcomes[2].status,
            PairStatus::Failed(PairError::Peak {
                source: FitError::DegenerateInput { .. },
                ..
            })
        ));
        assert!(matches!(
            report.outcomes[3].status,
            PairStatus::Skipped(SkipReason::MissingSpectrum(_))
        ));
    }

    #[test]
    fn test_run_characterization_writes_table() {
        let (temp, iv_dir, spectrum_dir) = setup_dirs();
        create_iv_file(&iv_dir, "led1-a1-iv.csv");
        create_iv_file(&iv_dir, "led1-a2-iv.txt");
        create_spectrum_file(&spectrum_dir, "led1-a1-espectro.txt");
        create_spectrum_file(&spectrum_dir, "led1-a2-espectro.txt");

        let output = temp.path().join("Resultados/a1-resultados.csv");
        let report =
            run_characterization(&iv_dir, &spectrum_dir, &output, &PipelineConfig::default())
                .unwrap();
        assert_eq!(report.succeeded(), 2);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            vec!["led", "x0", "x_max", "var_fit"]
        );
        let rows: Vec<CharacterizationRecord> =
            reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].led, "led1-a1");
        assert_eq!(rows[1].led, "led1-a2");
        assert_abs_diff_eq!(rows[1].x0, 2.4, epsilon = 1e-6);
    }

    #[test]
    fn test_process_candidate_reports_missing_spectrum() {
        let (_temp, iv_dir, spectrum_dir) = setup_dirs();
        let candidate = PairCandidate {
            base_name: "led9-a1".to_string(),
            iv_path: create_iv_file(&iv_dir, "led9-a1-iv.csv"),
            spectrum_path: spectrum_dir.join("led9-a1-espectro.txt"),
        };

        let outcome = process_candidate(candidate, &PipelineConfig::default());

        assert_eq!(outcome.base_name, "led9-a1");
        match outcome.status {
            PairStatus::Skipped(SkipReason::MissingSpectrum(path)) => {
                assert_eq!(path, spectrum_dir.join("led9-a1-espectro.txt"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_run_characterization_without_results_writes_nothing() {
        let (temp, iv_dir, spectrum_dir) = setup_dirs();
        create_iv_file(&iv_dir, "led1-a1-iv.csv");

        let output = temp.path().join("results.csv");
        let report =
            run_characterization(&iv_dir, &spectrum_dir, &output, &PipelineConfig::default())
                .unwrap();

        assert_eq!(report.skipped(), 1);
        assert!(!output.exists());
    }
}
