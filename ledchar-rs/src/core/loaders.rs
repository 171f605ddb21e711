//! Data loaders for IV tables and spectrometer exports.
//!
//! This module provides parsers for:
//! - IV tables (comma separated, period decimal, header row, quoted fields)
//! - Spectrum exports (tab separated, comma decimal, no header)
//!
//! Both produce a [`SampleSeries`]. Malformed cells fail the whole file with
//! the offending path, line and column instead of being skipped.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use crate::config::{IvConfig, SpectrumConfig};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}, line {line}: expected at least {expected} columns, found {found}")]
    ColumnCount {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{path}, line {line}, column {column}: '{value}' is not a number")]
    Parse {
        path: PathBuf,
        line: u64,
        column: usize,
        value: String,
    },

    #[error("Delimiter {0:?} is not a single-byte character")]
    InvalidDelimiter(char),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// An ordered series of (x, y) samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    /// Abscissa values (voltage or wavelength).
    pub x: Vec<f64>,
    /// Ordinate values (current or intensity), same length as `x`.
    pub y: Vec<f64>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl SampleSeries {
    /// Creates a series from coordinate vectors.
    pub fn from_xy(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            source_path: None,
        }
    }

    /// Creates an empty series with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            source_path: None,
        }
    }

    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the series has no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a sample.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }

    /// Returns the series with y multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x.clone(),
            y: self.y.iter().map(|v| v * factor).collect(),
            source_path: self.source_path.clone(),
        }
    }
}

/// Parse a numeric cell written with the given decimal separator.
///
/// Surrounding whitespace is ignored. Thousands separators are not supported.
pub fn parse_decimal(cell: &str, decimal: char) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    if decimal == '.' {
        trimmed.parse().ok()
    } else {
        trimmed.replace(decimal, ".").parse().ok()
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(LoaderError::InvalidDelimiter(delimiter))
}

fn record_line(record: &StringRecord, fallback: u64) -> u64 {
    record.position().map_or(fallback, |p| p.line())
}

fn parse_cell(
    record: &StringRecord,
    column: usize,
    decimal: char,
    path: &Path,
    line: u64,
) -> Result<f64> {
    let value = record.get(column).unwrap_or("");
    parse_decimal(value, decimal).ok_or_else(|| LoaderError::Parse {
        path: path.to_path_buf(),
        line,
        column: column + 1,
        value: value.to_string(),
    })
}

/// Load an IV table.
///
/// The expected format:
/// - Header row naming the columns
/// - Voltage and current columns identified by the exact header names in `config`
/// - Comma field separator, period decimal separator, optional quoting
///
/// # Arguments
///
/// * `path` - Path to the IV file
/// * `config` - IV layout (uses defaults if None)
///
/// # Returns
///
/// A `SampleSeries` with voltage as x and current as y.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks one of the columns,
/// contains a non-numeric cell in them, or has no data rows.
pub fn load_iv_csv<P: AsRef<Path>>(path: P, config: Option<&IvConfig>) -> Result<SampleSeries> {
    let path = path.as_ref();
    let default_config = IvConfig::default();
    let config = config.unwrap_or(&default_config);

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter_byte(config.delimiter)?)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let find_column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or_else(|| LoaderError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let x_idx = find_column(&config.voltage_column)?;
    let y_idx = find_column(&config.current_column)?;
    let needed = x_idx.max(y_idx) + 1;

    let mut series = SampleSeries::with_capacity(256);

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let line = record_line(&record, row_no as u64 + 2);

        // Fully blank lines carry no sample
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if record.len() < needed {
            return Err(LoaderError::ColumnCount {
                path: path.to_path_buf(),
                line,
                expected: needed,
                found: record.len(),
            });
        }

        let x = parse_cell(&record, x_idx, '.', path, line)?;
        let y = parse_cell(&record, y_idx, '.', path, line)?;
        series.push(x, y);
    }

    if series.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    series.source_path = Some(path.to_path_buf());
    Ok(series)
}

/// Load a spectrometer export.
///
/// The expected format:
/// - No header row
/// - First column wavelength, second column intensity, extra columns ignored
/// - Tab field separator, comma decimal separator (configurable)
///
/// # Arguments
///
/// * `path` - Path to the spectrum file
/// * `config` - Spectrum layout (uses defaults if None)
///
/// # Returns
///
/// A `SampleSeries` with wavelength as x and intensity as y.
pub fn load_spectrum<P: AsRef<Path>>(
    path: P,
    config: Option<&SpectrumConfig>,
) -> Result<SampleSeries> {
    let path = path.as_ref();
    let default_config = SpectrumConfig::default();
    let config = config.unwrap_or(&default_config);

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter_byte(config.delimiter)?)
        .from_reader(BufReader::new(file));

    let mut series = SampleSeries::with_capacity(2048);

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let line = record_line(&record, row_no as u64 + 1);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if record.len() < 2 {
            return Err(LoaderError::ColumnCount {
                path: path.to_path_buf(),
                line,
                expected: 2,
                found: record.len(),
            });
        }

        let x = parse_cell(&record, 0, config.decimal, path, line)?;
        let y = parse_cell(&record, 1, config.decimal, path, line)?;
        series.push(x, y);
    }

    if series.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    series.source_path = Some(path.to_path_buf());
    Ok(series)
}
