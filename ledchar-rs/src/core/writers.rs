//! Data writers for result tables and plain CSV.
//!
//! This module provides functions for writing:
//! - The characterization summary (one row per processed pair)
//! - Generic text tables (used by the spreadsheet converter)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a CSV writer over a buffered file for the given path.
fn create_csv_writer(path: &Path, flexible: bool) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::WriterBuilder::new()
        .flexible(flexible)
        .from_writer(BufWriter::new(file)))
}

fn finish<W: Write>(mut writer: csv::Writer<W>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write serializable records as a comma-separated table with a header row.
///
/// The header is taken from the record's field names. Parent directories are
/// created if needed.
///
/// # Example
///
/// ```no_run
/// use ledchar::core::writers::write_records_csv;
/// use ledchar::processors::pairing::CharacterizationRecord;
/// use std::path::Path;
///
/// let records = vec![CharacterizationRecord {
///     led: "led1-a1".to_string(),
///     x0: 2.41,
///     x_max: 468.5,
///     var_fit: 96.2,
/// }];
/// write_records_csv(Path::new("results.csv"), &records).unwrap();
/// ```
pub fn write_records_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = create_csv_writer(path, false)?;
    let path_str = path.display().to_string();

    for record in records {
        writer.serialize(record).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    finish(writer, path)
}

/// Write rows of text cells as CSV, quoting cells where needed.
///
/// Rows may have different lengths.
pub fn write_rows_csv(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut writer = create_csv_writer(path, true)?;
    let path_str = path.display().to_string();

    for row in rows {
        writer.write_record(row).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    finish(writer, path)
}
