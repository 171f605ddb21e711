//! Conversion of IV workbooks to CSV.
//!
//! The IV tracer exports spreadsheets; the loaders read CSV. Each workbook's
//! first sheet is written next to it as `<stem>.csv` with every cell as text.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use log::{info, warn};
use thiserror::Error;

use crate::core::writers::{write_rows_csv, WriteError};

/// Extensions recognized as workbooks.
pub const WORKBOOK_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "ods"];

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("No sheets found in {0}")]
    NoSheets(PathBuf),

    #[error(transparent)]
    Write(#[from] WriteError),
}

pub type Result<T> = std::result::Result<T, ConversionError>;

/// What happened to one workbook.
#[derive(Debug)]
pub enum ConversionOutcome {
    Converted {
        source: PathBuf,
        output: PathBuf,
        /// Data rows written, header excluded
        rows: usize,
    },
    Failed {
        source: PathBuf,
        error: ConversionError,
    },
}

/// Render a cell as text.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

/// Whether `path` has a workbook extension.
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Write the first sheet of `src` to `dst` as CSV.
///
/// Returns the number of data rows (all rows but the header).
pub fn convert_workbook(src: &Path, dst: &Path) -> Result<usize> {
    let mut workbook = open_workbook_auto(src).map_err(|source| ConversionError::Workbook {
        path: src.to_path_buf(),
        source,
    })?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ConversionError::NoSheets(src.to_path_buf()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|source| ConversionError::Workbook {
            path: src.to_path_buf(),
            source,
        })?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    write_rows_csv(dst, &rows)?;

    Ok(rows.len().saturating_sub(1))
}

/// Workbooks in `dir`, sorted by name.
pub fn find_workbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConversionError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut workbooks: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| ConversionError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_workbook(path))
        .collect();

    workbooks.sort();
    Ok(workbooks)
}

/// Convert one workbook to `<stem>.csv` beside it, logging the result.
pub fn convert_to_sibling_csv(source: PathBuf) -> ConversionOutcome {
    let output = source.with_extension("csv");
    match convert_workbook(&source, &output) {
        Ok(rows) => {
            info!("Converted {} ({} rows)", source.display(), rows);
            ConversionOutcome::Converted {
                source,
                output,
                rows,
            }
        }
        Err(error) => {
            warn!("{}", error);
            ConversionOutcome::Failed { source, error }
        }
    }
}

/// Convert every workbook in `dir` to a CSV file beside it.
///
/// A workbook that fails is reported and the rest are still converted.
pub fn convert_directory(dir: &Path) -> Result<Vec<ConversionOutcome>> {
    Ok(find_workbooks(dir)?
        .into_iter()
        .map(convert_to_sibling_csv)
        .collect())
}
