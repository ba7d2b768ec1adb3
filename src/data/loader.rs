//! Table Loader Module
//! Reads tab- or comma-delimited exports into `SignalTable`s using Polars.

use super::table::{ColumnKey, SignalTable, TableError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}: no header rows found")]
    NoHeader(PathBuf),
    #[error("{0}: no data rows found")]
    NoData(PathBuf),
    #[error("{path}: header layout expects {expected} header rows, file has {actual} rows")]
    ShortHeader {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Field separator of the input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Tab when the first line contains one, comma otherwise.
    #[default]
    Auto,
    Comma,
    Tab,
}

/// Which leading rows hold the header levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLayout {
    /// Number of leading rows that are not data.
    pub header_rows: usize,
    /// Row holding signal names.
    pub signal_row: usize,
    /// Row holding axis labels, if any.
    pub axis_row: Option<usize>,
}

impl HeaderLayout {
    /// Layout implied by the number of leading header rows.
    ///
    /// Visual3D exports carry five rows (file, signal, type, folder, axis).
    pub fn infer(header_rows: usize) -> Option<Self> {
        match header_rows {
            0 => None,
            1 => Some(Self {
                header_rows,
                signal_row: 0,
                axis_row: None,
            }),
            2..=4 => Some(Self {
                header_rows,
                signal_row: 0,
                axis_row: Some(header_rows - 1),
            }),
            _ => Some(Self {
                header_rows,
                signal_row: 1,
                axis_row: Some(header_rows - 1),
            }),
        }
    }
}

/// Options controlling how a file is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub delimiter: Delimiter,
    /// Explicit header layout; detected from the data when absent.
    #[serde(default)]
    pub header: Option<HeaderLayout>,
}

/// Handles table loading with Polars.
#[derive(Debug, Clone, Default)]
pub struct TableLoader {
    options: LoadOptions,
}

impl TableLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    /// Load one delimited file.
    pub fn load(&self, path: &Path) -> Result<SignalTable, LoaderError> {
        let separator = self.separator_for(path)?;

        // Everything is read as strings; header rows are split off below.
        let df = LazyCsvReader::new(path)
            .with_has_header(false)
            .with_separator(separator)
            .with_infer_schema_length(Some(0))
            .with_truncate_ragged_lines(true)
            .finish()?
            .collect()?;

        let cells = string_cells(&df)?;
        let total_rows = df.height();

        let layout = match self.options.header {
            Some(layout) => layout,
            None => {
                let header_rows = count_header_rows(&cells, total_rows);
                HeaderLayout::infer(header_rows)
                    .ok_or_else(|| LoaderError::NoHeader(path.to_path_buf()))?
            }
        };
        if layout.header_rows > total_rows {
            return Err(LoaderError::ShortHeader {
                path: path.to_path_buf(),
                expected: layout.header_rows,
                actual: total_rows,
            });
        }
        if layout.header_rows == total_rows {
            return Err(LoaderError::NoData(path.to_path_buf()));
        }

        let keys = header_keys(&cells, layout);
        let data_rows = total_rows - layout.header_rows;

        let columns = df
            .get_columns()
            .iter()
            .map(|column| {
                let numeric = column
                    .as_materialized_series()
                    .slice(layout.header_rows as i64, data_rows)
                    .cast(&DataType::Float64)?;
                Ok(numeric
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect())
            })
            .collect::<PolarsResult<Vec<Vec<f64>>>>()?;

        debug!(
            "Loaded {} ({} header rows, {} columns, {} frames)",
            path.display(),
            layout.header_rows,
            keys.len(),
            data_rows
        );

        Ok(SignalTable::new(keys, columns)?)
    }

    /// Load every `.csv` file of a directory in sorted order.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<(PathBuf, SignalTable)>, LoaderError> {
        csv_files(dir)?
            .into_iter()
            .map(|path| {
                let table = self.load(&path)?;
                Ok((path, table))
            })
            .collect()
    }

    fn separator_for(&self, path: &Path) -> Result<u8, LoaderError> {
        match self.options.delimiter {
            Delimiter::Comma => Ok(b','),
            Delimiter::Tab => Ok(b'\t'),
            Delimiter::Auto => {
                let io_err = |source| LoaderError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                let file = File::open(path).map_err(io_err)?;
                let mut first_line = String::new();
                BufReader::new(file)
                    .read_line(&mut first_line)
                    .map_err(io_err)?;
                Ok(if first_line.contains('\t') { b'\t' } else { b',' })
            }
        }
    }
}

/// `.csv` files directly inside `dir`, in natural order: a trailing
/// number in the file stem sorts numerically (`sliced2` before `sliced10`).
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let io_err = |source| LoaderError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| natural_key(path));
    Ok(files)
}

fn natural_key(path: &Path) -> (String, Option<u64>, PathBuf) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = stem[prefix.len()..].parse().ok();
    (prefix.to_string(), number, path.to_path_buf())
}

fn string_cells(df: &DataFrame) -> PolarsResult<Vec<Vec<Option<&str>>>> {
    df.get_columns()
        .iter()
        .map(|column| {
            let ca = column.as_materialized_series().str()?;
            Ok(ca.into_iter().collect())
        })
        .collect()
}

fn is_numeric_cell(cell: &str) -> bool {
    cell.trim().parse::<f64>().is_ok()
}

/// Leading rows that contain text are header rows. Blank rows count only
/// before the first text row; after it, a blank row is an all-missing
/// data row.
fn count_header_rows(cells: &[Vec<Option<&str>>], total_rows: usize) -> usize {
    let mut seen_text = false;
    (0..total_rows)
        .take_while(|&row| {
            let non_empty: Vec<&str> = cells
                .iter()
                .filter_map(|column| column[row])
                .filter(|cell| !cell.trim().is_empty())
                .collect();
            if non_empty.is_empty() {
                return !seen_text;
            }
            let is_text = non_empty.iter().any(|cell| !is_numeric_cell(cell));
            seen_text |= is_text;
            is_text
        })
        .count()
}

fn header_keys(cells: &[Vec<Option<&str>>], layout: HeaderLayout) -> Vec<ColumnKey> {
    let mut current_signal = String::new();
    cells
        .iter()
        .map(|column| {
            let cell = |row: usize| column[row].map(str::trim).unwrap_or("").to_string();
            let signal = cell(layout.signal_row);
            // Blank signal cells belong to the signal on their left.
            if !signal.is_empty() {
                current_signal = signal;
            }
            let axis = layout.axis_row.map(cell).unwrap_or_default();
            ColumnKey::new(current_signal.clone(), axis)
        })
        .collect()
}
