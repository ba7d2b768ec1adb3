//! Trial Averager Module
//! Element-wise, NaN-ignoring mean across time-normalized trials.

use super::calculator::StatsCalculator;
use crate::data::{write_table, LoaderError, SignalTable, TableError, TableLoader, WriterError};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum AverageError {
    #[error("No trials to average")]
    NoTables,
    #[error("Trial {trial} has {actual} columns, expected {expected}")]
    WidthMismatch {
        trial: usize,
        expected: usize,
        actual: usize,
    },
    #[error("No common index across trials")]
    NoCommonIndex,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// How rows of different trials are matched up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Index alignment when the first column looks like an index,
    /// truncation otherwise.
    ///
    /// Time-normalized Visual3D exports keep their `ITEM` column, now
    /// holding fractional frame numbers that differ from trial to trial.
    /// Auto then aligns on it and fails with `NoCommonIndex`; average such
    /// trials with `Truncate`.
    #[default]
    Auto,
    /// Rows matched on the values of the first column.
    Index,
    /// Rows matched by position, cut to the shortest trial.
    Truncate,
}

/// Averages trials column by column.
#[derive(Debug, Clone, Default)]
pub struct TrialAverager {
    alignment: Alignment,
}

impl TrialAverager {
    pub fn new(alignment: Alignment) -> Self {
        Self { alignment }
    }

    /// Whether the first column should be treated as a row index: its
    /// header looks like one, or its values are finite and non-decreasing.
    pub fn detect_index_column(table: &SignalTable) -> bool {
        let Some(key) = table.keys().first() else {
            return false;
        };
        if key.looks_like_index() {
            return true;
        }
        let Some(values) = table.column(0) else {
            return false;
        };
        !values.is_empty()
            && values.iter().all(|v| v.is_finite())
            && values.windows(2).all(|w| w[1] >= w[0])
    }

    /// Average `tables` into one table with the first trial's header.
    pub fn average(&self, tables: &[SignalTable]) -> Result<SignalTable, AverageError> {
        let first = tables.first().ok_or(AverageError::NoTables)?;
        for (trial, table) in tables.iter().enumerate() {
            if table.width() != first.width() {
                return Err(AverageError::WidthMismatch {
                    trial,
                    expected: first.width(),
                    actual: table.width(),
                });
            }
        }

        let use_index = match self.alignment {
            Alignment::Auto => Self::detect_index_column(first),
            Alignment::Index => true,
            Alignment::Truncate => false,
        };

        let aligned = if use_index {
            align_on_index(tables)?
        } else {
            let min_len = tables.iter().map(SignalTable::height).min().unwrap_or(0);
            tables
                .iter()
                .map(|t| {
                    let mut t = t.clone();
                    t.truncate(min_len);
                    t
                })
                .collect()
        };

        let height = aligned[0].height();
        let columns = (0..first.width())
            .map(|c| {
                if use_index && c == 0 {
                    return aligned[0].columns()[0].clone();
                }
                (0..height)
                    .map(|row| StatsCalculator::nan_mean(aligned.iter().map(|t| t.columns()[c][row])))
                    .collect()
            })
            .collect();

        Ok(SignalTable::new(first.keys().to_vec(), columns)?)
    }

    /// Average every CSV of `subdir` into `<out_dir>/<subdir name>.csv`.
    /// Returns `None` when the directory holds no CSV files.
    pub fn average_directory(
        &self,
        loader: &TableLoader,
        subdir: &Path,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, AverageError> {
        let tables: Vec<SignalTable> = loader
            .load_dir(subdir)?
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        if tables.is_empty() {
            return Ok(None);
        }

        info!("Averaging {} trials in {}", tables.len(), subdir.display());
        let averaged = self.average(&tables)?;

        let name = subdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "averaged".to_string());
        let out_path = out_dir.join(format!("{name}.csv"));
        write_table(&averaged, &out_path)?;
        Ok(Some(out_path))
    }

    /// Run `average_directory` for each immediate subdirectory of `root`.
    pub fn average_tree(
        &self,
        loader: &TableLoader,
        root: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, AverageError> {
        let io_err = |source| AverageError::Io {
            path: root.to_path_buf(),
            source,
        };
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_dir() {
                subdirs.push(path);
            }
        }
        subdirs.sort();

        let written: Vec<Option<PathBuf>> = subdirs
            .par_iter()
            .map(|subdir| self.average_directory(loader, subdir, out_dir))
            .collect::<Result<_, _>>()?;
        Ok(written.into_iter().flatten().collect())
    }
}

/// Keep the rows whose first-column value occurs in every table, in the
/// order of the first table.
fn align_on_index(tables: &[SignalTable]) -> Result<Vec<SignalTable>, AverageError> {
    let row_maps: Vec<HashMap<OrderedFloat<f64>, usize>> = tables
        .iter()
        .map(|t| {
            let mut rows = HashMap::new();
            for (row, value) in t.column(0).unwrap_or(&[]).iter().enumerate() {
                rows.entry(OrderedFloat(*value)).or_insert(row);
            }
            rows
        })
        .collect();

    let mut seen = HashSet::new();
    let common: Vec<OrderedFloat<f64>> = tables[0]
        .column(0)
        .unwrap_or(&[])
        .iter()
        .map(|v| OrderedFloat(*v))
        .filter(|v| seen.insert(*v))
        .filter(|v| row_maps.iter().all(|rows| rows.contains_key(v)))
        .collect();

    if common.is_empty() {
        return Err(AverageError::NoCommonIndex);
    }

    Ok(tables
        .iter()
        .zip(&row_maps)
        .map(|(table, rows)| {
            let selected: Vec<usize> = common.iter().map(|v| rows[v]).collect();
            table.select_rows(&selected)
        })
        .collect())
}
