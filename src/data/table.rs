//! Signal Table Module
//! Column-major numeric table with a two-level (signal, axis) header.

use nalgebra::Vector3;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("{keys} header keys but {columns} data columns")]
    ColumnCountMismatch { keys: usize, columns: usize },
    #[error("Column '{key}' has {actual} rows, expected {expected}")]
    RowCountMismatch {
        key: ColumnKey,
        expected: usize,
        actual: usize,
    },
}

/// Name of one column: the signal (first header row) and its axis
/// (second header row, empty for single-row headers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub signal: String,
    #[serde(default)]
    pub axis: String,
}

impl ColumnKey {
    pub fn new(signal: impl Into<String>, axis: impl Into<String>) -> Self {
        Self {
            signal: signal.into(),
            axis: axis.into(),
        }
    }

    /// True when either header level looks like a generated index label.
    pub fn looks_like_index(&self) -> bool {
        [&self.signal, &self.axis].iter().any(|level| {
            let level = level.to_lowercase();
            level.contains("unnamed") || level.contains("item")
        })
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.axis.is_empty() {
            write!(f, "{}", self.signal)
        } else {
            write!(f, "{}/{}", self.signal, self.axis)
        }
    }
}

/// Time-indexed samples of one recording. Every column has the same
/// number of rows; missing cells are NaN, so tables are compared with
/// [`SignalTable::same_values`] rather than `==`.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    keys: Vec<ColumnKey>,
    columns: Vec<Vec<f64>>,
}

impl SignalTable {
    pub fn new(keys: Vec<ColumnKey>, columns: Vec<Vec<f64>>) -> Result<Self, TableError> {
        if keys.len() != columns.len() {
            return Err(TableError::ColumnCountMismatch {
                keys: keys.len(),
                columns: columns.len(),
            });
        }
        let height = columns.first().map(Vec::len).unwrap_or(0);
        for (key, column) in keys.iter().zip(&columns) {
            if column.len() != height {
                return Err(TableError::RowCountMismatch {
                    key: key.clone(),
                    expected: height,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { keys, columns })
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    /// Index of the first column with this key.
    pub fn find(&self, key: &ColumnKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn column_by_key(&self, key: &ColumnKey) -> Option<&[f64]> {
        self.find(key).and_then(|i| self.column(i))
    }

    /// Same keys and cells, with missing cells matching each other.
    pub fn same_values(&self, other: &Self) -> bool {
        self.keys == other.keys
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
            })
    }

    /// Distinct signal names in header order.
    pub fn signals(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for key in &self.keys {
            if !seen.contains(&key.signal.as_str()) {
                seen.push(key.signal.as_str());
            }
        }
        seen
    }

    /// Column indices of every complete X/Y/Z triplet of `signal`.
    ///
    /// Exports repeat a signal once per trial block, so the k-th triplet
    /// belongs to the k-th block. Trailing incomplete sets are dropped.
    pub fn triplets(&self, signal: &str) -> Vec<[usize; 3]> {
        let indices: Vec<usize> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.signal == signal)
            .map(|(i, _)| i)
            .collect();

        indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    /// Per-frame vectors assembled from a column triplet.
    pub fn vectors(&self, triplet: [usize; 3]) -> Vec<Vector3<f64>> {
        let [x, y, z] = triplet;
        (0..self.height())
            .map(|row| {
                Vector3::new(
                    self.columns[x][row],
                    self.columns[y][row],
                    self.columns[z][row],
                )
            })
            .collect()
    }

    /// Rows `[start, end)`, clamped to the table.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.height());
        let start = start.min(end);
        Self {
            keys: self.keys.clone(),
            columns: self.columns.iter().map(|c| c[start..end].to_vec()).collect(),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        for column in &mut self.columns {
            column.truncate(len);
        }
    }

    /// Keep only the rows whose index is listed, in the listed order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            keys: self.keys.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().filter_map(|&r| c.get(r).copied()).collect())
                .collect(),
        }
    }

    pub fn push_column(&mut self, key: ColumnKey, values: Vec<f64>) -> Result<(), TableError> {
        if !self.keys.is_empty() && values.len() != self.height() {
            return Err(TableError::RowCountMismatch {
                key,
                expected: self.height(),
                actual: values.len(),
            });
        }
        self.keys.push(key);
        self.columns.push(values);
        Ok(())
    }

    /// Append an X/Y/Z triplet named `signal`.
    pub fn push_vectors(&mut self, signal: &str, values: &[Vector3<f64>]) -> Result<(), TableError> {
        for (axis, component) in ["X", "Y", "Z"].iter().enumerate() {
            let column = values.iter().map(|v| v[axis]).collect();
            self.push_column(ColumnKey::new(signal, *component), column)?;
        }
        Ok(())
    }

    /// Numeric body as a polars DataFrame, NaN mapped to null.
    ///
    /// Column names are positional (`c0`, `c1`, ...) because the two-level
    /// header may repeat signal names across trial blocks.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let values: Vec<Option<f64>> =
                    values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();
                Column::new(format!("c{i}").into(), values)
            })
            .collect();
        DataFrame::new(columns)
    }
}
