//! Table Writer Module
//! Writes `SignalTable`s as CSV with a two-row (signal, axis) header.

use super::table::SignalTable;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Failed to write CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `table` to `path`, creating parent directories as needed.
pub fn write_table(table: &SignalTable, path: &Path) -> Result<(), WriterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);

    write_header_row(&mut out, table.keys().iter().map(|k| k.signal.as_str()))?;
    write_header_row(&mut out, table.keys().iter().map(|k| k.axis.as_str()))?;

    if !table.is_empty() {
        let mut df = table.to_dataframe()?;
        CsvWriter::new(&mut out)
            .include_header(false)
            .finish(&mut df)?;
    }

    out.flush()?;
    Ok(())
}

/// Write a DataFrame with its own single-row header (summary outputs).
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<(), WriterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

fn write_header_row<'a, W: Write>(
    out: &mut W,
    cells: impl Iterator<Item = &'a str>,
) -> std::io::Result<()> {
    let line: Vec<String> = cells.map(escape_cell).collect();
    writeln!(out, "{}", line.join(","))
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
