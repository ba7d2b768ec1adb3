//! Data module - Table loading, writing and slicing

mod loader;
mod slicer;
mod table;
mod writer;

pub use loader::{csv_files, Delimiter, HeaderLayout, LoadOptions, LoaderError, TableLoader};
pub use slicer::{KickFrames, SliceError, TrialSlicer};
pub use table::{ColumnKey, SignalTable, TableError};
pub use writer::{write_frame, write_table, WriterError};
