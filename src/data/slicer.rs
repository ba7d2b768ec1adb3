//! Trial Slicer Module
//! Cuts a continuous recording of repeated kicks into one table per kick.

use super::loader::{LoaderError, TableLoader};
use super::table::SignalTable;
use super::writer::{write_table, WriterError};
use crate::phases::{BoundaryError, PhaseBoundaries};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SliceError {
    #[error("At least two begin frames are needed, got {0}")]
    TooFewFrames(usize),
    #[error("Begin frames must be non-decreasing: {0} follows {1}")]
    NotSorted(usize, usize),
    #[error("Begin frame {frame} is past the end of the recording ({height} frames)")]
    OutOfRange { frame: usize, height: usize },
    #[error("Frame lists differ in length: {0:?}")]
    LengthMismatch([usize; 4]),
    #[error("Trial {trial}: {source}")]
    Boundary {
        trial: usize,
        source: BoundaryError,
    },
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// Frame lists of one recording, in absolute recording frames.
#[derive(Debug, Clone, Copy)]
pub struct KickFrames<'a> {
    pub begin: &'a [usize],
    pub lift_off: &'a [usize],
    pub impact: &'a [usize],
    pub foot_down: &'a [usize],
}

/// Handles slicing of recordings into trials.
pub struct TrialSlicer;

impl TrialSlicer {
    /// Consecutive begin frames `[b0, b1, ..., bn]` yield the `n` trials
    /// `[b_i, b_{i+1})`.
    pub fn slice_trials(
        table: &SignalTable,
        begin_frames: &[usize],
    ) -> Result<Vec<SignalTable>, SliceError> {
        if begin_frames.len() < 2 {
            return Err(SliceError::TooFewFrames(begin_frames.len()));
        }
        for pair in begin_frames.windows(2) {
            if pair[1] < pair[0] {
                return Err(SliceError::NotSorted(pair[1], pair[0]));
            }
        }
        if let Some(&frame) = begin_frames.iter().find(|&&f| f > table.height()) {
            return Err(SliceError::OutOfRange {
                frame,
                height: table.height(),
            });
        }

        Ok(begin_frames
            .windows(2)
            .map(|pair| table.slice_rows(pair[0], pair[1]))
            .collect())
    }

    /// Trials start `lead` frames before lift-off.
    pub fn begin_frames_from_lift_offs(lift_offs: &[usize], lead: usize) -> Vec<usize> {
        lift_offs.iter().map(|f| f.saturating_sub(lead)).collect()
    }

    /// Phase boundaries of each trial from manually picked frames; each
    /// trial ends `tail` frames after foot-down.
    pub fn boundaries_from_frames(
        frames: KickFrames<'_>,
        tail: usize,
    ) -> Result<Vec<PhaseBoundaries>, SliceError> {
        let lengths = [
            frames.begin.len(),
            frames.lift_off.len(),
            frames.impact.len(),
            frames.foot_down.len(),
        ];
        if lengths.iter().any(|&l| l != lengths[0]) {
            return Err(SliceError::LengthMismatch(lengths));
        }

        (0..lengths[0])
            .map(|trial| {
                PhaseBoundaries::relative_to(
                    frames.begin[trial],
                    frames.lift_off[trial],
                    frames.impact[trial],
                    frames.foot_down[trial],
                    frames.foot_down[trial] + tail,
                )
                .map_err(|source| SliceError::Boundary { trial, source })
            })
            .collect()
    }

    /// Write trials as `<out_dir>/<stem>/sliced<i>.csv`.
    pub fn write_slices(
        slices: &[SignalTable],
        out_dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, SliceError> {
        let folder = out_dir.join(stem);
        let mut written = Vec::with_capacity(slices.len());
        for (i, slice) in slices.iter().enumerate() {
            let path = folder.join(format!("sliced{i}.csv"));
            write_table(slice, &path)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Load a recording, slice it and write the trials.
    pub fn slice_file(
        loader: &TableLoader,
        path: &Path,
        out_dir: &Path,
        begin_frames: &[usize],
    ) -> Result<Vec<PathBuf>, SliceError> {
        let table = loader.load(path)?;
        let slices = Self::slice_trials(&table, begin_frames)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "recording".to_string());
        info!("Slicing {} into {} trials", path.display(), slices.len());
        Self::write_slices(&slices, out_dir, &stem)
    }
}
