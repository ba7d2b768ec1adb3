//! Phase Scaler Module
//! Time-normalizes a kick by resampling each of its four phases to a fixed
//! number of frames and concatenating them.

use super::interpolate::{resample, Interpolation};
use crate::data::{
    write_table, LoaderError, SignalTable, TableError, TableLoader, WriterError,
};
use crate::phases::{BoundaryError, Phase, PhaseBoundaries, PHASE_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("Trial {trial}: {source}")]
    Trial {
        trial: usize,
        #[source]
        source: Box<ScaleError>,
    },
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error("{tables} trials but {boundaries} boundary sets")]
    CountMismatch { tables: usize, boundaries: usize },
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Output frame count of each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFrames(pub [usize; PHASE_COUNT]);

impl PhaseFrames {
    pub fn uniform(frames: usize) -> Self {
        Self([frames; PHASE_COUNT])
    }

    pub fn get(&self, phase: Phase) -> usize {
        self.0[phase as usize]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

impl Default for PhaseFrames {
    fn default() -> Self {
        Self::uniform(25)
    }
}

/// Resamples trials phase by phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseScaler {
    frames: PhaseFrames,
    method: Interpolation,
}

impl PhaseScaler {
    pub fn new(frames: PhaseFrames, method: Interpolation) -> Self {
        Self { frames, method }
    }

    pub fn frames(&self) -> PhaseFrames {
        self.frames
    }

    /// Resample every column of `phase` to `target` rows.
    pub fn resample_phase(
        &self,
        phase: &SignalTable,
        target: usize,
    ) -> Result<SignalTable, ScaleError> {
        let columns = phase
            .columns()
            .iter()
            .map(|column| resample(column, target, self.method))
            .collect();
        Ok(SignalTable::new(phase.keys().to_vec(), columns)?)
    }

    /// Slice the four phases, resample each, and concatenate.
    pub fn scale_to_four_phases(
        &self,
        table: &SignalTable,
        boundaries: &PhaseBoundaries,
    ) -> Result<SignalTable, ScaleError> {
        boundaries.check_fits(table.height())?;

        let mut columns = vec![Vec::with_capacity(self.frames.total()); table.width()];
        for phase in Phase::ALL {
            let (start, end) = boundaries.range(phase);
            let samples = table.slice_rows(start, end);
            if samples.is_empty() {
                warn!("Empty {} phase encountered during resampling", phase);
                continue;
            }
            let resampled = self.resample_phase(&samples, self.frames.get(phase))?;
            for (column, extra) in columns.iter_mut().zip(resampled.columns()) {
                column.extend_from_slice(extra);
            }
        }
        Ok(SignalTable::new(table.keys().to_vec(), columns)?)
    }

    /// Scale a batch of trials, one boundary set per trial, in parallel.
    pub fn scale_tables(
        &self,
        tables: &[SignalTable],
        boundaries: &[PhaseBoundaries],
    ) -> Result<Vec<SignalTable>, ScaleError> {
        if tables.len() != boundaries.len() {
            return Err(ScaleError::CountMismatch {
                tables: tables.len(),
                boundaries: boundaries.len(),
            });
        }
        tables
            .par_iter()
            .zip(boundaries.par_iter())
            .enumerate()
            .map(|(trial, (table, b))| {
                self.scale_to_four_phases(table, b)
                    .map_err(|source| ScaleError::Trial {
                        trial,
                        source: Box::new(source),
                    })
            })
            .collect()
    }

    /// Scale every CSV of `input_dir` (sorted order) and write
    /// `scaled<i>.csv` files into `output_dir`.
    pub fn scale_directory(
        &self,
        loader: &TableLoader,
        input_dir: &Path,
        boundaries: &[PhaseBoundaries],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ScaleError> {
        let tables: Vec<SignalTable> = loader
            .load_dir(input_dir)?
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        info!(
            "Scaling {} trials from {} to {} frames each",
            tables.len(),
            input_dir.display(),
            self.frames.total()
        );

        let scaled = self.scale_tables(&tables, boundaries)?;
        let mut written = Vec::with_capacity(scaled.len());
        for (i, table) in scaled.iter().enumerate() {
            let path = output_dir.join(format!("scaled{i}.csv"));
            write_table(table, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnKey;
    use proptest::prelude::*;

    fn ramp(height: usize) -> SignalTable {
        SignalTable::new(
            vec![ColumnKey::new("FP1", "Z"), ColumnKey::new("R_Foot", "X")],
            vec![
                (0..height).map(|i| i as f64).collect(),
                (0..height).map(|i| 2.0 * i as f64 + 1.0).collect(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn four_phases_concatenate_to_total_frames() {
        let scaler = PhaseScaler::default();
        let b = PhaseBoundaries::new(40, 55, 90, 140).unwrap();
        let scaled = scaler.scale_to_four_phases(&ramp(140), &b).unwrap();
        assert_eq!(scaled.height(), 100);
        assert_eq!(scaled.width(), 2);
    }

    #[test]
    fn phases_keep_their_endpoints() {
        let scaler = PhaseScaler::new(PhaseFrames([5, 10, 3, 7]), Interpolation::Linear);
        let b = PhaseBoundaries::new(4, 9, 20, 30).unwrap();
        let scaled = scaler.scale_to_four_phases(&ramp(30), &b).unwrap();
        let frame = scaled.column(0).unwrap();
        assert_eq!(scaled.height(), 25);
        // preparation covers frames 0..=3
        assert_eq!(frame[0], 0.0);
        assert_eq!(frame[4], 3.0);
        // extension starts at lift-off
        assert_eq!(frame[5], 4.0);
        assert_eq!(frame[14], 8.0);
        assert_eq!(frame[24], 29.0);
    }

    #[test]
    fn single_sample_phase_is_replicated() {
        let scaler = PhaseScaler::new(PhaseFrames::uniform(4), Interpolation::CubicSpline);
        let b = PhaseBoundaries::new(1, 5, 9, 12).unwrap();
        let scaled = scaler.scale_to_four_phases(&ramp(12), &b).unwrap();
        assert_eq!(&scaled.column(1).unwrap()[0..4], &[1.0; 4]);
    }

    #[test]
    fn boundaries_past_table_end_are_rejected() {
        let scaler = PhaseScaler::default();
        let b = PhaseBoundaries::new(10, 20, 30, 50).unwrap();
        assert!(matches!(
            scaler.scale_to_four_phases(&ramp(40), &b),
            Err(ScaleError::Boundary(BoundaryError::ExceedsTable { .. }))
        ));
    }

    #[test]
    fn batch_requires_one_boundary_set_per_trial() {
        let scaler = PhaseScaler::default();
        let result = scaler.scale_tables(&[ramp(10), ramp(10)], &[]);
        assert!(matches!(result, Err(ScaleError::CountMismatch { .. })));
    }

    #[test]
    fn empty_phase_table_resamples_to_nothing() {
        let scaler = PhaseScaler::default();
        let empty = ramp(0);
        assert_eq!(scaler.resample_phase(&empty, 25).unwrap().height(), 0);
    }

    #[test]
    fn directory_trials_pair_with_their_boundaries() {
        let root = std::env::temp_dir().join(format!("kickseg-pairing-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let slices: Vec<SignalTable> = (0..11).map(|i| ramp(10 + i)).collect();
        crate::data::TrialSlicer::write_slices(&slices, &root, "rec").unwrap();

        let boundaries: Vec<PhaseBoundaries> = (0..11)
            .map(|i| PhaseBoundaries::new(2, 4, 6, 10 + i).unwrap())
            .collect();
        let scaler = PhaseScaler::new(PhaseFrames::uniform(5), Interpolation::Linear);
        let written = scaler
            .scale_directory(
                &TableLoader::default(),
                &root.join("rec"),
                &boundaries,
                &root.join("scaled"),
            )
            .unwrap();
        assert_eq!(written.len(), 11);

        let loader = TableLoader::default();
        for (i, path) in written.iter().enumerate() {
            let scaled = loader.load(path).unwrap();
            // last frame of the termination phase is trial_end - 1
            assert_eq!(scaled.column(0).unwrap()[19], (9 + i) as f64);
        }
    }

    proptest! {
        #[test]
        fn scaled_height_is_sum_of_phase_frames(
            lengths in prop::array::uniform4(1usize..40),
            frames in prop::array::uniform4(1usize..60),
            spline in any::<bool>(),
        ) {
            let lift_off = lengths[0];
            let impact = lift_off + lengths[1];
            let foot_down = impact + lengths[2];
            let end = foot_down + lengths[3];
            let b = PhaseBoundaries::new(lift_off, impact, foot_down, end).unwrap();
            let method = if spline { Interpolation::CubicSpline } else { Interpolation::Linear };
            let scaler = PhaseScaler::new(PhaseFrames(frames), method);
            let scaled = scaler.scale_to_four_phases(&ramp(end), &b).unwrap();
            prop_assert_eq!(scaled.height(), frames.iter().sum::<usize>());
        }
    }
}
