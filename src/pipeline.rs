//! Pipeline Module
//! Runs the configured stages in order: slicing, scaling, averaging and
//! the angular momentum conversion with its metrics.

use crate::config::{
    AveragingConfig, BoundarySource, ConfigError, MomentumConfig, PipelineConfig, ScalingConfig,
    SlicingConfig,
};
use crate::data::{
    write_table, KickFrames, LoaderError, SignalTable, SliceError, TableLoader, TrialSlicer,
    WriterError,
};
use crate::momentum::{FrameConverter, MetricCalculator, MomentumError, SegmentMasses};
use crate::phases::{DetectError, PhaseBoundaries};
use crate::resample::{PhaseScaler, ScaleError};
use crate::stats::{AverageError, TrialAverager};
use rayon::prelude::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error(transparent)]
    Scale(#[from] ScaleError),
    #[error("Trial {trial}: {source}")]
    Detect { trial: usize, source: DetectError },
    #[error(transparent)]
    Average(#[from] AverageError),
    #[error(transparent)]
    Momentum(#[from] MomentumError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// Files written by each stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub sliced: Vec<PathBuf>,
    pub scaled: Vec<PathBuf>,
    pub averaged: Vec<PathBuf>,
    pub momentum: Vec<PathBuf>,
}

impl PipelineReport {
    pub fn total(&self) -> usize {
        self.sliced.len() + self.scaled.len() + self.averaged.len() + self.momentum.len()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    loader: TableLoader,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let loader = TableLoader::new(config.loader.clone());
        Self { config, loader }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every configured stage.
    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let mut report = PipelineReport::default();
        if let Some(slicing) = &self.config.slicing {
            report.sliced = self.run_slicing(slicing)?;
        }
        if let Some(scaling) = &self.config.scaling {
            report.scaled = self.run_scaling(scaling)?;
        }
        if let Some(averaging) = &self.config.averaging {
            report.averaged = self.run_averaging(averaging)?;
        }
        if let Some(momentum) = &self.config.momentum {
            report.momentum = self.run_momentum(momentum)?;
        }
        info!("Pipeline finished, {} files written", report.total());
        Ok(report)
    }

    pub fn run_slicing(&self, config: &SlicingConfig) -> Result<Vec<PathBuf>, PipelineError> {
        info!("Slicing {} recordings", config.inputs.len());
        let begin_frames = config.begin_frames();
        let mut written = Vec::new();
        for input in &config.inputs {
            written.extend(TrialSlicer::slice_file(
                &self.loader,
                input,
                &config.output_dir,
                &begin_frames,
            )?);
        }
        Ok(written)
    }

    pub fn run_scaling(&self, config: &ScalingConfig) -> Result<Vec<PathBuf>, PipelineError> {
        let boundaries = self.boundaries(config)?;
        let scaler = PhaseScaler::new(config.frames, config.interpolation);
        Ok(scaler.scale_directory(
            &self.loader,
            &config.input_dir,
            &boundaries,
            &config.output_dir,
        )?)
    }

    /// Phase boundaries of every trial of the scaling input.
    pub fn boundaries(&self, config: &ScalingConfig) -> Result<Vec<PhaseBoundaries>, PipelineError> {
        match &config.boundaries {
            BoundarySource::Frames { boundaries } => Ok(boundaries.clone()),
            BoundarySource::Picked {
                begin,
                lift_off,
                impact,
                foot_down,
                tail,
            } => {
                let frames = KickFrames {
                    begin,
                    lift_off,
                    impact,
                    foot_down,
                };
                Ok(TrialSlicer::boundaries_from_frames(frames, *tail)?)
            }
            BoundarySource::Detect { detector } => {
                let tables: Vec<SignalTable> = self
                    .loader
                    .load_dir(&config.input_dir)?
                    .into_iter()
                    .map(|(_, table)| table)
                    .collect();
                info!("Detecting phase boundaries in {} trials", tables.len());
                tables
                    .par_iter()
                    .enumerate()
                    .map(|(trial, table)| {
                        detector
                            .detect_trial(table, trial)
                            .map_err(|source| PipelineError::Detect { trial, source })
                    })
                    .collect()
            }
        }
    }

    pub fn run_averaging(&self, config: &AveragingConfig) -> Result<Vec<PathBuf>, PipelineError> {
        let averager = TrialAverager::new(config.alignment);
        Ok(averager.average_tree(&self.loader, &config.input_root, &config.output_dir)?)
    }

    pub fn run_momentum(&self, config: &MomentumConfig) -> Result<Vec<PathBuf>, PipelineError> {
        let momentum = self.loader.load(&config.angular_momentum)?;
        let position = self.loader.load(&config.position)?;
        let velocity = self.loader.load(&config.velocity)?;

        let masses = SegmentMasses::new(config.body_mass, config.fractions.clone())?;
        let converter =
            FrameConverter::new(masses, config.suffixes.clone(), config.centre.clone());
        let converted = converter.convert(&momentum, &position, &velocity)?;
        write_table(&converted, &config.output)?;
        info!("Wrote body-COM angular momentum to {}", config.output.display());

        let calculator = MetricCalculator::new(config.groups.clone(), config.metrics.clone());
        let series = calculator.compute(&converted)?;
        let mut written = vec![config.output.clone()];
        written.extend(calculator.write_outputs(&series, &config.metrics_dir)?);
        Ok(written)
    }
}
