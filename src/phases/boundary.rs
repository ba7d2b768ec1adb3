//! Phase Boundary Module
//! The five frame indices that split one kick into four phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of phases in one kick.
pub const PHASE_COUNT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("Phase boundaries must start at frame 0, got {0}")]
    NonZeroStart(usize),
    #[error("Phase boundaries must be strictly increasing: {0:?}")]
    NotIncreasing([usize; 5]),
    #[error("Trial end {end} exceeds table length {height}")]
    ExceedsTable { end: usize, height: usize },
    #[error("Frame {frame} precedes the trial start {begin}")]
    BeforeBegin { frame: usize, begin: usize },
}

/// Biomechanical phases of a kick, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparation,
    Extension,
    Retraction,
    Termination,
}

impl Phase {
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::Preparation,
        Phase::Extension,
        Phase::Retraction,
        Phase::Termination,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Preparation => "preparation",
            Phase::Extension => "extension",
            Phase::Retraction => "retraction",
            Phase::Termination => "termination",
        };
        f.write_str(name)
    }
}

/// `[0, lift_off, impact, foot_down, trial_end]`, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 5]", into = "[usize; 5]")]
pub struct PhaseBoundaries([usize; 5]);

impl PhaseBoundaries {
    pub fn new(
        lift_off: usize,
        impact: usize,
        foot_down: usize,
        trial_end: usize,
    ) -> Result<Self, BoundaryError> {
        Self::try_from([0, lift_off, impact, foot_down, trial_end])
    }

    /// Shift absolute recording frames so that `begin` becomes frame 0.
    pub fn relative_to(
        begin: usize,
        lift_off: usize,
        impact: usize,
        foot_down: usize,
        trial_end: usize,
    ) -> Result<Self, BoundaryError> {
        let shift = |frame: usize| {
            frame
                .checked_sub(begin)
                .ok_or(BoundaryError::BeforeBegin { frame, begin })
        };
        Self::new(
            shift(lift_off)?,
            shift(impact)?,
            shift(foot_down)?,
            shift(trial_end)?,
        )
    }

    pub fn frames(&self) -> [usize; 5] {
        self.0
    }

    pub fn lift_off(&self) -> usize {
        self.0[1]
    }

    pub fn impact(&self) -> usize {
        self.0[2]
    }

    pub fn foot_down(&self) -> usize {
        self.0[3]
    }

    pub fn trial_end(&self) -> usize {
        self.0[4]
    }

    /// Half-open frame range `[start, end)` of one phase.
    pub fn range(&self, phase: Phase) -> (usize, usize) {
        let i = phase as usize;
        (self.0[i], self.0[i + 1])
    }

    /// Check that the boundaries fit a table with `height` rows.
    pub fn check_fits(&self, height: usize) -> Result<(), BoundaryError> {
        if self.trial_end() > height {
            return Err(BoundaryError::ExceedsTable {
                end: self.trial_end(),
                height,
            });
        }
        Ok(())
    }
}

impl TryFrom<[usize; 5]> for PhaseBoundaries {
    type Error = BoundaryError;

    fn try_from(frames: [usize; 5]) -> Result<Self, Self::Error> {
        if frames[0] != 0 {
            return Err(BoundaryError::NonZeroStart(frames[0]));
        }
        if frames.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BoundaryError::NotIncreasing(frames));
        }
        Ok(Self(frames))
    }
}

impl From<PhaseBoundaries> for [usize; 5] {
    fn from(boundaries: PhaseBoundaries) -> Self {
        boundaries.0
    }
}
