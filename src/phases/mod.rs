//! Phases module - Phase boundaries and their detection

mod boundary;
mod detector;

pub use boundary::{BoundaryError, Phase, PhaseBoundaries, PHASE_COUNT};
pub use detector::{
    find_peaks, first_crossing, ContactEvent, Crossing, DetectError, ExtremumKind, ImpactRule,
    Threshold, ThresholdDetector, TrialEnd,
};
