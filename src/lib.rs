//! Kickseg - Kick trial segmentation and angular momentum analysis
//!
//! Slices motion-capture recordings into kicks, time-normalizes each kick
//! over its four phases, averages trials, and expresses segment angular
//! momentum about the whole-body centre of mass.

pub mod config;
pub mod data;
pub mod momentum;
pub mod phases;
pub mod pipeline;
pub mod resample;
pub mod stats;

pub use config::{ConfigError, PipelineConfig};
pub use data::{ColumnKey, SignalTable, TableLoader};
pub use phases::{Phase, PhaseBoundaries, ThresholdDetector};
pub use pipeline::{Pipeline, PipelineError, PipelineReport};
pub use resample::{Interpolation, PhaseFrames, PhaseScaler};
pub use stats::{Alignment, TrialAverager};
