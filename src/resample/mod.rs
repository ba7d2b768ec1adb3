//! Resample module - Interpolation and phase time-normalization

mod interpolate;
mod scaler;

pub use interpolate::{linear_at, resample, sample_positions, CubicSpline, Interpolation};
pub use scaler::{PhaseFrames, PhaseScaler, ScaleError};
