//! Stats module - Descriptive statistics and cross-trial averaging

mod averager;
mod calculator;

pub use averager::{AverageError, Alignment, TrialAverager};
pub use calculator::{SeriesStats, StatsCalculator};
