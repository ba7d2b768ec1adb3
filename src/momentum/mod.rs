//! Momentum module - Body-COM angular momentum and AMAC/AMOC metrics

mod frame;
mod metrics;

pub use frame::{
    about_centre_of_mass, CentreOfMass, FrameConverter, SegmentMasses, SignalSuffixes,
    BODY_COM_SUFFIX, FULL_BODY_SIGNAL,
};
pub use metrics::{
    amac_amoc, default_groups, fill_nan_gaps, percent_axis, time_normalize, Anthropometrics,
    MetricCalculator, MetricOptions, MetricSeries, SegmentGroup, AMAC, AMAC_NORM, AMOC,
    AMOC_NORM,
};

use crate::data::{LoaderError, TableError, WriterError};
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MomentumError {
    #[error("Body mass must be positive, got {0}")]
    InvalidMass(f64),
    #[error("Body height must be positive, got {0}")]
    InvalidHeight(f64),
    #[error("Mass fraction of {segment} must be non-negative, got {fraction}")]
    InvalidFraction { segment: String, fraction: f64 },
    #[error("No mass fraction for segment {0}")]
    UnknownSegment(String),
    #[error("No segment appears in all three input tables")]
    NoSegments,
    #[error("Segment masses of block {block} sum to zero")]
    ZeroTotalMass { block: usize },
    #[error("Signal {0} not found")]
    MissingSignal(String),
    #[error("Signal {signal} has no data in block {block}")]
    MissingBlockSignal { signal: String, block: usize },
    #[error("Summary error: {0}")]
    Summary(#[from] PolarsError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}
