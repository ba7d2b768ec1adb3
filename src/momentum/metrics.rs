//! Momentum Metrics Module
//! AMAC/AMOC: the components of a segment group's angular momentum parallel
//! and orthogonal to the whole-body angular momentum.

use super::frame::{BODY_COM_SUFFIX, FULL_BODY_SIGNAL};
use super::MomentumError;
use crate::data::{write_frame, write_table, ColumnKey, SignalTable};
use crate::resample::{linear_at, sample_positions};
use crate::stats::{SeriesStats, StatsCalculator};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const AMAC: &str = "AMAC";
pub const AMOC: &str = "AMOC";
pub const AMAC_NORM: &str = "AMAC_norm";
pub const AMOC_NORM: &str = "AMOC_norm";

/// Named set of segments whose momenta are summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGroup {
    pub name: String,
    pub segments: Vec<String>,
}

impl SegmentGroup {
    pub fn new(name: &str, segments: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Limb and trunk groups of a full-body marker model.
pub fn default_groups() -> Vec<SegmentGroup> {
    vec![
        SegmentGroup::new("RightArm", &["R_UA", "R_FA", "R_Hand"]),
        SegmentGroup::new("LeftArm", &["L_UA", "L_FA", "L_Hand"]),
        SegmentGroup::new("RightLeg", &["R_Thigh", "R_Shank", "R_Foot"]),
        SegmentGroup::new("LeftLeg", &["L_Thigh", "L_Shank", "L_Foot"]),
        SegmentGroup::new("Trunk", &["Torso", "Pelvis", "Head"]),
    ]
}

/// Subject mass (kg) and height (m, or cm when above 10).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anthropometrics {
    pub mass: f64,
    pub height: f64,
}

impl Anthropometrics {
    /// `mass · height²` with height in metres.
    pub fn denominator(&self) -> Result<f64, MomentumError> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(MomentumError::InvalidMass(self.mass));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(MomentumError::InvalidHeight(self.height));
        }
        let metres = if self.height > 10.0 {
            self.height / 100.0
        } else {
            self.height
        };
        Ok(self.mass * metres * metres)
    }
}

fn default_eps() -> f64 {
    1e-12
}

fn default_time_points() -> Option<usize> {
    Some(101)
}

fn default_whole_body_signal() -> String {
    FULL_BODY_SIGNAL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOptions {
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// Adds `AMAC_norm`/`AMOC_norm` divided by `mass · height²`.
    #[serde(default)]
    pub normalize: Option<Anthropometrics>,
    /// Frames whose whole-body momentum norm is below this become NaN.
    #[serde(default)]
    pub min_whole_body_norm: Option<f64>,
    /// Also report every grouped segment on its own.
    #[serde(default)]
    pub per_segment: bool,
    /// Resample written series onto `0..=100 %` with this many points.
    #[serde(default = "default_time_points")]
    pub time_points: Option<usize>,
    #[serde(default = "default_whole_body_signal")]
    pub whole_body_signal: String,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            normalize: None,
            min_whole_body_norm: None,
            per_segment: false,
            time_points: default_time_points(),
            whole_body_signal: default_whole_body_signal(),
        }
    }
}

/// `(AMAC, AMOC)` of summed momentum `s` against whole-body momentum `h`.
pub fn amac_amoc(s: &Vector3<f64>, h: &Vector3<f64>, eps: f64) -> (f64, f64) {
    let norm = h.norm() + eps;
    (s.dot(h) / norm, s.cross(h).norm() / norm)
}

/// Linearly fill interior NaN gaps; leading and trailing gaps take the
/// nearest finite value. An all-NaN series is returned unchanged.
pub fn fill_nan_gaps(values: &[f64]) -> Vec<f64> {
    let known: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return values.to_vec();
    };

    let mut filled = values.to_vec();
    filled[..first].fill(values[first]);
    filled[last + 1..].fill(values[last]);
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for i in a + 1..b {
            let frac = (i - a) as f64 / (b - a) as f64;
            filled[i] = values[a] + frac * (values[b] - values[a]);
        }
    }
    filled
}

/// Percent-of-movement axis `0..=100` with `points` samples.
pub fn percent_axis(points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![0.0; points];
    }
    (0..points)
        .map(|j| 100.0 * j as f64 / (points - 1) as f64)
        .collect()
}

/// Resample a series onto `points` samples after filling NaN gaps.
/// Series shorter than two frames are returned as they are.
pub fn time_normalize(values: &[f64], points: usize) -> Vec<f64> {
    if values.len() < 2 {
        return values.to_vec();
    }
    let filled = fill_nan_gaps(values);
    sample_positions(filled.len(), points)
        .into_iter()
        .map(|t| linear_at(&filled, t))
        .collect()
}

/// Metric series of one group (or segment) in one trial block.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub group: String,
    /// Single-segment series from per-segment reporting.
    pub segment: bool,
    pub block: usize,
    pub amac: Vec<f64>,
    pub amoc: Vec<f64>,
    pub amac_norm: Option<Vec<f64>>,
    pub amoc_norm: Option<Vec<f64>>,
}

impl MetricSeries {
    pub fn metrics(&self) -> Vec<(&'static str, &[f64])> {
        let mut metrics = vec![(AMAC, self.amac.as_slice()), (AMOC, self.amoc.as_slice())];
        if let Some(values) = &self.amac_norm {
            metrics.push((AMAC_NORM, values.as_slice()));
        }
        if let Some(values) = &self.amoc_norm {
            metrics.push((AMOC_NORM, values.as_slice()));
        }
        metrics
    }
}

/// Computes AMAC/AMOC from a body-COM angular momentum table.
#[derive(Debug, Clone)]
pub struct MetricCalculator {
    groups: Vec<SegmentGroup>,
    options: MetricOptions,
}

impl MetricCalculator {
    pub fn new(groups: Vec<SegmentGroup>, options: MetricOptions) -> Self {
        Self { groups, options }
    }

    /// Groups evaluated, flagged `true` for single-segment groups: the
    /// configured ones, then each of their segments when per-segment
    /// reporting is on.
    fn evaluated_groups(&self) -> Vec<(SegmentGroup, bool)> {
        let mut groups: Vec<(SegmentGroup, bool)> =
            self.groups.iter().map(|g| (g.clone(), false)).collect();
        if self.options.per_segment {
            let mut seen = Vec::new();
            for segment in self.groups.iter().flat_map(|g| &g.segments) {
                if !seen.contains(segment) {
                    seen.push(segment.clone());
                    let group = SegmentGroup {
                        name: segment.clone(),
                        segments: vec![segment.clone()],
                    };
                    groups.push((group, true));
                }
            }
        }
        groups
    }

    /// Metrics for every group and every trial block of `table`.
    pub fn compute(&self, table: &SignalTable) -> Result<Vec<MetricSeries>, MomentumError> {
        let whole_body = table.triplets(&self.options.whole_body_signal);
        if whole_body.is_empty() {
            return Err(MomentumError::MissingSignal(
                self.options.whole_body_signal.clone(),
            ));
        }
        let denominator = self
            .options
            .normalize
            .as_ref()
            .map(Anthropometrics::denominator)
            .transpose()?;

        let groups = self.evaluated_groups();
        let mut series = Vec::new();
        for (block, triplet) in whole_body.iter().enumerate() {
            let h = table.vectors(*triplet);
            for (group, segment) in &groups {
                let Some(s) = group_momentum(table, group, block) else {
                    warn!(
                        "Skipping group {} in block {}: missing segment data",
                        group.name, block
                    );
                    continue;
                };
                let mut item = self.group_series(group, block, &s, &h, denominator);
                item.segment = *segment;
                series.push(item);
            }
        }
        info!(
            "Computed {} metric series over {} blocks",
            series.len(),
            whole_body.len()
        );
        Ok(series)
    }

    fn group_series(
        &self,
        group: &SegmentGroup,
        block: usize,
        s: &[Vector3<f64>],
        h: &[Vector3<f64>],
        denominator: Option<f64>,
    ) -> MetricSeries {
        let (amac, amoc): (Vec<f64>, Vec<f64>) = s
            .iter()
            .zip(h)
            .map(|(s, h)| match self.options.min_whole_body_norm {
                Some(min) if h.norm() < min => (f64::NAN, f64::NAN),
                _ => amac_amoc(s, h, self.options.eps),
            })
            .unzip();
        let scale = |values: &[f64], d: f64| values.iter().map(|v| v / d).collect::<Vec<f64>>();
        MetricSeries {
            group: group.name.clone(),
            segment: false,
            block,
            amac_norm: denominator.map(|d| scale(amac.as_slice(), d)),
            amoc_norm: denominator.map(|d| scale(amoc.as_slice(), d)),
            amac,
            amoc,
        }
    }

    /// Values as written: resampled onto the percent axis when time
    /// normalization is on.
    fn written_values(&self, values: &[f64]) -> Vec<f64> {
        match self.options.time_points {
            Some(points) => time_normalize(values, points),
            None => values.to_vec(),
        }
    }

    fn block_count(series: &[MetricSeries]) -> usize {
        series.iter().map(|s| s.block + 1).max().unwrap_or(0)
    }

    /// One table per block: an optional `FramePct` column followed by a
    /// `<group>/<metric>` column per series.
    pub fn block_tables(&self, series: &[MetricSeries]) -> Result<Vec<SignalTable>, MomentumError> {
        let mut tables = vec![SignalTable::default(); Self::block_count(series)];
        for item in series {
            let table = &mut tables[item.block];
            for (metric, values) in item.metrics() {
                let values = self.written_values(values);
                if table.width() == 0 {
                    if let Some(points) = self.options.time_points {
                        if values.len() == points {
                            table.push_column(ColumnKey::new("FramePct", "%"), percent_axis(points))?;
                        }
                    }
                }
                table.push_column(ColumnKey::new(item.group.as_str(), metric), values)?;
            }
        }
        Ok(tables)
    }

    /// Descriptive statistics of the written group series, one list per
    /// block. Per-segment series are not summarized.
    pub fn summarize(&self, series: &[MetricSeries]) -> Vec<Vec<SeriesStats>> {
        (0..Self::block_count(series))
            .map(|block| {
                let rows: Vec<(String, String, Vec<f64>)> = series
                    .iter()
                    .filter(|s| s.block == block && !s.segment)
                    .flat_map(|s| {
                        s.metrics().into_iter().map(move |(metric, values)| {
                            (s.group.clone(), metric.to_string(), self.written_values(values))
                        })
                    })
                    .collect();
                StatsCalculator::compute_all_stats_parallel(&rows)
            })
            .collect()
    }

    /// Write `metrics_block<i>.csv` and `metrics_block<i>_summary.csv` for
    /// every block into `out_dir`.
    pub fn write_outputs(
        &self,
        series: &[MetricSeries],
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, MomentumError> {
        let summaries = self.summarize(series);
        let mut written = Vec::new();
        for (block, (table, stats)) in self
            .block_tables(series)?
            .iter()
            .zip(&summaries)
            .enumerate()
        {
            if table.width() == 0 {
                continue;
            }
            let path = out_dir.join(format!("metrics_block{block}.csv"));
            write_table(table, &path)?;
            written.push(path);

            let mut summary = StatsCalculator::summary_frame(stats)?;
            let path = out_dir.join(format!("metrics_block{block}_summary.csv"));
            write_frame(&mut summary, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Sum of the group's segment momenta in `block`, `None` when a segment
/// has no triplet there.
fn group_momentum(table: &SignalTable, group: &SegmentGroup, block: usize) -> Option<Vec<Vector3<f64>>> {
    let mut sum = vec![Vector3::zeros(); table.height()];
    for segment in &group.segments {
        let triplet = *table
            .triplets(&format!("{segment}{BODY_COM_SUFFIX}"))
            .get(block)?;
        for (acc, h) in sum.iter_mut().zip(table.vectors(triplet)) {
            *acc += h;
        }
    }
    (!group.segments.is_empty()).then_some(sum)
}
