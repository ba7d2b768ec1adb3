//! Statistics Calculator Module
//! Descriptive statistics for metric time series and NaN-aware column means.

use polars::prelude::*;
use rayon::prelude::*;
use statrs::statistics::Statistics;

/// Descriptive statistics of one metric series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStats {
    pub group: String,
    pub metric: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub max: f64,
}

impl Default for SeriesStats {
    fn default() -> Self {
        Self {
            group: String::new(),
            metric: String::new(),
            count: 0,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            p25: f64::NAN,
            median: f64::NAN,
            p75: f64::NAN,
            max: f64::NAN,
        }
    }
}

/// Handles statistical calculations with multi-threading support.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Compute descriptive statistics, ignoring NaN samples.
    pub fn compute_descriptive_stats(values: &[f64]) -> SeriesStats {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let n = finite.len();
        if n == 0 {
            return SeriesStats::default();
        }

        let mut sorted = finite.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Sample standard deviation, NaN for a single sample.
        let std = if n > 1 {
            finite.iter().std_dev()
        } else {
            f64::NAN
        };

        SeriesStats {
            count: n,
            mean: finite.iter().mean(),
            std,
            min: sorted[0],
            p25: Self::percentile(&sorted, 25.0),
            median: Self::percentile(&sorted, 50.0),
            p75: Self::percentile(&sorted, 75.0),
            max: sorted[n - 1],
            ..SeriesStats::default()
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Mean of the non-NaN values, NaN when there are none.
    pub fn nan_mean(values: impl IntoIterator<Item = f64>) -> f64 {
        let (sum, count) = values
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Statistics for every `(group, metric, values)` series in parallel,
    /// returned in input order.
    pub fn compute_all_stats_parallel(series: &[(String, String, Vec<f64>)]) -> Vec<SeriesStats> {
        series
            .par_iter()
            .map(|(group, metric, values)| {
                let mut stats = Self::compute_descriptive_stats(values);
                stats.group = group.clone();
                stats.metric = metric.clone();
                stats
            })
            .collect()
    }

    /// Summary table with one row per series.
    pub fn summary_frame(stats: &[SeriesStats]) -> PolarsResult<DataFrame> {
        let column = |name: &str, f: fn(&SeriesStats) -> f64| {
            Column::new(name.into(), stats.iter().map(f).collect::<Vec<f64>>())
        };
        DataFrame::new(vec![
            Column::new(
                "Group".into(),
                stats.iter().map(|s| s.group.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "Metric".into(),
                stats.iter().map(|s| s.metric.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "N".into(),
                stats.iter().map(|s| s.count as u64).collect::<Vec<u64>>(),
            ),
            column("Mean", |s| s.mean),
            column("Std", |s| s.std),
            column("Min", |s| s.min),
            column("25%", |s| s.p25),
            column("50%", |s| s.median),
            column("75%", |s| s.p75),
            column("Max", |s| s.max),
        ])
    }
}
