//! Interpolation Module
//! Resamples a uniformly sampled series onto a fixed number of frames.

use serde::{Deserialize, Serialize};

/// Interpolation scheme used when resampling a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Piecewise linear.
    #[default]
    Linear,
    /// Not-a-knot cubic spline; order drops to quadratic for three
    /// samples and linear for two.
    CubicSpline,
}

/// Resample `values` (taken at frames `0..n`) onto `target` evenly spaced
/// positions spanning the same interval.
///
/// An empty input yields an empty output, a single sample is repeated.
pub fn resample(values: &[f64], target: usize, method: Interpolation) -> Vec<f64> {
    let n = values.len();
    if n == 0 || target == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![values[0]; target];
    }

    let positions = sample_positions(n, target);
    let has_nan = values.iter().any(|v| v.is_nan());

    match method {
        Interpolation::CubicSpline if n >= 4 && !has_nan => {
            let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
            match CubicSpline::not_a_knot(&x, values) {
                Some(spline) => positions.iter().map(|&t| spline.eval(t)).collect(),
                None => positions.iter().map(|&t| linear_at(values, t)).collect(),
            }
        }
        Interpolation::CubicSpline if n == 3 && !has_nan => {
            positions.iter().map(|&t| quadratic_at(values, t)).collect()
        }
        // NaN breaks a global spline fit, so such columns fall back to
        // linear interpolation, which only spreads NaN to adjacent frames.
        _ => positions.iter().map(|&t| linear_at(values, t)).collect(),
    }
}

/// Positions `j * (n - 1) / (target - 1)` for `j in 0..target`.
pub fn sample_positions(n: usize, target: usize) -> Vec<f64> {
    if target == 1 {
        return vec![0.0];
    }
    let span = (n.saturating_sub(1)) as f64;
    let step = span / (target - 1) as f64;
    (0..target)
        .map(|j| if j + 1 == target { span } else { j as f64 * step })
        .collect()
}

/// Linear interpolation of uniformly sampled `values` at position `t`.
pub fn linear_at(values: &[f64], t: f64) -> f64 {
    let last = values.len() - 1;
    if t <= 0.0 {
        return values[0];
    }
    if t >= last as f64 {
        return values[last];
    }
    let i = t.floor() as usize;
    let frac = t - i as f64;
    if frac == 0.0 {
        values[i]
    } else {
        values[i] + frac * (values[i + 1] - values[i])
    }
}

/// Quadratic through three samples at frames 0, 1, 2.
fn quadratic_at(values: &[f64], t: f64) -> f64 {
    let (y0, y1, y2) = (values[0], values[1], values[2]);
    y0 * (t - 1.0) * (t - 2.0) / 2.0 - y1 * t * (t - 2.0) + y2 * t * (t - 1.0) / 2.0
}

/// Interpolating cubic spline with not-a-knot end conditions.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit a spline through `(x, y)`. Needs at least four strictly
    /// increasing knots.
    pub fn not_a_knot(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < 4 || y.len() != n || x.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

        // Unknowns are m[1..n-1]; the end values follow from the
        // third-derivative continuity at x[1] and x[n-2].
        let k = n - 2;
        let mut sub = vec![0.0; k];
        let mut diag = vec![0.0; k];
        let mut sup = vec![0.0; k];
        let mut rhs = vec![0.0; k];
        for j in 0..k {
            let r = j + 1;
            sub[j] = h[r - 1];
            diag[j] = 2.0 * (h[r - 1] + h[r]);
            sup[j] = h[r];
            rhs[j] = 6.0 * (slope[r] - slope[r - 1]);
        }

        let (h0, h1) = (h[0], h[1]);
        diag[0] = 3.0 * h0 + 2.0 * h1 + h0 * h0 / h1;
        sup[0] = h1 - h0 * h0 / h1;
        sub[0] = 0.0;

        let (ha, hb) = (h[n - 3], h[n - 2]);
        sub[k - 1] = ha - hb * hb / ha;
        diag[k - 1] = 2.0 * ha + 3.0 * hb + hb * hb / ha;
        sup[k - 1] = 0.0;

        let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;

        let mut m = Vec::with_capacity(n);
        m.push(interior[0] + h0 / h1 * (interior[0] - interior[1]));
        m.extend_from_slice(&interior);
        m.push(interior[k - 1] + hb / ha * (interior[k - 1] - interior[k - 2]));

        Some(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    /// Evaluate at `t`; outside the knots the end polynomials extrapolate.
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let i = self
            .x
            .partition_point(|&xi| xi <= t)
            .saturating_sub(1)
            .min(n - 2);

        let h = self.x[i + 1] - self.x[i];
        let a = self.x[i + 1] - t;
        let b = t - self.x[i];
        let (mi, mj) = (self.m[i], self.m[i + 1]);

        mi * a.powi(3) / (6.0 * h)
            + mj * b.powi(3) / (6.0 * h)
            + (self.y[i] / h - mi * h / 6.0) * a
            + (self.y[i + 1] / h - mj * h / 6.0) * b
    }
}

/// Thomas algorithm. Returns `None` on a zero pivot.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    if diag[0] == 0.0 {
        return None;
    }
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        if denom == 0.0 {
            return None;
        }
        c[i] = sup[i] / denom;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }

    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    Some(out)
}
