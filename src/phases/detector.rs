//! Boundary Detection Module
//! Finds lift-off, impact and foot-down frames from force and kinematic channels.

use super::boundary::{BoundaryError, PhaseBoundaries};
use crate::data::{ColumnKey, SignalTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("Channel {0} not found in trial")]
    MissingChannel(ColumnKey),
    #[error("{event} threshold {threshold} not crossed after frame {from}")]
    ThresholdNotCrossed {
        event: ContactEvent,
        threshold: f64,
        from: usize,
    },
    #[error("No impact frame between lift-off {lift_off} and foot-down {foot_down}")]
    NoImpact { lift_off: usize, foot_down: usize },
    #[error("No picked impact frame for trial {0}")]
    NoTrialImpact(usize),
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

/// Force-plate contact events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    LiftOff,
    FootDown,
}

impl fmt::Display for ContactEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactEvent::LiftOff => f.write_str("lift-off"),
            ContactEvent::FootDown => f.write_str("foot-down"),
        }
    }
}

/// Direction in which a sample must lie relative to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    Below,
    AtOrBelow,
    Above,
    AtOrAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    pub crossing: Crossing,
}

impl Threshold {
    pub fn below(value: f64) -> Self {
        Self {
            value,
            crossing: Crossing::Below,
        }
    }

    pub fn above(value: f64) -> Self {
        Self {
            value,
            crossing: Crossing::Above,
        }
    }

    /// NaN samples never cross.
    pub fn is_crossed(&self, sample: f64) -> bool {
        match self.crossing {
            Crossing::Below => sample < self.value,
            Crossing::AtOrBelow => sample <= self.value,
            Crossing::Above => sample > self.value,
            Crossing::AtOrAbove => sample >= self.value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    Max,
    Min,
}

/// How the impact (maximum extension) frame is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ImpactRule {
    /// Literal frame relative to the trial start.
    Frame { frame: usize },
    /// Absolute recording frames picked per trial: trial `i` uses
    /// `impact[i] - begin[i]`.
    PerTrial { impact: Vec<usize>, begin: Vec<usize> },
    /// Global extremum of a channel between lift-off and foot-down.
    Extremum {
        channel: ColumnKey,
        kind: ExtremumKind,
    },
    /// First peak of a channel between lift-off and foot-down. With
    /// `invert`, troughs are searched instead (knee extension).
    FirstPeak {
        channel: ColumnKey,
        #[serde(default)]
        invert: bool,
        #[serde(default)]
        min_height: Option<f64>,
    },
}

/// Where the last phase of a trial ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TrialEnd {
    #[default]
    TableEnd,
    AfterFootDown { frames: usize },
}

/// Threshold-based boundary detector on a force channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDetector {
    /// Vertical force channel of the kicking-foot plate.
    #[serde(default = "default_channel")]
    pub channel: ColumnKey,
    #[serde(default = "default_lift")]
    pub lift: Threshold,
    #[serde(default = "default_down")]
    pub down: Threshold,
    #[serde(default)]
    pub search_start: usize,
    pub impact: ImpactRule,
    #[serde(default)]
    pub trial_end: TrialEnd,
}

fn default_channel() -> ColumnKey {
    ColumnKey::new("FP1", "Z")
}

fn default_lift() -> Threshold {
    Threshold::below(8.0)
}

fn default_down() -> Threshold {
    Threshold::above(15.0)
}

impl ThresholdDetector {
    pub fn new(impact: ImpactRule) -> Self {
        Self {
            channel: default_channel(),
            lift: default_lift(),
            down: default_down(),
            search_start: 0,
            impact,
            trial_end: TrialEnd::default(),
        }
    }

    /// First frame at or after `search_start` crossing the lift threshold.
    pub fn find_lift_off(&self, table: &SignalTable) -> Result<usize, DetectError> {
        let force = channel(table, &self.channel)?;
        first_crossing(force, self.search_start, &self.lift).ok_or(
            DetectError::ThresholdNotCrossed {
                event: ContactEvent::LiftOff,
                threshold: self.lift.value,
                from: self.search_start,
            },
        )
    }

    /// First frame strictly after `lift_off` crossing the down threshold.
    pub fn find_foot_down(&self, table: &SignalTable, lift_off: usize) -> Result<usize, DetectError> {
        let force = channel(table, &self.channel)?;
        first_crossing(force, lift_off + 1, &self.down).ok_or(DetectError::ThresholdNotCrossed {
            event: ContactEvent::FootDown,
            threshold: self.down.value,
            from: lift_off + 1,
        })
    }

    pub fn find_impact(
        &self,
        table: &SignalTable,
        trial: usize,
        lift_off: usize,
        foot_down: usize,
    ) -> Result<usize, DetectError> {
        let no_impact = DetectError::NoImpact {
            lift_off,
            foot_down,
        };
        match &self.impact {
            ImpactRule::Frame { frame } => Ok(*frame),
            ImpactRule::PerTrial { impact, begin } => {
                let (Some(&frame), Some(&begin)) = (impact.get(trial), begin.get(trial)) else {
                    return Err(DetectError::NoTrialImpact(trial));
                };
                frame
                    .checked_sub(begin)
                    .ok_or(DetectError::Boundary(BoundaryError::BeforeBegin { frame, begin }))
            }
            ImpactRule::Extremum { channel: key, kind } => {
                let values = channel(table, key)?;
                window(values, lift_off, foot_down)
                    .filter(|(_, v)| !v.is_nan())
                    .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
                        Some((_, b)) if !is_better(v, b, *kind) => best,
                        _ => Some((i, v)),
                    })
                    .map(|(i, _)| i)
                    .ok_or(no_impact)
            }
            ImpactRule::FirstPeak {
                channel: key,
                invert,
                min_height,
            } => {
                let values = channel(table, key)?;
                let signal: Vec<f64> = if *invert {
                    values.iter().map(|v| -v).collect()
                } else {
                    values.to_vec()
                };
                find_peaks(&signal, *min_height, 1)
                    .into_iter()
                    .find(|&i| i > lift_off && i < foot_down)
                    .ok_or(no_impact)
            }
        }
    }

    /// Detect all five boundaries of a single trial.
    pub fn detect(&self, table: &SignalTable) -> Result<PhaseBoundaries, DetectError> {
        self.detect_trial(table, 0)
    }

    /// Detect the boundaries of trial number `trial` of a batch; the index
    /// selects per-trial picked impact frames.
    pub fn detect_trial(
        &self,
        table: &SignalTable,
        trial: usize,
    ) -> Result<PhaseBoundaries, DetectError> {
        let lift_off = self.find_lift_off(table)?;
        let foot_down = self.find_foot_down(table, lift_off)?;
        let impact = self.find_impact(table, trial, lift_off, foot_down)?;
        let trial_end = match self.trial_end {
            TrialEnd::TableEnd => table.height(),
            TrialEnd::AfterFootDown { frames } => (foot_down + frames).min(table.height()),
        };
        debug!(
            "Detected lift-off {}, impact {}, foot-down {}, end {}",
            lift_off, impact, foot_down, trial_end
        );
        Ok(PhaseBoundaries::new(lift_off, impact, foot_down, trial_end)?)
    }
}

fn channel<'a>(table: &'a SignalTable, key: &ColumnKey) -> Result<&'a [f64], DetectError> {
    table
        .column_by_key(key)
        .ok_or_else(|| DetectError::MissingChannel(key.clone()))
}

fn window(values: &[f64], lift_off: usize, foot_down: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
    values
        .iter()
        .copied()
        .enumerate()
        .skip(lift_off + 1)
        .take(foot_down.saturating_sub(lift_off + 1))
}

fn is_better(candidate: f64, best: f64, kind: ExtremumKind) -> bool {
    match kind {
        ExtremumKind::Max => candidate > best,
        ExtremumKind::Min => candidate < best,
    }
}

/// Index of the first sample at or after `from` that crosses `threshold`.
pub fn first_crossing(values: &[f64], from: usize, threshold: &Threshold) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| threshold.is_crossed(**v))
        .map(|(i, _)| i)
}

/// Local maxima of `signal`, plateaus reported at their middle sample.
///
/// Peaks lower than `min_height` are dropped. Of peaks closer than
/// `min_distance` samples, only the highest is kept.
pub fn find_peaks(signal: &[f64], min_height: Option<f64>, min_distance: usize) -> Vec<usize> {
    let n = signal.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if signal[i] > signal[i - 1] {
            let mut ahead = i + 1;
            while ahead + 1 < n && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    if let Some(height) = min_height {
        peaks.retain(|&p| signal[p] >= height);
    }

    if min_distance > 1 && peaks.len() > 1 {
        let mut by_height = peaks.clone();
        by_height.sort_by(|a, b| {
            signal[*b]
                .partial_cmp(&signal[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut kept: Vec<usize> = Vec::new();
        for p in by_height {
            if kept.iter().all(|&k| k.abs_diff(p) >= min_distance) {
                kept.push(p);
            }
        }
        kept.sort_unstable();
        peaks = kept;
    }

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn force_trial(force: Vec<f64>, knee: Vec<f64>) -> SignalTable {
        SignalTable::new(
            vec![ColumnKey::new("FP1", "Z"), ColumnKey::new("R_Knee", "Angle")],
            vec![force, knee],
        )
        .unwrap()
    }

    fn kick() -> SignalTable {
        // on plate, off for frames 3..=7, back on from 8
        let force = vec![700.0, 650.0, 300.0, 5.0, 1.0, 0.0, 2.0, 9.0, 400.0, 690.0];
        let knee = vec![10.0, 20.0, 60.0, 90.0, 40.0, 5.0, 30.0, 70.0, 20.0, 10.0];
        force_trial(force, knee)
    }

    #[test]
    fn lift_off_and_foot_down() {
        let detector = ThresholdDetector::new(ImpactRule::Frame { frame: 5 });
        let table = kick();
        assert_eq!(detector.find_lift_off(&table).unwrap(), 3);
        assert_eq!(detector.find_foot_down(&table, 3).unwrap(), 8);
        let b = detector.detect(&table).unwrap();
        assert_eq!(b.frames(), [0, 3, 5, 8, 10]);
    }

    #[test]
    fn missing_crossing_is_an_error() {
        let table = force_trial(vec![700.0; 6], vec![0.0; 6]);
        let detector = ThresholdDetector::new(ImpactRule::Frame { frame: 2 });
        let err = detector.detect(&table).unwrap_err();
        assert_eq!(
            err,
            DetectError::ThresholdNotCrossed {
                event: ContactEvent::LiftOff,
                threshold: 8.0,
                from: 0
            }
        );

        let never_down = force_trial(vec![700.0, 2.0, 3.0, 4.0], vec![0.0; 4]);
        assert!(matches!(
            detector.detect(&never_down),
            Err(DetectError::ThresholdNotCrossed {
                event: ContactEvent::FootDown,
                ..
            })
        ));
    }

    #[test]
    fn missing_channel_is_reported() {
        let mut detector = ThresholdDetector::new(ImpactRule::Frame { frame: 2 });
        detector.channel = ColumnKey::new("FP2", "Z");
        assert!(matches!(
            detector.detect(&kick()),
            Err(DetectError::MissingChannel(_))
        ));
    }

    #[test]
    fn impact_from_extremum() {
        let detector = ThresholdDetector::new(ImpactRule::Extremum {
            channel: ColumnKey::new("R_Knee", "Angle"),
            kind: ExtremumKind::Min,
        });
        assert_eq!(detector.detect(&kick()).unwrap().impact(), 5);
    }

    #[test]
    fn impact_from_first_trough() {
        let detector = ThresholdDetector::new(ImpactRule::FirstPeak {
            channel: ColumnKey::new("R_Knee", "Angle"),
            invert: true,
            min_height: None,
        });
        assert_eq!(detector.detect(&kick()).unwrap().impact(), 5);
    }

    #[test]
    fn impact_picked_per_trial() {
        let detector = ThresholdDetector::new(ImpactRule::PerTrial {
            impact: vec![130, 205],
            begin: vec![100, 200],
        });
        assert_eq!(detector.detect_trial(&kick(), 1).unwrap().impact(), 5);
        assert_eq!(
            detector.detect_trial(&kick(), 2),
            Err(DetectError::NoTrialImpact(2))
        );

        let early = ThresholdDetector::new(ImpactRule::PerTrial {
            impact: vec![90],
            begin: vec![100],
        });
        assert_eq!(
            early.detect(&kick()),
            Err(DetectError::Boundary(BoundaryError::BeforeBegin {
                frame: 90,
                begin: 100
            }))
        );
    }

    #[test]
    fn negative_force_convention() {
        let mut detector = ThresholdDetector::new(ImpactRule::Frame { frame: 2 });
        detector.lift = Threshold {
            value: -4.0,
            crossing: Crossing::AtOrAbove,
        };
        detector.down = Threshold::below(-4.0);
        detector.trial_end = TrialEnd::AfterFootDown { frames: 1 };
        let table = force_trial(vec![-600.0, -3.0, -1.0, -2.0, -500.0, -650.0], vec![0.0; 6]);
        assert_eq!(detector.detect(&table).unwrap().frames(), [0, 1, 2, 4, 5]);
    }

    #[test]
    fn peaks_with_plateau_height_and_distance() {
        let signal = [0.0, 2.0, 2.0, 2.0, 0.0, 5.0, 0.0, 1.0, 0.0];
        assert_eq!(find_peaks(&signal, None, 1), vec![2, 5, 7]);
        assert_eq!(find_peaks(&signal, Some(1.5), 1), vec![2, 5]);
        assert_eq!(find_peaks(&signal, None, 3), vec![2, 5]);
    }

    #[test]
    fn nan_never_crosses() {
        let t = Threshold::below(8.0);
        assert!(!t.is_crossed(f64::NAN));
        assert_eq!(first_crossing(&[f64::NAN, 9.0, 7.0], 0, &t), Some(2));
    }
}
