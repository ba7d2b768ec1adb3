//! Configuration Module
//! JSON pipeline configuration. Every stage is optional and every field
//! has a default, except the subject data the momentum stage needs.

use crate::data::LoadOptions;
use crate::momentum::{default_groups, CentreOfMass, MetricOptions, SegmentGroup, SignalSuffixes};
use crate::phases::{PhaseBoundaries, ThresholdDetector};
use crate::resample::{Interpolation, PhaseFrames};
use crate::stats::Alignment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Cutting continuous recordings into trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicingConfig {
    pub inputs: Vec<PathBuf>,
    #[serde(default = "default_sliced_dir")]
    pub output_dir: PathBuf,
    /// Trial start frames, the last entry closing the last trial.
    #[serde(default)]
    pub begin_frames: Vec<usize>,
    /// Used when `begin_frames` is empty: trials start `lead` frames
    /// before each lift-off.
    #[serde(default)]
    pub lift_offs: Vec<usize>,
    #[serde(default = "default_lead")]
    pub lead: usize,
}

fn default_sliced_dir() -> PathBuf {
    PathBuf::from("sliced")
}

fn default_lead() -> usize {
    40
}

fn default_tail() -> usize {
    50
}

impl SlicingConfig {
    pub fn begin_frames(&self) -> Vec<usize> {
        if self.begin_frames.is_empty() {
            crate::data::TrialSlicer::begin_frames_from_lift_offs(&self.lift_offs, self.lead)
        } else {
            self.begin_frames.clone()
        }
    }
}

/// Where the phase boundaries of each trial come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BoundarySource {
    /// Boundaries relative to each trial's first frame.
    Frames { boundaries: Vec<PhaseBoundaries> },
    /// Absolute recording frames picked by hand; trials end `tail` frames
    /// after foot-down.
    Picked {
        begin: Vec<usize>,
        lift_off: Vec<usize>,
        impact: Vec<usize>,
        foot_down: Vec<usize>,
        #[serde(default = "default_tail")]
        tail: usize,
    },
    /// Force-plate threshold detection on every trial.
    Detect { detector: ThresholdDetector },
}

/// Four-phase time normalization of a directory of trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub input_dir: PathBuf,
    #[serde(default = "default_scaled_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub frames: PhaseFrames,
    #[serde(default)]
    pub interpolation: Interpolation,
    pub boundaries: BoundarySource,
}

fn default_scaled_dir() -> PathBuf {
    PathBuf::from("scaled")
}

/// Cross-trial averaging of every subdirectory of `input_root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragingConfig {
    pub input_root: PathBuf,
    #[serde(default = "default_averaged_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub alignment: Alignment,
}

fn default_averaged_dir() -> PathBuf {
    PathBuf::from("averaged")
}

/// Lab-to-body-COM conversion followed by AMAC/AMOC metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    pub angular_momentum: PathBuf,
    pub position: PathBuf,
    pub velocity: PathBuf,
    /// Subject mass in kg.
    pub body_mass: f64,
    /// Segment mass as a fraction of body mass.
    pub fractions: BTreeMap<String, f64>,
    #[serde(default)]
    pub suffixes: SignalSuffixes,
    #[serde(default)]
    pub centre: CentreOfMass,
    #[serde(default = "default_groups")]
    pub groups: Vec<SegmentGroup>,
    #[serde(default)]
    pub metrics: MetricOptions,
    #[serde(default = "default_converted_path")]
    pub output: PathBuf,
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,
}

fn default_converted_path() -> PathBuf {
    PathBuf::from("angmom_wrt_body_com.csv")
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from("metrics")
}

/// Main pipeline configuration combining all stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub loader: LoadOptions,
    #[serde(default)]
    pub slicing: Option<SlicingConfig>,
    #[serde(default)]
    pub scaling: Option<ScalingConfig>,
    #[serde(default)]
    pub averaging: Option<AveragingConfig>,
    #[serde(default)]
    pub momentum: Option<MomentumConfig>,
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if let Some(scaling) = &self.scaling {
            if scaling.frames.0.contains(&0) {
                return invalid(format!(
                    "phase frame counts must be positive, got {:?}",
                    scaling.frames.0
                ));
            }
            if let BoundarySource::Detect { detector } = &scaling.boundaries {
                for threshold in [&detector.lift, &detector.down] {
                    if !threshold.value.is_finite() {
                        return invalid(format!(
                            "detector threshold must be finite, got {}",
                            threshold.value
                        ));
                    }
                }
            }
        }

        if let Some(momentum) = &self.momentum {
            if !(momentum.body_mass.is_finite() && momentum.body_mass > 0.0) {
                return invalid(format!(
                    "body mass must be positive, got {}",
                    momentum.body_mass
                ));
            }
            if momentum.fractions.is_empty() {
                return invalid("mass fraction map is empty".to_string());
            }
            if momentum.metrics.time_points == Some(0) {
                return invalid("time normalization needs at least one point".to_string());
            }
            if let Some(min) = momentum.metrics.min_whole_body_norm {
                if !min.is_finite() {
                    return invalid(format!("whole-body norm mask must be finite, got {min}"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{Crossing, ImpactRule};

    #[test]
    fn empty_config_runs_nothing() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn stage_defaults_are_filled_in() {
        let config = PipelineConfig::from_json(
            r#"{
                "slicing": { "inputs": ["raw.tsv"], "lift_offs": [100, 300, 520] },
                "scaling": {
                    "input_dir": "sliced/raw",
                    "boundaries": {
                        "source": "detect",
                        "detector": { "impact": { "rule": "frame", "frame": 30 } }
                    }
                },
                "averaging": { "input_root": "scaled" }
            }"#,
        )
        .unwrap();

        let slicing = config.slicing.unwrap();
        assert_eq!(slicing.begin_frames(), vec![60, 260, 480]);
        assert_eq!(slicing.output_dir, PathBuf::from("sliced"));

        let scaling = config.scaling.unwrap();
        assert_eq!(scaling.frames, PhaseFrames::uniform(25));
        assert_eq!(scaling.interpolation, Interpolation::Linear);
        match scaling.boundaries {
            BoundarySource::Detect { detector } => {
                assert_eq!(detector.lift.crossing, Crossing::Below);
                assert_eq!(detector.impact, ImpactRule::Frame { frame: 30 });
            }
            other => panic!("unexpected boundary source {other:?}"),
        }

        assert_eq!(config.averaging.unwrap().alignment, Alignment::Auto);
    }

    #[test]
    fn picked_frames_default_tail() {
        let config = PipelineConfig::from_json(
            r#"{ "scaling": { "input_dir": "x", "boundaries": {
                "source": "picked", "begin": [0], "lift_off": [40],
                "impact": [60], "foot_down": [90]
            } } }"#,
        )
        .unwrap();
        match config.scaling.unwrap().boundaries {
            BoundarySource::Picked { tail, .. } => assert_eq!(tail, 50),
            other => panic!("unexpected boundary source {other:?}"),
        }
    }

    #[test]
    fn detection_accepts_per_trial_impacts() {
        let config = PipelineConfig::from_json(
            r#"{ "scaling": { "input_dir": "x", "boundaries": {
                "source": "detect",
                "detector": { "impact": {
                    "rule": "per_trial", "impact": [130, 528], "begin": [100, 500]
                } }
            } } }"#,
        )
        .unwrap();
        match config.scaling.unwrap().boundaries {
            BoundarySource::Detect { detector } => assert_eq!(
                detector.impact,
                ImpactRule::PerTrial {
                    impact: vec![130, 528],
                    begin: vec![100, 500]
                }
            ),
            other => panic!("unexpected boundary source {other:?}"),
        }
    }

    #[test]
    fn literal_boundaries_are_validated_on_parse() {
        let result = PipelineConfig::from_json(
            r#"{ "scaling": { "input_dir": "x", "boundaries": {
                "source": "frames", "boundaries": [[0, 50, 40, 60, 80]]
            } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_frames = r#"{ "scaling": { "input_dir": "x", "frames": [25, 0, 25, 25],
            "boundaries": { "source": "frames", "boundaries": [] } } }"#;
        assert!(matches!(
            PipelineConfig::from_json(zero_frames),
            Err(ConfigError::Invalid(_))
        ));

        let momentum = |mass: f64, fractions: &str| {
            format!(
                r#"{{ "momentum": {{ "angular_momentum": "h.tsv", "position": "r.tsv",
                    "velocity": "v.tsv", "body_mass": {mass}, "fractions": {fractions} }} }}"#
            )
        };
        assert!(PipelineConfig::from_json(&momentum(70.0, r#"{"Head": 0.08}"#)).is_ok());
        assert!(matches!(
            PipelineConfig::from_json(&momentum(-1.0, r#"{"Head": 0.08}"#)),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(&momentum(70.0, "{}")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn momentum_defaults_use_standard_groups() {
        let config = PipelineConfig::from_json(
            r#"{ "momentum": { "angular_momentum": "h.tsv", "position": "r.tsv",
                "velocity": "v.tsv", "body_mass": 70, "fractions": {"Head": 0.08} } }"#,
        )
        .unwrap();
        let momentum = config.momentum.unwrap();
        assert_eq!(momentum.groups.len(), 5);
        assert_eq!(momentum.metrics.time_points, Some(101));
        assert_eq!(momentum.suffixes.position, "_CoG_pos");
        assert_eq!(momentum.centre, CentreOfMass::Weighted);
    }
}
