//! Reference Frame Module
//! Converts segment angular momentum about the lab origin into angular
//! momentum about the whole-body centre of mass.

use super::MomentumError;
use crate::data::SignalTable;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Suffix of converted segment signals.
pub const BODY_COM_SUFFIX: &str = "_AngMom_wrt_BodyCOM";

/// Whole-body angular momentum about the centre of mass.
pub const FULL_BODY_SIGNAL: &str = "FullBody_AngMom_wrt_BodyCOM";

/// Prefix reserved for whole-body signals; never treated as a segment.
const WHOLE_BODY_PREFIX: &str = "FullBody";

/// Signal name suffixes identifying a segment in each input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSuffixes {
    #[serde(default = "default_angular_suffix")]
    pub angular_momentum: String,
    #[serde(default = "default_position_suffix")]
    pub position: String,
    #[serde(default = "default_velocity_suffix")]
    pub velocity: String,
}

fn default_angular_suffix() -> String {
    "_AngMom_wrt_LAB".to_string()
}

fn default_position_suffix() -> String {
    "_CoG_pos".to_string()
}

fn default_velocity_suffix() -> String {
    "_CoG_vel".to_string()
}

impl Default for SignalSuffixes {
    fn default() -> Self {
        Self {
            angular_momentum: default_angular_suffix(),
            position: default_position_suffix(),
            velocity: default_velocity_suffix(),
        }
    }
}

/// Segment masses derived from total body mass and per-segment fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMasses {
    body_mass: f64,
    fractions: BTreeMap<String, f64>,
}

impl SegmentMasses {
    pub fn new(body_mass: f64, fractions: BTreeMap<String, f64>) -> Result<Self, MomentumError> {
        if !(body_mass.is_finite() && body_mass > 0.0) {
            return Err(MomentumError::InvalidMass(body_mass));
        }
        if let Some((segment, fraction)) = fractions
            .iter()
            .find(|(_, f)| !(f.is_finite() && **f >= 0.0))
        {
            return Err(MomentumError::InvalidFraction {
                segment: segment.clone(),
                fraction: *fraction,
            });
        }
        Ok(Self {
            body_mass,
            fractions,
        })
    }

    pub fn body_mass(&self) -> f64 {
        self.body_mass
    }

    pub fn mass(&self, segment: &str) -> Result<f64, MomentumError> {
        self.fractions
            .get(segment)
            .map(|fraction| fraction * self.body_mass)
            .ok_or_else(|| MomentumError::UnknownSegment(segment.to_string()))
    }
}

/// Source of the whole-body centre of mass position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CentreOfMass {
    /// Mass-weighted mean of the segment positions.
    #[default]
    Weighted,
    /// A position signal of the position table (e.g. `FullBody_CoG_pos`).
    /// A signal with a single triplet serves every block.
    Signal { name: String },
}

/// `H_com = H_origin + (r_segment - r_com) × (m · v)`.
pub fn about_centre_of_mass(
    h_origin: &Vector3<f64>,
    r_segment: &Vector3<f64>,
    r_com: &Vector3<f64>,
    mass: f64,
    velocity: &Vector3<f64>,
) -> Vector3<f64> {
    h_origin + (r_segment - r_com).cross(&(velocity * mass))
}

struct SegmentBlock {
    name: String,
    mass: f64,
    momentum: Vec<Vector3<f64>>,
    position: Vec<Vector3<f64>>,
    velocity: Vec<Vector3<f64>>,
}

/// Converts angular momentum tables from the lab frame to the body COM.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    masses: SegmentMasses,
    suffixes: SignalSuffixes,
    centre: CentreOfMass,
}

impl FrameConverter {
    pub fn new(masses: SegmentMasses, suffixes: SignalSuffixes, centre: CentreOfMass) -> Self {
        Self {
            masses,
            suffixes,
            centre,
        }
    }

    /// Segments present in all three tables, in angular momentum order.
    pub fn segments(
        &self,
        momentum: &SignalTable,
        position: &SignalTable,
        velocity: &SignalTable,
    ) -> Vec<String> {
        let position_signals = position.signals();
        let velocity_signals = velocity.signals();
        momentum
            .signals()
            .into_iter()
            .filter_map(|signal| signal.strip_suffix(self.suffixes.angular_momentum.as_str()))
            .filter(|segment| *segment != WHOLE_BODY_PREFIX)
            .filter(|segment| {
                position_signals.contains(&format!("{segment}{}", self.suffixes.position).as_str())
                    && velocity_signals
                        .contains(&format!("{segment}{}", self.suffixes.velocity).as_str())
            })
            .map(str::to_string)
            .collect()
    }

    /// Convert every block of the inputs. Output holds one X/Y/Z triplet
    /// per segment and block, each block closed by the whole-body sum.
    pub fn convert(
        &self,
        momentum: &SignalTable,
        position: &SignalTable,
        velocity: &SignalTable,
    ) -> Result<SignalTable, MomentumError> {
        let segments = self.segments(momentum, position, velocity);
        if segments.is_empty() {
            return Err(MomentumError::NoSegments);
        }

        let frames = momentum
            .height()
            .min(position.height())
            .min(velocity.height());
        let blocks = segments
            .iter()
            .map(|s| {
                momentum
                    .triplets(&format!("{s}{}", self.suffixes.angular_momentum))
                    .len()
            })
            .max()
            .unwrap_or(0);

        info!(
            "Converting {} segments in {} blocks ({} frames) to body COM",
            segments.len(),
            blocks,
            frames
        );

        let mut out = SignalTable::default();
        for block in 0..blocks {
            let parts = self.block_segments(&segments, block, frames, momentum, position, velocity)?;
            if parts.is_empty() {
                continue;
            }
            let com = self.centre_of_mass(&parts, block, frames, position)?;

            let mut whole_body = vec![Vector3::zeros(); frames];
            for part in &parts {
                let converted: Vec<Vector3<f64>> = (0..frames)
                    .map(|t| {
                        about_centre_of_mass(
                            &part.momentum[t],
                            &part.position[t],
                            &com[t],
                            part.mass,
                            &part.velocity[t],
                        )
                    })
                    .collect();
                for (sum, h) in whole_body.iter_mut().zip(&converted) {
                    *sum += h;
                }
                out.push_vectors(&format!("{}{BODY_COM_SUFFIX}", part.name), &converted)?;
            }
            out.push_vectors(FULL_BODY_SIGNAL, &whole_body)?;
        }
        Ok(out)
    }

    fn block_segments(
        &self,
        segments: &[String],
        block: usize,
        frames: usize,
        momentum: &SignalTable,
        position: &SignalTable,
        velocity: &SignalTable,
    ) -> Result<Vec<SegmentBlock>, MomentumError> {
        let mut parts = Vec::new();
        for segment in segments {
            let triplet = |table: &SignalTable, suffix: &str| {
                table.triplets(&format!("{segment}{suffix}")).get(block).copied()
            };
            let Some(h) = triplet(momentum, &self.suffixes.angular_momentum) else {
                debug!("Segment {} has no data in block {}", segment, block);
                continue;
            };
            let companion = |table: &SignalTable, suffix: &str| {
                triplet(table, suffix).ok_or_else(|| MomentumError::MissingBlockSignal {
                    signal: format!("{segment}{suffix}"),
                    block,
                })
            };
            let r = companion(position, &self.suffixes.position)?;
            let v = companion(velocity, &self.suffixes.velocity)?;

            let take = |mut v: Vec<Vector3<f64>>| {
                v.truncate(frames);
                v
            };
            parts.push(SegmentBlock {
                name: segment.clone(),
                mass: self.masses.mass(segment)?,
                momentum: take(momentum.vectors(h)),
                position: take(position.vectors(r)),
                velocity: take(velocity.vectors(v)),
            });
        }
        Ok(parts)
    }

    fn centre_of_mass(
        &self,
        parts: &[SegmentBlock],
        block: usize,
        frames: usize,
        position: &SignalTable,
    ) -> Result<Vec<Vector3<f64>>, MomentumError> {
        match &self.centre {
            CentreOfMass::Weighted => {
                let total: f64 = parts.iter().map(|p| p.mass).sum();
                if total <= 0.0 {
                    return Err(MomentumError::ZeroTotalMass { block });
                }
                Ok((0..frames)
                    .map(|t| {
                        parts
                            .iter()
                            .fold(Vector3::zeros(), |acc, p| acc + p.position[t] * p.mass)
                            / total
                    })
                    .collect())
            }
            CentreOfMass::Signal { name } => {
                let triplets = position.triplets(name);
                let triplet = triplets
                    .get(block)
                    .or_else(|| triplets.first())
                    .copied()
                    .ok_or_else(|| MomentumError::MissingSignal(name.clone()))?;
                let mut com = position.vectors(triplet);
                com.truncate(frames);
                Ok(com)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnKey;
    use approx::assert_relative_eq;

    fn vector_table(signals: &[(&str, Vec<Vector3<f64>>)]) -> SignalTable {
        let mut table = SignalTable::default();
        for (name, values) in signals {
            table.push_vectors(name, values).unwrap();
        }
        table
    }

    fn masses() -> SegmentMasses {
        let fractions = [("R_Foot", 0.2), ("L_Foot", 0.3), ("Head", 0.5)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        SegmentMasses::new(80.0, fractions).unwrap()
    }

    fn inputs(offset: Vector3<f64>) -> (SignalTable, SignalTable, SignalTable) {
        let frames = 5;
        let series = |f: &dyn Fn(f64) -> Vector3<f64>| -> Vec<Vector3<f64>> {
            (0..frames).map(|t| f(t as f64)).collect()
        };
        let momentum = vector_table(&[
            ("R_Foot_AngMom_wrt_LAB", series(&|t| Vector3::new(t, 1.0, 0.5))),
            ("L_Foot_AngMom_wrt_LAB", series(&|t| Vector3::new(0.0, -t, 2.0))),
            ("Head_AngMom_wrt_LAB", series(&|_| Vector3::new(0.1, 0.2, 0.3))),
        ]);
        let position = vector_table(&[
            ("R_Foot_CoG_pos", series(&|t| Vector3::new(0.3 + t, 0.1, 0.1) + offset)),
            ("L_Foot_CoG_pos", series(&|t| Vector3::new(-0.2, 0.4 * t, 0.1) + offset)),
            ("Head_CoG_pos", series(&|_| Vector3::new(0.0, 0.0, 1.7) + offset)),
        ]);
        let velocity = vector_table(&[
            ("R_Foot_CoG_vel", series(&|t| Vector3::new(1.0, t, 0.0))),
            ("L_Foot_CoG_vel", series(&|_| Vector3::new(0.0, 0.4, 0.0))),
            ("Head_CoG_vel", series(&|t| Vector3::new(0.0, 0.0, 0.1 * t))),
        ]);
        (momentum, position, velocity)
    }

    /// Place each table's columns after the previous one, one block per table.
    fn stack(blocks: &[&SignalTable]) -> SignalTable {
        let keys = blocks.iter().flat_map(|t| t.keys().to_vec()).collect();
        let columns = blocks.iter().flat_map(|t| t.columns().to_vec()).collect();
        SignalTable::new(keys, columns).unwrap()
    }

    fn scaled(table: &SignalTable, factor: f64) -> SignalTable {
        let columns = table
            .columns()
            .iter()
            .map(|c| c.iter().map(|x| x * factor).collect())
            .collect();
        SignalTable::new(table.keys().to_vec(), columns).unwrap()
    }

    #[test]
    fn converts_with_parallel_axis_term() {
        let h = Vector3::new(1.0, 0.0, 0.0);
        let r = Vector3::new(0.0, 1.0, 0.0);
        let g = Vector3::zeros();
        let v = Vector3::new(0.0, 0.0, 2.0);
        // (0,1,0) x (0,0,6) = (6,0,0)
        let out = about_centre_of_mass(&h, &r, &g, 3.0, &v);
        assert_relative_eq!(out, Vector3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn discovers_common_segments() {
        let (momentum, position, mut velocity) = inputs(Vector3::zeros());
        velocity = {
            let keys: Vec<ColumnKey> = velocity.keys()[..6].to_vec();
            let columns = velocity.columns()[..6].to_vec();
            SignalTable::new(keys, columns).unwrap()
        };
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        assert_eq!(
            converter.segments(&momentum, &position, &velocity),
            vec!["R_Foot".to_string(), "L_Foot".to_string()]
        );
    }

    #[test]
    fn whole_body_is_sum_of_segments() {
        let (momentum, position, velocity) = inputs(Vector3::zeros());
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        let out = converter.convert(&momentum, &position, &velocity).unwrap();
        assert_eq!(out.width(), 12);

        let full = out.vectors(out.triplets(FULL_BODY_SIGNAL)[0]);
        let parts: Vec<Vec<Vector3<f64>>> = ["R_Foot", "L_Foot", "Head"]
            .iter()
            .map(|s| out.vectors(out.triplets(&format!("{s}{BODY_COM_SUFFIX}"))[0]))
            .collect();
        for t in 0..5 {
            let sum = parts.iter().fold(Vector3::zeros(), |acc, p| acc + p[t]);
            assert_relative_eq!(full[t], sum, epsilon = 1e-12);
        }
    }

    #[test]
    fn translation_leaves_result_unchanged() {
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        let (m, p, v) = inputs(Vector3::zeros());
        let base = converter.convert(&m, &p, &v).unwrap();
        let (m, p, v) = inputs(Vector3::new(12.5, -3.0, 100.0));
        let moved = converter.convert(&m, &p, &v).unwrap();
        for (a, b) in base.columns().iter().zip(moved.columns()) {
            for (x, y) in a.iter().zip(b) {
                assert_relative_eq!(x, y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn unknown_segment_is_an_error() {
        let (momentum, position, velocity) = inputs(Vector3::zeros());
        let fractions = [("R_Foot".to_string(), 0.5)].into_iter().collect();
        let converter = FrameConverter::new(
            SegmentMasses::new(70.0, fractions).unwrap(),
            SignalSuffixes::default(),
            CentreOfMass::Weighted,
        );
        assert!(matches!(
            converter.convert(&momentum, &position, &velocity),
            Err(MomentumError::UnknownSegment(_))
        ));
    }

    #[test]
    fn explicit_centre_signal_is_used() {
        let (momentum, mut position, velocity) = inputs(Vector3::zeros());
        let com: Vec<Vector3<f64>> = vec![Vector3::new(0.0, 0.0, 1.0); 5];
        position.push_vectors("FullBody_CoG_pos", &com).unwrap();
        let converter = FrameConverter::new(
            masses(),
            SignalSuffixes::default(),
            CentreOfMass::Signal {
                name: "FullBody_CoG_pos".to_string(),
            },
        );
        let out = converter.convert(&momentum, &position, &velocity).unwrap();
        // Head sits at (0,0,1.7), moving along z: r x v is zero
        let head = out.vectors(out.triplets(&format!("Head{BODY_COM_SUFFIX}"))[0]);
        assert_relative_eq!(head[3], Vector3::new(0.1, 0.2, 0.3), epsilon = 1e-12);
    }

    #[test]
    fn blocks_are_converted_independently() {
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        let (m, p, v) = inputs(Vector3::zeros());
        let (m2, p2, _) = inputs(Vector3::new(1.0, -2.0, 0.5));
        let v2 = scaled(&v, 2.0);
        let first = converter.convert(&m, &p, &v).unwrap();
        let second = converter.convert(&m2, &p2, &v2).unwrap();

        let both = converter
            .convert(&stack(&[&m, &m2]), &stack(&[&p, &p2]), &stack(&[&v, &v2]))
            .unwrap();
        assert_eq!(both.width(), 24);

        for signal in ["R_Foot", "L_Foot", "Head", "FullBody"] {
            let name = format!("{signal}{BODY_COM_SUFFIX}");
            let blocks = both.triplets(&name);
            assert_eq!(blocks.len(), 2, "{name}");
            for (block, single) in [&first, &second].into_iter().enumerate() {
                let expected = single.vectors(single.triplets(&name)[0]);
                let actual = both.vectors(blocks[block]);
                for (a, e) in actual.iter().zip(&expected) {
                    assert_relative_eq!(a, e, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn single_centre_signal_serves_every_block() {
        let (m, p, v) = inputs(Vector3::zeros());
        let com = vec![Vector3::new(0.0, 0.0, 1.0); 5];
        let mut with_com = p.clone();
        with_com.push_vectors("FullBody_CoG_pos", &com).unwrap();
        let converter = FrameConverter::new(
            masses(),
            SignalSuffixes::default(),
            CentreOfMass::Signal {
                name: "FullBody_CoG_pos".to_string(),
            },
        );
        let single = converter.convert(&m, &with_com, &v).unwrap();

        // The centre triplet appears once, ahead of the second block
        let both = converter
            .convert(&stack(&[&m, &m]), &stack(&[&with_com, &p]), &stack(&[&v, &v]))
            .unwrap();
        let name = format!("R_Foot{BODY_COM_SUFFIX}");
        let expected = single.vectors(single.triplets(&name)[0]);
        for block in both.triplets(&name) {
            for (a, e) in both.vectors(block).iter().zip(&expected) {
                assert_relative_eq!(a, e, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn missing_companion_block_is_an_error() {
        let (m, p, v) = inputs(Vector3::zeros());
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        let result = converter.convert(&stack(&[&m, &m]), &p, &stack(&[&v, &v]));
        match result {
            Err(MomentumError::MissingBlockSignal { signal, block }) => {
                assert_eq!(signal, "R_Foot_CoG_pos");
                assert_eq!(block, 1);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn segment_absent_from_a_block_is_skipped() {
        let (m, p, v) = inputs(Vector3::zeros());
        let head_only = |table: &SignalTable| {
            let keys = table.keys()[6..].to_vec();
            let columns = table.columns()[6..].to_vec();
            SignalTable::new(keys, columns).unwrap()
        };
        let converter =
            FrameConverter::new(masses(), SignalSuffixes::default(), CentreOfMass::Weighted);
        let out = converter
            .convert(
                &stack(&[&m, &head_only(&m)]),
                &stack(&[&p, &head_only(&p)]),
                &stack(&[&v, &head_only(&v)]),
            )
            .unwrap();
        assert_eq!(out.triplets(&format!("R_Foot{BODY_COM_SUFFIX}")).len(), 1);
        assert_eq!(out.triplets(&format!("Head{BODY_COM_SUFFIX}")).len(), 2);
        assert_eq!(out.triplets(FULL_BODY_SIGNAL).len(), 2);
    }

    #[test]
    fn rejects_bad_masses() {
        assert!(SegmentMasses::new(0.0, BTreeMap::new()).is_err());
        let fractions = [("Head".to_string(), -0.1)].into_iter().collect();
        assert!(matches!(
            SegmentMasses::new(70.0, fractions),
            Err(MomentumError::InvalidFraction { .. })
        ));
    }
}
