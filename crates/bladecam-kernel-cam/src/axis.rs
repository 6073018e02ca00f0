//! Tool-axis resolution and smoothing.
//!
//! Every cutting point gets a unit tool axis (pointing from the tip up
//! the tool). Raw axes come from the axis mode, are clamped to the safety
//! cone, low-pass filtered with a `(1, 2, 1)` kernel and clamped again.
//! What is still discontinuous after that is an error, not something to
//! paper over.

use bladecam_kernel_math::{angle_between, any_perpendicular, rotate_vec, Dir3, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, CamError, Result};
use crate::planner::{Pass, PathPoint};

/// How raw tool axes are derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AxisMode {
    /// The same axis everywhere.
    Fixed {
        /// Axis direction.
        direction: Vec3,
    },
    /// Radial from a line, leaned by drag and tilt.
    RotateAbout {
        /// A point on the line.
        origin: Point3,
        /// Line direction.
        direction: Vec3,
        /// Lead (positive) or lag along the feed in degrees.
        drag: f64,
        /// Side lean about the feed direction in degrees.
        tilt: f64,
    },
    /// The contact normal, leaned by drag and tilt.
    DragTilt {
        /// Lead (positive) or lag along the feed in degrees.
        drag: f64,
        /// Side lean about the feed direction in degrees.
        tilt: f64,
    },
}

/// Limits on the angle between the tool axis and a reference axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyCone {
    /// Reference axis, usually the part axis.
    pub axis: Vec3,
    /// Minimum angle in degrees.
    pub min_angle: f64,
    /// Maximum angle in degrees.
    pub max_angle: f64,
}

impl SafetyCone {
    /// Pull `a` into `[min_angle, max_angle]` from the cone axis, keeping
    /// its azimuth.
    pub fn clamp(&self, a: &Dir3) -> Dir3 {
        let c = Dir3::new_normalize(self.axis);
        let angle = angle_between(c.as_ref(), a.as_ref());
        let target = angle.clamp(self.min_angle.to_radians(), self.max_angle.to_radians());
        if (target - angle).abs() < 1e-12 {
            return *a;
        }
        let radial = a.as_ref() - c.as_ref() * c.dot(a.as_ref());
        let perp = radial
            .try_normalize(1e-12)
            .unwrap_or_else(|| any_perpendicular(&c).into_inner());
        Dir3::new_normalize(c.as_ref() * target.cos() + perp * target.sin())
    }
}

/// Tool-axis control of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisParams {
    /// Raw axis mode.
    pub mode: AxisMode,
    /// Optional cone clamp.
    pub safety: Option<SafetyCone>,
    /// Largest allowed change between consecutive axes in degrees.
    pub max_angle_change: f64,
    /// Passes of the smoothing filter.
    pub smoothing_iterations: usize,
}

impl Default for AxisParams {
    fn default() -> Self {
        Self {
            mode: AxisMode::Fixed {
                direction: Vec3::z(),
            },
            safety: None,
            max_angle_change: 5.0,
            smoothing_iterations: 3,
        }
    }
}

impl AxisParams {
    /// Fixed-axis parameters.
    pub fn fixed(direction: Vec3) -> Self {
        Self {
            mode: AxisMode::Fixed { direction },
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.max_angle_change > 0.0 && self.max_angle_change <= 180.0) {
            return Err(invalid("axis.max_angle_change", "must be in (0, 180]"));
        }
        let zero = |v: &Vec3| v.norm() < 1e-12;
        match &self.mode {
            AxisMode::Fixed { direction } if zero(direction) => {
                return Err(invalid("axis.direction", "must be non-zero"))
            }
            AxisMode::RotateAbout { direction, .. } if zero(direction) => {
                return Err(invalid("axis.direction", "must be non-zero"))
            }
            _ => {}
        }
        if let Some(cone) = &self.safety {
            if zero(&cone.axis) || cone.min_angle < 0.0 || cone.min_angle > cone.max_angle {
                return Err(CamError::InvalidRange {
                    name: "axis.safety",
                    start: cone.min_angle,
                    end: cone.max_angle,
                });
            }
        }
        Ok(())
    }
}

/// Resolved axes, one list per row, one axis per point.
pub type RowAxes = Vec<Vec<Dir3>>;

fn feed_direction(points: &[PathPoint], i: usize) -> Vec3 {
    let n = points.len();
    let d = if n < 2 {
        Vec3::zeros()
    } else if i + 1 < n {
        points[i + 1].position - points[i].position
    } else {
        points[i].position - points[i - 1].position
    };
    d.try_normalize(1e-12).unwrap_or_else(Vec3::zeros)
}

/// Lean `base` by `drag` toward the feed and by `tilt` about it.
fn lean(base: &Dir3, feed: &Vec3, drag: f64, tilt: f64) -> Dir3 {
    let f = feed - base.as_ref() * base.dot(feed);
    let Some(f) = f.try_normalize(1e-12) else {
        return *base;
    };
    let side = Dir3::new_normalize(base.cross(&f));
    let leaned = rotate_vec(base.as_ref(), &side, drag.to_radians());
    Dir3::new_normalize(rotate_vec(&leaned, &Dir3::new_normalize(f), tilt.to_radians()))
}

fn raw_axis(mode: &AxisMode, point: &PathPoint, feed: &Vec3) -> Dir3 {
    match mode {
        AxisMode::Fixed { direction } => Dir3::new_normalize(*direction),
        AxisMode::RotateAbout {
            origin,
            direction,
            drag,
            tilt,
        } => {
            let d = direction.normalize();
            let r = point.position - origin;
            let radial = r - d * d.dot(&r);
            let base = radial
                .try_normalize(1e-12)
                .map(Dir3::new_unchecked)
                .unwrap_or_else(|| any_perpendicular(&Dir3::new_normalize(d)));
            lean(&base, feed, *drag, *tilt)
        }
        AxisMode::DragTilt { drag, tilt } => {
            let base = point
                .normal
                .try_normalize(1e-12)
                .map(Dir3::new_unchecked)
                .unwrap_or_else(Vec3::z_axis);
            lean(&base, feed, *drag, *tilt)
        }
    }
}

/// One pass of the `(1, 2, 1)` filter; endpoints stay fixed.
fn smooth_once(axes: &[Dir3]) -> Vec<Dir3> {
    let n = axes.len();
    if n < 3 {
        return axes.to_vec();
    }
    let mut out = Vec::with_capacity(n);
    out.push(axes[0]);
    for i in 1..n - 1 {
        let v = axes[i - 1].as_ref() + axes[i].as_ref() * 2.0 + axes[i + 1].as_ref();
        out.push(v.try_normalize(1e-12).map(Dir3::new_unchecked).unwrap_or(axes[i]));
    }
    out.push(axes[n - 1]);
    out
}

/// Smooth a sequence of axes `iterations` times.
pub fn smooth_axes(axes: &[Dir3], iterations: usize) -> Vec<Dir3> {
    (0..iterations).fold(axes.to_vec(), |acc, _| smooth_once(&acc))
}

/// Resolve the tool axis at every cutting point of `pass`.
///
/// # Errors
///
/// [`CamError::AxisDiscontinuity`] when consecutive axes still differ by
/// more than `max_angle_change` after smoothing and clamping.
pub fn resolve_axis(pass: &Pass, params: &AxisParams) -> Result<RowAxes> {
    let limit = params.max_angle_change.to_radians();
    let clamp = |a: Dir3| match &params.safety {
        Some(cone) => cone.clamp(&a),
        None => a,
    };
    pass.rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let raw: Vec<Dir3> = row
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| clamp(raw_axis(&params.mode, p, &feed_direction(&row.points, i))))
                .collect();
            let axes: Vec<Dir3> = smooth_axes(&raw, params.smoothing_iterations)
                .into_iter()
                .map(clamp)
                .collect();
            if let Some((i, angle)) = axes
                .windows(2)
                .map(|w| angle_between(w[0].as_ref(), w[1].as_ref()))
                .enumerate()
                .find(|(_, a)| *a > limit + 1e-12)
            {
                return Err(CamError::AxisDiscontinuity {
                    pass: pass.index,
                    row: row_idx,
                    point: i + 1,
                    angle_deg: angle.to_degrees(),
                    limit_deg: params.max_angle_change,
                });
            }
            Ok(axes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{Row, Stage};
    use proptest::prelude::*;

    fn pass(points: Vec<PathPoint>) -> Pass {
        Pass {
            index: 4,
            stage: Stage::Finish,
            depth: 1.0,
            rows: vec![Row::new(points)],
        }
    }

    fn line(n: usize, normal: impl Fn(usize) -> Vec3) -> Vec<PathPoint> {
        (0..n)
            .map(|i| PathPoint::new(Point3::new(i as f64, 0.0, 0.0), normal(i)))
            .collect()
    }

    #[test]
    fn test_fixed_axis() {
        let axes = resolve_axis(&pass(line(4, |_| Vec3::y())), &AxisParams::default()).unwrap();
        assert!(axes[0].iter().all(|a| (a.as_ref() - Vec3::z()).norm() < 1e-12));
    }

    #[test]
    fn test_drag_leans_into_feed() {
        let params = AxisParams {
            mode: AxisMode::DragTilt {
                drag: 10.0,
                tilt: 0.0,
            },
            ..Default::default()
        };
        let axes = resolve_axis(&pass(line(3, |_| Vec3::z())), &params).unwrap();
        let a = axes[0][1];
        assert!((angle_between(a.as_ref(), &Vec3::z()).to_degrees() - 10.0).abs() < 1e-9);
        assert!(a.x > 0.0 && a.y.abs() < 1e-12);
    }

    #[test]
    fn test_tilt_leans_sideways() {
        let params = AxisParams {
            mode: AxisMode::DragTilt {
                drag: 0.0,
                tilt: 15.0,
            },
            ..Default::default()
        };
        let axes = resolve_axis(&pass(line(3, |_| Vec3::z())), &params).unwrap();
        let a = axes[0][0];
        assert!(a.x.abs() < 1e-12);
        assert!((a.y.abs().asin().to_degrees() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_about_is_radial() {
        let params = AxisParams {
            mode: AxisMode::RotateAbout {
                origin: Point3::new(0.0, -10.0, 0.0),
                direction: Vec3::x(),
                drag: 0.0,
                tilt: 0.0,
            },
            ..Default::default()
        };
        let axes = resolve_axis(&pass(line(3, |_| Vec3::z())), &params).unwrap();
        assert!(axes[0].iter().all(|a| (a.as_ref() - Vec3::y()).norm() < 1e-12));
    }

    #[test]
    fn test_safety_cone_clamps() {
        let cone = SafetyCone {
            axis: Vec3::z(),
            min_angle: 0.0,
            max_angle: 30.0,
        };
        let a = cone.clamp(&Dir3::new_normalize(Vec3::x()));
        assert!((angle_between(a.as_ref(), &Vec3::z()).to_degrees() - 30.0).abs() < 1e-9);
        assert!(a.y.abs() < 1e-12 && a.x > 0.0);
        let b = SafetyCone {
            min_angle: 10.0,
            ..cone
        }
        .clamp(&Vec3::z_axis());
        assert!((angle_between(b.as_ref(), &Vec3::z()).to_degrees() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_discontinuity_reported() {
        let params = AxisParams {
            mode: AxisMode::DragTilt {
                drag: 0.0,
                tilt: 0.0,
            },
            max_angle_change: 5.0,
            smoothing_iterations: 0,
            safety: None,
        };
        let points = line(4, |i| if i < 2 { Vec3::z() } else { Vec3::x() });
        match resolve_axis(&pass(points), &params) {
            Err(CamError::AxisDiscontinuity {
                pass, row, point, angle_deg, ..
            }) => {
                assert_eq!((pass, row, point), (4, 0, 2));
                assert!((angle_deg - 90.0).abs() < 1e-9);
            }
            other => panic!("expected discontinuity, got {other:?}"),
        }
    }

    #[test]
    fn test_smoothing_reduces_step() {
        let raw: Vec<Dir3> = (0..21)
            .map(|i| {
                let a: f64 = if i < 10 { 0.0 } else { 8f64.to_radians() };
                Dir3::new_normalize(Vec3::new(a.sin(), 0.0, a.cos()))
            })
            .collect();
        let smoothed = smooth_axes(&raw, 4);
        let max_step = smoothed
            .windows(2)
            .map(|w| angle_between(w[0].as_ref(), w[1].as_ref()))
            .fold(0.0, f64::max);
        assert!(max_step.to_degrees() < 5.0);
    }

    proptest! {
        #[test]
        fn prop_smoothing_keeps_endpoints(
            angles in proptest::collection::vec(-1.5f64..1.5, 2..30),
            iterations in 0usize..6,
        ) {
            let axes: Vec<Dir3> = angles
                .iter()
                .map(|a| Dir3::new_normalize(Vec3::new(a.sin(), 0.0, a.cos())))
                .collect();
            let smoothed = smooth_axes(&axes, iterations);
            prop_assert_eq!(smoothed.len(), axes.len());
            prop_assert!((smoothed[0].as_ref() - axes[0].as_ref()).norm() < 1e-12);
            let last = axes.len() - 1;
            prop_assert!((smoothed[last].as_ref() - axes[last].as_ref()).norm() < 1e-12);
            for a in &smoothed {
                prop_assert!((a.norm() - 1.0).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_axis_steps_stay_within_limit_or_are_reported(
            normals in proptest::collection::vec(
                proptest::collection::vec((0.0f64..1.4, 0.0f64..std::f64::consts::TAU), 2..20),
                1..4,
            ),
            max_angle in 0.5f64..45.0,
            iterations in 0usize..4,
        ) {
            let params = AxisParams {
                mode: AxisMode::DragTilt { drag: 0.0, tilt: 0.0 },
                safety: None,
                max_angle_change: max_angle,
                smoothing_iterations: iterations,
            };
            let to_normal = |&(theta, phi): &(f64, f64)| {
                Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
            };
            let rows: Vec<Row> = normals
                .iter()
                .enumerate()
                .map(|(r, row)| {
                    Row::new(
                        row.iter()
                            .enumerate()
                            .map(|(i, n)| PathPoint::new(Point3::new(i as f64, r as f64, 0.0), to_normal(n)))
                            .collect(),
                    )
                })
                .collect();
            // Without lean or clamp the resolved axes are the smoothed normals.
            let expected: Vec<Vec<Dir3>> = normals
                .iter()
                .map(|row| {
                    let raw: Vec<Dir3> = row.iter().map(|n| Dir3::new_normalize(to_normal(n))).collect();
                    smooth_axes(&raw, iterations)
                })
                .collect();
            let steps = |axes: &[Dir3]| -> Vec<f64> {
                axes.windows(2)
                    .map(|w| angle_between(w[0].as_ref(), w[1].as_ref()).to_degrees())
                    .collect()
            };
            let pass = Pass { index: 4, stage: Stage::Finish, depth: 1.0, rows };

            match resolve_axis(&pass, &params) {
                Ok(axes) => {
                    prop_assert_eq!(axes.len(), normals.len());
                    for (row, n) in axes.iter().zip(&normals) {
                        prop_assert_eq!(row.len(), n.len());
                        for step in steps(row) {
                            prop_assert!(step <= max_angle + 1e-9);
                        }
                    }
                }
                Err(CamError::AxisDiscontinuity { pass: p, row, point, angle_deg, limit_deg }) => {
                    prop_assert_eq!(p, 4);
                    prop_assert_eq!(limit_deg, max_angle);
                    prop_assert!(row < expected.len());
                    for earlier in &expected[..row] {
                        for step in steps(earlier) {
                            prop_assert!(step <= max_angle + 1e-6);
                        }
                    }
                    let row_steps = steps(&expected[row]);
                    prop_assert!(point >= 1 && point < expected[row].len());
                    prop_assert!(angle_deg > max_angle);
                    prop_assert!((row_steps[point - 1] - angle_deg).abs() < 1e-6);
                    for step in &row_steps[..point - 1] {
                        prop_assert!(*step <= max_angle + 1e-6);
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }
    }
}
