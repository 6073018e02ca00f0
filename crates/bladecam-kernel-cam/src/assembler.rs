//! Toolpath assembly: turns planned passes and resolved axes into an
//! ordered list of motion segments.
//!
//! Each pass runs through the same state machine:
//!
//! ```text
//! Start → Approach → Engage → FirstCut → [StepOver → Cut]* → Retract
//!       → Departure → Traversal → (next pass | End)
//! ```
//!
//! When the next pass starts within the avoidance distance of the retract
//! point, the departure to clearance is skipped and the traversal goes
//! straight to the next engage point.

use bladecam_kernel_math::{angle_between, lerp_point, slerp_dir, Dir3, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::axis::RowAxes;
use crate::error::{invalid, CamError, Result};
use crate::feeds::{FeedTable, Kinematics, MotionKind};
use crate::planner::Pass;
use crate::tool::{Cutter, Tool};

/// Assembler state that emitted a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathState {
    /// Move to the home position.
    Start,
    /// Down from clearance to just above the first cut.
    Approach,
    /// Into the material.
    Engage,
    /// The first row of a pass.
    FirstCut,
    /// Between rows.
    StepOver,
    /// Rows after the first.
    Cut,
    /// Out of the material.
    Retract,
    /// Up to clearance.
    Departure,
    /// Along clearance to the next pass.
    Traversal,
    /// Back home.
    End,
}

/// Clearance geometry for linking between passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Clearance {
    /// Approach and depart along the tool axis to a plane.
    Plane {
        /// A point on the plane.
        point: Point3,
        /// Plane normal, pointing away from the part.
        normal: Vec3,
    },
    /// Approach from and depart to a single point.
    Point {
        /// Clearance point.
        point: Point3,
    },
}

/// Rotary travel of a two-rotary-axis machine, in degrees.
///
/// `A` is the tilt of the tool axis from machine Z, `C` its rotation
/// about Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineLimits {
    /// Minimum tilt.
    pub a_min: f64,
    /// Maximum tilt.
    pub a_max: f64,
    /// Minimum rotation.
    pub c_min: f64,
    /// Maximum rotation.
    pub c_max: f64,
}

impl MachineLimits {
    /// Tilt and rotation of `axis` in degrees.
    pub fn decompose(axis: &Dir3) -> (f64, f64) {
        let a = angle_between(axis.as_ref(), &Vec3::z());
        let c = if a.sin().abs() < 1e-9 {
            0.0
        } else {
            axis.y.atan2(axis.x)
        };
        (a.to_degrees(), c.to_degrees())
    }
}

/// Linking settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkingParams {
    /// Clearance geometry.
    pub clearance: Clearance,
    /// Height above the first cut where the engage feed starts.
    pub approach_distance: f64,
    /// Withdrawal along the axis after the last cut and for lifted rows.
    pub retract_distance: f64,
    /// Passes starting closer than this to the retract point are joined directly.
    pub avoidance_distance: f64,
    /// Largest axis change per link segment in degrees.
    pub max_angle_change: f64,
    /// Rotary limits to check.
    pub limits: Option<MachineLimits>,
    /// Start and end position; defaults to the first clearance point.
    pub home: Option<Point3>,
}

impl Default for LinkingParams {
    fn default() -> Self {
        Self {
            clearance: Clearance::Plane {
                point: Point3::new(0.0, 0.0, 50.0),
                normal: Vec3::z(),
            },
            approach_distance: 2.0,
            retract_distance: 2.0,
            avoidance_distance: 0.0,
            max_angle_change: 5.0,
            limits: None,
            home: None,
        }
    }
}

impl LinkingParams {
    pub(crate) fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("linking.approach_distance", self.approach_distance),
            ("linking.retract_distance", self.retract_distance),
            ("linking.avoidance_distance", self.avoidance_distance),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(name, format!("must be non-negative, got {v}")));
            }
        }
        if !(self.max_angle_change > 0.0) {
            return Err(invalid("linking.max_angle_change", "must be positive"));
        }
        if let Clearance::Plane { normal, .. } = &self.clearance {
            if normal.norm() < 1e-12 {
                return Err(invalid("linking.clearance", "plane normal must be non-zero"));
            }
        }
        if let Some(l) = &self.limits {
            if l.a_min > l.a_max || l.c_min > l.c_max {
                return Err(invalid("linking.limits", "minimum exceeds maximum"));
            }
        }
        Ok(())
    }

    /// Point on the clearance reached from `from` along `axis`, at least
    /// `min_distance` away.
    fn to_clearance(
        &self,
        pass: usize,
        move_kind: &'static str,
        from: &Point3,
        axis: &Dir3,
        min_distance: f64,
    ) -> Result<Point3> {
        match &self.clearance {
            Clearance::Plane { point, normal } => {
                let n = normal.normalize();
                let denom = axis.dot(&n);
                if denom.abs() < 1e-9 {
                    return Err(CamError::UnreachableApproach {
                        pass,
                        move_kind,
                        reason: "tool axis is parallel to the clearance plane".into(),
                    });
                }
                let t = (point - from).dot(&n) / denom;
                if t < min_distance - 1e-9 {
                    return Err(CamError::UnreachableApproach {
                        pass,
                        move_kind,
                        reason: format!(
                            "clearance plane is {t:.3} mm along the axis, needs at least {min_distance:.3} mm"
                        ),
                    });
                }
                Ok(from + axis.as_ref() * t)
            }
            Clearance::Point { point } => {
                let t = (point - from).dot(axis.as_ref());
                if t < min_distance - 1e-9 {
                    return Err(CamError::UnreachableApproach {
                        pass,
                        move_kind,
                        reason: format!(
                            "clearance point is {t:.3} mm along the axis, needs at least {min_distance:.3} mm"
                        ),
                    });
                }
                Ok(*point)
            }
        }
    }
}

/// One motion of the toolpath, ending at `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSegment {
    /// Motion kind.
    pub kind: MotionKind,
    /// Emitting state.
    pub state: PathState,
    /// Pass index, `None` for start and end.
    pub pass: Option<usize>,
    /// Row index for cutting and step-over moves.
    pub row: Option<usize>,
    /// Tool-tip position at the end of the move.
    pub position: Point3,
    /// Tool axis at the end of the move.
    pub axis: Dir3,
    /// Programmed feed (mm/min).
    pub feed: f64,
    /// Derived kinematics.
    pub kinematics: Kinematics,
}

/// An assembled toolpath.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Toolpath {
    /// Segments in machining order.
    pub segments: Vec<MotionSegment>,
}

impl Toolpath {
    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the toolpath has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Length of segment `i`, measured from the previous segment's end.
    pub fn segment_length(&self, i: usize) -> f64 {
        if i == 0 || i >= self.segments.len() {
            return 0.0;
        }
        (self.segments[i].position - self.segments[i - 1].position).norm()
    }

    /// States visited, with consecutive repeats collapsed.
    pub fn state_trace(&self) -> Vec<PathState> {
        let mut trace: Vec<PathState> = self.segments.iter().map(|s| s.state).collect();
        trace.dedup();
        trace
    }

    /// Total length of cutting moves.
    pub fn cutting_length(&self) -> f64 {
        (0..self.segments.len())
            .filter(|&i| self.segments[i].kind == MotionKind::Cut)
            .map(|i| self.segment_length(i))
            .sum()
    }

    /// Machining time in minutes at the programmed feeds.
    pub fn machining_time(&self) -> f64 {
        (0..self.segments.len())
            .map(|i| {
                let feed = self.segments[i].feed;
                if feed > 0.0 {
                    self.segment_length(i) / feed
                } else {
                    0.0
                }
            })
            .sum()
    }
}

struct Builder<'a> {
    segments: Vec<MotionSegment>,
    feeds: &'a FeedTable,
    tool: &'a Tool,
    max_change: f64,
    position: Point3,
    axis: Dir3,
}

impl Builder<'_> {
    fn push(
        &mut self,
        kind: MotionKind,
        state: PathState,
        at: (Option<usize>, Option<usize>),
        position: Point3,
        axis: Dir3,
    ) {
        let feed = self.feeds.feed_for(kind);
        self.segments.push(MotionSegment {
            kind,
            state,
            pass: at.0,
            row: at.1,
            position,
            axis,
            feed,
            kinematics: self.feeds.kinematics(kind, self.tool),
        });
        self.position = position;
        self.axis = axis;
    }

    /// Straight move to `target`, split so no piece turns the axis by
    /// more than the maximum angle change.
    fn link(
        &mut self,
        kind: MotionKind,
        state: PathState,
        at: (Option<usize>, Option<usize>),
        target: Point3,
        target_axis: Dir3,
    ) {
        let angle = angle_between(self.axis.as_ref(), target_axis.as_ref());
        let steps = ((angle / self.max_change).ceil() as usize).max(1);
        let (from, from_axis) = (self.position, self.axis);
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let axis = if i == steps {
                target_axis
            } else {
                slerp_dir(&from_axis, &target_axis, t)
            };
            self.push(kind, state, at, lerp_point(&from, &target, t), axis);
        }
    }
}

struct Entry {
    clearance: Point3,
    engage_from: Point3,
    first: Point3,
    axis: Dir3,
}

/// Assemble a toolpath from planned passes and their resolved axes.
///
/// # Errors
///
/// * [`CamError::UnreachableApproach`] when a pass cannot be reached from
///   or left to the clearance geometry
/// * [`CamError::AxisLimitExceeded`] when a segment leaves the machine's
///   rotary range
pub fn assemble(
    passes: &[Pass],
    axes: &[RowAxes],
    linking: &LinkingParams,
    cutter: &Cutter,
    feeds: &FeedTable,
) -> Result<Toolpath> {
    linking.validate()?;
    if passes.is_empty() {
        return Err(invalid("passes", "nothing to assemble"));
    }
    if axes.len() != passes.len()
        || passes.iter().zip(axes).any(|(p, a)| {
            p.rows.len() != a.len()
                || p.rows.iter().zip(a).any(|(r, ra)| r.points.len() != ra.len())
        })
    {
        return Err(invalid("axes", "must match the passes point for point"));
    }

    let mut entries = Vec::with_capacity(passes.len());
    for (pass, pass_axes) in passes.iter().zip(axes) {
        let (first, axis) = pass
            .rows
            .first()
            .and_then(|r| r.points.first())
            .zip(pass_axes.first().and_then(|a| a.first()))
            .map(|(p, a)| (p.position, *a))
            .ok_or_else(|| invalid("passes", format!("pass {} has no points", pass.index)))?;
        entries.push(Entry {
            clearance: linking.to_clearance(pass.index, "approach", &first, &axis, linking.approach_distance)?,
            engage_from: first + axis.as_ref() * linking.approach_distance,
            first,
            axis,
        });
    }

    let home = linking.home.unwrap_or(entries[0].clearance);
    let mut b = Builder {
        segments: Vec::new(),
        feeds,
        tool: &cutter.tool,
        max_change: linking.max_angle_change.to_radians(),
        position: home,
        axis: entries[0].axis,
    };
    b.push(MotionKind::Rapid, PathState::Start, (None, None), home, entries[0].axis);

    let mut at_engage = false;
    for (pi, (pass, pass_axes)) in passes.iter().zip(axes).enumerate() {
        let entry = &entries[pi];
        let p = Some(pi);
        if !at_engage {
            if (b.position - entry.clearance).norm() > 1e-9 {
                b.link(MotionKind::Approach, PathState::Approach, (p, None), entry.clearance, entry.axis);
            }
            b.link(MotionKind::Approach, PathState::Approach, (p, None), entry.engage_from, entry.axis);
        }
        b.push(MotionKind::Engage, PathState::Engage, (p, Some(0)), entry.first, entry.axis);

        for (ri, (row, row_axes)) in pass.rows.iter().zip(pass_axes).enumerate() {
            let at = (p, Some(ri));
            let state = if ri == 0 {
                PathState::FirstCut
            } else {
                let (start, start_axis) = (row.points[0].position, row_axes[0]);
                if row.lift {
                    let up = b.position + b.axis.as_ref() * linking.retract_distance;
                    let over = start + start_axis.as_ref() * linking.retract_distance;
                    b.link(MotionKind::StepOver, PathState::StepOver, at, up, b.axis);
                    b.link(MotionKind::StepOver, PathState::StepOver, at, over, start_axis);
                }
                b.link(MotionKind::StepOver, PathState::StepOver, at, start, start_axis);
                PathState::Cut
            };
            for (point, axis) in row.points.iter().zip(row_axes).skip(1) {
                b.push(MotionKind::Cut, state, at, point.position, *axis);
            }
        }

        let last = b.position;
        let last_axis = b.axis;
        let retract = last + last_axis.as_ref() * linking.retract_distance;
        b.push(MotionKind::Retract, PathState::Retract, (p, None), retract, last_axis);

        let next = entries.get(pi + 1);
        at_engage = match next {
            Some(n) => {
                linking.avoidance_distance > 0.0
                    && (n.engage_from - retract).norm() <= linking.avoidance_distance
            }
            None => false,
        };
        if let (true, Some(n)) = (at_engage, next) {
            b.link(MotionKind::Traversal, PathState::Traversal, (p, None), n.engage_from, n.axis);
            continue;
        }
        let departure =
            linking.to_clearance(pass.index, "departure", &last, &last_axis, linking.retract_distance)?;
        b.link(MotionKind::Departure, PathState::Departure, (p, None), departure, last_axis);
        let (target, target_axis) = match next {
            Some(n) => (n.clearance, n.axis),
            None => (home, last_axis),
        };
        b.link(MotionKind::Traversal, PathState::Traversal, (p, None), target, target_axis);
    }
    let axis = b.axis;
    b.push(MotionKind::Rapid, PathState::End, (None, None), home, axis);

    let toolpath = Toolpath {
        segments: b.segments,
    };
    if let Some(limits) = &linking.limits {
        check_limits(&toolpath, limits)?;
    }
    tracing::debug!(
        passes = passes.len(),
        segments = toolpath.len(),
        "toolpath assembled"
    );
    Ok(toolpath)
}

fn check_limits(toolpath: &Toolpath, limits: &MachineLimits) -> Result<()> {
    for (i, seg) in toolpath.segments.iter().enumerate() {
        let (a, c) = MachineLimits::decompose(&seg.axis);
        if a < limits.a_min - 1e-9 || a > limits.a_max + 1e-9 {
            return Err(CamError::AxisLimitExceeded {
                segment: i,
                axis: "A",
                value: a,
                min: limits.a_min,
                max: limits.a_max,
            });
        }
        if c < limits.c_min - 1e-9 || c > limits.c_max + 1e-9 {
            return Err(CamError::AxisLimitExceeded {
                segment: i,
                axis: "C",
                value: c,
                min: limits.c_min,
                max: limits.c_max,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::tests::flat_cutter;
    use crate::planner::{PathPoint, Row, Stage};

    fn row(y: f64, z: f64, forward: bool) -> Row {
        let mut points: Vec<PathPoint> = (0..5)
            .map(|i| PathPoint::new(Point3::new(i as f64 * 4.0, y, z), Vec3::z()))
            .collect();
        if !forward {
            points.reverse();
        }
        Row::new(points)
    }

    fn two_passes() -> Vec<Pass> {
        (0..2)
            .map(|i| {
                let z = 7.0 - i as f64;
                Pass {
                    index: i,
                    stage: Stage::Rough,
                    depth: 1.0 + i as f64,
                    rows: vec![row(2.0, z, true), row(3.0, z, false)],
                }
            })
            .collect()
    }

    fn fixed_axes(passes: &[Pass], axis: Dir3) -> Vec<RowAxes> {
        passes
            .iter()
            .map(|p| p.rows.iter().map(|r| vec![axis; r.points.len()]).collect())
            .collect()
    }

    fn plane(z: f64) -> LinkingParams {
        LinkingParams {
            clearance: Clearance::Plane {
                point: Point3::new(0.0, 0.0, z),
                normal: Vec3::z(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_state_sequence() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let tp = assemble(&passes, &axes, &plane(20.0), &flat_cutter(), &FeedTable::default()).unwrap();
        use PathState::*;
        let per_pass = [
            Approach, Engage, FirstCut, StepOver, Cut, Retract, Departure, Traversal,
        ];
        let mut expected = vec![Start];
        expected.extend(per_pass);
        expected.extend(per_pass);
        expected.push(End);
        assert_eq!(tp.state_trace(), expected);
        assert_eq!(tp.segments[0].position, Point3::new(0.0, 2.0, 20.0));
        assert_eq!(tp.segments[tp.len() - 1].position, Point3::new(0.0, 2.0, 20.0));
    }

    #[test]
    fn test_link_geometry_and_feeds() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let feeds = FeedTable::default();
        let tp = assemble(&passes, &axes, &plane(20.0), &flat_cutter(), &feeds).unwrap();
        let approach = &tp.segments[1];
        assert_eq!(approach.state, PathState::Approach);
        assert!((approach.position - Point3::new(0.0, 2.0, 9.0)).norm() < 1e-12);
        let engage = &tp.segments[2];
        assert_eq!(engage.feed, feeds.plunge);
        let retract = tp.segments.iter().find(|s| s.state == PathState::Retract).unwrap();
        assert!((retract.position - Point3::new(0.0, 3.0, 9.0)).norm() < 1e-12);
        let departure = tp.segments.iter().find(|s| s.state == PathState::Departure).unwrap();
        assert!((departure.position.z - 20.0).abs() < 1e-12);
        assert!((tp.cutting_length() - 2.0 * (16.0 + 16.0)).abs() < 1e-9);
        assert!(tp.machining_time() > 0.0);
    }

    #[test]
    fn test_axis_parallel_to_plane_is_unreachable() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::x_axis());
        let err = assemble(&passes, &axes, &plane(20.0), &flat_cutter(), &FeedTable::default());
        assert!(matches!(
            err,
            Err(CamError::UnreachableApproach { move_kind: "approach", .. })
        ));
    }

    #[test]
    fn test_plane_too_close_is_unreachable() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let err = assemble(&passes, &axes, &plane(8.0), &flat_cutter(), &FeedTable::default());
        assert!(matches!(err, Err(CamError::UnreachableApproach { pass: 0, .. })));
    }

    #[test]
    fn test_point_clearance_keeps_the_standoff() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let at = |z: f64| LinkingParams {
            clearance: Clearance::Point {
                point: Point3::new(8.0, 2.5, z),
            },
            ..Default::default()
        };
        // First cut point sits at z 7 and the approach needs 2 mm.
        let err = assemble(&passes, &axes, &at(8.0), &flat_cutter(), &FeedTable::default());
        assert!(matches!(
            err,
            Err(CamError::UnreachableApproach { pass: 0, move_kind: "approach", .. })
        ));

        let tp = assemble(&passes, &axes, &at(20.0), &flat_cutter(), &FeedTable::default()).unwrap();
        assert_eq!(tp.segments[0].position, Point3::new(8.0, 2.5, 20.0));
        let departure = tp.segments.iter().find(|s| s.state == PathState::Departure).unwrap();
        assert_eq!(departure.position, Point3::new(8.0, 2.5, 20.0));
    }

    #[test]
    fn test_avoidance_shortcut() {
        let passes = two_passes();
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let linking = LinkingParams {
            avoidance_distance: 30.0,
            ..plane(20.0)
        };
        let tp = assemble(&passes, &axes, &linking, &flat_cutter(), &FeedTable::default()).unwrap();
        let trace = tp.state_trace();
        use PathState::*;
        assert_eq!(
            &trace[..10],
            &[Start, Approach, Engage, FirstCut, StepOver, Cut, Retract, Traversal, Engage, FirstCut]
        );
    }

    #[test]
    fn test_axis_change_is_subdivided() {
        let passes = vec![Pass {
            index: 0,
            stage: Stage::Finish,
            depth: 1.0,
            rows: vec![row(2.0, 7.0, true), row(3.0, 7.0, false)],
        }];
        let tilted = Dir3::new_normalize(Vec3::new(18f64.to_radians().sin(), 0.0, 18f64.to_radians().cos()));
        let axes = vec![vec![vec![Vec3::z_axis(); 5], vec![tilted; 5]]];
        let tp = assemble(&passes, &axes, &plane(20.0), &flat_cutter(), &FeedTable::default()).unwrap();
        let steps: Vec<&MotionSegment> = tp
            .segments
            .iter()
            .filter(|s| s.state == PathState::StepOver)
            .collect();
        assert_eq!(steps.len(), 4);
        let mut prev = Vec3::z_axis();
        for s in steps {
            assert!(angle_between(prev.as_ref(), s.axis.as_ref()).to_degrees() <= 5.0 + 1e-9);
            prev = s.axis;
        }
    }

    #[test]
    fn test_lifted_row() {
        let mut passes = two_passes();
        passes[0].rows[1] = row(3.0, 7.0, true);
        passes[0].rows[1].lift = true;
        let axes = fixed_axes(&passes, Vec3::z_axis());
        let tp = assemble(&passes, &axes, &plane(20.0), &flat_cutter(), &FeedTable::default()).unwrap();
        let steps: Vec<Point3> = tp
            .segments
            .iter()
            .filter(|s| s.state == PathState::StepOver && s.pass == Some(0))
            .map(|s| s.position)
            .collect();
        assert_eq!(
            steps,
            vec![
                Point3::new(16.0, 2.0, 9.0),
                Point3::new(0.0, 3.0, 9.0),
                Point3::new(0.0, 3.0, 7.0)
            ]
        );
    }

    #[test]
    fn test_machine_limits() {
        let passes = two_passes();
        let tilted = Dir3::new_normalize(Vec3::new(30f64.to_radians().sin(), 0.0, 30f64.to_radians().cos()));
        let axes = fixed_axes(&passes, tilted);
        let linking = LinkingParams {
            limits: Some(MachineLimits {
                a_min: 0.0,
                a_max: 20.0,
                c_min: -180.0,
                c_max: 180.0,
            }),
            ..plane(40.0)
        };
        match assemble(&passes, &axes, &linking, &flat_cutter(), &FeedTable::default()) {
            Err(CamError::AxisLimitExceeded { segment, axis, value, .. }) => {
                assert_eq!(segment, 0);
                assert_eq!(axis, "A");
                assert!((value - 30.0).abs() < 1e-6);
            }
            other => panic!("expected axis limit error, got {other:?}"),
        }
    }

    #[test]
    fn test_decompose() {
        let (a, c) = MachineLimits::decompose(&Dir3::new_normalize(Vec3::new(0.0, 1.0, 1.0)));
        assert!((a - 45.0).abs() < 1e-9);
        assert!((c - 90.0).abs() < 1e-9);
        let (a, c) = MachineLimits::decompose(&Vec3::z_axis());
        assert!(a.abs() < 1e-12 && c == 0.0);
    }
}
