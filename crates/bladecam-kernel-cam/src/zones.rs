//! Buffer zones and interference checking of cutting points.
//!
//! A buffer zone is a set of obstacle samples (typically points on the
//! neighbouring blades or a fixture) the cutter envelope must stay
//! `clearance` away from. Excluded ranges are boxes where checking is
//! switched off: a tool tip inside one is exempt, and obstacle samples
//! inside one are ignored.

use std::collections::HashMap;

use bladecam_kernel_math::{Aabb, Dir3, Point3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::axis::RowAxes;
use crate::error::{CamError, Result};
use crate::planner::Pass;
use crate::tool::{Cutter, EnvelopeKind, EnvelopePart};

/// Role of a buffer zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    /// Next to the machined blade.
    LeftBuffer,
    /// Next to the adjacent blade.
    RightBuffer,
    /// Anywhere else in the work envelope.
    FreeRange,
}

/// Obstacle samples with a minimum distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferZone {
    /// Zone role.
    pub kind: ZoneKind,
    /// Obstacle samples.
    pub obstacles: Vec<Point3>,
    /// Minimum distance from the cutter envelope in mm.
    pub clearance: f64,
}

/// All zones of an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearanceZones {
    /// Buffer zones.
    pub zones: Vec<BufferZone>,
    /// Interference-checking-excluded ranges.
    pub excluded: Vec<Aabb>,
}

/// An obstacle sample closer to the cutter than its clearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneHit {
    /// Zone the sample came from.
    pub zone: ZoneKind,
    /// Envelope part that came too close.
    pub part: EnvelopeKind,
    /// Offending sample.
    pub obstacle: Point3,
    /// Distance from the envelope.
    pub distance: f64,
    /// Required clearance.
    pub clearance: f64,
}

/// Outcome of checking one cutter placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearanceResult {
    /// Every sample that is too close.
    pub hits: Vec<ZoneHit>,
}

impl ClearanceResult {
    /// No sample too close.
    pub fn is_clear(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A cutting point that violates a buffer zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointViolation {
    /// Pass index.
    pub pass: usize,
    /// Row index.
    pub row: usize,
    /// Point index.
    pub point: usize,
    /// Tool tip.
    pub position: Point3,
    /// Samples that were too close.
    pub hits: Vec<ZoneHit>,
}

#[derive(Debug, Clone, Copy)]
struct Obstacle {
    point: Point3,
    clearance: f64,
    zone: ZoneKind,
}

fn quantize_pt(p: &Point3) -> [i64; 3] {
    [
        (p.x * 1e9).round() as i64,
        (p.y * 1e9).round() as i64,
        (p.z * 1e9).round() as i64,
    ]
}

impl ClearanceZones {
    /// No zones.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer zone.
    pub fn with_zone(mut self, kind: ZoneKind, obstacles: Vec<Point3>, clearance: f64) -> Self {
        self.zones.push(BufferZone {
            kind,
            obstacles,
            clearance,
        });
        self
    }

    /// Add an excluded range.
    pub fn with_excluded(mut self, range: Aabb) -> Self {
        self.excluded.push(range);
        self
    }

    fn is_excluded(&self, p: &Point3) -> bool {
        self.excluded.iter().any(|b| b.contains(p))
    }

    /// Obstacles merged across zones, samples in excluded ranges dropped.
    ///
    /// Where zones overlap the smaller clearance wins: a sample lying
    /// within another zone's clearance of one of that zone's samples takes
    /// the smaller of the two clearances. Coincident samples collapse into
    /// one.
    fn merged(&self) -> Vec<Obstacle> {
        let mut by_key: HashMap<[i64; 3], Obstacle> = HashMap::new();
        let mut order = Vec::new();
        for zone in &self.zones {
            for p in &zone.obstacles {
                if self.is_excluded(p) {
                    continue;
                }
                let key = quantize_pt(p);
                let candidate = Obstacle {
                    point: *p,
                    clearance: zone.clearance,
                    zone: zone.kind,
                };
                match by_key.get_mut(&key) {
                    Some(existing) if existing.clearance > zone.clearance => *existing = candidate,
                    Some(_) => {}
                    None => {
                        by_key.insert(key, candidate);
                        order.push(key);
                    }
                }
            }
        }
        let obstacles: Vec<Obstacle> = order.iter().filter_map(|k| by_key.get(k).copied()).collect();
        tighten_overlaps(&obstacles)
    }

    fn check_merged(
        &self,
        obstacles: &[Obstacle],
        tip: &Point3,
        axis: &Dir3,
        envelope: &[EnvelopePart],
    ) -> ClearanceResult {
        if self.is_excluded(tip) {
            return ClearanceResult::default();
        }
        let mut hits = Vec::new();
        for o in obstacles {
            for part in envelope {
                let distance = cylinder_distance(tip, axis, part, &o.point);
                if distance < o.clearance {
                    hits.push(ZoneHit {
                        zone: o.zone,
                        part: part.kind,
                        obstacle: o.point,
                        distance,
                        clearance: o.clearance,
                    });
                }
            }
        }
        ClearanceResult { hits }
    }
}

/// Give each obstacle the smallest clearance of any obstacle whose buffer
/// covers it. Candidates are found by a sweep along x.
fn tighten_overlaps(obstacles: &[Obstacle]) -> Vec<Obstacle> {
    let reach = obstacles.iter().map(|o| o.clearance).fold(0.0, f64::max);
    let mut by_x: Vec<usize> = (0..obstacles.len()).collect();
    by_x.sort_by(|&a, &b| obstacles[a].point.x.total_cmp(&obstacles[b].point.x));

    let mut resolved = obstacles.to_vec();
    for (pos, &i) in by_x.iter().enumerate() {
        let o = &obstacles[i];
        let after = by_x[pos + 1..]
            .iter()
            .take_while(|&&j| obstacles[j].point.x - o.point.x <= reach);
        let before = by_x[..pos]
            .iter()
            .rev()
            .take_while(|&&j| o.point.x - obstacles[j].point.x <= reach);
        for &j in after.chain(before) {
            let q = &obstacles[j];
            if q.clearance < resolved[i].clearance && (q.point - o.point).norm() <= q.clearance {
                resolved[i].clearance = q.clearance;
            }
        }
    }
    resolved
}

/// Distance from `q` to a finite cylinder band of the envelope placed at
/// `tip` along `axis`; zero inside.
pub fn cylinder_distance(tip: &Point3, axis: &Dir3, part: &EnvelopePart, q: &Point3) -> f64 {
    let d = q - tip;
    let h = d.dot(axis.as_ref());
    let rho = (d - axis.as_ref() * h).norm();
    let dr = (rho - part.radius).max(0.0);
    let dh = if h < part.bottom {
        part.bottom - h
    } else if h > part.top {
        h - part.top
    } else {
        0.0
    };
    (dr * dr + dh * dh).sqrt()
}

/// Check one cutter placement against the zones.
pub fn check_clearance(
    point: &Point3,
    axis: &Dir3,
    cutter: &Cutter,
    zones: &ClearanceZones,
) -> ClearanceResult {
    zones.check_merged(&zones.merged(), point, axis, &cutter.envelope())
}

/// Check every cutting point of a pass, in parallel.
///
/// # Errors
///
/// [`CamError::Interference`] listing each violating point.
pub fn check_pass(pass: &Pass, axes: &RowAxes, cutter: &Cutter, zones: &ClearanceZones) -> Result<()> {
    if zones.zones.is_empty() {
        return Ok(());
    }
    let obstacles = zones.merged();
    let envelope = cutter.envelope();
    let placements: Vec<(usize, usize, Point3, Dir3)> = pass
        .rows
        .iter()
        .zip(axes)
        .enumerate()
        .flat_map(|(r, (row, row_axes))| {
            row.points
                .iter()
                .zip(row_axes)
                .enumerate()
                .map(move |(i, (p, a))| (r, i, p.position, *a))
        })
        .collect();
    let violations: Vec<PointViolation> = placements
        .par_iter()
        .filter_map(|(row, point, tip, axis)| {
            let result = zones.check_merged(&obstacles, tip, axis, &envelope);
            (!result.is_clear()).then(|| PointViolation {
                pass: pass.index,
                row: *row,
                point: *point,
                position: *tip,
                hits: result.hits,
            })
        })
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        tracing::warn!(pass = pass.index, count = violations.len(), "buffer zone violations");
        Err(CamError::Interference(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PathPoint, Row, Stage};
    use crate::tool::{Shank, Tool, ToolHolder};
    use bladecam_kernel_math::Vec3;

    fn cutter() -> Cutter {
        Cutter::new(
            Tool::FlatEndMill {
                diameter: 4.0,
                flute_length: 10.0,
                flutes: 2,
            },
            Shank::new(4.0, 10.0),
            ToolHolder::new(30.0, 40.0),
        )
    }

    #[test]
    fn test_cylinder_distance() {
        let part = EnvelopePart {
            kind: EnvelopeKind::Flute,
            bottom: 0.0,
            top: 10.0,
            radius: 2.0,
        };
        let tip = Point3::origin();
        let z = Vec3::z_axis();
        assert!((cylinder_distance(&tip, &z, &part, &Point3::new(5.0, 0.0, 5.0)) - 3.0).abs() < 1e-12);
        assert!(cylinder_distance(&tip, &z, &part, &Point3::new(1.0, 0.0, 5.0)).abs() < 1e-12);
        assert!((cylinder_distance(&tip, &z, &part, &Point3::new(0.0, 0.0, -2.0)) - 2.0).abs() < 1e-12);
        let corner = cylinder_distance(&tip, &z, &part, &Point3::new(5.0, 0.0, 14.0));
        assert!((corner - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_clearance_violation_and_clear() {
        let zones = ClearanceZones::new().with_zone(
            ZoneKind::RightBuffer,
            vec![Point3::new(3.0, 0.0, 5.0)],
            1.5,
        );
        let z = Vec3::z_axis();
        let hit = check_clearance(&Point3::origin(), &z, &cutter(), &zones);
        assert!(!hit.is_clear());
        assert_eq!(hit.hits[0].part, EnvelopeKind::Flute);
        let clear = check_clearance(&Point3::new(-1.0, 0.0, 0.0), &z, &cutter(), &zones);
        assert!(clear.is_clear());
    }

    #[test]
    fn test_smaller_clearance_wins() {
        let p = Point3::new(3.0, 0.0, 5.0);
        let zones = ClearanceZones::new()
            .with_zone(ZoneKind::LeftBuffer, vec![p], 2.0)
            .with_zone(ZoneKind::FreeRange, vec![p], 0.5);
        let merged = zones.merged();
        assert_eq!(merged.len(), 1);
        assert!((merged[0].clearance - 0.5).abs() < 1e-12);
        // 1 mm away: inside the 2 mm buffer, outside the 0.5 mm one.
        let r = check_clearance(&Point3::origin(), &Vec3::z_axis(), &cutter(), &zones);
        assert!(r.is_clear());
    }

    #[test]
    fn test_overlapping_zones_take_the_smaller_clearance() {
        let z = Vec3::z_axis();
        let zones = ClearanceZones::new()
            .with_zone(ZoneKind::LeftBuffer, vec![Point3::new(3.0, 0.0, 1.0)], 2.0)
            .with_zone(ZoneKind::RightBuffer, vec![Point3::new(3.0 + 1e-6, 0.0, 1.0)], 0.5);
        assert_eq!(zones.merged().len(), 2);
        assert!(zones.merged().iter().all(|o| (o.clearance - 0.5).abs() < 1e-12));
        // Both samples sit 1 mm from the flutes.
        assert!(check_clearance(&Point3::origin(), &z, &cutter(), &zones).is_clear());

        // Disjoint buffers keep their own clearance.
        let apart = ClearanceZones::new()
            .with_zone(ZoneKind::LeftBuffer, vec![Point3::new(3.0, 0.0, 1.0)], 2.0)
            .with_zone(ZoneKind::RightBuffer, vec![Point3::new(3.0, 5.0, 1.0)], 0.5);
        let r = check_clearance(&Point3::origin(), &z, &cutter(), &apart);
        assert_eq!(r.hits.len(), 1);
        assert_eq!(r.hits[0].zone, ZoneKind::LeftBuffer);
        assert!((r.hits[0].clearance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_excluded_ranges() {
        let obstacle = Point3::new(3.0, 0.0, 5.0);
        let zones = ClearanceZones::new().with_zone(ZoneKind::FreeRange, vec![obstacle], 2.0);
        let z = Vec3::z_axis();
        let ignored = zones
            .clone()
            .with_excluded(Aabb::new(Point3::new(2.0, -1.0, 4.0), Point3::new(4.0, 1.0, 6.0)));
        assert!(check_clearance(&Point3::origin(), &z, &cutter(), &ignored).is_clear());
        let exempt = zones.with_excluded(Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)));
        assert!(check_clearance(&Point3::origin(), &z, &cutter(), &exempt).is_clear());
        assert!(!check_clearance(&Point3::new(0.0, 0.0, 3.0), &z, &cutter(), &exempt).is_clear());
    }

    #[test]
    fn test_check_pass_reports_points() {
        let zones = ClearanceZones::new().with_zone(
            ZoneKind::LeftBuffer,
            vec![Point3::new(10.0, 1.0, 5.0)],
            0.5,
        );
        let points: Vec<PathPoint> = (0..11)
            .map(|i| PathPoint::new(Point3::new(i as f64 * 2.0, 0.0, 0.0), Vec3::z()))
            .collect();
        let pass = Pass {
            index: 2,
            stage: Stage::Rough,
            depth: 1.0,
            rows: vec![Row::new(points)],
        };
        let axes = vec![vec![Vec3::z_axis(); 11]];
        match check_pass(&pass, &axes, &cutter(), &zones) {
            Err(CamError::Interference(v)) => {
                // Tips at x = 8, 10, 12 bring the flutes within 0.5 mm of the sample.
                let idx: Vec<usize> = v.iter().map(|p| p.point).collect();
                assert_eq!(idx, vec![4, 5, 6]);
                assert!(v.iter().all(|p| p.pass == 2 && p.row == 0));
            }
            other => panic!("expected interference, got {other:?}"),
        }
    }
}
