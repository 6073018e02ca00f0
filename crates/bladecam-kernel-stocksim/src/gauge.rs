//! Finished-part gauges for overcut detection.

use bladecam_kernel_math::{Aabb, Dir3, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::sweep::ProfilePiece;

/// Signed distance to the finished part, negative inside it.
pub trait PartGauge: Send + Sync {
    /// Signed distance from `p` to the part surface.
    fn signed_distance(&self, p: &Point3) -> f64;
}

/// Part filling the half-space behind a plane, such as a hub floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfSpaceGauge {
    /// Point on the part surface.
    pub point: Point3,
    /// Outward surface normal.
    pub normal: Vec3,
}

impl PartGauge for HalfSpaceGauge {
    fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.point).dot(&self.normal.normalize())
    }
}

/// Part shaped as a box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxGauge {
    /// Part extent.
    pub bounds: Aabb,
}

impl PartGauge for BoxGauge {
    fn signed_distance(&self, p: &Point3) -> f64 {
        let c = self.bounds.center();
        let h = self.bounds.size() / 2.0;
        let d = Vec3::new((p.x - c.x).abs() - h.x, (p.y - c.y).abs() - h.y, (p.z - c.z).abs() - h.z);
        let outside = Vec3::new(d.x.max(0.0), d.y.max(0.0), d.z.max(0.0)).norm();
        let inside = d.x.max(d.y).max(d.z).min(0.0);
        outside + inside
    }
}

/// Union of several gauges.
#[derive(Default)]
pub struct UnionGauge {
    parts: Vec<Box<dyn PartGauge>>,
}

impl UnionGauge {
    /// Empty union.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a gauge.
    pub fn with(mut self, gauge: impl PartGauge + 'static) -> Self {
        self.parts.push(Box::new(gauge));
        self
    }
}

impl PartGauge for UnionGauge {
    fn signed_distance(&self, p: &Point3) -> f64 {
        self.parts
            .iter()
            .map(|g| g.signed_distance(p))
            .fold(f64::INFINITY, f64::min)
    }
}

const RING_SAMPLES: usize = 8;

/// Surface samples of a profile placed at `tip` with `axis`.
pub(crate) fn profile_samples(profile: &[ProfilePiece], tip: &Point3, axis: &Dir3) -> Vec<Point3> {
    let a = axis.as_ref();
    let u = bladecam_kernel_math::any_perpendicular(axis);
    let v = a.cross(u.as_ref());
    let ring = |height: f64, radius: f64, out: &mut Vec<Point3>| {
        let c = tip + a * height;
        out.push(c);
        for k in 0..RING_SAMPLES {
            let t = std::f64::consts::TAU * k as f64 / RING_SAMPLES as f64;
            out.push(c + (u.as_ref() * t.cos() + v * t.sin()) * radius);
        }
    };
    let mut out = Vec::new();
    for piece in profile {
        match *piece {
            ProfilePiece::Band { bottom, top, radius } => {
                ring(bottom, radius, &mut out);
                ring(top, radius, &mut out);
            }
            ProfilePiece::Ball { center, radius } => {
                out.push(tip + a * (center - radius));
                let s = std::f64::consts::FRAC_1_SQRT_2 * radius;
                ring(center - s, s, &mut out);
                ring(center, radius, &mut out);
            }
        }
    }
    out
}

/// Deepest penetration of the profile into the part over a move,
/// sampled at `samples + 1` placements. Zero when the tool stays clear.
pub(crate) fn penetration(
    gauge: &dyn PartGauge,
    profile: &[ProfilePiece],
    from: (&Point3, &Dir3),
    to: (&Point3, &Dir3),
    samples: usize,
) -> f64 {
    let n = samples.max(1);
    (0..=n)
        .flat_map(|k| {
            let t = k as f64 / n as f64;
            let tip = bladecam_kernel_math::lerp_point(from.0, to.0, t);
            let axis = bladecam_kernel_math::slerp_dir(from.1, to.1, t);
            profile_samples(profile, &tip, &axis)
        })
        .map(|p| -gauge.signed_distance(&p))
        .fold(0.0, f64::max)
}
