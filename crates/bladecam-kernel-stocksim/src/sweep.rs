//! Swept cutter volumes.
//!
//! A cutter profile is split into coaxial pieces, bands of constant radius
//! and balls, so each piece swept along a straight move with a fixed axis
//! stays convex. Moves that turn the axis are split into sub-moves that
//! each use their mid axis.

use bladecam_kernel_cam::{EnvelopePart, Tool};
use bladecam_kernel_math::{angle_between, lerp_point, slerp_dir, Aabb, Dir3, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::octree::Region;

/// Bands used for a bull-nose corner.
const CORNER_BANDS: usize = 4;
/// Bands used for a tapered flank.
const TAPER_BANDS: usize = 8;

/// Piece of a cutter profile, heights measured from the tip along the axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProfilePiece {
    /// Cylinder between two heights.
    Band {
        /// Lower height.
        bottom: f64,
        /// Upper height.
        top: f64,
        /// Radius.
        radius: f64,
    },
    /// Sphere centred on the axis.
    Ball {
        /// Height of the centre.
        center: f64,
        /// Radius.
        radius: f64,
    },
}

/// Cutting profile of `tool` over its flute length.
pub fn tool_profile(tool: &Tool) -> Vec<ProfilePiece> {
    let r = tool.radius();
    let rc = tool.corner_radius().min(r);
    let length = tool.flute_length();
    let mut pieces = Vec::new();
    let straight_from = match tool {
        Tool::FlatEndMill { .. } => 0.0,
        Tool::BallEndMill { .. } | Tool::TaperedBallEndMill { .. } => {
            pieces.push(ProfilePiece::Ball {
                center: rc,
                radius: rc,
            });
            rc
        }
        Tool::BullEndMill { .. } if rc <= 0.0 => 0.0,
        Tool::BullEndMill { .. } => {
            let step = rc / CORNER_BANDS as f64;
            for k in 0..CORNER_BANDS {
                let (bottom, top) = (k as f64 * step, (k + 1) as f64 * step);
                pieces.push(ProfilePiece::Band {
                    bottom,
                    top,
                    radius: tool.radius_at_height(0.5 * (bottom + top)),
                });
            }
            rc
        }
    };
    if length <= straight_from {
        return pieces;
    }
    if let Tool::TaperedBallEndMill { .. } = tool {
        let step = (length - straight_from) / TAPER_BANDS as f64;
        for k in 0..TAPER_BANDS {
            let bottom = straight_from + k as f64 * step;
            let top = bottom + step;
            pieces.push(ProfilePiece::Band {
                bottom,
                top,
                radius: tool.radius_at_height(0.5 * (bottom + top)),
            });
        }
    } else {
        pieces.push(ProfilePiece::Band {
            bottom: straight_from,
            top: length,
            radius: r,
        });
    }
    pieces
}

/// Envelope parts as profile bands grown radially and upward by `gap`.
pub fn envelope_profile<'a>(parts: impl IntoIterator<Item = &'a EnvelopePart>, gap: f64) -> Vec<ProfilePiece> {
    parts
        .into_iter()
        .map(|p| ProfilePiece::Band {
            bottom: p.bottom,
            top: p.top + gap,
            radius: p.radius + gap,
        })
        .collect()
}

/// A band of fixed axis swept along a straight move.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BandSweep {
    from: Point3,
    delta: Vec3,
    axis: Dir3,
    bottom: f64,
    top: f64,
    radius: f64,
}

impl BandSweep {
    /// Parameter interval `[t0, t1] ∩ [0, 1]` where `p` is inside.
    fn interval(&self, p: &Point3) -> Option<(f64, f64)> {
        let a = self.axis.as_ref();
        let q = p - self.from;
        let h0 = q.dot(a);
        let d_par = self.delta.dot(a);
        let r0 = q - a * h0;
        let d_perp = self.delta - a * d_par;

        // Height h0 - t·d_par within [bottom, top].
        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        if d_par.abs() < 1e-12 {
            if h0 < self.bottom || h0 > self.top {
                return None;
            }
        } else {
            let ta = (h0 - self.top) / d_par;
            let tb = (h0 - self.bottom) / d_par;
            lo = lo.max(ta.min(tb));
            hi = hi.min(ta.max(tb));
        }

        // |r0 - t·d_perp|² ≤ radius².
        let qa = d_perp.norm_squared();
        let qb = -2.0 * r0.dot(&d_perp);
        let qc = r0.norm_squared() - self.radius * self.radius;
        if qa < 1e-18 {
            if qc > 0.0 {
                return None;
            }
        } else {
            let disc = qb * qb - 4.0 * qa * qc;
            if disc < 0.0 {
                return None;
            }
            let s = disc.sqrt();
            lo = lo.max((-qb - s) / (2.0 * qa));
            hi = hi.min((-qb + s) / (2.0 * qa));
        }
        (lo <= hi).then_some((lo, hi))
    }

    fn bounds(&self) -> Aabb {
        let a = self.axis.as_ref();
        let to = self.from + self.delta;
        let pts = [
            self.from + a * self.bottom,
            self.from + a * self.top,
            to + a * self.bottom,
            to + a * self.top,
        ];
        let b = Aabb::new(pts[0], pts[1]).including(&pts[2]).including(&pts[3]);
        b.expanded(self.radius)
    }
}

/// A sphere swept along a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Capsule {
    a: Point3,
    b: Point3,
    radius: f64,
}

impl Capsule {
    fn sdf(&self, p: &Point3) -> f64 {
        capsule_sdf(p, &self.a, &self.b, self.radius)
    }
}

/// Signed distance from `p` to a capsule (line segment with radius).
pub fn capsule_sdf(p: &Point3, a: &Point3, b: &Point3, r: f64) -> f64 {
    let pa = p - a;
    let ba = b - a;
    let len_sq = ba.norm_squared();
    let h = if len_sq < 1e-10 {
        0.0
    } else {
        (pa.dot(&ba) / len_sq).clamp(0.0, 1.0)
    };
    (pa - ba * h).norm() - r
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SweptPiece {
    Band(BandSweep),
    Capsule(Capsule),
}

impl SweptPiece {
    fn contains(&self, p: &Point3) -> bool {
        match self {
            SweptPiece::Band(b) => b.interval(p).is_some(),
            SweptPiece::Capsule(c) => c.sdf(p) <= 0.0,
        }
    }

    fn bounds(&self) -> Aabb {
        match self {
            SweptPiece::Band(b) => b.bounds(),
            SweptPiece::Capsule(c) => Aabb::new(c.a, c.b).expanded(c.radius),
        }
    }
}

/// Volume swept by a cutter profile moving between two placements.
#[derive(Debug, Clone, PartialEq)]
pub struct SweptVolume {
    pieces: Vec<SweptPiece>,
    bounds: Aabb,
}

impl SweptVolume {
    /// Sweep `profile` from placement `from` to `to`, each a tip position
    /// and tool axis. Axis changes are split into steps of at most
    /// `max_axis_step` radians.
    pub fn new(
        profile: &[ProfilePiece],
        from: (&Point3, &Dir3),
        to: (&Point3, &Dir3),
        max_axis_step: f64,
    ) -> Self {
        let angle = angle_between(from.1.as_ref(), to.1.as_ref());
        let steps = if max_axis_step > 0.0 {
            ((angle / max_axis_step).ceil() as usize).max(1)
        } else {
            1
        };
        let mut pieces = Vec::with_capacity(steps * profile.len());
        for k in 0..steps {
            let t0 = k as f64 / steps as f64;
            let t1 = (k + 1) as f64 / steps as f64;
            let p0 = lerp_point(from.0, to.0, t0);
            let p1 = lerp_point(from.0, to.0, t1);
            let axis = if steps == 1 {
                *from.1
            } else {
                slerp_dir(from.1, to.1, 0.5 * (t0 + t1))
            };
            for piece in profile {
                pieces.push(match *piece {
                    ProfilePiece::Band { bottom, top, radius } => SweptPiece::Band(BandSweep {
                        from: p0,
                        delta: p1 - p0,
                        axis,
                        bottom,
                        top,
                        radius,
                    }),
                    ProfilePiece::Ball { center, radius } => SweptPiece::Capsule(Capsule {
                        a: p0 + axis.as_ref() * center,
                        b: p1 + axis.as_ref() * center,
                        radius,
                    }),
                });
            }
        }
        let bounds = pieces
            .iter()
            .map(SweptPiece::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| Aabb::new(*from.0, *to.0));
        Self { pieces, bounds }
    }
}

impl Region for SweptVolume {
    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn contains(&self, p: &Point3) -> bool {
        self.bounds.contains(p) && self.pieces.iter().any(|s| s.contains(p))
    }

    fn contains_box(&self, cell: &Aabb) -> bool {
        let corners = cell.corners();
        self.pieces
            .iter()
            .any(|s| corners.iter().all(|c| s.contains(c)))
    }
}

/// Area of the disc of radius `radius` swept across the move `delta`,
/// projected onto the plane normal to `axis`.
pub fn footprint_area(delta: &Vec3, axis: &Dir3, radius: f64) -> f64 {
    let d_perp = delta - axis.as_ref() * delta.dot(axis.as_ref());
    2.0 * radius * d_perp.norm() + std::f64::consts::PI * radius * radius
}
