//! Shank and holder collision detection.
//!
//! The non-cutting parts of the cutter are swept along each move and
//! checked against the remaining stock, grown by the critical gap.

use bladecam_kernel_cam::{Cutter, EnvelopeKind};
use bladecam_kernel_math::{Dir3, Point3};
use serde::{Deserialize, Serialize};

use crate::sweep::{envelope_profile, SweptVolume};
use crate::Stock;

/// Type of collision detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionType {
    /// The shank above the flutes touched stock.
    Shank,
    /// The holder touched stock.
    Holder,
    /// A rapid move removed material.
    RapidRemoval,
}

/// Result of a collision check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionResult {
    /// Whether a collision was detected.
    pub collides: bool,
    /// A stock point inside the offending envelope.
    pub point: Option<Point3>,
    /// Type of collision.
    pub collision_type: Option<CollisionType>,
}

impl CollisionResult {
    /// No collision detected.
    pub fn clear() -> Self {
        Self {
            collides: false,
            point: None,
            collision_type: None,
        }
    }

    /// Collision detected.
    pub fn collision(point: Point3, collision_type: CollisionType) -> Self {
        Self {
            collides: true,
            point: Some(point),
            collision_type: Some(collision_type),
        }
    }
}

impl Stock {
    /// Check the shank and holder against stock over a move.
    ///
    /// `gap` grows the envelope radially and at its top; the shank is
    /// checked before the holder.
    pub fn check_collision(
        &self,
        cutter: &Cutter,
        from: (&Point3, &Dir3),
        to: (&Point3, &Dir3),
        gap: f64,
        max_axis_step: f64,
    ) -> CollisionResult {
        let envelope = cutter.envelope();
        for (kind, collision_type) in [
            (EnvelopeKind::Shank, CollisionType::Shank),
            (EnvelopeKind::Holder, CollisionType::Holder),
        ] {
            let profile = envelope_profile(envelope.iter().filter(|p| p.kind == kind), gap);
            if profile.is_empty() {
                continue;
            }
            let sweep = SweptVolume::new(&profile, from, to, max_axis_step);
            if let Some(p) = self.find_material(&sweep) {
                return CollisionResult::collision(p, collision_type);
            }
        }
        CollisionResult::clear()
    }

    /// Whether the cutter standing at `position` would collide.
    pub fn would_collide(&self, cutter: &Cutter, position: &Point3, axis: &Dir3, gap: f64) -> bool {
        self.check_collision(cutter, (position, axis), (position, axis), gap, 0.0)
            .collides
    }
}
