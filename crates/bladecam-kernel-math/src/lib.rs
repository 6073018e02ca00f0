#![warn(missing_docs)]

//! Math types for the bladecam machining kernel.
//!
//! Thin wrappers around nalgebra providing the domain types shared by the
//! reconstruction, toolpath and simulation crates: points, vectors, unit
//! directions, rigid transforms, bounding boxes and tolerance constants.

use nalgebra::{Matrix4, Unit, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D parameter space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by a vector.
    pub fn translation(offset: &Vec3) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = offset.x;
        m[(1, 3)] = offset.y;
        m[(2, 3)] = offset.z;
        Self { matrix: m }
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        let mut m = Matrix4::identity();
        m[(0, 0)] = t * x * x + c;
        m[(0, 1)] = t * x * y - s * z;
        m[(0, 2)] = t * x * z + s * y;
        m[(1, 0)] = t * x * y + s * z;
        m[(1, 1)] = t * y * y + c;
        m[(1, 2)] = t * y * z - s * x;
        m[(2, 0)] = t * x * z - s * y;
        m[(2, 1)] = t * y * z + s * x;
        m[(2, 2)] = t * z * z + c;
        Self { matrix: m }
    }

    /// Rotation about the line through `origin` along `axis`.
    ///
    /// This is the pitch transform of a bladed rotor: one blade maps onto
    /// its neighbour by rotating about the part axis.
    pub fn rotation_about_line(origin: &Point3, axis: &Dir3, angle: f64) -> Self {
        let to_origin = Self::translation(&-origin.coords);
        let back = Self::translation(&origin.coords);
        back.then(&Self::rotation_about_axis(axis, angle))
            .then(&to_origin)
    }

    /// Compose: `self` then `other` (self * other).
    ///
    /// Applying the result to a point applies `other` first.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Default CAD tolerances (1e-6 mm linear, 1e-9 rad angular).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Check if two angles are effectively equal (in radians).
    pub fn angles_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.angular
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb {
    /// Box from two corners, in any order.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Tight box around a point set. `None` when the set is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self::new(first, first), |b, p| b.including(p)))
    }

    /// Grow the box to include `p`.
    pub fn including(&self, p: &Point3) -> Self {
        Self {
            min: Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Aabb) -> Self {
        self.including(&other.min).including(&other.max)
    }

    /// Box grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vec3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Whether `p` lies inside or on the boundary.
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Euclidean distance from `p` to the box (zero inside).
    pub fn distance_to(&self, p: &Point3) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Edge lengths.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Enclosed volume.
    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Centre point.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Whether the two boxes overlap, touching counts.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The eight corners, bit 0 selecting x, bit 1 y, bit 2 z.
    pub fn corners(&self) -> [Point3; 8] {
        std::array::from_fn(|i| {
            Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }
}

/// Unsigned angle between two vectors in radians.
///
/// Uses `atan2(|a×b|, a·b)`, which stays accurate near 0 and π.
pub fn angle_between(a: &Vec3, b: &Vec3) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Rotate `v` about `axis` by `angle` radians (Rodrigues).
pub fn rotate_vec(v: &Vec3, axis: &Dir3, angle: f64) -> Vec3 {
    let k = axis.as_ref();
    let (s, c) = angle.sin_cos();
    v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
}

/// Some unit vector perpendicular to `d`.
pub fn any_perpendicular(d: &Dir3) -> Dir3 {
    let v = d.as_ref();
    let helper = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    Dir3::new_normalize(v.cross(&helper))
}

/// Spherical interpolation between two unit directions.
///
/// Antiparallel inputs rotate about an arbitrary perpendicular.
pub fn slerp_dir(a: &Dir3, b: &Dir3, t: f64) -> Dir3 {
    let angle = angle_between(a.as_ref(), b.as_ref());
    if angle < 1e-12 {
        return *a;
    }
    let cross = a.as_ref().cross(b.as_ref());
    let axis = if cross.norm() < 1e-12 {
        any_perpendicular(a)
    } else {
        Dir3::new_normalize(cross)
    };
    Dir3::new_normalize(rotate_vec(a.as_ref(), &axis, angle * t))
}

/// Linear interpolation between two points.
pub fn lerp_point(a: &Point3, b: &Point3, t: f64) -> Point3 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3::new(1.0, 2.0, 3.0);
        let result = t.apply_point(&p);
        assert!((result - p).norm() < 1e-12);
    }

    #[test]
    fn test_translation() {
        let t = Transform::translation(&Vec3::new(10.0, 20.0, 30.0));
        let result = t.apply_point(&Point3::new(1.0, 2.0, 3.0));
        assert!((result.x - 11.0).abs() < 1e-12);
        assert!((result.y - 22.0).abs() < 1e-12);
        assert!((result.z - 33.0).abs() < 1e-12);
        // Vectors ignore translation.
        let v = t.apply_vec(&Vec3::x());
        assert!((v - Vec3::x()).norm() < 1e-12);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let rotate = Transform::rotation_about_axis(&Vec3::z_axis(), PI / 2.0);
        let shift = Transform::translation(&Vec3::new(1.0, 0.0, 0.0));
        // Shift (0,0,0) -> (1,0,0), then rotate -> (0,1,0).
        let composed = rotate.then(&shift);
        let result = composed.apply_point(&Point3::origin());
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse() {
        let t = Transform::rotation_about_line(
            &Point3::new(1.0, 2.0, 3.0),
            &Dir3::new_normalize(Vec3::new(0.0, 1.0, 1.0)),
            0.7,
        );
        let inv = t.inverse().unwrap();
        let p = Point3::new(5.0, 6.0, 7.0);
        let result = t.then(&inv).apply_point(&p);
        assert!((result - p).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_about_axis() {
        let t = Transform::rotation_about_axis(&Vec3::z_axis(), PI / 2.0);
        let result = t.apply_point(&Point3::new(1.0, 0.0, 0.0));
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
        assert!(result.z.abs() < 1e-12);

        // 180° about (1,1,0) swaps x and y.
        let axis2 = Dir3::new_normalize(Vec3::new(1.0, 1.0, 0.0));
        let r2 = Transform::rotation_about_axis(&axis2, PI).apply_point(&Point3::new(1.0, 0.0, 0.0));
        assert!(r2.x.abs() < 1e-12);
        assert!((r2.y - 1.0).abs() < 1e-12);
        assert!(r2.z.abs() < 1e-12);
    }

    #[test]
    fn test_rotation_about_line_keeps_pivot_fixed() {
        let pivot = Point3::new(10.0, 0.0, 0.0);
        let t = Transform::rotation_about_line(&pivot, &Vec3::z_axis(), PI / 2.0);
        assert!((t.apply_point(&pivot) - pivot).norm() < 1e-12);
        let moved = t.apply_point(&Point3::new(11.0, 0.0, 0.0));
        assert_relative_eq!(moved, Point3::new(10.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_tolerance_points_equal() {
        let tol = Tolerance::DEFAULT;
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(1.0 + 1e-7, 2.0, 3.0);
        assert!(tol.points_equal(&a, &b));
        let c = Point3::new(1.001, 2.0, 3.0);
        assert!(!tol.points_equal(&a, &c));
    }

    #[test]
    fn test_angle_between() {
        assert!((angle_between(&Vec3::x(), &Vec3::y()) - PI / 2.0).abs() < 1e-12);
        assert!((angle_between(&Vec3::x(), &-Vec3::x()) - PI).abs() < 1e-12);
        assert!(angle_between(&Vec3::z(), &(Vec3::z() * 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_slerp_dir_midpoint() {
        let a = Vec3::x_axis();
        let b = Vec3::y_axis();
        let mid = slerp_dir(&a, &b, 0.5);
        let h = 0.5_f64.sqrt();
        assert_relative_eq!(mid.into_inner(), Vec3::new(h, h, 0.0), epsilon = 1e-12);
        assert_relative_eq!(slerp_dir(&a, &b, 1.0).into_inner(), b.into_inner(), epsilon = 1e-12);
    }

    #[test]
    fn test_slerp_dir_antiparallel() {
        let a = Vec3::z_axis();
        let b = -Vec3::z_axis();
        let mid = slerp_dir(&a, &b, 0.5);
        assert!((angle_between(mid.as_ref(), a.as_ref()) - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_aabb_queries() {
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(0.0, 0.0, 0.0));
        assert!(b.contains(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!b.contains(&Point3::new(3.0, 1.0, 1.0)));
        assert!((b.distance_to(&Point3::new(3.0, 1.0, 1.0)) - 1.0).abs() < 1e-12);
        assert!((b.volume() - 8.0).abs() < 1e-12);
        let pts = [Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 5.0, 2.0)];
        let fitted = Aabb::from_points(pts.iter()).unwrap();
        assert_eq!(fitted.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(fitted.max, Point3::new(1.0, 5.0, 2.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
        let far = Aabb::new(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0));
        assert!(b.intersects(&far));
        assert!(!b.intersects(&far.expanded(-0.1).including(&Point3::new(3.0, 3.0, 3.0))));
        assert_eq!(b.corners()[0], b.min);
        assert_eq!(b.corners()[7], b.max);
        assert_eq!(b.corners()[2], Point3::new(0.0, 2.0, 0.0));
    }
}
