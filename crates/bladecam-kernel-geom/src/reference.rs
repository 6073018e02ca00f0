//! Already-picked reference geometry.
//!
//! Interactive picking is done by the caller; the kernel only sees the
//! result: either a sampled surface grid or a set of chord-wise guide
//! curves ordered from hub to shroud.

use bladecam_kernel_math::{Aabb, Point3, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};

/// A bilinearly interpolated surface over a rectangular point grid.
///
/// Rows run along the span (`v`, hub at 0, shroud at 1); columns run along
/// the chord (`u`, leading edge at 0, trailing edge at 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSurface {
    rows: Vec<Vec<Point3>>,
}

impl GridSurface {
    /// Build a grid from rows of equal length.
    ///
    /// Needs at least two rows and two columns of finite points.
    pub fn new(rows: Vec<Vec<Point3>>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(GeomError::InsufficientDefinition(format!(
                "surface grid needs at least 2 rows, got {}",
                rows.len()
            )));
        }
        let cols = rows[0].len();
        if cols < 2 {
            return Err(GeomError::InsufficientDefinition(format!(
                "surface grid needs at least 2 columns, got {cols}"
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(GeomError::InsufficientDefinition(format!(
                "surface grid row {i} has {} points, expected {cols}",
                row.len()
            )));
        }
        if rows.iter().flatten().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(GeomError::InvalidParameter(
                "surface grid contains non-finite points".into(),
            ));
        }
        Ok(Self { rows })
    }

    /// Rows of the grid, hub first.
    pub fn rows(&self) -> &[Vec<Point3>] {
        &self.rows
    }

    /// Number of rows (span direction).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (chord direction).
    pub fn column_count(&self) -> usize {
        self.rows[0].len()
    }

    fn cell(t: f64, n: usize) -> (usize, f64) {
        let x = t.clamp(0.0, 1.0) * (n - 1) as f64;
        let i = (x.floor() as usize).min(n - 2);
        (i, x - i as f64)
    }

    /// Evaluate the surface at `(u, v)`, both clamped to `[0, 1]`.
    pub fn eval(&self, u: f64, v: f64) -> Point3 {
        let (j, fu) = Self::cell(u, self.column_count());
        let (i, fv) = Self::cell(v, self.row_count());
        let p00 = self.rows[i][j].coords;
        let p01 = self.rows[i][j + 1].coords;
        let p10 = self.rows[i + 1][j].coords;
        let p11 = self.rows[i + 1][j + 1].coords;
        let lower = p00 * (1.0 - fu) + p01 * fu;
        let upper = p10 * (1.0 - fu) + p11 * fu;
        Point3::from(lower * (1.0 - fv) + upper * fv)
    }

    /// Partial derivative along the chord.
    pub fn du(&self, u: f64, v: f64) -> Vec3 {
        let n = self.column_count();
        let (j, _) = Self::cell(u, n);
        let h = 1.0 / (n - 1) as f64;
        let u0 = j as f64 * h;
        (self.eval(u0 + h, v) - self.eval(u0, v)) / h
    }

    /// Partial derivative along the span.
    pub fn dv(&self, u: f64, v: f64) -> Vec3 {
        let n = self.row_count();
        let (i, _) = Self::cell(v, n);
        let h = 1.0 / (n - 1) as f64;
        let v0 = i as f64 * h;
        (self.eval(u, v0 + h) - self.eval(u, v0)) / h
    }

    /// Unit normal `du × dv`, or `None` where the grid is degenerate.
    pub fn normal(&self, u: f64, v: f64) -> Option<Vec3> {
        let n = self.du(u, v).cross(&self.dv(u, v));
        let len = n.norm();
        (len > 1e-12).then(|| n / len)
    }

    /// The iso-`v` polyline through the grid columns.
    pub fn iso_v(&self, v: f64) -> Polyline {
        let n = self.column_count();
        Polyline::new(
            (0..n)
                .map(|j| self.eval(j as f64 / (n - 1) as f64, v))
                .collect(),
        )
    }

    /// Grid with every point transformed.
    pub fn transformed(&self, t: &Transform) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().map(|p| t.apply_point(p)).collect())
                .collect(),
        }
    }

    /// Bounding box of the grid points.
    pub fn bounds(&self) -> Aabb {
        let first = self.rows[0][0];
        self.rows
            .iter()
            .flatten()
            .fold(Aabb::new(first, first), |b, p| b.including(p))
    }
}

/// An open polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    /// Vertices in order.
    pub points: Vec<Point3>,
}

impl Polyline {
    /// Wrap a point list.
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// Total length.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Cumulative arc length at each vertex, starting at zero.
    pub fn cumulative_lengths(&self) -> Vec<f64> {
        let mut acc = 0.0;
        let mut out = Vec::with_capacity(self.points.len());
        out.push(0.0);
        for w in self.points.windows(2) {
            acc += (w[1] - w[0]).norm();
            out.push(acc);
        }
        out
    }

    /// Point at normalized vertex parameter `t ∈ [0, 1]`.
    pub fn at_parameter(&self, t: f64) -> Point3 {
        let n = self.points.len();
        if n == 1 {
            return self.points[0];
        }
        let x = t.clamp(0.0, 1.0) * (n - 1) as f64;
        let i = (x.floor() as usize).min(n - 2);
        let f = x - i as f64;
        self.points[i] + (self.points[i + 1] - self.points[i]) * f
    }

    /// Point at normalized arc length `t ∈ [0, 1]`.
    pub fn at_length_fraction(&self, t: f64) -> Point3 {
        let cum = self.cumulative_lengths();
        let total = *cum.last().unwrap_or(&0.0);
        if total <= 0.0 || self.points.len() == 1 {
            return self.points[0];
        }
        let target = t.clamp(0.0, 1.0) * total;
        let i = match cum.binary_search_by(|c| c.total_cmp(&target)) {
            Ok(i) => i.min(self.points.len() - 2),
            Err(i) => i.saturating_sub(1).min(self.points.len() - 2),
        };
        let seg = cum[i + 1] - cum[i];
        let f = if seg > 0.0 { (target - cum[i]) / seg } else { 0.0 };
        self.points[i] + (self.points[i + 1] - self.points[i]) * f
    }
}

/// Geometry the caller picked as the source of a surface definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReferenceGeometry {
    /// A sampled face of the imported model.
    Surface {
        /// The face as a grid.
        grid: GridSurface,
    },
    /// Chord-wise guide curves, hub first, evenly spread over the span.
    Curves {
        /// The curves.
        curves: Vec<Polyline>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_grid() -> GridSurface {
        GridSurface::new(vec![
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)],
            vec![Point3::new(0.0, 0.0, 5.0), Point3::new(10.0, 0.0, 5.0)],
        ])
        .unwrap()
    }

    #[test]
    fn test_grid_eval_corners_and_center() {
        let g = plane_grid();
        assert!((g.eval(0.0, 0.0) - Point3::origin()).norm() < 1e-12);
        assert!((g.eval(1.0, 1.0) - Point3::new(10.0, 0.0, 5.0)).norm() < 1e-12);
        assert!((g.eval(0.5, 0.5) - Point3::new(5.0, 0.0, 2.5)).norm() < 1e-12);
    }

    #[test]
    fn test_grid_normal() {
        let g = plane_grid();
        // du = +x, dv = +z, du × dv = -y
        let n = g.normal(0.3, 0.3).unwrap();
        assert!((n - Vec3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_grid_rejects_ragged_rows() {
        let err = GridSurface::new(vec![
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![Point3::origin()],
        ])
        .unwrap_err();
        assert!(matches!(err, GeomError::InsufficientDefinition(_)));
    }

    #[test]
    fn test_polyline_length_fraction() {
        let p = Polyline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 3.0, 0.0),
        ]);
        assert!((p.length() - 4.0).abs() < 1e-12);
        let mid = p.at_length_fraction(0.5);
        assert!((mid - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        // Vertex parameter: halfway is the middle vertex.
        let v = p.at_parameter(0.5);
        assert!((v - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }
}
