//! Blade-to-hub and blade-to-shroud fillets.
//!
//! A fillet is a quarter-circle blend swept along the boundary row of a
//! blade side. Its radius is constant or interpolated from a per-side
//! table of `(parameter, radius)` rows, the parameter normalized to
//! `[0, 1]` along the boundary from leading to trailing edge.

use bladecam_kernel_math::{Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::reference::GridSurface;

/// Boundary the fillet runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilletBoundary {
    /// Blade root.
    #[default]
    Hub,
    /// Blade tip (closed impellers).
    Shroud,
}

/// Blade side a fillet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BladeSide {
    /// Pressure side.
    A,
    /// Suction side.
    B,
}

/// One row of a variable-radius table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusRow {
    /// Normalized position along the boundary.
    pub parameter: f64,
    /// Fillet radius in mm.
    pub radius: f64,
}

impl RadiusRow {
    /// Create a row.
    pub fn new(parameter: f64, radius: f64) -> Self {
        Self { parameter, radius }
    }
}

/// Fillet definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilletSpec {
    /// Same radius everywhere.
    Constant {
        /// Radius in mm.
        radius: f64,
        /// Boundary.
        boundary: FilletBoundary,
    },
    /// Radius interpolated along the boundary, per side.
    Variable {
        /// Boundary.
        boundary: FilletBoundary,
        /// A-side table.
        a_side: Vec<RadiusRow>,
        /// B-side table.
        b_side: Vec<RadiusRow>,
    },
}

impl FilletSpec {
    /// Boundary this fillet follows.
    pub fn boundary(&self) -> FilletBoundary {
        match self {
            FilletSpec::Constant { boundary, .. } | FilletSpec::Variable { boundary, .. } => *boundary,
        }
    }

    /// Check the definition before any geometry is built.
    pub fn validate(&self) -> Result<()> {
        match self {
            FilletSpec::Constant { radius, .. } => {
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(GeomError::InvalidParameter(format!(
                        "fillet radius must be positive, got {radius}"
                    )));
                }
            }
            FilletSpec::Variable { a_side, b_side, .. } => {
                for (name, rows) in [("A-side", a_side), ("B-side", b_side)] {
                    if rows.len() < 2 {
                        return Err(GeomError::InsufficientDefinition(format!(
                            "{name} fillet table needs at least 2 rows, got {}",
                            rows.len()
                        )));
                    }
                    for row in rows {
                        if !(0.0..=1.0).contains(&row.parameter) {
                            tracing::debug!(side = name, parameter = row.parameter, "fillet row off the span");
                            return Err(GeomError::InvalidRange {
                                start: row.parameter * 100.0,
                                end: 100.0,
                            });
                        }
                        if !(row.radius.is_finite() && row.radius >= 0.0) {
                            return Err(GeomError::InvalidParameter(format!(
                                "{name} fillet radius {} must be non-negative",
                                row.radius
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Radius on `side` at normalized boundary parameter `t`.
    pub fn radius_at(&self, side: BladeSide, t: f64) -> f64 {
        match self {
            FilletSpec::Constant { radius, .. } => *radius,
            FilletSpec::Variable { a_side, b_side, .. } => {
                let rows = match side {
                    BladeSide::A => a_side,
                    BladeSide::B => b_side,
                };
                interpolate(rows, t)
            }
        }
    }
}

fn interpolate(rows: &[RadiusRow], t: f64) -> f64 {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| a.parameter.total_cmp(&b.parameter));
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return 0.0,
    };
    if t <= first.parameter {
        return first.radius;
    }
    if t >= last.parameter {
        return last.radius;
    }
    sorted
        .windows(2)
        .find(|w| t >= w[0].parameter && t <= w[1].parameter)
        .map(|w| {
            let span = w[1].parameter - w[0].parameter;
            if span <= 0.0 {
                w[1].radius
            } else {
                w[0].radius + (w[1].radius - w[0].radius) * (t - w[0].parameter) / span
            }
        })
        .unwrap_or(last.radius)
}

/// A rebuilt fillet patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilletPatch {
    /// Blade side.
    pub side: BladeSide,
    /// Whether it belongs to the splitter.
    pub splitter: bool,
    /// Boundary.
    pub boundary: FilletBoundary,
    /// Patch grid: rows sweep the arc from blade wall to floor, columns
    /// follow the blade side's chord.
    pub grid: GridSurface,
}

/// Build a fillet patch along the boundary of `wall`.
///
/// `opposite` is the other side of the same blade; it fixes which way the
/// wall normal points (away from the blade body).
pub fn build_patch(
    spec: &FilletSpec,
    side: BladeSide,
    wall: &GridSurface,
    opposite: Option<&GridSurface>,
    arc_samples: usize,
) -> Result<GridSurface> {
    let boundary = spec.boundary();
    let v_b = match boundary {
        FilletBoundary::Hub => 0.0,
        FilletBoundary::Shroud => 1.0,
    };
    let cols = wall.column_count();
    let m = arc_samples.max(2);
    let mut rows: Vec<Vec<Point3>> = vec![Vec::with_capacity(cols); m];

    for j in 0..cols {
        let u = j as f64 / (cols - 1) as f64;
        let p = wall.eval(u, v_b);
        let mut s = wall.dv(u, v_b);
        if boundary == FilletBoundary::Shroud {
            s = -s;
        }
        let s = s.try_normalize(1e-12).unwrap_or_else(Vec3::z);
        let mut n = wall.normal(u, v_b).unwrap_or_else(Vec3::x);
        if let Some(other) = opposite {
            if n.dot(&(p - other.eval(u, v_b))) < 0.0 {
                n = -n;
            }
        }
        let n = (n - s * s.dot(&n)).try_normalize(1e-12).unwrap_or(n);
        let r = spec.radius_at(side, u);
        let center = p + n * r + s * r;
        for (k, row) in rows.iter_mut().enumerate() {
            let theta = std::f64::consts::FRAC_PI_2 * k as f64 / (m - 1) as f64;
            row.push(center - n * (r * theta.cos()) - s * (r * theta.sin()));
        }
    }
    GridSurface::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wall in the XZ plane at y=0, chord along X, span along +Z.
    fn wall() -> GridSurface {
        GridSurface::new(vec![
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)],
            vec![Point3::new(0.0, 0.0, 5.0), Point3::new(10.0, 0.0, 5.0)],
        ])
        .unwrap()
    }

    /// Other side of the blade, behind the wall at y=-2.
    fn opposite() -> GridSurface {
        GridSurface::new(vec![
            vec![Point3::new(0.0, -2.0, 0.0), Point3::new(10.0, -2.0, 0.0)],
            vec![Point3::new(0.0, -2.0, 5.0), Point3::new(10.0, -2.0, 5.0)],
        ])
        .unwrap()
    }

    #[test]
    fn test_variable_needs_two_rows_per_side() {
        let spec = FilletSpec::Variable {
            boundary: FilletBoundary::Hub,
            a_side: vec![RadiusRow::new(0.0, 1.0), RadiusRow::new(1.0, 2.0)],
            b_side: vec![RadiusRow::new(0.5, 1.0)],
        };
        assert!(matches!(
            spec.validate(),
            Err(GeomError::InsufficientDefinition(_))
        ));
    }

    #[test]
    fn test_parameter_outside_unit_interval() {
        let spec = FilletSpec::Variable {
            boundary: FilletBoundary::Shroud,
            a_side: vec![RadiusRow::new(0.0, 1.0), RadiusRow::new(1.2, 2.0)],
            b_side: vec![RadiusRow::new(0.0, 1.0), RadiusRow::new(1.0, 2.0)],
        };
        assert!(matches!(
            spec.validate(),
            Err(GeomError::InvalidRange { start, .. }) if (start - 120.0).abs() < 1e-9
        ));

        let below = FilletSpec::Variable {
            boundary: FilletBoundary::Hub,
            a_side: vec![RadiusRow::new(-0.1, 1.0), RadiusRow::new(1.0, 2.0)],
            b_side: vec![RadiusRow::new(0.0, 1.0), RadiusRow::new(1.0, 2.0)],
        };
        assert!(matches!(below.validate(), Err(GeomError::InvalidRange { .. })));
    }

    #[test]
    fn test_radius_interpolation() {
        let spec = FilletSpec::Variable {
            boundary: FilletBoundary::Hub,
            a_side: vec![RadiusRow::new(1.0, 3.0), RadiusRow::new(0.0, 1.0)],
            b_side: vec![RadiusRow::new(0.0, 2.0), RadiusRow::new(1.0, 2.0)],
        };
        assert!((spec.radius_at(BladeSide::A, 0.5) - 2.0).abs() < 1e-12);
        assert!((spec.radius_at(BladeSide::A, -1.0) - 1.0).abs() < 1e-12);
        assert!((spec.radius_at(BladeSide::B, 0.3) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_patch_blends_wall_to_floor() {
        let spec = FilletSpec::Constant {
            radius: 1.0,
            boundary: FilletBoundary::Hub,
        };
        let patch = build_patch(&spec, BladeSide::B, &wall(), Some(&opposite()), 5).unwrap();
        let rows = patch.rows();
        // First arc row sits on the wall, one radius above the hub.
        assert!((rows[0][0] - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
        // Last arc row lies on the floor, one radius out into the passage.
        assert!((rows[4][1] - Point3::new(10.0, 1.0, 0.0)).norm() < 1e-9);
        // Every arc point is one radius from the centre line.
        let c = Point3::new(0.0, 1.0, 1.0);
        for row in rows {
            assert!(((row[0] - c).norm() - 1.0).abs() < 1e-9);
        }
    }
}
