//! Parametric sampler: reference geometry to ordered cross-sections.
//!
//! Every sampler is a pure function of the picked reference. Failures are
//! reported as [`GeomError::TopologyExtraction`] and never touch existing
//! definitions.

use bladecam_kernel_math::{Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::model::PartAxis;
use crate::reference::{GridSurface, Polyline, ReferenceGeometry};

/// Which kind of reference drives sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PickMode {
    /// A surface grid; sections are iso-curves or intersections.
    #[default]
    Surface,
    /// Guide curves; sections are interpolated between them.
    Curves,
}

/// How points are spaced along a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpacingMode {
    /// Equal arc length between consecutive points.
    #[default]
    EvenlySpaced,
    /// Equal steps in the surface (or curve) parameter.
    SurfaceParameter,
}

/// How a surface definition produces new sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Iso-curves of the picked source geometry.
    #[default]
    IsoSource,
    /// Iso-curves of the last rebuilt surface.
    IsoRebuilt,
    /// Intersection with a surface of revolution about the part axis.
    RotatingIntersection,
}

/// Point count and spacing shared by every section of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Points per section.
    pub points_per_section: usize,
    /// Spacing policy.
    pub spacing: SpacingMode,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            points_per_section: 32,
            spacing: SpacingMode::EvenlySpaced,
        }
    }
}

impl SamplingParams {
    /// Create sampling parameters.
    pub fn new(points_per_section: usize, spacing: SpacingMode) -> Self {
        Self {
            points_per_section,
            spacing,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.points_per_section < 2 {
            return Err(GeomError::InvalidParameter(format!(
                "points per section must be at least 2, got {}",
                self.points_per_section
            )));
        }
        Ok(())
    }
}

/// One cross-section at a parametric station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Station in `[0, 1]` (hub to shroud).
    pub station: f64,
    /// Ordered points.
    pub points: Vec<Point3>,
    /// Unit tangents per point, if known.
    pub tangents: Option<Vec<Vec3>>,
    /// Unit surface normals per point, if known.
    pub normals: Option<Vec<Vec3>>,
}

impl Section {
    /// Section with points only.
    pub fn new(station: f64, points: Vec<Point3>) -> Self {
        Self {
            station,
            points,
            tangents: None,
            normals: None,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the section has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The same section traversed in the opposite direction.
    ///
    /// Tangents flip sign; normals keep their direction.
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self {
            station: self.station,
            points,
            tangents: self
                .tangents
                .as_ref()
                .map(|t| t.iter().rev().map(|v| -v).collect()),
            normals: self
                .normals
                .as_ref()
                .map(|n| n.iter().rev().copied().collect()),
        }
    }

    /// As a polyline.
    pub fn polyline(&self) -> Polyline {
        Polyline::new(self.points.clone())
    }
}

/// Sample one section from picked reference geometry.
///
/// Surface references yield the iso-`v` curve at `station`; curve
/// references interpolate between the two guide curves bracketing it.
pub fn sample(
    reference: &ReferenceGeometry,
    pick: PickMode,
    station: f64,
    params: &SamplingParams,
) -> Result<Section> {
    params.validate()?;
    check_station(station)?;
    let section = match (reference, pick) {
        (ReferenceGeometry::Surface { grid }, PickMode::Surface) => sample_iso(grid, station, params)?,
        (ReferenceGeometry::Curves { curves }, PickMode::Curves) => {
            sample_curves(curves, station, params)?
        }
        (ReferenceGeometry::Curves { .. }, PickMode::Surface) => {
            return Err(extraction(station, "surface pick mode on a curve reference"));
        }
        (ReferenceGeometry::Surface { .. }, PickMode::Curves) => {
            return Err(extraction(station, "curve pick mode on a surface reference"));
        }
    };
    check_section(section)
}

/// Iso-`v` section of a surface grid.
pub fn sample_iso(grid: &GridSurface, station: f64, params: &SamplingParams) -> Result<Section> {
    params.validate()?;
    check_station(station)?;
    let traced = trace(grid.column_count(), params, |u| Ok((station, grid.eval(u, station))))?;
    check_section(with_surface_frames(grid, station, traced))
}

/// Intersection of a surface grid with a surface of revolution about `axis`.
///
/// The revolution radius runs linearly from the mean hub radius
/// (`station = 0`) to the mean shroud radius (`station = 1`).
pub fn sample_revolution(
    grid: &GridSurface,
    axis: &PartAxis,
    station: f64,
    params: &SamplingParams,
) -> Result<Section> {
    params.validate()?;
    check_station(station)?;
    let rows = grid.rows();
    let mean_radius = |row: &[Point3]| -> f64 {
        row.iter().map(|p| axis.radial_distance(p)).sum::<f64>() / row.len() as f64
    };
    let hub_r = mean_radius(&rows[0]);
    let shroud_r = mean_radius(&rows[rows.len() - 1]);
    let target = hub_r + (shroud_r - hub_r) * station;

    let traced = trace(grid.column_count(), params, |u| {
        let f = |v: f64| axis.radial_distance(&grid.eval(u, v)) - target;
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        let (f_lo, f_hi) = (f(lo), f(hi));
        if f_lo.abs() < 1e-12 {
            return Ok((lo, grid.eval(u, lo)));
        }
        if f_lo * f_hi > 0.0 {
            return Err(extraction(
                station,
                format!("surface of revolution r={target:.4} misses chord position u={u:.4}"),
            ));
        }
        let rising = f_hi > f_lo;
        for _ in 0..60 {
            let mid = 0.5 * (lo + hi);
            if (f(mid) < 0.0) == rising {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let v = 0.5 * (lo + hi);
        Ok((v, grid.eval(u, v)))
    })?;
    check_section(with_surface_frames(grid, station, traced))
}

struct Traced {
    u: Vec<f64>,
    v: Vec<f64>,
    points: Vec<Point3>,
}

/// Trace a chord-wise curve `u -> (v, point)` and space its samples.
fn trace<F>(columns: usize, params: &SamplingParams, f: F) -> Result<Traced>
where
    F: Fn(f64) -> Result<(f64, Point3)>,
{
    let n = params.points_per_section;
    let us: Vec<f64> = match params.spacing {
        SpacingMode::SurfaceParameter => (0..n).map(|j| j as f64 / (n - 1) as f64).collect(),
        SpacingMode::EvenlySpaced => {
            let dense = columns.max(n) * 8;
            let mut cum = Vec::with_capacity(dense + 1);
            let mut prev = f(0.0)?.1;
            cum.push(0.0);
            for k in 1..=dense {
                let p = f(k as f64 / dense as f64)?.1;
                let last = *cum.last().unwrap_or(&0.0);
                cum.push(last + (p - prev).norm());
                prev = p;
            }
            let total = cum[dense];
            (0..n)
                .map(|j| {
                    let target = total * j as f64 / (n - 1) as f64;
                    let k = cum.partition_point(|c| *c < target).clamp(1, dense);
                    let seg = cum[k] - cum[k - 1];
                    let frac = if seg > 0.0 { (target - cum[k - 1]) / seg } else { 0.0 };
                    ((k - 1) as f64 + frac) / dense as f64
                })
                .collect()
        }
    };
    let mut out = Traced {
        u: Vec::with_capacity(n),
        v: Vec::with_capacity(n),
        points: Vec::with_capacity(n),
    };
    for u in us {
        let (v, p) = f(u)?;
        out.u.push(u);
        out.v.push(v);
        out.points.push(p);
    }
    Ok(out)
}

fn with_surface_frames(grid: &GridSurface, station: f64, traced: Traced) -> Section {
    let normals = traced
        .u
        .iter()
        .zip(&traced.v)
        .map(|(&u, &v)| grid.normal(u, v).unwrap_or_else(Vec3::zeros))
        .collect();
    let tangents = polyline_tangents(&traced.points);
    Section {
        station,
        points: traced.points,
        tangents: Some(tangents),
        normals: Some(normals),
    }
}

fn sample_curves(curves: &[Polyline], station: f64, params: &SamplingParams) -> Result<Section> {
    if curves.is_empty() {
        return Err(extraction(station, "no guide curves picked"));
    }
    if let Some(i) = curves.iter().position(|c| c.points.len() < 2) {
        return Err(extraction(station, format!("guide curve {i} has fewer than 2 points")));
    }
    let n = params.points_per_section;
    let resample = |c: &Polyline| -> Vec<Point3> {
        (0..n)
            .map(|j| {
                let t = j as f64 / (n - 1) as f64;
                match params.spacing {
                    SpacingMode::EvenlySpaced => c.at_length_fraction(t),
                    SpacingMode::SurfaceParameter => c.at_parameter(t),
                }
            })
            .collect()
    };
    let points = if curves.len() == 1 {
        resample(&curves[0])
    } else {
        let x = station * (curves.len() - 1) as f64;
        let k = (x.floor() as usize).min(curves.len() - 2);
        let f = x - k as f64;
        let lower = resample(&curves[k]);
        let upper = resample(&curves[k + 1]);
        lower
            .iter()
            .zip(&upper)
            .map(|(a, b)| a + (b - a) * f)
            .collect()
    };
    let tangents = polyline_tangents(&points);
    Ok(Section {
        station,
        points,
        tangents: Some(tangents),
        normals: None,
    })
}

/// Unit tangents by central differences.
fn polyline_tangents(points: &[Point3]) -> Vec<Vec3> {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i.saturating_sub(1)];
            let b = points[(i + 1).min(n - 1)];
            let d = b - a;
            let len = d.norm();
            if len > 1e-12 {
                d / len
            } else {
                Vec3::zeros()
            }
        })
        .collect()
}

fn check_station(station: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&station) {
        return Err(GeomError::InvalidParameter(format!(
            "station must lie in [0, 1], got {station}"
        )));
    }
    Ok(())
}

fn check_section(section: Section) -> Result<Section> {
    if section
        .points
        .iter()
        .any(|p| !p.coords.iter().all(|c| c.is_finite()))
    {
        return Err(extraction(section.station, "non-finite sample point"));
    }
    if section.polyline().length() < 1e-9 {
        return Err(extraction(section.station, "section collapses to a point"));
    }
    Ok(section)
}

fn extraction(station: f64, reason: impl Into<String>) -> GeomError {
    GeomError::TopologyExtraction {
        station,
        reason: reason.into(),
    }
}
