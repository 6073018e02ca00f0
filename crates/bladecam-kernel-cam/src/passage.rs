//! The machining passage between two neighbouring blades.
//!
//! The left wall is the B side of the machined blade, the right wall the
//! A side of the next blade (the machined blade's A side mapped through
//! one pitch step, or the splitter's A side when the model has one).
//! Positions are addressed by chord parameter `u` (leading edge 0,
//! trailing edge 1), span fraction `h` (hub 0, shroud 1) and lateral
//! fraction `w` (left wall 0, right wall 1). `u` and `h` extrapolate
//! linearly past the grids.

use bladecam_kernel_geom::{BladeGeometryModel, GridSurface, SurfaceKind, SurfaceRole};
use bladecam_kernel_math::{lerp_point, Point3, Vec3};

use crate::error::{CamError, Result};

/// Number of chord samples used for width and height estimates.
const CHORD_SAMPLES: usize = 17;

/// Which wall of the passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    /// Machined blade.
    Left,
    /// Adjacent blade.
    Right,
}

/// Passage geometry derived from a rebuilt model.
#[derive(Debug, Clone)]
pub struct Passage {
    left: GridSurface,
    right: GridSurface,
    own_a: GridSurface,
    blade_height: f64,
    shroud_allowance: f64,
}

fn eval_ext(grid: &GridSurface, u: f64, h: f64) -> Point3 {
    let uc = u.clamp(0.0, 1.0);
    let hc = h.clamp(0.0, 1.0);
    grid.eval(uc, hc) + grid.du(uc, hc) * (u - uc) + grid.dv(uc, hc) * (h - hc)
}

impl Passage {
    /// Passage next to the main blade, or next to the splitter.
    ///
    /// # Errors
    ///
    /// [`CamError::MissingSurface`] when the model has not been rebuilt or
    /// lacks a blade side.
    pub fn from_model(model: &BladeGeometryModel, splitter: bool, shroud_allowance: f64) -> Result<Self> {
        let solid = model
            .solid()
            .ok_or_else(|| CamError::MissingSurface("rebuilt blade".into()))?;
        let role = |kind, splitter| SurfaceRole { kind, splitter };
        let side = |r: SurfaceRole| {
            solid
                .surface(r)
                .cloned()
                .ok_or_else(|| CamError::MissingSurface(r.to_string()))
        };
        let left = side(role(SurfaceKind::BSide, splitter))?;
        let own_a = side(role(SurfaceKind::ASide, splitter))?;
        let splitter_a = solid.surface(SurfaceRole::splitter(SurfaceKind::ASide));
        let right = match (splitter, splitter_a) {
            (false, Some(a)) => a.clone(),
            _ => side(SurfaceRole::main(SurfaceKind::ASide))?
                .transformed(&model.pitch.transform(&model.axis, 1)),
        };
        Ok(Self::new(left, right, own_a, shroud_allowance))
    }

    /// Passage from explicit walls.
    pub fn new(left: GridSurface, right: GridSurface, own_a: GridSurface, shroud_allowance: f64) -> Self {
        let blade_height = (0..CHORD_SAMPLES)
            .map(|i| left.dv(i as f64 / (CHORD_SAMPLES - 1) as f64, 0.5).norm())
            .sum::<f64>()
            / CHORD_SAMPLES as f64;
        Self {
            left,
            right,
            own_a,
            blade_height,
            shroud_allowance,
        }
    }

    /// Mean hub-to-shroud height of the machined blade.
    pub fn blade_height(&self) -> f64 {
        self.blade_height
    }

    /// Span fraction at `depth` mm below the shroud allowance.
    pub fn height_at_depth(&self, depth: f64) -> f64 {
        (self.blade_height + self.shroud_allowance - depth) / self.blade_height
    }

    /// Wall point and unit normal pointing into the passage.
    pub fn wall(&self, wall: Wall, u: f64, h: f64) -> (Point3, Vec3) {
        let (grid, other) = match wall {
            Wall::Left => (&self.left, &self.right),
            Wall::Right => (&self.right, &self.left),
        };
        let p = eval_ext(grid, u, h);
        let q = eval_ext(other, u, h);
        let uc = u.clamp(0.0, 1.0);
        let hc = h.clamp(0.0, 1.0);
        let mut n = grid
            .normal(uc, hc)
            .unwrap_or_else(|| (q - p).try_normalize(1e-12).unwrap_or_else(Vec3::y));
        if n.dot(&(q - p)) < 0.0 {
            n = -n;
        }
        (p, n)
    }

    /// Tool-tip position at `(u, h, w)` between the walls offset by
    /// `left_offset` and `right_offset`.
    pub fn point(&self, u: f64, h: f64, w: f64, left_offset: f64, right_offset: f64) -> Point3 {
        let (pl, nl) = self.wall(Wall::Left, u, h);
        let (pr, nr) = self.wall(Wall::Right, u, h);
        lerp_point(&(pl + nl * left_offset), &(pr + nr * right_offset), w)
    }

    /// Lateral distance between the offset walls at `(u, h)`, negative when
    /// the offsets overlap.
    pub fn gap(&self, u: f64, h: f64, left_offset: f64, right_offset: f64) -> f64 {
        let (pl, nl) = self.wall(Wall::Left, u, h);
        let (pr, nr) = self.wall(Wall::Right, u, h);
        let d = (pr + nr * right_offset) - (pl + nl * left_offset);
        d.norm().copysign(d.dot(&nl))
    }

    /// Widest gap along the chord at span fraction `h`.
    pub fn max_gap(&self, h: f64, left_offset: f64, right_offset: f64) -> f64 {
        (0..CHORD_SAMPLES)
            .map(|i| self.gap(i as f64 / (CHORD_SAMPLES - 1) as f64, h, left_offset, right_offset))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Chord length of the machined blade at span fraction `h`.
    pub fn chord_length(&self, h: f64) -> f64 {
        self.left.iso_v(h.clamp(0.0, 1.0)).length()
    }

    /// Unit span direction (hub to shroud) at `(u, h)`, averaged over the walls.
    pub fn up(&self, u: f64, h: f64) -> Vec3 {
        let uc = u.clamp(0.0, 1.0);
        let hc = h.clamp(0.0, 1.0);
        let v = self.left.dv(uc, hc) + self.right.dv(uc, hc);
        v.try_normalize(1e-12).unwrap_or_else(Vec3::z)
    }

    /// Unit chord direction (leading to trailing edge) of the machined blade.
    pub fn chord_dir(&self, u: f64, h: f64) -> Vec3 {
        let uc = u.clamp(0.0, 1.0);
        let hc = h.clamp(0.0, 1.0);
        self.left
            .du(uc, hc)
            .try_normalize(1e-12)
            .unwrap_or_else(Vec3::x)
    }

    /// Chord-parameter length of `distance` mm at span fraction `h`.
    pub fn chord_fraction(&self, distance: f64, h: f64) -> f64 {
        let len = self.chord_length(h);
        if len > 1e-12 {
            distance / len
        } else {
            0.0
        }
    }

    /// Point on the machined blade's own A or B side (not offset).
    pub fn blade_side(&self, a_side: bool, u: f64, h: f64) -> Point3 {
        if a_side {
            eval_ext(&self.own_a, u, h)
        } else {
            eval_ext(&self.left, u, h)
        }
    }
}
