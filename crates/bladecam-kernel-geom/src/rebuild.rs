//! Rebuild: sections to lofted surfaces, edge blends, fillets and a mesh.
//!
//! The rebuild runs against a staged copy of the definitions. Nothing is
//! written back to the model until every stage has succeeded, so an error
//! or a cancellation at any checkpoint leaves the model untouched.

use bladecam_kernel_math::{Aabb, Point3, Vec3};
use bladecam_kernel_task::{Stage, TaskContext};
use serde::{Deserialize, Serialize};

use crate::definition::{SurfaceDefinition, SurfaceKind, SurfaceRole};
use crate::error::{GeomError, Result};
use crate::fillet::{self, BladeSide, FilletPatch};
use crate::lamination::LaminationSchedule;
use crate::loft::{loft_sections, TriangleMesh};
use crate::model::BladeGeometryModel;
use crate::reference::GridSurface;

/// Samples across an edge blend or fillet arc.
const ARC_SAMPLES: usize = 9;

/// A lofted surface in the rebuilt solid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuiltSurface {
    /// Role of the surface.
    pub role: SurfaceRole,
    /// Lofted grid.
    pub grid: GridSurface,
    /// True for edge blends generated without an explicit definition.
    pub synthesized: bool,
}

/// Result of a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidModel {
    /// Lofted and synthesized surfaces.
    pub surfaces: Vec<RebuiltSurface>,
    /// Fillet patches.
    pub fillets: Vec<FilletPatch>,
    /// Tessellation of all surfaces and fillets.
    pub mesh: TriangleMesh,
    /// Bounding box of the mesh.
    pub bounds: Aabb,
}

impl SolidModel {
    /// Rebuilt grid for `role`.
    pub fn surface(&self, role: SurfaceRole) -> Option<&GridSurface> {
        self.surfaces.iter().find(|s| s.role == role).map(|s| &s.grid)
    }
}

pub(crate) struct Staged {
    pub definitions: Vec<SurfaceDefinition>,
    pub solid: SolidModel,
}

fn validate(model: &BladeGeometryModel, lamination: Option<&LaminationSchedule>) -> Result<()> {
    let has_rebuilt = model.solid().is_some();
    for splitter in [false, true] {
        let role = |k| SurfaceRole {
            kind: k,
            splitter,
        };
        let a = model.definition(role(SurfaceKind::ASide));
        let b = model.definition(role(SurfaceKind::BSide));
        let blade = if splitter { "splitter" } else { "main" };
        match (a, b) {
            (None, None) if splitter => continue,
            (Some(a), Some(b)) => {
                for def in [a, b] {
                    let enough = def.sections().len() >= 2
                        || (lamination.is_some() && def.can_resample(has_rebuilt));
                    if !enough {
                        return Err(GeomError::InsufficientDefinition(format!(
                            "{} has {} sections and cannot be re-sampled",
                            def.role(),
                            def.sections().len()
                        )));
                    }
                }
            }
            (None, _) => {
                return Err(GeomError::InsufficientDefinition(format!(
                    "{blade} blade A side is not defined"
                )))
            }
            (_, None) => {
                return Err(GeomError::InsufficientDefinition(format!(
                    "{blade} blade B side is not defined"
                )))
            }
        }
    }
    if let Some(spec) = model.fillet() {
        spec.validate()?;
    }
    Ok(())
}

/// Run every rebuild stage on a staged copy of the model.
pub(crate) fn rebuild(
    model: &BladeGeometryModel,
    lamination: Option<&LaminationSchedule>,
    ctx: &TaskContext,
) -> Result<Staged> {
    validate(model, lamination)?;

    let mut staged: Vec<SurfaceDefinition> = model.definitions().to_vec();
    let stations = lamination.map(|l| l.stations()).unwrap_or_default();
    let has_rebuilt = model.solid().is_some();
    let resampled: Vec<usize> = if stations.is_empty() {
        Vec::new()
    } else {
        staged
            .iter()
            .enumerate()
            .filter(|(_, d)| d.can_resample(has_rebuilt))
            .map(|(i, _)| i)
            .collect()
    };
    let lofted_count = staged.len();
    let total = stations.len() + lofted_count + 2;
    let mut done = 0;

    for &i in &resampled {
        staged[i].clear_sections();
    }
    for (layer, &station) in stations.iter().enumerate() {
        for &i in &resampled {
            let source = &model.definitions()[i];
            let rebuilt = model.solid().and_then(|s| s.surface(source.role()));
            let section = source.sample_at(station, &model.axis, rebuilt)?;
            staged[i].push_section(section)?;
        }
        done += 1;
        ctx.checkpoint(Stage::Rebuild, done, total, format!("layer {layer}"))?;
    }

    let mut surfaces = Vec::with_capacity(lofted_count + 4);
    for def in &staged {
        if !def.sections().is_empty() {
            surfaces.push(RebuiltSurface {
                role: def.role(),
                grid: loft_sections(def.sections())?,
                synthesized: false,
            });
        }
        done += 1;
        ctx.checkpoint(Stage::Rebuild, done, total, format!("surface {}", def.role()))?;
    }

    let mut blends = Vec::new();
    for splitter in [false, true] {
        let role = |k| SurfaceRole { kind: k, splitter };
        let find = |k| {
            surfaces
                .iter()
                .find(|s: &&RebuiltSurface| s.role == role(k))
                .map(|s| &s.grid)
        };
        let (Some(a), Some(b)) = (find(SurfaceKind::ASide), find(SurfaceKind::BSide)) else {
            continue;
        };
        for (kind, u, sign) in [
            (SurfaceKind::LeadingEdge, 0.0, -1.0),
            (SurfaceKind::TrailingEdge, 1.0, 1.0),
        ] {
            if find(kind).is_some() {
                continue;
            }
            if let Some(grid) = edge_blend(a, b, u, sign)? {
                blends.push(RebuiltSurface {
                    role: role(kind),
                    grid,
                    synthesized: true,
                });
            }
        }
    }
    surfaces.extend(blends);
    done += 1;
    ctx.checkpoint(Stage::Rebuild, done, total, "edge blends")?;

    let mut fillets = Vec::new();
    if let Some(spec) = model.fillet() {
        for splitter in [false, true] {
            let role = |k| SurfaceRole { kind: k, splitter };
            let grid = |k| surfaces.iter().find(|s| s.role == role(k)).map(|s| &s.grid);
            for (side, wall, other) in [
                (BladeSide::A, SurfaceKind::ASide, SurfaceKind::BSide),
                (BladeSide::B, SurfaceKind::BSide, SurfaceKind::ASide),
            ] {
                if let Some(wall_grid) = grid(wall) {
                    fillets.push(FilletPatch {
                        side,
                        splitter,
                        boundary: spec.boundary(),
                        grid: fillet::build_patch(spec, side, wall_grid, grid(other), ARC_SAMPLES)?,
                    });
                }
            }
        }
    }

    let mut mesh = TriangleMesh::new();
    for s in &surfaces {
        mesh.add_grid(&s.grid);
    }
    for f in &fillets {
        mesh.add_grid(&f.grid);
    }
    let bounds = mesh
        .bounds()
        .ok_or_else(|| GeomError::InsufficientDefinition("rebuild produced no geometry".into()))?;
    done += 1;
    ctx.checkpoint(Stage::Rebuild, done, total, "fillets and mesh")?;

    tracing::debug!(
        surfaces = surfaces.len(),
        fillets = fillets.len(),
        triangles = mesh.triangles.len(),
        "rebuild staged"
    );
    Ok(Staged {
        definitions: staged,
        solid: SolidModel {
            surfaces,
            fillets,
            mesh,
            bounds,
        },
    })
}

/// Half-round blend joining the A and B sides at chord position `u`.
///
/// `sign` is -1 at the leading edge (bulge upstream) and +1 at the
/// trailing edge. Returns `None` for a zero-thickness edge.
fn edge_blend(a: &GridSurface, b: &GridSurface, u: f64, sign: f64) -> Result<Option<GridSurface>> {
    let rows = a.row_count().max(b.row_count());
    let mut grid = Vec::with_capacity(rows);
    for i in 0..rows {
        let v = i as f64 / (rows - 1) as f64;
        let pa = a.eval(u, v);
        let pb = b.eval(u, v);
        let half = (pb - pa) * 0.5;
        let r = half.norm();
        if r < 1e-9 {
            return Ok(None);
        }
        let chord = (a.du(u, v) + b.du(u, v)).try_normalize(1e-12).unwrap_or_else(Vec3::x);
        let bulge = chord * sign;
        let mid = pa + half;
        let row: Vec<Point3> = (0..ARC_SAMPLES)
            .map(|k| {
                let theta = std::f64::consts::PI * k as f64 / (ARC_SAMPLES - 1) as f64;
                mid - half * theta.cos() + bulge * (r * theta.sin())
            })
            .collect();
        grid.push(row);
    }
    GridSurface::new(grid).map(Some)
}
