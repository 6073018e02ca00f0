//! Loft: ruled surfaces between consecutive sections, and their tessellation.

use std::collections::HashMap;

use bladecam_kernel_math::{Aabb, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{GeomError, Result};
use crate::reference::GridSurface;
use crate::sample::Section;

/// Loft sections (hub first) into a surface grid.
///
/// # Errors
///
/// Returns an error if:
/// * Fewer than 2 sections are provided
/// * Sections have different point counts
pub fn loft_sections(sections: &[Section]) -> Result<GridSurface> {
    if sections.len() < 2 {
        return Err(GeomError::InsufficientDefinition(format!(
            "loft needs at least 2 sections, got {}",
            sections.len()
        )));
    }
    let n_points = sections[0].len();
    if let Some(bad) = sections.iter().find(|s| s.len() != n_points) {
        return Err(GeomError::InsufficientDefinition(format!(
            "section at station {} has {} points, expected {n_points}",
            bad.station,
            bad.len()
        )));
    }
    GridSurface::new(sections.iter().map(|s| s.points.clone()).collect())
}

fn quantize_pt(p: &Point3) -> [i64; 3] {
    [
        (p.x * 1e9).round() as i64,
        (p.y * 1e9).round() as i64,
        (p.z * 1e9).round() as i64,
    ]
}

/// Indexed triangle mesh with welded vertices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Triangles as vertex index triples.
    pub triangles: Vec<[u32; 3]>,
    #[serde(skip)]
    index: HashMap<[i64; 3], u32>,
}

impl TriangleMesh {
    /// Empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    fn vertex(&mut self, p: Point3) -> u32 {
        let key = quantize_pt(&p);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.vertices.len() as u32;
        self.vertices.push(p);
        self.index.insert(key, i);
        i
    }

    /// Append the quads of a surface grid as triangle pairs.
    ///
    /// Coincident vertices are welded, so neighbouring patches share
    /// their boundary. Triangles that collapse after welding are dropped.
    pub fn add_grid(&mut self, grid: &GridSurface) {
        let rows = grid.rows();
        let ids: Vec<Vec<u32>> = rows
            .iter()
            .map(|r| r.iter().map(|p| self.vertex(*p)).collect())
            .collect();
        for i in 0..rows.len() - 1 {
            for j in 0..grid.column_count() - 1 {
                let v0 = ids[i][j];
                let v1 = ids[i][j + 1];
                let v2 = ids[i + 1][j + 1];
                let v3 = ids[i + 1][j];
                for tri in [[v0, v1, v2], [v0, v2, v3]] {
                    if tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2] {
                        self.triangles.push(tri);
                    }
                }
            }
        }
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let a = self.vertices[t[0] as usize];
                let b = self.vertices[t[1] as usize];
                let c = self.vertices[t[2] as usize];
                0.5 * (b - a).cross(&(c - a)).norm()
            })
            .sum()
    }

    /// Bounding box, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter())
    }

    /// Unit normal of a triangle, using its winding.
    pub fn triangle_normal(&self, t: usize) -> Vec3 {
        let [a, b, c] = self.triangles[t];
        let (a, b, c) = (
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        );
        let n = (b - a).cross(&(c - a));
        let len = n.norm();
        if len < 1e-15 {
            Vec3::z()
        } else {
            n / len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(station: f64, z: f64) -> Section {
        Section::new(
            station,
            vec![
                Point3::new(0.0, 0.0, z),
                Point3::new(1.0, 0.0, z),
                Point3::new(2.0, 0.0, z),
            ],
        )
    }

    #[test]
    fn test_loft_two_sections() {
        let grid = loft_sections(&[line(0.0, 0.0), line(1.0, 3.0)]).unwrap();
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.column_count(), 3);
        assert!((grid.eval(0.5, 0.5) - Point3::new(1.0, 0.0, 1.5)).norm() < 1e-12);
    }

    #[test]
    fn test_loft_too_few_sections() {
        assert!(matches!(
            loft_sections(&[line(0.0, 0.0)]),
            Err(GeomError::InsufficientDefinition(_))
        ));
    }

    #[test]
    fn test_mesh_welds_shared_boundary() {
        let lower = loft_sections(&[line(0.0, 0.0), line(0.5, 1.0)]).unwrap();
        let upper = loft_sections(&[line(0.5, 1.0), line(1.0, 2.0)]).unwrap();
        let mut mesh = TriangleMesh::new();
        mesh.add_grid(&lower);
        mesh.add_grid(&upper);
        // 3 rows of 3 points, middle row shared.
        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.triangles.len(), 8);
        assert!((mesh.area() - 4.0).abs() < 1e-12);
    }
}
