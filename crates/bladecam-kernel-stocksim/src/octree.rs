//! Occupancy octree representation of stock material.
//!
//! Every finest cell is either material or air, classified by its centre.
//! Removal and queries descend only into cells the region's bounds touch,
//! and clear whole subtrees when a convex piece of the region contains
//! the cell outright.

use bladecam_kernel_math::{Aabb, Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::{Result, StockSimError};

/// Deepest subdivision a stock may use.
pub const MAX_DEPTH: u8 = 10;

/// A solid region the octree can be tested against.
pub trait Region {
    /// Bounding box of the region.
    fn bounds(&self) -> Aabb;

    /// Whether `p` lies inside.
    fn contains(&self, p: &Point3) -> bool;

    /// Whether the whole cell lies inside.
    ///
    /// The default checks the corners, which is exact for convex regions
    /// only. Non-convex regions must override it with a conservative test.
    fn contains_box(&self, cell: &Aabb) -> bool {
        cell.corners().iter().all(|c| self.contains(c))
    }
}

/// An octree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OctreeNode {
    /// Uniform cell.
    Solid {
        /// True if material, false if air.
        inside: bool,
    },
    /// Branch node with 8 children.
    Branch {
        /// Children in Morton order: (-x-y-z), (+x-y-z), (-x+y-z), (+x+y-z),
        /// (-x-y+z), (+x-y+z), (-x+y+z), (+x+y+z)
        children: Box<[OctreeNode; 8]>,
    },
}

impl OctreeNode {
    /// Create a uniform node.
    pub fn solid(inside: bool) -> Self {
        OctreeNode::Solid { inside }
    }

    /// Whether any material is left under this node.
    pub fn is_inside(&self) -> bool {
        match self {
            OctreeNode::Solid { inside } => *inside,
            OctreeNode::Branch { children } => children.iter().any(|c| c.is_inside()),
        }
    }

    fn material_volume(&self, cell: &Aabb) -> f64 {
        match self {
            OctreeNode::Solid { inside } => {
                if *inside {
                    cell.volume()
                } else {
                    0.0
                }
            }
            OctreeNode::Branch { children } => children
                .iter()
                .enumerate()
                .map(|(i, c)| c.material_volume(&child_bounds(cell, i)))
                .sum(),
        }
    }

    fn for_each_material(&self, cell: &Aabb, visit: &mut dyn FnMut(&Aabb)) {
        match self {
            OctreeNode::Solid { inside: true } => visit(cell),
            OctreeNode::Solid { inside: false } => {}
            OctreeNode::Branch { children } => {
                for (i, c) in children.iter().enumerate() {
                    c.for_each_material(&child_bounds(cell, i), visit);
                }
            }
        }
    }
}

/// Stock material as an occupancy octree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    root: OctreeNode,
    bounds: Aabb,
    max_depth: u8,
    resolution: f64,
}

impl Stock {
    /// Create solid stock filling `bounds`.
    ///
    /// `resolution` is the target edge length of the finest cells along
    /// the longest side.
    ///
    /// # Errors
    ///
    /// * [`StockSimError::InvalidBounds`] for an empty or non-finite box
    /// * [`StockSimError::ResolutionTooSmall`] when the resolution is not
    ///   positive or would need more than [`MAX_DEPTH`] subdivisions
    pub fn from_box(bounds: Aabb, resolution: f64) -> Result<Self> {
        let size = bounds.size();
        if !(size.iter().all(|d| d.is_finite() && *d > 0.0)) {
            return Err(StockSimError::InvalidBounds(format!(
                "extent {:.3} x {:.3} x {:.3}",
                size.x, size.y, size.z
            )));
        }
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(StockSimError::ResolutionTooSmall(resolution));
        }
        let max_dim = size.x.max(size.y).max(size.z);
        let levels = (max_dim / resolution).log2().ceil().max(0.0);
        if levels > MAX_DEPTH as f64 {
            return Err(StockSimError::ResolutionTooSmall(resolution));
        }
        Ok(Self {
            root: OctreeNode::solid(true),
            bounds,
            max_depth: levels as u8,
            resolution,
        })
    }

    /// Stock bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Requested resolution.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Subdivision depth of the finest cells.
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Edge lengths of a finest cell.
    pub fn cell_size(&self) -> Vec3 {
        self.bounds.size() / f64::from(1u32 << self.max_depth)
    }

    /// Root node.
    pub fn root(&self) -> &OctreeNode {
        &self.root
    }

    /// Total nodes in the tree.
    pub fn node_count(&self) -> usize {
        fn count(node: &OctreeNode) -> usize {
            match node {
                OctreeNode::Solid { .. } => 1,
                OctreeNode::Branch { children } => 1 + children.iter().map(count).sum::<usize>(),
            }
        }
        count(&self.root)
    }

    /// Remaining material volume.
    pub fn volume(&self) -> f64 {
        self.root.material_volume(&self.bounds)
    }

    /// Whether the cell containing `p` is material.
    pub fn is_material(&self, p: &Point3) -> bool {
        if !self.bounds.contains(p) {
            return false;
        }
        let mut node = &self.root;
        let mut cell = self.bounds;
        loop {
            match node {
                OctreeNode::Solid { inside } => return *inside,
                OctreeNode::Branch { children } => {
                    let c = cell.center();
                    let idx = usize::from(p.x >= c.x)
                        | usize::from(p.y >= c.y) << 1
                        | usize::from(p.z >= c.z) << 2;
                    cell = child_bounds(&cell, idx);
                    node = &children[idx];
                }
            }
        }
    }

    /// Remove every cell whose centre lies inside `region`.
    ///
    /// `visit` is called once per removed material cell, which may be
    /// coarser than the finest level. Returns the removed volume.
    pub fn remove<R: Region + ?Sized>(&mut self, region: &R, visit: &mut dyn FnMut(&Aabb)) -> f64 {
        let region_bounds = region.bounds();
        if !region_bounds.intersects(&self.bounds) {
            return 0.0;
        }
        let mut removed = 0.0;
        let root = std::mem::replace(&mut self.root, OctreeNode::solid(false));
        let walk = Walk {
            region,
            region_bounds,
            max_depth: self.max_depth,
        };
        self.root = walk.remove(root, &self.bounds, 0, visit, &mut removed);
        removed
    }

    /// A material point inside `region`, if any finest cell centre there
    /// is still material.
    pub fn find_material<R: Region + ?Sized>(&self, region: &R) -> Option<Point3> {
        let walk = Walk {
            region,
            region_bounds: region.bounds(),
            max_depth: self.max_depth,
        };
        walk.find(&self.root, &self.bounds, 0)
    }
}

struct Walk<'a, R: ?Sized> {
    region: &'a R,
    region_bounds: Aabb,
    max_depth: u8,
}

impl<R: Region + ?Sized> Walk<'_, R> {
    fn remove(
        &self,
        node: OctreeNode,
        cell: &Aabb,
        depth: u8,
        visit: &mut dyn FnMut(&Aabb),
        removed: &mut f64,
    ) -> OctreeNode {
        if matches!(node, OctreeNode::Solid { inside: false }) || !self.region_bounds.intersects(cell) {
            return node;
        }
        if self.region.contains_box(cell) {
            *removed += node.material_volume(cell);
            node.for_each_material(cell, visit);
            return OctreeNode::solid(false);
        }
        if depth >= self.max_depth {
            if self.region.contains(&cell.center()) {
                *removed += node.material_volume(cell);
                node.for_each_material(cell, visit);
                return OctreeNode::solid(false);
            }
            return node;
        }

        let mut children = match node {
            OctreeNode::Branch { children } => *children,
            OctreeNode::Solid { inside } => std::array::from_fn(|_| OctreeNode::solid(inside)),
        };
        for (i, child) in children.iter_mut().enumerate() {
            let old = std::mem::replace(child, OctreeNode::solid(false));
            *child = self.remove(old, &child_bounds(cell, i), depth + 1, visit, removed);
        }
        match can_collapse(&children) {
            Some(inside) => OctreeNode::solid(inside),
            None => OctreeNode::Branch {
                children: Box::new(children),
            },
        }
    }

    fn find(&self, node: &OctreeNode, cell: &Aabb, depth: u8) -> Option<Point3> {
        if matches!(node, OctreeNode::Solid { inside: false }) || !self.region_bounds.intersects(cell) {
            return None;
        }
        match node {
            OctreeNode::Solid { .. } => {
                if depth >= self.max_depth || self.region.contains_box(cell) {
                    let c = cell.center();
                    return self.region.contains(&c).then_some(c);
                }
                // Uniform material: descend without allocating.
                (0..8).find_map(|i| self.find(node, &child_bounds(cell, i), depth + 1))
            }
            OctreeNode::Branch { children } => children
                .iter()
                .enumerate()
                .find_map(|(i, c)| self.find(c, &child_bounds(cell, i), depth + 1)),
        }
    }
}

fn child_bounds(bounds: &Aabb, index: usize) -> Aabb {
    let c = bounds.center();
    Aabb {
        min: Point3::new(
            if index & 1 == 0 { bounds.min.x } else { c.x },
            if index & 2 == 0 { bounds.min.y } else { c.y },
            if index & 4 == 0 { bounds.min.z } else { c.z },
        ),
        max: Point3::new(
            if index & 1 == 0 { c.x } else { bounds.max.x },
            if index & 2 == 0 { c.y } else { bounds.max.y },
            if index & 4 == 0 { c.z } else { bounds.max.z },
        ),
    }
}

fn can_collapse(children: &[OctreeNode; 8]) -> Option<bool> {
    let first = match &children[0] {
        OctreeNode::Solid { inside } => *inside,
        _ => return None,
    };
    children[1..]
        .iter()
        .all(|c| matches!(c, OctreeNode::Solid { inside } if *inside == first))
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ball {
        center: Point3,
        radius: f64,
    }

    impl Region for Ball {
        fn bounds(&self) -> Aabb {
            Aabb::new(self.center, self.center).expanded(self.radius)
        }

        fn contains(&self, p: &Point3) -> bool {
            (p - self.center).norm() <= self.radius
        }
    }

    fn block() -> Stock {
        Stock::from_box(
            Aabb::new(Point3::origin(), Point3::new(16.0, 16.0, 8.0)),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_stock_from_box() {
        let stock = block();
        assert_eq!(stock.max_depth(), 4);
        assert_eq!(stock.cell_size(), Vec3::new(1.0, 1.0, 0.5));
        assert!((stock.volume() - 2048.0).abs() < 1e-9);
        assert_eq!(stock.node_count(), 1);
    }

    #[test]
    fn test_invalid_stock() {
        let flat = Aabb::new(Point3::origin(), Point3::new(10.0, 10.0, 0.0));
        assert!(matches!(
            Stock::from_box(flat, 1.0),
            Err(StockSimError::InvalidBounds(_))
        ));
        let b = Aabb::new(Point3::origin(), Point3::new(10.0, 10.0, 10.0));
        assert!(matches!(
            Stock::from_box(b, 0.0),
            Err(StockSimError::ResolutionTooSmall(_))
        ));
        assert!(matches!(
            Stock::from_box(b, 0.001),
            Err(StockSimError::ResolutionTooSmall(_))
        ));
    }

    #[test]
    fn test_remove_conserves_volume() {
        let mut stock = block();
        let before = stock.volume();
        let mut cells = 0.0;
        let removed = stock.remove(
            &Ball {
                center: Point3::new(8.0, 8.0, 8.0),
                radius: 3.0,
            },
            &mut |c| cells += c.volume(),
        );
        assert!(removed > 0.0);
        assert!((cells - removed).abs() < 1e-9);
        assert!((before - stock.volume() - removed).abs() < 1e-9);
        assert!(!stock.is_material(&Point3::new(8.2, 8.2, 7.8)));
        assert!(stock.is_material(&Point3::new(1.0, 1.0, 1.0)));

        // Removing the same region again takes nothing.
        let again = stock.remove(
            &Ball {
                center: Point3::new(8.0, 8.0, 8.0),
                radius: 3.0,
            },
            &mut |_| {},
        );
        assert_eq!(again, 0.0);
    }

    #[test]
    fn test_remove_everything_collapses() {
        let mut stock = block();
        let removed = stock.remove(
            &Ball {
                center: Point3::new(8.0, 8.0, 4.0),
                radius: 100.0,
            },
            &mut |_| {},
        );
        assert!((removed - 2048.0).abs() < 1e-9);
        assert_eq!(stock.root(), &OctreeNode::solid(false));
        assert!(!stock.root().is_inside());
    }

    #[test]
    fn test_find_material() {
        let mut stock = block();
        let ball = Ball {
            center: Point3::new(8.0, 8.0, 9.0),
            radius: 1.5,
        };
        let hit = stock.find_material(&ball).unwrap();
        assert!(ball.contains(&hit) && stock.is_material(&hit));
        stock.remove(&ball, &mut |_| {});
        assert!(stock.find_material(&ball).is_none());
        let outside = Ball {
            center: Point3::new(8.0, 8.0, 20.0),
            radius: 2.0,
        };
        assert!(stock.find_material(&outside).is_none());
    }
}
