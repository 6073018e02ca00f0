//! The blade geometry model owned by a reconstruction session.

use bladecam_kernel_math::{Dir3, Point3, Transform, Vec3};
use bladecam_kernel_task::TaskContext;
use serde::{Deserialize, Serialize};

use crate::definition::{SurfaceDefinition, SurfaceKind, SurfaceRole};
use crate::error::Result;
use crate::fillet::FilletSpec;
use crate::lamination::LaminationSchedule;
use crate::rebuild::{self, SolidModel};

/// Rotation axis of the part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartAxis {
    /// A point on the axis.
    pub origin: Point3,
    /// Axis direction.
    pub direction: Dir3,
}

impl PartAxis {
    /// Create an axis.
    pub fn new(origin: Point3, direction: Dir3) -> Self {
        Self { origin, direction }
    }

    /// Distance from `p` to the axis line.
    pub fn radial_distance(&self, p: &Point3) -> f64 {
        self.radial_vector(p).norm()
    }

    /// Component of `p - origin` perpendicular to the axis.
    pub fn radial_vector(&self, p: &Point3) -> Vec3 {
        let d = p - self.origin;
        d - self.direction.as_ref() * d.dot(self.direction.as_ref())
    }
}

impl Default for PartAxis {
    fn default() -> Self {
        Self::new(Point3::origin(), Vec3::z_axis())
    }
}

/// How one blade maps onto the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pitch {
    /// Blades repeat around the part axis.
    Rotational {
        /// Number of main blades.
        blade_count: u32,
    },
    /// Blades repeat by translation (planar cascade).
    Linear {
        /// Offset from one blade to the next.
        offset: Vec3,
    },
}

impl Pitch {
    /// Transform mapping a blade onto its `k`-th neighbour.
    pub fn transform(&self, axis: &PartAxis, k: i32) -> Transform {
        match self {
            Pitch::Rotational { blade_count } => {
                let angle = std::f64::consts::TAU * k as f64 / (*blade_count).max(1) as f64;
                Transform::rotation_about_line(&axis.origin, &axis.direction, angle)
            }
            Pitch::Linear { offset } => Transform::translation(&(offset * k as f64)),
        }
    }
}

/// The set of surface definitions describing one blisk or impeller.
///
/// Owned by a single reconstruction session. A successful rebuild commits
/// new sections, the rebuilt solid and a new revision together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BladeGeometryModel {
    /// Model name.
    pub name: String,
    /// Rotation axis.
    pub axis: PartAxis,
    /// Blade-to-blade pitch.
    pub pitch: Pitch,
    definitions: Vec<SurfaceDefinition>,
    fillet: Option<FilletSpec>,
    solid: Option<SolidModel>,
    revision: u64,
}

impl BladeGeometryModel {
    /// Empty model.
    pub fn new(name: impl Into<String>, axis: PartAxis, pitch: Pitch) -> Self {
        Self {
            name: name.into(),
            axis,
            pitch,
            definitions: Vec::new(),
            fillet: None,
            solid: None,
            revision: 0,
        }
    }

    /// Insert or replace the definition for its role.
    pub fn set_definition(&mut self, definition: SurfaceDefinition) {
        let role = definition.role();
        match self.definitions.iter_mut().find(|d| d.role() == role) {
            Some(slot) => *slot = definition,
            None => self.definitions.push(definition),
        }
        self.revision += 1;
    }

    /// Remove and return the definition for `role`.
    pub fn remove_definition(&mut self, role: SurfaceRole) -> Option<SurfaceDefinition> {
        let idx = self.definitions.iter().position(|d| d.role() == role)?;
        self.revision += 1;
        Some(self.definitions.remove(idx))
    }

    /// Definition for `role`.
    pub fn definition(&self, role: SurfaceRole) -> Option<&SurfaceDefinition> {
        self.definitions.iter().find(|d| d.role() == role)
    }

    /// Mutable definition for `role`. Bumps the revision.
    pub fn definition_mut(&mut self, role: SurfaceRole) -> Option<&mut SurfaceDefinition> {
        let def = self.definitions.iter_mut().find(|d| d.role() == role)?;
        self.revision += 1;
        Some(def)
    }

    /// All definitions in insertion order.
    pub fn definitions(&self) -> &[SurfaceDefinition] {
        &self.definitions
    }

    /// Set or clear the fillet definition.
    pub fn set_fillet(&mut self, fillet: Option<FilletSpec>) {
        self.fillet = fillet;
        self.revision += 1;
    }

    /// Fillet definition.
    pub fn fillet(&self) -> Option<&FilletSpec> {
        self.fillet.as_ref()
    }

    /// Last committed rebuild.
    pub fn solid(&self) -> Option<&SolidModel> {
        self.solid.as_ref()
    }

    /// Monotonic change counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the main blade has both sides defined.
    pub fn has_blade_sides(&self) -> bool {
        [SurfaceKind::ASide, SurfaceKind::BSide]
            .iter()
            .all(|k| self.definition(SurfaceRole::main(*k)).is_some())
    }

    /// Rebuild and commit.
    ///
    /// On error or cancellation the model is left exactly as it was.
    pub fn rebuild(
        &mut self,
        lamination: Option<&LaminationSchedule>,
        ctx: &TaskContext,
    ) -> Result<&SolidModel> {
        let staged = rebuild::rebuild(self, lamination, ctx)?;
        self.definitions = staged.definitions;
        self.revision += 1;
        tracing::info!(model = %self.name, revision = self.revision, "rebuild committed");
        Ok(self.solid.insert(staged.solid))
    }
}
