#![warn(missing_docs)]

//! Blade geometry reconstruction for bladecam.
//!
//! Turns already-picked reference geometry of a blisk or impeller into a
//! clean parametric model:
//!
//! - [`sample`] produces ordered cross-sections from a surface grid or
//!   guide curves, with even or parametric spacing
//! - [`SurfaceDefinition`] owns the sections of one surface role and
//!   freezes their layout once sampling has started
//! - [`LaminationSchedule`] drives layered re-sampling between two span
//!   bounds
//! - [`BladeGeometryModel::rebuild`] lofts every definition, blends the
//!   leading and trailing edges, builds fillets and tessellates the result
//!
//! # Example
//!
//! ```
//! use bladecam_kernel_geom::{
//!     BladeGeometryModel, PartAxis, Pitch, Section, SurfaceDefinition, SurfaceKind, SurfaceRole,
//! };
//! use bladecam_kernel_math::{Point3, Vec3};
//! use bladecam_kernel_task::TaskContext;
//!
//! let side = |y: f64, z: f64, station: f64| {
//!     Section::new(station, (0..8).map(|i| Point3::new(i as f64 * 2.0, y, z)).collect())
//! };
//! let mut model = BladeGeometryModel::new(
//!     "cascade",
//!     PartAxis::default(),
//!     Pitch::Linear { offset: Vec3::new(0.0, 18.0, 0.0) },
//! );
//! for (kind, y) in [(SurfaceKind::BSide, 0.0), (SurfaceKind::ASide, -2.0)] {
//!     let sections = vec![side(y, 0.0, 0.0), side(y, 8.0, 1.0)];
//!     model.set_definition(SurfaceDefinition::define(SurfaceRole::main(kind), sections, false).unwrap());
//! }
//! let solid = model.rebuild(None, &TaskContext::detached()).unwrap();
//! assert!(solid.mesh.triangles.len() > 0);
//! ```

mod definition;
mod error;
pub mod fillet;
mod lamination;
mod loft;
mod model;
mod rebuild;
mod reference;
mod sample;

pub use definition::{SectionSource, SurfaceDefinition, SurfaceKind, SurfaceRole};
pub use error::{GeomError, Result};
pub use fillet::{BladeSide, FilletBoundary, FilletPatch, FilletSpec, RadiusRow};
pub use lamination::LaminationSchedule;
pub use loft::{loft_sections, TriangleMesh};
pub use model::{BladeGeometryModel, PartAxis, Pitch};
pub use rebuild::{RebuiltSurface, SolidModel};
pub use reference::{GridSurface, Polyline, ReferenceGeometry};
pub use sample::{
    sample, sample_iso, sample_revolution, GenerationMode, PickMode, SamplingParams, Section,
    SpacingMode,
};
