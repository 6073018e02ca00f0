#![warn(missing_docs)]

//! Stock simulation for bladecam toolpaths.
//!
//! Replays a toolpath segment by segment against an occupancy octree of
//! stock material, removing the swept cutter volume and recording cutting
//! metrics per step.
//!
//! # Features
//!
//! - Occupancy octree stock with exact volume bookkeeping
//! - Swept volumes for flat, ball, bull and tapered cutters, including
//!   moves that turn the tool axis
//! - Shank and holder collision detection with a critical gap
//! - Overcut detection against a finished-part gauge
//! - Step forward, reverse over cached steps, continuous play and CSV export
//!
//! # Example
//!
//! ```
//! use bladecam_kernel_math::{Aabb, Point3};
//! use bladecam_kernel_stocksim::Stock;
//!
//! let stock = Stock::from_box(Aabb::new(Point3::origin(), Point3::new(100.0, 100.0, 50.0)), 2.0).unwrap();
//! assert!((stock.volume() - 500_000.0).abs() < 1e-6);
//! ```

mod collision;
mod export;
mod gauge;
mod octree;
mod simulation;
mod sweep;

pub use collision::{CollisionResult, CollisionType};
pub use export::{export_csv, write_csv};
pub use gauge::{BoxGauge, HalfSpaceGauge, PartGauge, UnionGauge};
pub use octree::{OctreeNode, Region, Stock, MAX_DEPTH};
pub use simulation::{simulate, RunSummary, Simulation, SimulationSettings, SimulationStep, StepStatus};
pub use sweep::{capsule_sdf, envelope_profile, footprint_area, tool_profile, ProfilePiece, SweptVolume};

use bladecam_kernel_cam::CamError;
use bladecam_kernel_task::Cancelled;
use thiserror::Error;

/// Errors from stock simulation.
#[derive(Debug, Error)]
pub enum StockSimError {
    /// Invalid stock bounds (zero or negative dimensions).
    #[error("invalid stock bounds: {0}")]
    InvalidBounds(String),

    /// Resolution too small.
    #[error("resolution too small: {0}")]
    ResolutionTooSmall(f64),

    /// Tool wider than the stock.
    #[error("tool diameter too large: {0}")]
    ToolTooLarge(f64),

    /// A simulation setting is out of range.
    #[error("invalid simulation parameter: {0}")]
    InvalidParameter(String),

    /// The cutter failed validation.
    #[error(transparent)]
    Cutter(#[from] CamError),

    /// Step export failed.
    #[error("export failed: {0}")]
    Export(String),

    /// File I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The run was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl From<csv::Error> for StockSimError {
    fn from(err: csv::Error) -> Self {
        StockSimError::Export(err.to_string())
    }
}

/// Result type for stock simulation.
pub type Result<T> = std::result::Result<T, StockSimError>;
