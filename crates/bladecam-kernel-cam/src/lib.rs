#![warn(missing_docs)]

//! Multi-axis toolpath generation for blisks and impellers.
//!
//! The pipeline for one operation:
//!
//! 1. [`plan`] partitions the passage between two blades into passes of
//!    cutting rows for the operation kind
//! 2. [`resolve_axis`] orients the tool at every row point, smoothing and
//!    clamping the axis to the safety cone
//! 3. [`check_pass`] keeps the cutter envelope clear of the buffer zones
//! 4. [`assemble`] links the passes into a toolpath through the
//!    approach / engage / cut / retract / departure / traversal states
//!
//! [`generate_toolpath`] runs all four with progress and cancellation.
//!
//! # Example
//!
//! ```no_run
//! use bladecam_kernel_cam::{generate_toolpath, Cutter, Operation, OperationKind, Tool};
//! use bladecam_kernel_geom::BladeGeometryModel;
//! use bladecam_kernel_task::TaskContext;
//!
//! # fn rebuilt_model() -> BladeGeometryModel { unimplemented!() }
//! let model = rebuilt_model();
//! let cutter = Cutter::with_default_mount(Tool::default_ball());
//! let op = Operation::new("rough", OperationKind::Rough, cutter);
//! let out = generate_toolpath(&op, &model, &TaskContext::detached()).unwrap();
//! println!("{} segments", out.toolpath.len());
//! ```

mod assembler;
mod axis;
mod error;
mod feeds;
mod generate;
mod operation;
mod passage;
pub mod planner;
mod tool;
mod zones;

pub use assembler::{
    assemble, Clearance, LinkingParams, MachineLimits, MotionSegment, PathState, Toolpath,
};
pub use axis::{resolve_axis, smooth_axes, AxisMode, AxisParams, RowAxes, SafetyCone};
pub use error::{CamError, Result};
pub use feeds::{FeedTable, Kinematics, MotionKind};
pub use generate::{generate_toolpath, GeneratedToolpath};
pub use operation::{
    Allowances, CombinedParams, CutDirection, CutPattern, DepthMode, DepthParams, EdgeExtension,
    EdgeParams, EdgeSelect, LayerNotFinished, Operation, OperationKind, OperationParams,
    SlotStart, StageOrdering, TrochoidalParams, WallSide,
};
pub use passage::{Passage, Wall};
pub use planner::{plan, Pass, PathPoint, PlanOutcome, Row, Stage};
pub use tool::{Cutter, EnvelopeKind, EnvelopePart, Shank, Tool, ToolHolder};
pub use zones::{
    check_clearance, check_pass, cylinder_distance, BufferZone, ClearanceResult, ClearanceZones,
    PointViolation, ZoneHit, ZoneKind,
};
