//! Error types for toolpath generation.

use bladecam_kernel_geom::GeomError;
use bladecam_kernel_task::Cancelled;
use thiserror::Error;

use crate::zones::PointViolation;

/// Errors from planning, axis resolution and assembly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CamError {
    /// A parameter is outside its valid domain.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A range is empty or outside its bounds.
    #[error("invalid range for {name}: [{start}, {end}]")]
    InvalidRange {
        /// Range name.
        name: &'static str,
        /// Range start.
        start: f64,
        /// Range end.
        end: f64,
    },

    /// The model lacks a surface the operation needs.
    #[error("model has no {0} surface")]
    MissingSurface(String),

    /// Planning produced no passes.
    #[error("operation {operation} produced no passes: {reason}")]
    EmptyPassSet {
        /// Operation name.
        operation: String,
        /// Why the pass set is empty.
        reason: String,
    },

    /// Consecutive tool axes still differ by more than the limit after smoothing.
    #[error(
        "axis discontinuity in pass {pass} row {row} at point {point}: {angle_deg:.3}° exceeds {limit_deg:.3}°"
    )]
    AxisDiscontinuity {
        /// Pass index.
        pass: usize,
        /// Row index within the pass.
        row: usize,
        /// Index of the second point of the offending pair.
        point: usize,
        /// Angle between the two axes.
        angle_deg: f64,
        /// Configured maximum.
        limit_deg: f64,
    },

    /// An approach or departure cannot reach the clearance geometry.
    #[error("unreachable {move_kind} for pass {pass}: {reason}")]
    UnreachableApproach {
        /// Pass index.
        pass: usize,
        /// "approach" or "departure".
        move_kind: &'static str,
        /// Why.
        reason: String,
    },

    /// A segment requests a rotary position outside the machine's range.
    #[error("segment {segment}: {axis} axis at {value:.3}° outside [{min}, {max}]")]
    AxisLimitExceeded {
        /// Segment index in the toolpath.
        segment: usize,
        /// Machine axis name.
        axis: &'static str,
        /// Requested position in degrees.
        value: f64,
        /// Lower limit.
        min: f64,
        /// Upper limit.
        max: f64,
    },

    /// Cutting points violate buffer zones.
    #[error("{} cutting points violate buffer zones", .0.len())]
    Interference(Vec<PointViolation>),

    /// Geometry error from the blade model.
    #[error(transparent)]
    Geometry(#[from] GeomError),

    /// The task was cancelled between checkpoints.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Result type for CAM operations.
pub type Result<T> = std::result::Result<T, CamError>;

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> CamError {
    CamError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}
