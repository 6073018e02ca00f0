//! Error types for geometry reconstruction.

use bladecam_kernel_task::Cancelled;
use thiserror::Error;

/// Errors that can occur while sampling or rebuilding blade geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeomError {
    /// Sampling parameters changed while sections exist, or a section
    /// does not match the definition's point count.
    #[error("stale definition for {role}: {reason}")]
    StaleDefinition {
        /// Role of the affected surface definition.
        role: String,
        /// What changed.
        reason: String,
    },

    /// Not enough data to rebuild (missing sides, too few sections,
    /// fillet tables with fewer than two rows).
    #[error("insufficient definition: {0}")]
    InsufficientDefinition(String),

    /// A percent range is empty or outside `[0, 100]`.
    #[error("invalid range: start {start}% must be below end {end}% and both within [0, 100]")]
    InvalidRange {
        /// Range start in percent.
        start: f64,
        /// Range end in percent.
        end: f64,
    },

    /// Reference geometry could not be turned into a section.
    #[error("topology extraction failed at station {station}: {reason}")]
    TopologyExtraction {
        /// Parametric station in `[0, 1]` being sampled.
        station: f64,
        /// What went wrong.
        reason: String,
    },

    /// A scalar parameter is out of its valid domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The task was cancelled between checkpoints.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeomError>;
