//! Error type of the session layer.

use bladecam_kernel_cam::CamError;
use bladecam_kernel_geom::GeomError;
use bladecam_kernel_stocksim::StockSimError;
use bladecam_kernel_task::Cancelled;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`Session`](crate::Session) requests.
#[derive(Error, Debug)]
pub enum BladecamError {
    /// Sampling or rebuilding failed.
    #[error(transparent)]
    Geometry(#[from] GeomError),

    /// Planning, axis resolution or linking failed.
    #[error(transparent)]
    Cam(#[from] CamError),

    /// Stock simulation failed.
    #[error(transparent)]
    Simulation(#[from] StockSimError),

    /// A task was cancelled outside any kernel call.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Unknown operation, surface role or simulation.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The key that missed.
        id: String,
    },

    /// The model is being rebuilt; edits and a second rebuild must wait.
    #[error("model '{0}' is busy rebuilding")]
    Busy(String),

    /// A newer generate request replaced this one.
    #[error("toolpath generation for operation {0} was superseded")]
    Superseded(Uuid),

    /// The toolpath exists but upstream geometry or parameters changed.
    #[error("toolpath for operation {0} is out of date, regenerate it first")]
    StaleToolpath(Uuid),

    /// Bad configuration or record contents.
    #[error("config error: {0}")]
    Config(String),

    /// A worker thread panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Record (de)serialization failed.
    #[error("record error: {0}")]
    Record(#[from] serde_json::Error),

    /// File I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BladecamError {
    pub(crate) fn operation_not_found(id: Uuid) -> Self {
        BladecamError::NotFound {
            kind: "operation",
            id: id.to_string(),
        }
    }
}

impl From<toml::de::Error> for BladecamError {
    fn from(err: toml::de::Error) -> Self {
        BladecamError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BladecamError {
    fn from(err: toml::ser::Error) -> Self {
        BladecamError::Config(err.to_string())
    }
}

/// Result type for session requests.
pub type Result<T> = std::result::Result<T, BladecamError>;
