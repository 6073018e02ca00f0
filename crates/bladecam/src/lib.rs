#![warn(missing_docs)]

//! bladecam: CAM core for blisks and impellers
//!
//! Geometry reconstruction, multi-axis toolpath generation and NC stock
//! simulation behind one explicit [`Session`].
//!
//! The kernel crates are re-exported as [`math`], [`task`], [`geom`],
//! [`cam`] and [`stocksim`]; this crate adds the session, typed
//! [`Request`]s, background [`TaskHandle`]s, outbound [`SessionEvent`]s,
//! TOML configuration, logging setup and a persisted record schema.
//!
//! # Example
//!
//! ```rust,no_run
//! use bladecam::geom::BladeGeometryModel;
//! use bladecam::cam::{Cutter, OperationKind, Tool};
//! use bladecam::task::TaskContext;
//! use bladecam::{BladecamConfig, Request, Response, Session};
//!
//! # fn imported_model() -> BladeGeometryModel { unimplemented!() }
//! let session = Session::new(BladecamConfig::default(), imported_model());
//! let ctx = TaskContext::detached();
//! session.execute(Request::Rebuild { lamination: None }, &ctx).unwrap();
//!
//! let op = session.new_operation("rough", OperationKind::Rough, Cutter::with_default_mount(Tool::default_endmill()));
//! let id = session.add_operation(op).unwrap();
//! if let Response::Generated(out) = session.execute(Request::GenerateToolpath { operation: id }, &ctx).unwrap() {
//!     println!("{} segments", out.toolpath.len());
//! }
//! ```

mod config;
mod error;
mod events;
mod handle;
pub mod logging;
mod persist;
mod request;
mod session;

pub use bladecam_kernel_cam as cam;
pub use bladecam_kernel_geom as geom;
pub use bladecam_kernel_math as math;
pub use bladecam_kernel_stocksim as stocksim;
pub use bladecam_kernel_task as task;

pub use config::{
    BladecamConfig, LaminationConfig, LoggingConfig, MachiningConfig, SamplingConfig,
    SimulationConfig,
};
pub use error::{BladecamError, Result};
pub use events::{EventBus, EventCategory, EventFilter, SessionEvent, SubscriptionId};
pub use handle::TaskHandle;
pub use persist::{ModelRecord, OperationRecord, SessionRecord, ToolpathRecord, RECORD_VERSION};
pub use request::{Request, Response};
pub use session::Session;
