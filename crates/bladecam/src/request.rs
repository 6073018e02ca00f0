//! Typed inbound requests.
//!
//! Every UI command reaches the core as a [`Request`]. Run it inline with
//! [`Session::execute`] or off the calling thread with [`Session::spawn`].

use std::sync::Arc;
use std::time::Instant;

use bladecam_kernel_cam::{GeneratedToolpath, PlanOutcome};
use bladecam_kernel_geom::{LaminationSchedule, Section, SurfaceRole};
use bladecam_kernel_stocksim::{SimulationStep, Stock};
use bladecam_kernel_task::{Stage, TaskContext};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::session::Session;
use crate::handle::TaskHandle;

/// A request to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Sample one section into a definition.
    Sample {
        /// Definition to extend.
        role: SurfaceRole,
        /// Parametric station in `[0, 1]`.
        station: f64,
    },
    /// Rebuild the model.
    Rebuild {
        /// Layered re-sampling before lofting.
        lamination: Option<LaminationSchedule>,
    },
    /// Plan an operation without storing a toolpath.
    PlanOperation {
        /// Operation id.
        operation: Uuid,
    },
    /// Generate and store an operation's toolpath.
    GenerateToolpath {
        /// Operation id.
        operation: Uuid,
    },
    /// Start simulating an operation's toolpath against a stock.
    StartSimulation {
        /// Operation id.
        operation: Uuid,
        /// Stock to cut.
        stock: Stock,
        /// Critical gap for shank and holder, the configured one when absent.
        #[serde(default)]
        tolerance: Option<f64>,
    },
    /// Advance an operation's active simulation.
    SimulateStep {
        /// Operation id.
        operation: Uuid,
        /// Steps to compute.
        steps: usize,
    },
}

impl Request {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Sample { .. } => "sample",
            Request::Rebuild { .. } => "rebuild",
            Request::PlanOperation { .. } => "plan",
            Request::GenerateToolpath { .. } => "generate",
            Request::StartSimulation { .. } => "start-simulation",
            Request::SimulateStep { .. } => "simulate-step",
        }
    }
}

/// Result of a [`Request`].
#[derive(Debug, Clone)]
pub enum Response {
    /// The new section.
    Sampled(Section),
    /// New model revision.
    Rebuilt {
        /// Revision after the commit.
        revision: u64,
    },
    /// Planned passes.
    Planned(PlanOutcome),
    /// The stored toolpath.
    Generated(Arc<GeneratedToolpath>),
    /// Simulation attached.
    SimulationStarted {
        /// Segments to replay.
        segments: usize,
    },
    /// Steps computed, fewer than requested at the end of the toolpath.
    Simulated(Vec<SimulationStep>),
}

impl Session {
    /// Run a request on the calling thread.
    pub fn execute(&self, request: Request, ctx: &TaskContext) -> Result<Response> {
        let name = request.name();
        let started = Instant::now();
        let response = match request {
            Request::Sample { role, station } => {
                Response::Sampled(self.sample(role, station, ctx)?)
            }
            Request::Rebuild { lamination } => Response::Rebuilt {
                revision: self.rebuild(lamination.as_ref(), ctx)?,
            },
            Request::PlanOperation { operation } => {
                Response::Planned(self.plan_operation(operation)?)
            }
            Request::GenerateToolpath { operation } => {
                Response::Generated(self.generate(operation, ctx)?)
            }
            Request::StartSimulation {
                operation,
                stock,
                tolerance,
            } => {
                let mut settings = self.config().simulation.settings();
                if let Some(gap) = tolerance {
                    settings.critical_gap = gap;
                }
                Response::SimulationStarted {
                    segments: self.start_simulation_with(operation, stock, settings)?,
                }
            }
            Request::SimulateStep { operation, steps } => {
                ctx.ensure_active(Stage::Simulation, 0, steps)?;
                Response::Simulated(self.simulate_step(operation, steps)?)
            }
        };
        tracing::info!(
            request = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(response)
    }

    /// Run a request on a worker thread.
    pub fn spawn(self: &Arc<Self>, request: Request) -> Result<TaskHandle<Response>> {
        let session = Arc::clone(self);
        let name = format!("bladecam-{}", request.name());
        TaskHandle::spawn(&name, move |ctx| session.execute(request, ctx))
    }
}
