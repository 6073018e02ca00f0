//! Operation planning: from an operation and a rebuilt model to ordered
//! passes of cutting rows.
//!
//! Planning only decides where the tool tip goes and which surface it
//! touches. Tool axes, link moves and feeds are added downstream by
//! [`resolve_axis`](crate::resolve_axis) and [`assemble`](crate::assemble).

mod combined;
mod depth;
mod edge;
mod finish;
mod pattern;
pub mod trochoidal;

use bladecam_kernel_geom::BladeGeometryModel;
use bladecam_kernel_math::{Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};
use crate::operation::{Operation, OperationKind};
use crate::passage::Passage;

pub(crate) use depth::{levels, range as depth_range};

/// Machining stage a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Bulk removal.
    Rough,
    /// Intermediate wall pass.
    SemiFinish,
    /// Final surface pass.
    Finish,
}

/// A tool-tip point with the normal of the surface it machines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Tool-tip position.
    pub position: Point3,
    /// Unit contact normal.
    pub normal: Vec3,
}

impl PathPoint {
    /// Create a path point.
    pub fn new(position: Point3, normal: Vec3) -> Self {
        Self { position, normal }
    }
}

/// One cutting sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Points in cutting order.
    pub points: Vec<PathPoint>,
    /// Lift clear before moving onto this row.
    pub lift: bool,
}

impl Row {
    /// Row reached by a direct step-over.
    pub fn new(points: Vec<PathPoint>) -> Self {
        Self {
            points,
            lift: false,
        }
    }

    /// Row reached by lifting, moving and plunging.
    pub fn lifted(points: Vec<PathPoint>) -> Self {
        Self { points, lift: true }
    }

    /// Same row cut the other way.
    pub fn reversed(mut self) -> Self {
        self.points.reverse();
        self
    }
}

/// Rows cut at one depth without leaving the material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    /// Position in the plan.
    pub index: usize,
    /// Stage.
    pub stage: Stage,
    /// Depth below the shroud allowance in mm.
    pub depth: f64,
    /// Rows in pattern order.
    pub rows: Vec<Row>,
}

impl Pass {
    pub(crate) fn new(stage: Stage, depth: f64, rows: Vec<Row>) -> Self {
        Self {
            index: 0,
            stage,
            depth,
            rows,
        }
    }

    /// Total number of cutting points.
    pub fn point_count(&self) -> usize {
        self.rows.iter().map(|r| r.points.len()).sum()
    }
}

/// Result of planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    /// Passes in machining order.
    pub passes: Vec<Pass>,
    /// Non-fatal findings, such as an unfinished last layer.
    pub warnings: Vec<String>,
}

/// State shared by the per-kind planners.
pub(crate) struct PlanContext<'a> {
    pub op: &'a Operation,
    pub model: &'a BladeGeometryModel,
    pub passage: Passage,
    pub tool_radius: f64,
    pub warnings: Vec<String>,
}

impl PlanContext<'_> {
    /// Wall offsets for the tool centre with an extra allowance on both walls.
    pub fn offsets(&self, extra: f64) -> (f64, f64) {
        let a = &self.op.params.allowances;
        (
            self.tool_radius + a.blade + extra,
            self.tool_radius + a.adjacent + extra,
        )
    }

    /// Deepest level the hub allowance permits.
    pub fn max_depth(&self) -> f64 {
        let a = &self.op.params.allowances;
        self.passage.blade_height() + a.shroud - a.hub
    }

    pub fn warn(&mut self, message: String) {
        tracing::warn!(operation = %self.op.name, "{message}");
        self.warnings.push(message);
    }
}

type PlannerFn = fn(&mut PlanContext<'_>) -> Result<Vec<Pass>>;

/// Planner per operation kind.
const PLANNERS: &[(OperationKind, PlannerFn)] = &[
    (OperationKind::Rough, pattern::plan_rough),
    (OperationKind::BladeFinish, finish::plan_blade_finish),
    (OperationKind::HubFinish, finish::plan_hub_finish),
    (OperationKind::FilletFinish, finish::plan_fillet_finish),
    (OperationKind::Trochoidal, pattern::plan_trochoidal),
    (OperationKind::Combined, combined::plan_combined),
    (OperationKind::EdgeFinish, edge::plan_edge_finish),
    (OperationKind::EdgePlunge, edge::plan_edge_plunge),
];

/// Plan the passes of `operation` on a rebuilt `model`.
///
/// Parameters are validated before any geometry is touched.
///
/// # Errors
///
/// * [`CamError::InvalidParameter`] / [`CamError::InvalidRange`] for bad parameters
/// * [`CamError::MissingSurface`] when the model lacks a needed surface
/// * [`CamError::EmptyPassSet`] when nothing is left to cut
pub fn plan(operation: &Operation, model: &BladeGeometryModel) -> Result<PlanOutcome> {
    operation.validate()?;
    let passage = Passage::from_model(
        model,
        operation.params.splitter,
        operation.params.allowances.shroud,
    )?;
    let planner = PLANNERS
        .iter()
        .find(|(kind, _)| *kind == operation.kind)
        .map(|(_, f)| *f)
        .ok_or_else(|| CamError::EmptyPassSet {
            operation: operation.name.clone(),
            reason: format!("no planner for {}", operation.kind),
        })?;
    let mut ctx = PlanContext {
        op: operation,
        model,
        passage,
        tool_radius: operation.cutter.tool.radius(),
        warnings: Vec::new(),
    };
    let mut passes: Vec<Pass> = planner(&mut ctx)?
        .into_iter()
        .map(|mut p| {
            p.rows.retain(|r| !r.points.is_empty());
            p
        })
        .filter(|p| !p.rows.is_empty())
        .collect();
    if passes.is_empty() {
        return Err(CamError::EmptyPassSet {
            operation: operation.name.clone(),
            reason: "no level leaves room for the tool".into(),
        });
    }
    for (i, pass) in passes.iter_mut().enumerate() {
        pass.index = i;
    }
    tracing::debug!(
        operation = %operation.name,
        kind = %operation.kind,
        passes = passes.len(),
        warnings = ctx.warnings.len(),
        "planned"
    );
    Ok(PlanOutcome {
        passes,
        warnings: ctx.warnings,
    })
}
