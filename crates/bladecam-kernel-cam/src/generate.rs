//! End-to-end toolpath generation for one operation.

use bladecam_kernel_geom::BladeGeometryModel;
use bladecam_kernel_task::{Stage, TaskContext};
use serde::{Deserialize, Serialize};

use crate::assembler::{assemble, Toolpath};
use crate::axis::{resolve_axis, RowAxes};
use crate::error::Result;
use crate::operation::Operation;
use crate::planner::{plan, Pass};
use crate::zones::check_pass;

/// Output of [`generate_toolpath`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedToolpath {
    /// Planned passes.
    pub passes: Vec<Pass>,
    /// Resolved axes, one entry per pass.
    pub axes: Vec<RowAxes>,
    /// Assembled toolpath.
    pub toolpath: Toolpath,
    /// Planner warnings.
    pub warnings: Vec<String>,
}

/// Plan, orient, check and link `operation` on a rebuilt `model`.
///
/// Reports one checkpoint per pass; cancellation is honoured between
/// passes and nothing partial is returned.
pub fn generate_toolpath(
    operation: &Operation,
    model: &BladeGeometryModel,
    ctx: &TaskContext,
) -> Result<GeneratedToolpath> {
    ctx.ensure_active(Stage::Planning, 0, 1)?;
    let outcome = plan(operation, model)?;
    ctx.checkpoint(Stage::Planning, 1, 1, operation.name.as_str())?;

    let params = &operation.params;
    let total = outcome.passes.len();
    let mut axes = Vec::with_capacity(total);
    for (i, pass) in outcome.passes.iter().enumerate() {
        let pass_axes = resolve_axis(pass, &params.axis)?;
        check_pass(pass, &pass_axes, &operation.cutter, &params.zones)?;
        axes.push(pass_axes);
        ctx.checkpoint(Stage::Generation, i + 1, total, format!("pass {i}"))?;
    }

    let toolpath = assemble(
        &outcome.passes,
        &axes,
        &params.linking,
        &operation.cutter,
        &params.feeds,
    )?;
    tracing::info!(
        operation = %operation.name,
        passes = total,
        segments = toolpath.len(),
        cutting_length = toolpath.cutting_length(),
        "toolpath generated"
    );
    Ok(GeneratedToolpath {
        passes: outcome.passes,
        axes,
        toolpath,
        warnings: outcome.warnings,
    })
}
