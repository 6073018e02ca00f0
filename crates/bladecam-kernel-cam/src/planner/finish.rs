//! Wall, hub and fillet finishing.

use bladecam_kernel_geom::{BladeSide, FilletBoundary};
use bladecam_kernel_math::Vec3;

use crate::error::{invalid, CamError, Result};
use crate::operation::CutDirection;
use crate::passage::Wall;
use crate::planner::pattern::{chord_points, level_passes};
use crate::planner::{levels, Pass, PathPoint, PlanContext, Row, Stage};

pub(crate) fn plan_blade_finish(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let levels = levels(ctx)?;
    let (lo, ro) = ctx.offsets(0.0);
    Ok(wall_passes(ctx, &levels, lo, ro, Stage::Finish))
}

/// Per level, one row along each wall: the machined blade leading to
/// trailing edge, then the adjacent blade back.
pub(crate) fn wall_passes(
    ctx: &mut PlanContext<'_>,
    levels: &[f64],
    lo: f64,
    ro: f64,
    stage: Stage,
) -> Vec<Pass> {
    let climb = ctx.op.params.direction == CutDirection::Climb;
    let mut passes = Vec::with_capacity(levels.len());
    for &depth in levels {
        let h = ctx.passage.height_at_depth(depth);
        if ctx.passage.max_gap(h, lo, ro) < 0.0 {
            ctx.warn(format!("level at {depth:.3} mm is narrower than the tool"));
            continue;
        }
        let left = wall_row(ctx, Wall::Left, h, lo, ro);
        let right = wall_row(ctx, Wall::Right, h, lo, ro).reversed();
        let rows = if climb {
            vec![left, right]
        } else {
            vec![right.reversed(), left.reversed()]
        };
        passes.push(Pass::new(stage, depth, rows));
    }
    passes
}

fn wall_row(ctx: &PlanContext<'_>, wall: Wall, h: f64, lo: f64, ro: f64) -> Row {
    let w = match wall {
        Wall::Left => 0.0,
        Wall::Right => 1.0,
    };
    Row::new(
        chord_points(ctx, h, w, lo, ro)
            .into_iter()
            .map(|(u, p)| PathPoint::new(p, ctx.passage.wall(wall, u, h).1))
            .collect(),
    )
}

/// A single floor level at the hub allowance, laid out with the
/// operation's pattern.
pub(crate) fn plan_hub_finish(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let depth = ctx.max_depth();
    let (lo, ro) = ctx.offsets(0.0);
    let pattern = ctx.op.params.pattern;
    Ok(level_passes(ctx, &[depth], pattern, lo, ro, Stage::Finish))
}

/// Rows around the fillet arc of each wall, from the wall down to the floor.
///
/// The tool is treated as a ball of its tip radius; its centre runs on an
/// arc concentric with the fillet.
pub(crate) fn plan_fillet_finish(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let spec = ctx
        .model
        .fillet()
        .cloned()
        .ok_or_else(|| CamError::MissingSurface("fillet".into()))?;
    let params = &ctx.op.params;
    let r = ctx.tool_radius;
    let n = params.points_per_row;
    let (h_b, s_sign) = match spec.boundary() {
        FilletBoundary::Hub => (0.0, 1.0),
        FilletBoundary::Shroud => (1.0, -1.0),
    };
    let depth = match spec.boundary() {
        FilletBoundary::Hub => ctx.passage.blade_height() + params.allowances.shroud,
        FilletBoundary::Shroud => params.allowances.shroud,
    };

    let mut passes = Vec::with_capacity(2);
    for (wall, side, allowance) in [
        (Wall::Left, BladeSide::B, params.allowances.blade),
        (Wall::Right, BladeSide::A, params.allowances.adjacent),
    ] {
        let mid = spec.radius_at(side, 0.5);
        let rho_mid = mid - r - allowance;
        if rho_mid < 0.0 {
            return Err(invalid(
                "tool",
                format!("radius {r} plus allowance {allowance} exceeds the {side:?}-side fillet radius {mid}"),
            ));
        }
        let arc = rho_mid * std::f64::consts::FRAC_PI_2;
        let count = ((arc / params.stepover).ceil() as usize + 1).max(2);
        let mut rows = Vec::with_capacity(count);
        for k in 0..count {
            let theta = std::f64::consts::FRAC_PI_2 * k as f64 / (count - 1) as f64;
            let points: Vec<PathPoint> = (0..n)
                .map(|i| {
                    let u = i as f64 / (n - 1) as f64;
                    let (p, wall_n) = ctx.passage.wall(wall, u, h_b);
                    let s: Vec3 = ctx.passage.up(u, h_b) * s_sign;
                    let rf = spec.radius_at(side, u);
                    let rho = (rf - r - allowance).max(0.0);
                    let centre = p + wall_n * rf + s * rf;
                    let dir = -wall_n * theta.cos() - s * theta.sin();
                    let ball = centre + dir * rho;
                    PathPoint::new(ball - s * r, -dir)
                })
                .collect();
            let row = Row::new(points);
            rows.push(if k % 2 == 0 { row } else { row.reversed() });
        }
        passes.push(Pass::new(Stage::Finish, depth, rows));
    }
    Ok(passes)
}
