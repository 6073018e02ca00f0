//! Leading and trailing edge finishing and plunging.
//!
//! Both wrap the cutter around the edge on a half circle from the
//! machined blade's B side, past the edge, to its A side, concentric with
//! the edge blend.

use bladecam_kernel_math::{lerp_point, Vec3};

use crate::error::Result;
use crate::operation::{CutDirection, EdgeSelect};
use crate::planner::{depth_range, levels, Pass, PathPoint, PlanContext, Row, Stage};

fn selected(edges: EdgeSelect) -> &'static [bool] {
    match edges {
        EdgeSelect::Leading => &[false],
        EdgeSelect::Trailing => &[true],
        EdgeSelect::Both => &[false, true],
    }
}

/// Half circle around an edge at span fraction `h`, B side first.
fn edge_arc(ctx: &PlanContext<'_>, trailing: bool, h: f64) -> Vec<PathPoint> {
    let passage = &ctx.passage;
    let u = if trailing { 1.0 } else { 0.0 };
    let b = passage.blade_side(false, u, h);
    let a = passage.blade_side(true, u, h);
    let centre = lerp_point(&a, &b, 0.5);
    let half = (b - a).norm() / 2.0;
    let e1 = (b - a).try_normalize(1e-12).unwrap_or_else(Vec3::y);
    let t = passage.chord_dir(u, h) * if trailing { 1.0 } else { -1.0 };
    let e2 = (t - e1 * e1.dot(&t)).try_normalize(1e-12).unwrap_or(t);
    let rho = half + ctx.tool_radius + ctx.op.params.allowances.blade;
    let m = ctx.op.params.edge.arc_points;
    (0..m)
        .map(|k| {
            let phi = std::f64::consts::PI * k as f64 / (m - 1) as f64;
            let dir = e1 * phi.cos() + e2 * phi.sin();
            PathPoint::new(centre + dir * rho, dir)
        })
        .collect()
}

pub(crate) fn plan_edge_finish(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let levels = levels(ctx)?;
    let climb = ctx.op.params.direction == CutDirection::Climb;
    let mut passes = Vec::new();
    for &trailing in selected(ctx.op.params.edge.edges) {
        for (i, &depth) in levels.iter().enumerate() {
            let h = ctx.passage.height_at_depth(depth);
            let row = Row::new(edge_arc(ctx, trailing, h));
            let row = if (i % 2 == 0) == climb { row } else { row.reversed() };
            passes.push(Pass::new(Stage::Finish, depth, vec![row]));
        }
    }
    Ok(passes)
}

/// One pass per edge; each row plunges along the span at one arc position.
pub(crate) fn plan_edge_plunge(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let levels = levels(ctx)?;
    let (start, _) = depth_range(ctx);
    let depths: Vec<f64> = std::iter::once(start).chain(levels.iter().copied()).collect();
    let last = depths.last().copied().unwrap_or(start);
    let climb = ctx.op.params.direction == CutDirection::Climb;
    let mut passes = Vec::new();
    for &trailing in selected(ctx.op.params.edge.edges) {
        let arcs: Vec<Vec<PathPoint>> = depths
            .iter()
            .map(|&d| edge_arc(ctx, trailing, ctx.passage.height_at_depth(d)))
            .collect();
        let m = ctx.op.params.edge.arc_points;
        let mut order: Vec<usize> = (0..m).collect();
        if !climb {
            order.reverse();
        }
        let rows = order
            .into_iter()
            .enumerate()
            .map(|(i, k)| {
                let points = arcs.iter().map(|arc| arc[k]).collect();
                if i == 0 {
                    Row::new(points)
                } else {
                    Row::lifted(points)
                }
            })
            .collect();
        passes.push(Pass::new(Stage::Finish, last, rows));
    }
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::planner::plan;
    use crate::planner::tests::{cascade_model, rough_op};
    use bladecam_kernel_math::Point3;

    #[test]
    fn test_edge_finish_wraps_leading_edge() {
        let mut op = rough_op();
        op.kind = OperationKind::EdgeFinish;
        op.params.edge.edges = EdgeSelect::Leading;
        op.params.edge.arc_points = 3;
        let outcome = plan(&op, &cascade_model()).unwrap();
        assert_eq!(outcome.passes.len(), 3);
        let arc = &outcome.passes[0].rows[0].points;
        // Blade 2 mm thick, tool radius 2: arc radius 3 about (0, -1).
        assert!((arc[0].position - Point3::new(0.0, 2.0, 7.0)).norm() < 1e-9);
        assert!((arc[1].position - Point3::new(-3.0, -1.0, 7.0)).norm() < 1e-9);
        assert!((arc[2].position - Point3::new(0.0, -4.0, 7.0)).norm() < 1e-9);
        assert!((arc[1].normal + Vec3::x()).norm() < 1e-9);
        // The next level runs the other way.
        let next = &outcome.passes[1].rows[0].points;
        assert!((next[0].position.y + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_edge_plunge_rows_run_down_the_span() {
        let mut op = rough_op();
        op.kind = OperationKind::EdgePlunge;
        op.params.edge.arc_points = 5;
        let outcome = plan(&op, &cascade_model()).unwrap();
        assert_eq!(outcome.passes.len(), 2);
        for pass in &outcome.passes {
            assert_eq!(pass.rows.len(), 5);
            assert!(!pass.rows[0].lift && pass.rows[4].lift);
            let z: Vec<f64> = pass.rows[2].points.iter().map(|p| p.position.z).collect();
            assert_eq!(z.len(), 4);
            assert!(z.windows(2).all(|w| w[1] < w[0]));
            assert!((z[0] - 8.0).abs() < 1e-9 && (z[3] - 5.0).abs() < 1e-9);
        }
        // Trailing edge arc passes behind the blade.
        let tip = outcome.passes[1].rows[2].points[0].position;
        assert!((tip.x - 19.0).abs() < 1e-9);
    }
}
