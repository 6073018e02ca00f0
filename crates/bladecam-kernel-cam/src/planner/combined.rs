//! Combined three-stage milling: rough, semi-finish and finish in one
//! operation.

use crate::error::Result;
use crate::operation::StageOrdering;
use crate::planner::finish::wall_passes;
use crate::planner::pattern::level_passes;
use crate::planner::{depth_range, levels, Pass, PlanContext, Stage};

pub(crate) fn plan_combined(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let rough_levels = levels(ctx)?;
    let (start, _) = depth_range(ctx);
    let c = ctx.op.params.combined;
    let pattern = ctx.op.params.pattern;

    // Each rough interval is split into `pass_count_ratio` wall levels.
    let mut wall_levels: Vec<(usize, f64)> = Vec::new();
    let mut prev = start;
    for (i, &depth) in rough_levels.iter().enumerate() {
        for j in 1..=c.pass_count_ratio {
            wall_levels.push((i, prev + (depth - prev) * j as f64 / c.pass_count_ratio as f64));
        }
        prev = depth;
    }

    let (lo, ro) = ctx.offsets(c.rough_allowance);
    let rough: Vec<Option<Pass>> = rough_levels
        .iter()
        .map(|&d| level_passes(ctx, &[d], pattern, lo, ro, Stage::Rough).pop())
        .collect();
    let (lo, ro) = ctx.offsets(c.semi_finish_allowance);
    let semi: Vec<Option<Pass>> = wall_levels
        .iter()
        .map(|&(_, d)| wall_passes(ctx, &[d], lo, ro, Stage::SemiFinish).pop())
        .collect();
    let (lo, ro) = ctx.offsets(0.0);
    let finish: Vec<Option<Pass>> = wall_levels
        .iter()
        .map(|&(_, d)| wall_passes(ctx, &[d], lo, ro, Stage::Finish).pop())
        .collect();

    let ordered: Vec<Option<Pass>> = match c.ordering {
        StageOrdering::Longitudinal => rough.into_iter().chain(semi).chain(finish).collect(),
        StageOrdering::Triangulated => {
            let owners: Vec<usize> = wall_levels.iter().map(|(i, _)| *i).collect();
            triangulate(rough, semi, finish, &owners, c.levels_offset)
        }
    };
    Ok(ordered.into_iter().flatten().collect())
}

/// Interleave stages by depth: after each rough level come the semi-finish
/// levels it opens, and finish levels trail semi-finish by `offset`.
fn triangulate<T>(
    rough: Vec<T>,
    semi: Vec<T>,
    finish: Vec<T>,
    owners: &[usize],
    offset: usize,
) -> Vec<T> {
    let total = rough.len() + semi.len() + finish.len();
    let mut out = Vec::with_capacity(total);
    let mut semi = semi.into_iter().zip(owners.iter().copied()).peekable();
    let mut finish = finish.into_iter();
    let mut semi_done = 0;
    let mut finish_done = 0;
    for (i, r) in rough.into_iter().enumerate() {
        out.push(r);
        while let Some((s, _)) = semi.next_if(|(_, owner)| *owner == i) {
            out.push(s);
            semi_done += 1;
            while finish_done + offset < semi_done {
                match finish.next() {
                    Some(f) => out.push(f),
                    None => break,
                }
                finish_done += 1;
            }
        }
    }
    out.extend(semi.map(|(s, _)| s));
    out.extend(finish);
    out
}
