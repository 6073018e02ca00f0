//! Row layouts inside one depth level, and the roughing planners built on
//! them.

use bladecam_kernel_math::{Point2, Point3};

use crate::error::Result;
use crate::operation::{CutDirection, CutPattern, EdgeExtension, SlotStart, WallSide};
use crate::passage::Wall;
use crate::planner::trochoidal::generate_trochoidal;
use crate::planner::{levels, Pass, PathPoint, PlanContext, Row, Stage};

const EPS: f64 = 1e-9;

pub(crate) fn plan_rough(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let levels = levels(ctx)?;
    let (lo, ro) = ctx.offsets(0.0);
    let pattern = ctx.op.params.pattern;
    Ok(level_passes(ctx, &levels, pattern, lo, ro, Stage::Rough))
}

pub(crate) fn plan_trochoidal(ctx: &mut PlanContext<'_>) -> Result<Vec<Pass>> {
    let levels = levels(ctx)?;
    let (lo, ro) = ctx.offsets(0.0);
    Ok(level_passes(ctx, &levels, CutPattern::Trochoidal, lo, ro, Stage::Rough))
}

/// One pass per level; levels with no room for the tool are reported and skipped.
pub(crate) fn level_passes(
    ctx: &mut PlanContext<'_>,
    levels: &[f64],
    pattern: CutPattern,
    lo: f64,
    ro: f64,
    stage: Stage,
) -> Vec<Pass> {
    let mut passes = Vec::with_capacity(levels.len());
    for &depth in levels {
        let h = ctx.passage.height_at_depth(depth);
        let rows = level_rows(ctx, h, pattern, lo, ro);
        if rows.is_empty() {
            ctx.warn(format!("level at {depth:.3} mm is narrower than the tool"));
            continue;
        }
        passes.push(Pass::new(stage, depth, rows));
    }
    passes
}

/// Lateral fractions of rows spaced at most `stepover` apart across `width`.
pub(crate) fn fractions(width: f64, stepover: f64) -> Vec<f64> {
    if width <= EPS {
        return vec![0.5];
    }
    let n = (width / stepover - EPS).ceil() as usize + 1;
    (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
}

/// Rows at span fraction `h` between walls offset by `lo` and `ro`.
pub(crate) fn level_rows(
    ctx: &PlanContext<'_>,
    h: f64,
    pattern: CutPattern,
    lo: f64,
    ro: f64,
) -> Vec<Row> {
    let width = ctx.passage.max_gap(h, lo, ro);
    if width < -EPS {
        return Vec::new();
    }
    let params = &ctx.op.params;
    let climb = params.direction == CutDirection::Climb;
    let stepover = params.stepover;
    let orient = |row: Row, forward: bool| if forward { row } else { row.reversed() };

    match pattern {
        CutPattern::ZigZag => fractions(width, stepover)
            .into_iter()
            .enumerate()
            .map(|(i, w)| orient(chord_row(ctx, h, w, lo, ro), (i % 2 == 0) == climb))
            .collect(),
        CutPattern::SingleDirection => fractions(width, stepover)
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                let row = orient(chord_row(ctx, h, w, lo, ro), climb);
                Row {
                    lift: i > 0,
                    ..row
                }
            })
            .collect(),
        CutPattern::Helical => helical_rows(ctx, h, width, lo, ro, climb),
        CutPattern::Trochoidal => trochoidal_rows(ctx, h, width, lo, ro, climb),
        CutPattern::CenterSlot { start } => {
            let first_forward = (start == SlotStart::FromLeading) == climb;
            center_out(width, stepover)
                .into_iter()
                .enumerate()
                .map(|(i, w)| orient(chord_row(ctx, h, w, lo, ro), (i % 2 == 0) == first_forward))
                .collect()
        }
        CutPattern::WallToWall { from } => wall_to_wall_rows(ctx, h, width, lo, ro, from, climb),
    }
}

/// Center first, then alternately right and left of it out to the walls.
fn center_out(width: f64, stepover: f64) -> Vec<f64> {
    let mut out = vec![0.5];
    if width <= EPS {
        return out;
    }
    let dw = stepover / width;
    let mut k = 1;
    loop {
        let right = (0.5 + k as f64 * dw).min(1.0);
        let left = (0.5 - k as f64 * dw).max(0.0);
        out.push(right);
        out.push(left);
        if right >= 1.0 {
            break;
        }
        k += 1;
    }
    out
}

/// Chord-wise row at lateral fraction `w`, leading to trailing edge,
/// including edge extensions.
pub(crate) fn chord_row(ctx: &PlanContext<'_>, h: f64, w: f64, lo: f64, ro: f64) -> Row {
    Row::new(
        chord_points(ctx, h, w, lo, ro)
            .into_iter()
            .map(|(u, p)| PathPoint::new(p, ctx.passage.up(u, h)))
            .collect(),
    )
}

/// Extension length past each edge, including the blank allowance.
pub(crate) fn extension_length(ctx: &PlanContext<'_>) -> f64 {
    let params = &ctx.op.params;
    params.extension.length() + params.allowances.blank
}

/// `(u, point)` pairs along the chord with edge extensions.
pub(crate) fn chord_points(
    ctx: &PlanContext<'_>,
    h: f64,
    w: f64,
    lo: f64,
    ro: f64,
) -> Vec<(f64, Point3)> {
    let n = ctx.op.params.points_per_row;
    let length = extension_length(ctx);
    let spacing = ctx.passage.chord_length(h) / (n - 1) as f64;
    let m = if length > EPS {
        ((length / spacing.max(EPS)).ceil() as usize).max(1)
    } else {
        0
    };

    let mut out = Vec::with_capacity(n + 2 * m);
    for k in (1..=m).rev() {
        out.push(extend(ctx, h, w, lo, ro, false, length * k as f64 / m as f64));
    }
    for i in 0..n {
        let u = i as f64 / (n - 1) as f64;
        out.push((u, ctx.passage.point(u, h, w, lo, ro)));
    }
    for k in 1..=m {
        out.push(extend(ctx, h, w, lo, ro, true, length * k as f64 / m as f64));
    }
    out
}

/// Point `s` mm past the leading or trailing edge.
fn extend(
    ctx: &PlanContext<'_>,
    h: f64,
    w: f64,
    lo: f64,
    ro: f64,
    trailing: bool,
    s: f64,
) -> (f64, Point3) {
    let passage = &ctx.passage;
    let (u_edge, sign) = if trailing { (1.0, 1.0) } else { (0.0, -1.0) };
    let u = u_edge + sign * passage.chord_fraction(s, h);
    let curl = match ctx.op.params.extension {
        EdgeExtension::Curl { curl_angle, .. } if curl_angle.abs() > EPS => curl_angle.to_radians(),
        _ => return (u, passage.point(u, h, w, lo, ro)),
    };

    let edge = passage.point(u_edge, h, w, lo, ro);
    let tangent = passage.chord_dir(u_edge, h) * sign;
    let (_, nl) = passage.wall(Wall::Left, u_edge, h);
    let side = (nl - tangent * tangent.dot(&nl))
        .try_normalize(1e-12)
        .unwrap_or(nl);
    let rho = extension_length(ctx) / curl;
    let phi = s / rho;
    (
        u,
        edge + tangent * (rho * phi.sin()) + side * (rho * (1.0 - phi.cos())),
    )
}

/// Closed rings moving inward from the walls; an odd row count ends with
/// a center row.
fn helical_rows(ctx: &PlanContext<'_>, h: f64, width: f64, lo: f64, ro: f64, climb: bool) -> Vec<Row> {
    let fr = fractions(width, ctx.op.params.stepover);
    let n = fr.len();
    let mut rows = Vec::with_capacity(n.div_ceil(2));
    for k in 0..n.div_ceil(2) {
        let (wl, wr) = (fr[k], fr[n - 1 - k]);
        if wr - wl < EPS {
            rows.push(chord_row(ctx, h, wl, lo, ro));
            continue;
        }
        let left = chord_row(ctx, h, wl, lo, ro).points;
        let right = chord_row(ctx, h, wr, lo, ro).points;
        let mut ring = Vec::with_capacity(left.len() + right.len() + 1);
        ring.extend(left.iter().copied());
        ring.extend(right.iter().rev().copied());
        ring.extend(left.first().copied());
        let row = Row::new(ring);
        rows.push(if climb { row } else { row.reversed() });
    }
    rows
}

/// Trochoidal loops along rows spaced across the passage.
fn trochoidal_rows(ctx: &PlanContext<'_>, h: f64, width: f64, lo: f64, ro: f64, climb: bool) -> Vec<Row> {
    let params = &ctx.op.params;
    let tp = params.trochoidal;
    let loop_r = (ctx.tool_radius * tp.loop_diameter_ratio).min(width.max(0.0) / 2.0);
    let chord = ctx.passage.chord_length(h);
    if chord <= EPS {
        return Vec::new();
    }
    let ext = extension_length(ctx);
    let usable = width - 2.0 * loop_r;
    let centres: Vec<f64> = if usable <= EPS {
        vec![0.0]
    } else {
        fractions(usable, params.stepover)
            .into_iter()
            .map(|f| -usable / 2.0 + f * usable)
            .collect()
    };

    centres
        .into_iter()
        .enumerate()
        .map(|(i, l)| {
            let path = generate_trochoidal(Point2::new(-ext, l), Point2::new(chord + ext, l), loop_r, &tp);
            let points = path
                .into_iter()
                .map(|p| {
                    let u = p.x / chord;
                    let w = if width > EPS { 0.5 + p.y / width } else { 0.5 };
                    PathPoint::new(ctx.passage.point(u, h, w, lo, ro), ctx.passage.up(u, h))
                })
                .collect();
            let row = Row::new(points);
            if (i % 2 == 0) == climb {
                row
            } else {
                row.reversed()
            }
        })
        .collect()
}

/// Lateral rows from wall to wall, stepping along the chord.
fn wall_to_wall_rows(
    ctx: &PlanContext<'_>,
    h: f64,
    width: f64,
    lo: f64,
    ro: f64,
    from: WallSide,
    climb: bool,
) -> Vec<Row> {
    let params = &ctx.op.params;
    let chord = ctx.passage.chord_length(h);
    if chord <= EPS {
        return Vec::new();
    }
    let ext = extension_length(ctx);
    let span = chord + 2.0 * ext;
    let count = (span / params.stepover - EPS).ceil() as usize + 1;
    let lateral = if width > EPS { params.points_per_row } else { 1 };
    let mut stations: Vec<f64> = (0..count)
        .map(|j| (-ext + span * j as f64 / (count - 1) as f64) / chord)
        .collect();
    if !climb {
        stations.reverse();
    }
    stations
        .into_iter()
        .enumerate()
        .map(|(j, u)| {
            let points: Vec<PathPoint> = (0..lateral)
                .map(|k| {
                    let w = if lateral > 1 {
                        k as f64 / (lateral - 1) as f64
                    } else {
                        0.5
                    };
                    PathPoint::new(ctx.passage.point(u, h, w, lo, ro), ctx.passage.up(u, h))
                })
                .collect();
            let row = Row::new(points);
            if (j % 2 == 0) == (from == WallSide::FromLeft) {
                row
            } else {
                row.reversed()
            }
        })
        .collect()
}
