//! Depth partitioning into levels.

use crate::error::{invalid, CamError, Result};
use crate::operation::{DepthMode, LayerNotFinished};
use crate::planner::PlanContext;

const EPS: f64 = 1e-9;

/// Upper bound on depth levels in one operation.
pub(crate) const MAX_LEVELS: usize = 10_000;

/// Depth range `(start, end)` of the operation, clamped to the hub allowance.
pub(crate) fn range(ctx: &PlanContext<'_>) -> (f64, f64) {
    let depth = ctx.op.params.depth;
    let max_depth = ctx.max_depth();
    let height = ctx.passage.blade_height();
    let shroud = ctx.op.params.allowances.shroud;
    let (start, end) = match depth.mode {
        DepthMode::PercentRange { start, end, .. } => {
            (shroud + height * start / 100.0, shroud + height * end / 100.0)
        }
        _ => (depth.start, depth.end.unwrap_or(max_depth)),
    };
    (start, end.min(max_depth))
}

/// Level depths, shallowest first, in mm below the shroud allowance.
pub(crate) fn levels(ctx: &mut PlanContext<'_>) -> Result<Vec<f64>> {
    let depth = ctx.op.params.depth;
    let (start, end) = range(ctx);
    if start >= end - EPS {
        return Err(CamError::EmptyPassSet {
            operation: ctx.op.name.clone(),
            reason: format!("depth range {start:.3}..{end:.3} mm is empty"),
        });
    }

    let count = match depth.mode {
        DepthMode::ConstantDistance { step } => ((end - start) / step).floor(),
        DepthMode::PassCount { count, step } => ((end - start) / step).floor().min(count as f64),
        DepthMode::LayerCount { layers } | DepthMode::PercentRange { layers, .. } => layers as f64,
    };
    if count > MAX_LEVELS as f64 {
        return Err(invalid(
            "depth",
            format!("{count} levels over {:.3} mm exceeds {MAX_LEVELS}", end - start),
        ));
    }

    let mut levels = match depth.mode {
        DepthMode::ConstantDistance { step } => stepped(start, end, step, usize::MAX),
        DepthMode::PassCount { count, step } => stepped(start, end, step, count),
        DepthMode::LayerCount { layers } | DepthMode::PercentRange { layers, .. } => (1..=layers)
            .map(|i| start + (end - start) * i as f64 / layers as f64)
            .collect(),
    };

    let last = levels.last().copied().unwrap_or(start);
    if last < end - EPS {
        match depth.not_finished {
            LayerNotFinished::Ignore => {}
            LayerNotFinished::Warn => ctx.warn(format!(
                "last level at {last:.3} mm stops {:.3} mm short of {end:.3} mm",
                end - last
            )),
            LayerNotFinished::AutoComplete => levels.push(end),
        }
    }
    Ok(levels)
}

fn stepped(start: f64, end: f64, step: f64, count: usize) -> Vec<f64> {
    (1..)
        .map(|i| start + step * i as f64)
        .take_while(|d| *d <= end + EPS)
        .take(count)
        .map(|d| d.min(end))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::DepthParams;
    use crate::passage::tests::cascade;
    use crate::planner::tests::{cascade_model, rough_op};

    fn run(depth: DepthParams) -> (Result<Vec<f64>>, Vec<String>) {
        let mut op = rough_op();
        op.params.depth = depth;
        let model = cascade_model();
        let mut ctx = PlanContext {
            op: &op,
            model: &model,
            passage: cascade(),
            tool_radius: 2.0,
            warnings: Vec::new(),
        };
        let levels = levels(&mut ctx);
        (levels, ctx.warnings)
    }

    fn depth(mode: DepthMode, end: Option<f64>, not_finished: LayerNotFinished) -> DepthParams {
        DepthParams {
            mode,
            start: 0.0,
            end,
            not_finished,
        }
    }

    #[test]
    fn test_constant_distance_lands() {
        let (levels, warnings) = run(depth(
            DepthMode::ConstantDistance { step: 1.0 },
            Some(3.0),
            LayerNotFinished::Warn,
        ));
        assert_eq!(levels.unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unfinished_layer_policies() {
        let mode = DepthMode::ConstantDistance { step: 0.8 };
        let (levels, warnings) = run(depth(mode, Some(3.0), LayerNotFinished::Warn));
        assert_eq!(levels.unwrap().len(), 3);
        assert_eq!(warnings.len(), 1);

        let (levels, warnings) = run(depth(mode, Some(3.0), LayerNotFinished::Ignore));
        assert_eq!(levels.unwrap().len(), 3);
        assert!(warnings.is_empty());

        let (levels, _) = run(depth(mode, Some(3.0), LayerNotFinished::AutoComplete));
        let levels = levels.unwrap();
        assert_eq!(levels.len(), 4);
        assert!((levels[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pass_count_stops_at_count() {
        let (levels, warnings) = run(depth(
            DepthMode::PassCount { count: 2, step: 1.0 },
            Some(5.0),
            LayerNotFinished::Warn,
        ));
        assert_eq!(levels.unwrap(), vec![1.0, 2.0]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_layer_count_defaults_to_hub() {
        let (levels, _) = run(depth(
            DepthMode::LayerCount { layers: 4 },
            None,
            LayerNotFinished::Warn,
        ));
        assert_eq!(levels.unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_percent_range() {
        let (levels, _) = run(depth(
            DepthMode::PercentRange {
                start: 25.0,
                end: 75.0,
                layers: 2,
            },
            None,
            LayerNotFinished::Warn,
        ));
        assert_eq!(levels.unwrap(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_start_below_hub_leaves_nothing_to_cut() {
        let mut d = depth(
            DepthMode::ConstantDistance { step: 1.0 },
            None,
            LayerNotFinished::Warn,
        );
        d.start = 9.0;
        let (levels, _) = run(d);
        assert!(matches!(levels, Err(CamError::EmptyPassSet { .. })));
    }

    #[test]
    fn test_tiny_step_is_rejected() {
        let (levels, _) = run(depth(
            DepthMode::ConstantDistance { step: 1e-9 },
            Some(3.0),
            LayerNotFinished::Warn,
        ));
        assert!(matches!(levels, Err(CamError::InvalidParameter { name: "depth", .. })));

        // A bounded pass count is fine however small the step.
        let (levels, _) = run(depth(
            DepthMode::PassCount { count: 3, step: 1e-6 },
            Some(3.0),
            LayerNotFinished::Ignore,
        ));
        assert_eq!(levels.unwrap().len(), 3);
    }
}
