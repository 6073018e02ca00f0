//! Machining operations and their parameter sets.
//!
//! One [`OperationParams`] struct carries the fields every kind shares
//! (pattern, step-over, depth partitioning, allowances, edge extension,
//! tool axis, buffer zones, linking and feeds) plus per-kind sections that
//! only the matching planner reads.

use serde::{Deserialize, Serialize};

use crate::assembler::LinkingParams;
use crate::axis::AxisParams;
use crate::error::{invalid, CamError, Result};
use crate::feeds::FeedTable;
use crate::tool::Cutter;
use crate::zones::ClearanceZones;

/// Kind of machining operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Passage roughing by depth layers.
    Rough,
    /// Finishing of both walls of the passage.
    BladeFinish,
    /// Finishing of the hub floor.
    HubFinish,
    /// Finishing of the blade-to-hub fillet.
    FilletFinish,
    /// Trochoidal slotting of the passage.
    Trochoidal,
    /// Rough, semi-finish and finish in one operation.
    Combined,
    /// Flank finishing around the leading and trailing edges.
    EdgeFinish,
    /// Plunging along the span around the edges.
    EdgePlunge,
}

impl OperationKind {
    /// Every kind, in planner-table order.
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Rough,
        OperationKind::BladeFinish,
        OperationKind::HubFinish,
        OperationKind::FilletFinish,
        OperationKind::Trochoidal,
        OperationKind::Combined,
        OperationKind::EdgeFinish,
        OperationKind::EdgePlunge,
    ];
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Rough => "rough",
            OperationKind::BladeFinish => "blade finish",
            OperationKind::HubFinish => "hub finish",
            OperationKind::FilletFinish => "fillet finish",
            OperationKind::Trochoidal => "trochoidal",
            OperationKind::Combined => "combined",
            OperationKind::EdgeFinish => "edge finish",
            OperationKind::EdgePlunge => "edge plunge",
        };
        f.write_str(name)
    }
}

/// Where a center slot starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStart {
    /// First row runs from the leading edge.
    FromLeading,
    /// First row runs from the trailing edge.
    FromTrailing,
}

/// Wall a wall-to-wall pattern starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallSide {
    /// Start at the machined blade.
    FromLeft,
    /// Start at the adjacent blade.
    FromRight,
}

/// How rows are laid out inside one depth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CutPattern {
    /// Chord-wise rows, all cut in the same direction.
    SingleDirection,
    /// Chord-wise rows alternating direction.
    ZigZag,
    /// Closed rings moving inward from the walls.
    Helical,
    /// Trochoidal loops along the passage center line.
    Trochoidal,
    /// Slot down the middle, then alternate outward.
    CenterSlot {
        /// Edge the first row starts from.
        start: SlotStart,
    },
    /// Lateral rows from one wall to the other, stepping along the chord.
    WallToWall {
        /// Starting wall.
        from: WallSide,
    },
}

/// Cut direction relative to the spindle rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CutDirection {
    /// First row runs leading to trailing edge.
    #[default]
    Climb,
    /// First row runs trailing to leading edge.
    Conventional,
}

/// Depth partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DepthMode {
    /// Levels a fixed distance apart.
    ConstantDistance {
        /// Distance between levels in mm.
        step: f64,
    },
    /// A fixed number of evenly spaced levels.
    LayerCount {
        /// Number of levels.
        layers: usize,
    },
    /// `count` levels `step` apart, regardless of the target depth.
    PassCount {
        /// Number of levels.
        count: usize,
        /// Distance between levels in mm.
        step: f64,
    },
    /// Evenly spaced levels between two percentages of blade height.
    PercentRange {
        /// Start, percent of blade height from the shroud.
        start: f64,
        /// End, percent of blade height from the shroud.
        end: f64,
        /// Number of levels.
        layers: usize,
    },
}

/// What to do when the last level stops short of the target depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerNotFinished {
    /// Leave the remainder.
    Ignore,
    /// Leave the remainder and report it.
    #[default]
    Warn,
    /// Add a final level at the target depth.
    AutoComplete,
}

/// Depth range and partitioning.
///
/// Depths are measured in mm down from the shroud (plus the shroud
/// allowance).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthParams {
    /// Partitioning mode.
    pub mode: DepthMode,
    /// Depth the first level steps down from.
    pub start: f64,
    /// Target depth; `None` means down to the hub allowance.
    pub end: Option<f64>,
    /// Policy for an unfinished last layer.
    pub not_finished: LayerNotFinished,
}

impl Default for DepthParams {
    fn default() -> Self {
        Self {
            mode: DepthMode::ConstantDistance { step: 1.0 },
            start: 0.0,
            end: None,
            not_finished: LayerNotFinished::default(),
        }
    }
}

/// Material left on each region of the part.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Allowances {
    /// Extra length past the leading and trailing edges.
    pub blank: f64,
    /// Height above the shroud where depth zero lies.
    pub shroud: f64,
    /// Offset from the machined blade's wall.
    pub blade: f64,
    /// Offset above the hub.
    pub hub: f64,
    /// Offset from the adjacent blade's wall.
    pub adjacent: f64,
}

/// How rows continue past the leading and trailing edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EdgeExtension {
    /// Straight along the end tangent.
    Linear {
        /// Extension length in mm.
        length: f64,
    },
    /// Arc turning about the span direction.
    Curl {
        /// Arc length in mm.
        length: f64,
        /// Total turning angle in degrees.
        curl_angle: f64,
    },
}

impl Default for EdgeExtension {
    fn default() -> Self {
        EdgeExtension::Linear { length: 0.0 }
    }
}

impl EdgeExtension {
    /// Extension length in mm.
    pub fn length(&self) -> f64 {
        match self {
            EdgeExtension::Linear { length } | EdgeExtension::Curl { length, .. } => *length,
        }
    }
}

/// Order of stages in combined milling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StageOrdering {
    /// All rough levels, then semi-finish, then finish.
    #[default]
    Longitudinal,
    /// Stages interleaved by depth.
    Triangulated,
}

/// Combined three-stage milling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedParams {
    /// Stage ordering.
    pub ordering: StageOrdering,
    /// Semi-finish levels per rough level.
    pub pass_count_ratio: usize,
    /// Semi-finish levels that precede the first finish level.
    pub levels_offset: usize,
    /// Wall allowance left by roughing.
    pub rough_allowance: f64,
    /// Wall allowance left by semi-finishing.
    pub semi_finish_allowance: f64,
}

impl Default for CombinedParams {
    fn default() -> Self {
        Self {
            ordering: StageOrdering::Longitudinal,
            pass_count_ratio: 1,
            levels_offset: 1,
            rough_allowance: 0.5,
            semi_finish_allowance: 0.2,
        }
    }
}

/// Parameters for trochoidal motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrochoidalParams {
    /// Loop diameter as fraction of tool diameter (typically 0.5-0.9).
    pub loop_diameter_ratio: f64,
    /// Advance per loop (mm).
    pub stepover: f64,
    /// Points per loop for discretization.
    pub points_per_loop: usize,
}

impl Default for TrochoidalParams {
    fn default() -> Self {
        Self {
            loop_diameter_ratio: 0.7,
            stepover: 1.0,
            points_per_loop: 16,
        }
    }
}

/// Which edges an edge operation machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeSelect {
    /// Leading edge only.
    Leading,
    /// Trailing edge only.
    Trailing,
    /// Both edges.
    #[default]
    Both,
}

/// Edge finishing and plunging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeParams {
    /// Edges to machine.
    pub edges: EdgeSelect,
    /// Points along each wrap-around arc.
    pub arc_points: usize,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            edges: EdgeSelect::Both,
            arc_points: 13,
        }
    }
}

/// Parameters of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationParams {
    /// Row layout inside a level.
    pub pattern: CutPattern,
    /// Cut direction.
    pub direction: CutDirection,
    /// Distance between rows in mm.
    pub stepover: f64,
    /// Depth partitioning.
    pub depth: DepthParams,
    /// Stock allowances.
    pub allowances: Allowances,
    /// Edge extension.
    pub extension: EdgeExtension,
    /// Points per chord-wise row before extension.
    pub points_per_row: usize,
    /// Machine the splitter blade's passage instead of the main blade's.
    pub splitter: bool,
    /// Tool-axis control.
    pub axis: AxisParams,
    /// Buffer zones and excluded ranges.
    pub zones: ClearanceZones,
    /// Approach, retract and traversal settings.
    pub linking: LinkingParams,
    /// Feeds and speeds.
    pub feeds: FeedTable,
    /// Combined milling section.
    pub combined: CombinedParams,
    /// Trochoidal section.
    pub trochoidal: TrochoidalParams,
    /// Edge finishing section.
    pub edge: EdgeParams,
}

impl Default for OperationParams {
    fn default() -> Self {
        Self {
            pattern: CutPattern::ZigZag,
            direction: CutDirection::Climb,
            stepover: 1.0,
            depth: DepthParams::default(),
            allowances: Allowances::default(),
            extension: EdgeExtension::default(),
            points_per_row: 24,
            splitter: false,
            axis: AxisParams::default(),
            zones: ClearanceZones::default(),
            linking: LinkingParams::default(),
            feeds: FeedTable::default(),
            combined: CombinedParams::default(),
            trochoidal: TrochoidalParams::default(),
            edge: EdgeParams::default(),
        }
    }
}

impl OperationParams {
    /// Set the cut pattern.
    pub fn with_pattern(mut self, pattern: CutPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the cut direction.
    pub fn with_direction(mut self, direction: CutDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Set the step-over.
    pub fn with_stepover(mut self, stepover: f64) -> Self {
        self.stepover = stepover;
        self
    }

    /// Set depth partitioning.
    pub fn with_depth(mut self, depth: DepthParams) -> Self {
        self.depth = depth;
        self
    }

    /// Set stock allowances.
    pub fn with_allowances(mut self, allowances: Allowances) -> Self {
        self.allowances = allowances;
        self
    }

    /// Set the edge extension.
    pub fn with_extension(mut self, extension: EdgeExtension) -> Self {
        self.extension = extension;
        self
    }

    /// Set tool-axis control.
    pub fn with_axis(mut self, axis: AxisParams) -> Self {
        self.axis = axis;
        self
    }

    /// Set buffer zones.
    pub fn with_zones(mut self, zones: ClearanceZones) -> Self {
        self.zones = zones;
        self
    }

    /// Set linking.
    pub fn with_linking(mut self, linking: LinkingParams) -> Self {
        self.linking = linking;
        self
    }

    /// Set feeds.
    pub fn with_feeds(mut self, feeds: FeedTable) -> Self {
        self.feeds = feeds;
        self
    }

    /// Set the combined milling section.
    pub fn with_combined(mut self, combined: CombinedParams) -> Self {
        self.combined = combined;
        self
    }

    /// Check parameters that need no geometry.
    pub fn validate(&self, kind: OperationKind, cutter: &Cutter) -> Result<()> {
        cutter.validate()?;
        let diameter = cutter.tool.diameter();
        if !(self.stepover.is_finite() && self.stepover > 0.0) {
            return Err(invalid("stepover", format!("must be positive, got {}", self.stepover)));
        }
        if self.stepover >= diameter && kind != OperationKind::EdgePlunge {
            return Err(invalid(
                "stepover",
                format!("{} must be smaller than the tool diameter {diameter}", self.stepover),
            ));
        }
        if self.points_per_row < 2 {
            return Err(invalid("points_per_row", "needs at least 2 points"));
        }
        let a = &self.allowances;
        if [a.blank, a.shroud, a.blade, a.hub, a.adjacent]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(invalid("allowances", "must be finite and non-negative"));
        }
        if self.extension.length() < 0.0 {
            return Err(invalid("extension.length", "must be non-negative"));
        }
        self.validate_depth()?;
        if kind == OperationKind::Combined {
            let c = &self.combined;
            if c.pass_count_ratio == 0 {
                return Err(invalid("combined.pass_count_ratio", "must be at least 1"));
            }
            if c.rough_allowance < c.semi_finish_allowance || c.semi_finish_allowance < 0.0 {
                return Err(invalid(
                    "combined",
                    "rough allowance must be at least the semi-finish allowance",
                ));
            }
        }
        if kind == OperationKind::Trochoidal || self.pattern == CutPattern::Trochoidal {
            let t = &self.trochoidal;
            if !(t.stepover > 0.0) || t.points_per_loop < 3 {
                return Err(invalid("trochoidal", "needs a positive advance and 3+ points per loop"));
            }
            if !(0.0..=1.0).contains(&t.loop_diameter_ratio) || t.loop_diameter_ratio == 0.0 {
                return Err(invalid("trochoidal.loop_diameter_ratio", "must be in (0, 1]"));
            }
        }
        if matches!(kind, OperationKind::EdgeFinish | OperationKind::EdgePlunge)
            && self.edge.arc_points < 2
        {
            return Err(invalid("edge.arc_points", "needs at least 2 points"));
        }
        self.axis.validate()?;
        self.linking.validate()?;
        self.feeds.validate()?;
        Ok(())
    }

    fn validate_depth(&self) -> Result<()> {
        let d = &self.depth;
        if !d.start.is_finite() || d.start < 0.0 {
            return Err(invalid("depth.start", "must be finite and non-negative"));
        }
        if let Some(end) = d.end {
            if !end.is_finite() || end < 0.0 {
                return Err(CamError::InvalidRange {
                    name: "depth",
                    start: d.start,
                    end,
                });
            }
        }
        match d.mode {
            DepthMode::ConstantDistance { step } if !(step.is_finite() && step > 0.0) => {
                Err(invalid("depth.step", format!("must be positive, got {step}")))
            }
            DepthMode::LayerCount { layers: 0 } => Err(invalid("depth.layers", "must be at least 1")),
            DepthMode::PassCount { count, step } if count == 0 || !(step > 0.0) => Err(invalid(
                "depth.pass_count",
                "needs at least one pass and a positive step",
            )),
            DepthMode::PercentRange { start, end, layers } => {
                if !(0.0..=100.0).contains(&start) || !(0.0..=100.0).contains(&end) || start >= end {
                    Err(CamError::InvalidRange {
                        name: "depth.percent",
                        start,
                        end,
                    })
                } else if layers == 0 {
                    Err(invalid("depth.layers", "must be at least 1"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// A machining operation on one blade geometry model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Display name.
    pub name: String,
    /// Kind tag, selects the planner.
    pub kind: OperationKind,
    /// Mounted cutter.
    pub cutter: Cutter,
    /// Parameters.
    pub params: OperationParams,
}

impl Operation {
    /// Create an operation with default parameters.
    pub fn new(name: impl Into<String>, kind: OperationKind, cutter: Cutter) -> Self {
        Self {
            name: name.into(),
            kind,
            cutter,
            params: OperationParams::default(),
        }
    }

    /// Replace the parameters.
    pub fn with_params(mut self, params: OperationParams) -> Self {
        self.params = params;
        self
    }

    /// Validate parameters against the cutter.
    pub fn validate(&self) -> Result<()> {
        self.params.validate(self.kind, &self.cutter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::Tool;

    fn op(kind: OperationKind) -> Operation {
        Operation::new("test", kind, Cutter::with_default_mount(Tool::default_endmill()))
    }

    #[test]
    fn test_defaults_validate() {
        for kind in OperationKind::ALL {
            assert!(op(kind).validate().is_ok(), "{kind}");
        }
    }

    #[test]
    fn test_stepover_must_be_below_diameter() {
        let o = op(OperationKind::Rough).with_params(OperationParams::default().with_stepover(6.0));
        assert!(matches!(
            o.validate(),
            Err(CamError::InvalidParameter { name: "stepover", .. })
        ));
    }

    #[test]
    fn test_percent_range_validation() {
        let depth = DepthParams {
            mode: DepthMode::PercentRange {
                start: 70.0,
                end: 30.0,
                layers: 3,
            },
            ..Default::default()
        };
        let o = op(OperationKind::Rough).with_params(OperationParams::default().with_depth(depth));
        assert!(matches!(o.validate(), Err(CamError::InvalidRange { .. })));
    }

    #[test]
    fn test_zero_step_rejected() {
        let depth = DepthParams {
            mode: DepthMode::ConstantDistance { step: 0.0 },
            ..Default::default()
        };
        let o = op(OperationKind::Rough).with_params(OperationParams::default().with_depth(depth));
        assert!(o.validate().is_err());
    }

    #[test]
    fn test_params_serialization() {
        let params = OperationParams::default().with_pattern(CutPattern::CenterSlot {
            start: SlotStart::FromTrailing,
        });
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("CenterSlot"));
        let parsed: OperationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
    }
}
