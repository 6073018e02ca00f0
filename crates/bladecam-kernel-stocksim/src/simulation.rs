//! Toolpath replay against stock.
//!
//! A [`Simulation`] owns its stock for the whole run. Steps are computed
//! lazily, one per toolpath segment, and cached; stepping backward walks
//! the cache without touching the stock, and stepping forward again replays
//! cached steps until it reaches new segments.

use bladecam_kernel_cam::{Cutter, Kinematics, MotionKind, Toolpath};
use bladecam_kernel_math::{any_perpendicular, Aabb, Vec3};
use bladecam_kernel_task::{Stage, TaskContext};
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionResult, CollisionType};
use crate::gauge::{penetration, PartGauge};
use crate::sweep::{footprint_area, tool_profile, ProfilePiece, SweptVolume};
use crate::{Result, Stock, StockSimError};

/// Smallest removal that counts as cutting.
const VOLUME_EPS: f64 = 1e-9;
/// Upper bound on overcut samples per move.
const MAX_GAUGE_SAMPLES: usize = 256;

/// Simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Penetration into the part gauge tolerated before a step is an overcut.
    pub overcut_tolerance: f64,
    /// Clearance the shank and holder must keep from stock.
    pub critical_gap: f64,
    /// Largest axis change per swept sub-move in degrees.
    pub max_axis_step: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            overcut_tolerance: 0.01,
            critical_gap: 0.5,
            max_axis_step: 2.0,
        }
    }
}

impl SimulationSettings {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("overcut_tolerance", self.overcut_tolerance),
            ("critical_gap", self.critical_gap),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(StockSimError::InvalidParameter(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
        }
        if !(self.max_axis_step > 0.0) {
            return Err(StockSimError::InvalidParameter(
                "max_axis_step must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepStatus {
    /// Nothing flagged.
    Clear,
    /// Shank, holder or rapid move hit stock.
    Collision {
        /// What collided.
        cause: CollisionType,
    },
    /// The cutter went into the part beyond the tolerance.
    Overcut,
}

impl StepStatus {
    /// Display colour as linear RGB.
    pub fn color(&self) -> [f32; 3] {
        match self {
            StepStatus::Clear => [0.25, 0.7, 0.35],
            StepStatus::Collision { .. } => [0.9, 0.1, 0.1],
            StepStatus::Overcut => [1.0, 0.6, 0.0],
        }
    }

    /// Whether the step collided.
    pub fn is_collision(&self) -> bool {
        matches!(self, StepStatus::Collision { .. })
    }

    /// Short name.
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Clear => "clear",
            StepStatus::Collision { .. } => "collision",
            StepStatus::Overcut => "overcut",
        }
    }
}

/// Snapshot of one replayed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStep {
    /// Segment index.
    pub index: usize,
    /// Motion kind of the segment.
    pub kind: MotionKind,
    /// Machining time at the start of the step, minutes.
    pub start_time: f64,
    /// Step duration, minutes.
    pub duration: f64,
    /// Material removed by this step.
    pub removed_volume: f64,
    /// Material left after this step.
    pub remaining_volume: f64,
    /// Engaged cross-section, axial depth times radial width.
    pub contact_area: f64,
    /// Removed volume over the swept footprint.
    pub debris_thickness: f64,
    /// Removed volume per minute.
    pub volume_removal_rate: f64,
    /// Extent of removed material along the tool axis.
    pub axial_depth: f64,
    /// Extent of removed material across the feed direction.
    pub radial_width: f64,
    /// Step status.
    pub status: StepStatus,
    /// Stock point that caused a collision.
    pub collision_point: Option<bladecam_kernel_math::Point3>,
    /// Deepest penetration into the part gauge.
    pub overcut_depth: f64,
    /// Kinematics of the segment.
    pub kinematics: Kinematics,
}

/// Totals over the replayed steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Steps replayed.
    pub steps: usize,
    /// Total removed volume.
    pub removed_volume: f64,
    /// Steps with a collision.
    pub collisions: usize,
    /// Steps with an overcut.
    pub overcuts: usize,
    /// Machining time, minutes.
    pub machining_time: f64,
    /// Step where a stop-on-collision run halted.
    pub stopped_at: Option<usize>,
}

struct Extent {
    dir: Vec3,
    min: f64,
    max: f64,
}

impl Extent {
    fn new(dir: Vec3) -> Self {
        Self {
            dir,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, cell: &Aabb) {
        let p = cell.center().coords.dot(&self.dir);
        let h = cell.size() / 2.0;
        let r = h.x * self.dir.x.abs() + h.y * self.dir.y.abs() + h.z * self.dir.z.abs();
        self.min = self.min.min(p - r);
        self.max = self.max.max(p + r);
    }

    fn span(&self) -> f64 {
        if self.max >= self.min {
            self.max - self.min
        } else {
            0.0
        }
    }
}

/// Replay of a toolpath against stock.
pub struct Simulation {
    toolpath: Toolpath,
    cutter: Cutter,
    settings: SimulationSettings,
    profile: Vec<ProfilePiece>,
    gauge: Option<Box<dyn PartGauge>>,
    initial: Stock,
    stock: Stock,
    steps: Vec<SimulationStep>,
    cursor: usize,
    elapsed: f64,
    play_clock: f64,
}

/// Start a simulation of `toolpath` cutting `stock` with `cutter`.
///
/// Nothing is removed until the first step.
pub fn simulate(
    toolpath: &Toolpath,
    stock: Stock,
    cutter: &Cutter,
    settings: SimulationSettings,
) -> Result<Simulation> {
    Simulation::new(toolpath.clone(), stock, cutter.clone(), settings)
}

impl Simulation {
    /// Create a simulation.
    ///
    /// # Errors
    ///
    /// * [`StockSimError::Cutter`] for an invalid cutter
    /// * [`StockSimError::ToolTooLarge`] when the tool is wider than the stock
    /// * [`StockSimError::InvalidParameter`] for bad settings
    pub fn new(toolpath: Toolpath, stock: Stock, cutter: Cutter, settings: SimulationSettings) -> Result<Self> {
        cutter.validate()?;
        settings.validate()?;
        let size = stock.bounds().size();
        let diameter = cutter.tool.diameter();
        if diameter > size.x.max(size.y).max(size.z) {
            return Err(StockSimError::ToolTooLarge(diameter));
        }
        Ok(Self {
            profile: tool_profile(&cutter.tool),
            toolpath,
            cutter,
            settings,
            gauge: None,
            initial: stock.clone(),
            stock,
            steps: Vec::new(),
            cursor: 0,
            elapsed: 0.0,
            play_clock: 0.0,
        })
    }

    /// Check overcuts against `gauge`.
    pub fn with_gauge(mut self, gauge: impl PartGauge + 'static) -> Self {
        self.gauge = Some(Box::new(gauge));
        self
    }

    /// Number of segments to replay.
    pub fn len(&self) -> usize {
        self.toolpath.len()
    }

    /// Whether the toolpath is empty.
    pub fn is_empty(&self) -> bool {
        self.toolpath.is_empty()
    }

    /// Steps shown so far.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Whether every segment has been shown.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.len()
    }

    /// Steps up to the current position.
    pub fn steps(&self) -> &[SimulationStep] {
        &self.steps[..self.cursor]
    }

    /// Stock after the last computed step.
    pub fn stock(&self) -> &Stock {
        &self.stock
    }

    /// Stock the run started from.
    pub fn initial_stock(&self) -> &Stock {
        &self.initial
    }

    /// Settings in use.
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Show the next step, computing it if it is not cached.
    pub fn step_forward(&mut self) -> Option<SimulationStep> {
        if self.is_finished() {
            return None;
        }
        if self.cursor == self.steps.len() {
            let step = self.compute_step(self.cursor);
            self.steps.push(step);
        }
        self.cursor += 1;
        self.steps.get(self.cursor - 1).cloned()
    }

    /// Step back over a cached step. The stock is not restored.
    pub fn step_backward(&mut self) -> Option<SimulationStep> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.steps.get(self.cursor).cloned()
    }

    /// Reset the stock and drop all cached steps.
    pub fn restart(&mut self) {
        self.stock = self.initial.clone();
        self.steps.clear();
        self.cursor = 0;
        self.elapsed = 0.0;
        self.play_clock = 0.0;
    }

    /// Continuous play: advance by `dt` wall seconds at `speed` times
    /// machining time. Returns the steps completed within the budget;
    /// leftover time carries into the next call.
    pub fn advance(&mut self, dt: f64, speed: f64) -> Vec<SimulationStep> {
        let mut out = Vec::new();
        if !(dt > 0.0 && speed > 0.0) {
            return out;
        }
        self.play_clock += dt * speed / 60.0;
        while let Some(d) = self.next_duration() {
            if d > self.play_clock {
                break;
            }
            self.play_clock -= d;
            match self.step_forward() {
                Some(step) => out.push(step),
                None => break,
            }
        }
        if self.is_finished() {
            self.play_clock = 0.0;
        }
        out
    }

    /// Play to the end, reporting a checkpoint per step.
    ///
    /// With `stop_on_collision` the run halts after the first colliding
    /// step. Cancellation leaves the stock at the last completed step.
    pub fn run_to_end(&mut self, ctx: &TaskContext, stop_on_collision: bool) -> Result<RunSummary> {
        let total = self.len();
        let mut stopped_at = None;
        while !self.is_finished() {
            ctx.checkpoint(Stage::Simulation, self.cursor, total, "simulate")?;
            let Some(step) = self.step_forward() else {
                break;
            };
            if stop_on_collision && step.status.is_collision() {
                stopped_at = Some(step.index);
                break;
            }
        }
        let summary = self.summary(stopped_at);
        tracing::info!(
            steps = summary.steps,
            removed = summary.removed_volume,
            collisions = summary.collisions,
            overcuts = summary.overcuts,
            "simulation run finished"
        );
        Ok(summary)
    }

    /// Totals over the steps shown so far.
    pub fn summary(&self, stopped_at: Option<usize>) -> RunSummary {
        let steps = self.steps();
        RunSummary {
            steps: steps.len(),
            removed_volume: steps.iter().map(|s| s.removed_volume).sum(),
            collisions: steps.iter().filter(|s| s.status.is_collision()).count(),
            overcuts: steps
                .iter()
                .filter(|s| s.status == StepStatus::Overcut)
                .count(),
            machining_time: steps.iter().map(|s| s.duration).sum(),
            stopped_at,
        }
    }

    fn next_duration(&self) -> Option<f64> {
        if self.is_finished() {
            return None;
        }
        Some(match self.steps.get(self.cursor) {
            Some(step) => step.duration,
            None => self.segment_duration(self.cursor),
        })
    }

    fn segment_duration(&self, i: usize) -> f64 {
        let feed = self.toolpath.segments[i].feed;
        if feed > 0.0 {
            self.toolpath.segment_length(i) / feed
        } else {
            0.0
        }
    }

    fn compute_step(&mut self, i: usize) -> SimulationStep {
        let seg = self.toolpath.segments[i];
        let prev = if i == 0 {
            seg
        } else {
            self.toolpath.segments[i - 1]
        };
        let from = (&prev.position, &prev.axis);
        let to = (&seg.position, &seg.axis);
        let axis_step = self.settings.max_axis_step.to_radians();
        let sweep = SweptVolume::new(&self.profile, from, to, axis_step);

        let delta = seg.position - prev.position;
        let axis = seg.axis;
        let d_perp = delta - axis.as_ref() * delta.dot(axis.as_ref());
        let across = d_perp
            .try_normalize(1e-9)
            .map(|d| axis.cross(&d))
            .unwrap_or_else(|| any_perpendicular(&axis).into_inner());
        let mut axial = Extent::new(axis.into_inner());
        let mut radial = Extent::new(across);
        let removed = self.stock.remove(&sweep, &mut |cell| {
            axial.add(cell);
            radial.add(cell);
        });

        let tool = &self.cutter.tool;
        let axial_depth = axial.span().min(tool.flute_length());
        let radial_width = radial.span().min(2.0 * tool.max_radius());
        let duration = self.segment_duration(i);
        let footprint = footprint_area(&delta, &axis, tool.radius());

        let collision = if seg.kind.is_rapid() && removed > VOLUME_EPS {
            CollisionResult::collision(seg.position, CollisionType::RapidRemoval)
        } else {
            self.stock
                .check_collision(&self.cutter, from, to, self.settings.critical_gap, axis_step)
        };
        let overcut_depth = match &self.gauge {
            Some(gauge) => {
                let samples = (delta.norm() / self.stock.resolution()).ceil() as usize;
                penetration(
                    gauge.as_ref(),
                    &self.profile,
                    from,
                    to,
                    samples.clamp(1, MAX_GAUGE_SAMPLES),
                )
            }
            None => 0.0,
        };
        let status = match collision.collision_type {
            Some(cause) => StepStatus::Collision { cause },
            None if overcut_depth > self.settings.overcut_tolerance => StepStatus::Overcut,
            None => StepStatus::Clear,
        };
        if status != StepStatus::Clear {
            tracing::warn!(step = i, status = status.label(), overcut_depth, "flagged simulation step");
        }

        let step = SimulationStep {
            index: i,
            kind: seg.kind,
            start_time: self.elapsed,
            duration,
            removed_volume: removed,
            remaining_volume: self.stock.volume(),
            contact_area: axial_depth * radial_width,
            debris_thickness: if removed > 0.0 { removed / footprint } else { 0.0 },
            volume_removal_rate: if duration > 0.0 { removed / duration } else { 0.0 },
            axial_depth,
            radial_width,
            status,
            collision_point: collision.point,
            overcut_depth,
            kinematics: seg.kinematics,
        };
        self.elapsed += duration;
        tracing::trace!(step = i, removed, "simulation step");
        step
    }
}

impl Iterator for Simulation {
    type Item = SimulationStep;

    fn next(&mut self) -> Option<Self::Item> {
        self.step_forward()
    }
}
