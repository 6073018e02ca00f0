//! Feeds, speeds and derived machining kinematics.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};
use crate::tool::Tool;

/// How the tool moves on a toolpath segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionKind {
    /// Non-cutting move at rapid rate.
    Rapid,
    /// Move from clearance toward the first cut.
    Approach,
    /// Plunge into the material.
    Engage,
    /// Cutting move.
    Cut,
    /// Move between rows.
    StepOver,
    /// Withdrawal from the material.
    Retract,
    /// Move from the retract point to clearance.
    Departure,
    /// Move along the clearance geometry between passes.
    Traversal,
}

impl MotionKind {
    /// Moves at rapid rate, which must not touch material.
    pub fn is_rapid(&self) -> bool {
        matches!(self, MotionKind::Rapid | MotionKind::Traversal)
    }
}

/// Feed rates in mm/min and spindle speed in RPM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedTable {
    /// Cutting feed.
    pub cutting: f64,
    /// Plunge (engage) feed.
    pub plunge: f64,
    /// Step-over feed.
    pub step_over: f64,
    /// Approach feed.
    pub approach: f64,
    /// Retract and departure feed.
    pub retract: f64,
    /// Rapid and traversal rate.
    pub rapid: f64,
    /// Spindle speed.
    pub spindle_rpm: f64,
}

impl Default for FeedTable {
    fn default() -> Self {
        Self {
            cutting: 1000.0,
            plunge: 300.0,
            step_over: 800.0,
            approach: 2000.0,
            retract: 2000.0,
            rapid: 10000.0,
            spindle_rpm: 12000.0,
        }
    }
}

impl FeedTable {
    /// Feed for a motion kind.
    pub fn feed_for(&self, kind: MotionKind) -> f64 {
        match kind {
            MotionKind::Rapid | MotionKind::Traversal => self.rapid,
            MotionKind::Approach => self.approach,
            MotionKind::Engage => self.plunge,
            MotionKind::Cut => self.cutting,
            MotionKind::StepOver => self.step_over,
            MotionKind::Retract | MotionKind::Departure => self.retract,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let all = [
            self.cutting,
            self.plunge,
            self.step_over,
            self.approach,
            self.retract,
            self.rapid,
            self.spindle_rpm,
        ];
        if all.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(invalid("feeds", "every feed and the spindle speed must be positive"));
        }
        Ok(())
    }

    /// Kinematics of a move of `kind` with `tool`.
    pub fn kinematics(&self, kind: MotionKind, tool: &Tool) -> Kinematics {
        Kinematics::new(self.feed_for(kind), self.spindle_rpm, tool)
    }
}

/// Machine kinematics of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    /// Feed per minute (mm/min).
    pub feed_per_minute: f64,
    /// Feed per revolution (mm/rev).
    pub feed_per_rev: f64,
    /// Feed per tooth (mm/tooth).
    pub feed_per_tooth: f64,
    /// Spindle speed (RPM).
    pub spindle_rpm: f64,
    /// Surface speed at the tool diameter (m/min).
    pub surface_speed: f64,
}

impl Kinematics {
    /// Derive kinematics from a feed, spindle speed and tool.
    pub fn new(feed_per_minute: f64, spindle_rpm: f64, tool: &Tool) -> Self {
        let feed_per_rev = if spindle_rpm > 0.0 {
            feed_per_minute / spindle_rpm
        } else {
            0.0
        };
        Self {
            feed_per_minute,
            feed_per_rev,
            feed_per_tooth: feed_per_rev / f64::from(tool.flutes().max(1)),
            spindle_rpm,
            surface_speed: std::f64::consts::PI * tool.diameter() * spindle_rpm / 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kinematics() {
        let tool = Tool::FlatEndMill {
            diameter: 10.0,
            flute_length: 20.0,
            flutes: 4,
        };
        let k = Kinematics::new(1200.0, 6000.0, &tool);
        assert_relative_eq!(k.feed_per_rev, 0.2, epsilon = 1e-12);
        assert_relative_eq!(k.feed_per_tooth, 0.05, epsilon = 1e-12);
        assert_relative_eq!(k.surface_speed, std::f64::consts::PI * 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_feed_for_kind() {
        let feeds = FeedTable::default();
        assert_eq!(feeds.feed_for(MotionKind::Engage), feeds.plunge);
        assert_eq!(feeds.feed_for(MotionKind::Traversal), feeds.rapid);
        assert_eq!(feeds.feed_for(MotionKind::Departure), feeds.retract);
    }

    #[test]
    fn test_zero_feed_rejected() {
        let feeds = FeedTable {
            cutting: 0.0,
            ..Default::default()
        };
        assert!(feeds.validate().is_err());
    }
}
