//! Cutters for blade machining: the cutting tool plus its shank and holder.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};

/// A cutting tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Tool {
    /// Flat end mill for roughing and floor finishing.
    FlatEndMill {
        /// Tool diameter in mm.
        diameter: f64,
        /// Flute length (cutting depth) in mm.
        flute_length: f64,
        /// Number of flutes.
        flutes: u8,
    },
    /// Ball end mill for blade and hub finishing.
    BallEndMill {
        /// Tool diameter in mm.
        diameter: f64,
        /// Flute length in mm.
        flute_length: f64,
        /// Number of flutes.
        flutes: u8,
    },
    /// Bull end mill (corner radius) for semi-finishing.
    BullEndMill {
        /// Tool diameter in mm.
        diameter: f64,
        /// Corner radius in mm.
        corner_radius: f64,
        /// Flute length in mm.
        flute_length: f64,
        /// Number of flutes.
        flutes: u8,
    },
    /// Conical ball mill for narrow, deep passages.
    TaperedBallEndMill {
        /// Ball diameter at the tip in mm.
        diameter: f64,
        /// Half-angle of the cone in degrees.
        taper_angle: f64,
        /// Flute length in mm.
        flute_length: f64,
        /// Number of flutes.
        flutes: u8,
    },
}

impl Tool {
    /// Get the cutting diameter at the tip.
    pub fn diameter(&self) -> f64 {
        match self {
            Tool::FlatEndMill { diameter, .. }
            | Tool::BallEndMill { diameter, .. }
            | Tool::BullEndMill { diameter, .. }
            | Tool::TaperedBallEndMill { diameter, .. } => *diameter,
        }
    }

    /// Get the tool radius at the tip.
    pub fn radius(&self) -> f64 {
        self.diameter() / 2.0
    }

    /// Get the corner radius (ball radius for ball mills).
    pub fn corner_radius(&self) -> f64 {
        match self {
            Tool::FlatEndMill { .. } => 0.0,
            Tool::BullEndMill { corner_radius, .. } => *corner_radius,
            Tool::BallEndMill { diameter, .. } | Tool::TaperedBallEndMill { diameter, .. } => {
                diameter / 2.0
            }
        }
    }

    /// Get the number of flutes.
    pub fn flutes(&self) -> u8 {
        match self {
            Tool::FlatEndMill { flutes, .. }
            | Tool::BallEndMill { flutes, .. }
            | Tool::BullEndMill { flutes, .. }
            | Tool::TaperedBallEndMill { flutes, .. } => *flutes,
        }
    }

    /// Get the flute length.
    pub fn flute_length(&self) -> f64 {
        match self {
            Tool::FlatEndMill { flute_length, .. }
            | Tool::BallEndMill { flute_length, .. }
            | Tool::BullEndMill { flute_length, .. }
            | Tool::TaperedBallEndMill { flute_length, .. } => *flute_length,
        }
    }

    /// Cutting radius at `height` above the tip, measured along the axis.
    pub fn radius_at_height(&self, height: f64) -> f64 {
        let r = self.radius();
        let rc = self.corner_radius().min(r);
        if height <= 0.0 {
            return r - rc;
        }
        match self {
            Tool::TaperedBallEndMill { taper_angle, .. } => {
                if height < rc {
                    corner_profile(r, rc, height)
                } else {
                    r + (height - rc) * taper_angle.to_radians().tan()
                }
            }
            _ => {
                if height < rc {
                    corner_profile(r, rc, height)
                } else {
                    r
                }
            }
        }
    }

    /// Widest cutting radius along the flutes.
    pub fn max_radius(&self) -> f64 {
        self.radius_at_height(self.flute_length()).max(self.radius())
    }

    fn validate(&self) -> Result<()> {
        if !(self.diameter().is_finite() && self.diameter() > 0.0) {
            return Err(invalid("tool.diameter", "must be positive"));
        }
        if !(self.flute_length().is_finite() && self.flute_length() > 0.0) {
            return Err(invalid("tool.flute_length", "must be positive"));
        }
        if self.flutes() == 0 {
            return Err(invalid("tool.flutes", "must be at least 1"));
        }
        if let Tool::BullEndMill { corner_radius, .. } = self {
            if *corner_radius < 0.0 || *corner_radius > self.radius() {
                return Err(invalid(
                    "tool.corner_radius",
                    format!("{corner_radius} outside [0, {}]", self.radius()),
                ));
            }
        }
        if let Tool::TaperedBallEndMill { taper_angle, .. } = self {
            if !(0.0..45.0).contains(taper_angle) {
                return Err(invalid("tool.taper_angle", format!("{taper_angle}° outside [0, 45)")));
            }
        }
        Ok(())
    }

    /// Create a default flat end mill (6mm, 2 flute).
    pub fn default_endmill() -> Self {
        Tool::FlatEndMill {
            diameter: 6.0,
            flute_length: 20.0,
            flutes: 2,
        }
    }

    /// Create a default ball end mill (6mm, 2 flute).
    pub fn default_ball() -> Self {
        Tool::BallEndMill {
            diameter: 6.0,
            flute_length: 20.0,
            flutes: 2,
        }
    }

    /// Create a default bull end mill (6mm, 1mm corner radius, 2 flute).
    pub fn default_bull() -> Self {
        Tool::BullEndMill {
            diameter: 6.0,
            corner_radius: 1.0,
            flute_length: 20.0,
            flutes: 2,
        }
    }

    /// Create a default tapered ball mill (3mm tip, 3° half-angle, 4 flute).
    pub fn default_tapered() -> Self {
        Tool::TaperedBallEndMill {
            diameter: 3.0,
            taper_angle: 3.0,
            flute_length: 25.0,
            flutes: 4,
        }
    }
}

/// Radius of the torus/ball corner at `height` above the tip.
fn corner_profile(r: f64, rc: f64, height: f64) -> f64 {
    let dz = rc - height;
    r - rc + (rc * rc - dz * dz).max(0.0).sqrt()
}

/// Plain cylindrical shank between the flutes and the holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shank {
    /// Shank diameter in mm.
    pub diameter: f64,
    /// Exposed shank length in mm.
    pub length: f64,
}

impl Shank {
    /// Create a shank.
    pub fn new(diameter: f64, length: f64) -> Self {
        Self { diameter, length }
    }
}

/// Tool holder definition for collision detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHolder {
    /// Holder diameter in mm.
    pub diameter: f64,
    /// Holder length from its nose to the spindle face in mm.
    pub length: f64,
    /// Taper angle in degrees (0 for cylindrical).
    pub taper_angle: f64,
}

impl ToolHolder {
    /// Create a new tool holder.
    pub fn new(diameter: f64, length: f64) -> Self {
        Self {
            diameter,
            length,
            taper_angle: 0.0,
        }
    }

    /// Create a tool holder with taper.
    pub fn with_taper(diameter: f64, length: f64, taper_angle: f64) -> Self {
        Self {
            diameter,
            length,
            taper_angle,
        }
    }

    /// Get the radius at a given height above the holder nose.
    pub fn radius_at_height(&self, height: f64) -> f64 {
        if height > self.length || self.taper_angle == 0.0 {
            self.diameter / 2.0
        } else {
            let tan_half_angle = (self.taper_angle.to_radians() / 2.0).tan();
            (self.diameter / 2.0 - (self.length - height) * tan_half_angle).max(0.0)
        }
    }
}

/// Part of the cutter envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Cutting flutes.
    Flute,
    /// Non-cutting shank.
    Shank,
    /// Tool holder.
    Holder,
}

/// A coaxial cylinder band of the cutter envelope, heights measured from
/// the tool tip along the tool axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePart {
    /// Which part of the cutter.
    pub kind: EnvelopeKind,
    /// Lower height.
    pub bottom: f64,
    /// Upper height.
    pub top: f64,
    /// Cylinder radius.
    pub radius: f64,
}

/// Number of bands a tapered holder is split into.
const HOLDER_BANDS: usize = 4;

/// Tool, shank and holder as mounted in the spindle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cutter {
    /// Cutting tool.
    pub tool: Tool,
    /// Shank above the flutes.
    pub shank: Shank,
    /// Holder above the shank.
    pub holder: ToolHolder,
}

impl Cutter {
    /// Create a cutter.
    pub fn new(tool: Tool, shank: Shank, holder: ToolHolder) -> Self {
        Self {
            tool,
            shank,
            holder,
        }
    }

    /// Cutter with a shank matching the tool and a 40mm holder.
    pub fn with_default_mount(tool: Tool) -> Self {
        let d = tool.diameter();
        Self::new(tool, Shank::new(d, 2.0 * d), ToolHolder::new(40.0, 60.0))
    }

    /// Check dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`CamError::InvalidParameter`](crate::CamError::InvalidParameter)
    /// for non-positive or inconsistent dimensions.
    pub fn validate(&self) -> Result<()> {
        self.tool.validate()?;
        if !(self.shank.diameter > 0.0 && self.shank.length >= 0.0) {
            return Err(invalid("shank", "diameter must be positive, length non-negative"));
        }
        if !(self.holder.diameter > 0.0 && self.holder.length > 0.0) {
            return Err(invalid("holder", "diameter and length must be positive"));
        }
        Ok(())
    }

    /// Distance from the tool tip to the holder nose.
    pub fn stickout(&self) -> f64 {
        self.tool.flute_length() + self.shank.length
    }

    /// Distance from the tool tip to the spindle face.
    pub fn gauge_length(&self) -> f64 {
        self.stickout() + self.holder.length
    }

    /// Envelope as coaxial bands from the tip upward.
    pub fn envelope(&self) -> Vec<EnvelopePart> {
        let flute_top = self.tool.flute_length();
        let shank_top = self.stickout();
        let mut parts = vec![EnvelopePart {
            kind: EnvelopeKind::Flute,
            bottom: 0.0,
            top: flute_top,
            radius: self.tool.max_radius(),
        }];
        if self.shank.length > 0.0 {
            parts.push(EnvelopePart {
                kind: EnvelopeKind::Shank,
                bottom: flute_top,
                top: shank_top,
                radius: self.shank.diameter / 2.0,
            });
        }
        let bands = if self.holder.taper_angle == 0.0 {
            1
        } else {
            HOLDER_BANDS
        };
        let band = self.holder.length / bands as f64;
        for i in 0..bands {
            let top = (i + 1) as f64 * band;
            parts.push(EnvelopePart {
                kind: EnvelopeKind::Holder,
                bottom: shank_top + i as f64 * band,
                top: shank_top + top,
                radius: self.holder.radius_at_height(top),
            });
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_diameter() {
        let tool = Tool::FlatEndMill {
            diameter: 6.0,
            flute_length: 20.0,
            flutes: 2,
        };
        assert!((tool.diameter() - 6.0).abs() < 1e-6);
        assert!((tool.radius() - 3.0).abs() < 1e-6);
        assert!((tool.radius_at_height(0.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_ball_profile() {
        let tool = Tool::default_ball();
        assert!(tool.radius_at_height(0.0).abs() < 1e-12);
        assert!((tool.radius_at_height(3.0) - 3.0).abs() < 1e-12);
        let expected = (9.0f64 - 4.0).sqrt();
        assert!((tool.radius_at_height(1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_tapered_widens() {
        let tool = Tool::default_tapered();
        let r = tool.radius_at_height(21.5);
        assert!((r - (1.5 + 20.0 * 3f64.to_radians().tan())).abs() < 1e-9);
        assert!(tool.max_radius() > tool.radius());
    }

    #[test]
    fn test_bull_corner_out_of_range() {
        let cutter = Cutter::with_default_mount(Tool::BullEndMill {
            diameter: 6.0,
            corner_radius: 4.0,
            flute_length: 20.0,
            flutes: 2,
        });
        assert!(cutter.validate().is_err());
    }

    #[test]
    fn test_envelope_stack() {
        let cutter = Cutter::new(
            Tool::default_endmill(),
            Shank::new(6.0, 10.0),
            ToolHolder::new(32.0, 50.0),
        );
        let env = cutter.envelope();
        assert_eq!(env.len(), 3);
        assert_eq!(env[0].kind, EnvelopeKind::Flute);
        assert!((env[1].bottom - 20.0).abs() < 1e-12);
        assert!((env[2].bottom - 30.0).abs() < 1e-12);
        assert!((env[2].top - 80.0).abs() < 1e-12);
        assert!((cutter.gauge_length() - 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_tapered_holder_bands() {
        let cutter = Cutter::new(
            Tool::default_endmill(),
            Shank::new(6.0, 10.0),
            ToolHolder::with_taper(32.0, 40.0, 10.0),
        );
        let holder: Vec<_> = cutter
            .envelope()
            .into_iter()
            .filter(|p| p.kind == EnvelopeKind::Holder)
            .collect();
        assert_eq!(holder.len(), HOLDER_BANDS);
        assert!(holder[0].radius < holder[3].radius);
        assert!((holder[3].radius - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_tool_serialization() {
        let tool = Tool::default_tapered();
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("TaperedBallEndMill"));
        let parsed: Tool = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tool);
    }
}
