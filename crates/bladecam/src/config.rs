//! Session configuration.
//!
//! Defaults for everything a request does not spell out: section sampling,
//! linking and feeds for new operations, simulation tolerances and the
//! log filter. Loaded from TOML; every key is optional and falls back to
//! its default.
//!
//! ```toml
//! [sampling]
//! points_per_section = 48
//!
//! [machining]
//! retract_distance = 3.0
//!
//! [machining.feeds]
//! cutting = 1200.0
//! plunge = 300.0
//! step_over = 800.0
//! approach = 2000.0
//! retract = 2000.0
//! rapid = 10000.0
//! spindle_rpm = 15000.0
//!
//! [simulation]
//! resolution = 0.25
//! ```

use std::path::Path;

use bladecam_kernel_cam::{Clearance, FeedTable, LinkingParams, MachineLimits, OperationParams};
use bladecam_kernel_geom::{LaminationSchedule, SamplingParams, SpacingMode};
use bladecam_kernel_math::{Point3, Vec3};
use bladecam_kernel_stocksim::SimulationSettings;
use serde::{Deserialize, Serialize};

use crate::error::{BladecamError, Result};

/// Section sampling defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Points per section for new definitions.
    pub points_per_section: usize,
    /// Point spacing for new definitions.
    pub spacing: SpacingMode,
    /// Layered re-sampling used by batch rebuilds.
    pub lamination: Option<LaminationConfig>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        let params = SamplingParams::default();
        Self {
            points_per_section: params.points_per_section,
            spacing: params.spacing,
            lamination: None,
        }
    }
}

impl SamplingConfig {
    /// Sampling parameters for a new definition.
    pub fn params(&self) -> SamplingParams {
        SamplingParams::new(self.points_per_section, self.spacing)
    }

    /// The configured lamination schedule, if any.
    pub fn lamination_schedule(&self) -> Result<Option<LaminationSchedule>> {
        self.lamination
            .as_ref()
            .map(|l| LaminationSchedule::new(l.start_percent, l.end_percent, l.layers))
            .transpose()
            .map_err(BladecamError::from)
    }
}

/// Span range and layer count for layered re-sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaminationConfig {
    /// First layer, percent of span.
    pub start_percent: f64,
    /// Last layer, percent of span.
    pub end_percent: f64,
    /// Number of layers.
    pub layers: usize,
}

impl Default for LaminationConfig {
    fn default() -> Self {
        Self {
            start_percent: 0.0,
            end_percent: 100.0,
            layers: 4,
        }
    }
}

/// Linking and feed defaults for new operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachiningConfig {
    /// Engage distance above the first cut.
    pub approach_distance: f64,
    /// Withdrawal along the axis after a pass.
    pub retract_distance: f64,
    /// Passes closer than this are joined without leaving the part.
    pub avoidance_distance: f64,
    /// Largest tool-axis change between consecutive points, degrees.
    pub max_angle_change: f64,
    /// Clearance geometry.
    pub clearance: Clearance,
    /// Feeds and spindle speed.
    pub feeds: FeedTable,
    /// Rotary limits of the target machine.
    pub limits: Option<MachineLimits>,
}

impl Default for MachiningConfig {
    fn default() -> Self {
        let linking = LinkingParams::default();
        Self {
            approach_distance: linking.approach_distance,
            retract_distance: linking.retract_distance,
            avoidance_distance: linking.avoidance_distance,
            max_angle_change: linking.max_angle_change,
            clearance: Clearance::Plane {
                point: Point3::new(0.0, 0.0, 50.0),
                normal: Vec3::z(),
            },
            feeds: FeedTable::default(),
            limits: None,
        }
    }
}

impl MachiningConfig {
    /// Linking parameters built from these defaults.
    pub fn linking(&self) -> LinkingParams {
        LinkingParams {
            clearance: self.clearance,
            approach_distance: self.approach_distance,
            retract_distance: self.retract_distance,
            avoidance_distance: self.avoidance_distance,
            max_angle_change: self.max_angle_change,
            limits: self.limits,
            home: None,
        }
    }

    /// Overwrite the linking, feed and axis-change settings of `params`.
    pub fn apply(&self, params: &mut OperationParams) {
        params.linking = self.linking();
        params.feeds = self.feeds;
        params.axis.max_angle_change = self.max_angle_change;
    }
}

/// Simulation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Smallest octree cell edge, mm.
    pub resolution: f64,
    /// Tolerated penetration into the part gauge.
    pub overcut_tolerance: f64,
    /// Clearance the shank and holder must keep from stock.
    pub critical_gap: f64,
    /// Largest axis change per swept sub-move, degrees.
    pub max_axis_step: f64,
    /// Halt a run at the first collision.
    pub stop_on_collision: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let settings = SimulationSettings::default();
        Self {
            resolution: 0.5,
            overcut_tolerance: settings.overcut_tolerance,
            critical_gap: settings.critical_gap,
            max_axis_step: settings.max_axis_step,
            stop_on_collision: false,
        }
    }
}

impl SimulationConfig {
    /// Simulator settings.
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            overcut_tolerance: self.overcut_tolerance,
            critical_gap: self.critical_gap,
            max_axis_step: self.max_axis_step,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BladecamConfig {
    /// Sampling defaults.
    pub sampling: SamplingConfig,
    /// Machining defaults.
    pub machining: MachiningConfig,
    /// Simulation defaults.
    pub simulation: SimulationConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl BladecamConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate and write as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.points_per_section < 2 {
            return Err(BladecamError::Config(format!(
                "sampling.points_per_section must be at least 2, got {}",
                self.sampling.points_per_section
            )));
        }
        self.sampling.lamination_schedule()?;

        let m = &self.machining;
        for (name, v) in [
            ("approach_distance", m.approach_distance),
            ("retract_distance", m.retract_distance),
            ("avoidance_distance", m.avoidance_distance),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(BladecamError::Config(format!(
                    "machining.{name} must be non-negative, got {v}"
                )));
            }
        }
        if !(m.max_angle_change > 0.0 && m.max_angle_change <= 180.0) {
            return Err(BladecamError::Config(format!(
                "machining.max_angle_change must be in (0, 180], got {}",
                m.max_angle_change
            )));
        }

        let s = &self.simulation;
        if !(s.resolution.is_finite() && s.resolution > 0.0) {
            return Err(BladecamError::Config(format!(
                "simulation.resolution must be positive, got {}",
                s.resolution
            )));
        }
        if s.overcut_tolerance < 0.0 || s.critical_gap < 0.0 || s.max_axis_step <= 0.0 {
            return Err(BladecamError::Config(
                "simulation tolerances must be non-negative and max_axis_step positive".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(BladecamError::Config("logging.level is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = BladecamConfig::from_toml_str("").unwrap();
        assert_eq!(config, BladecamConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = BladecamConfig::from_toml_str(
            "[simulation]\nresolution = 0.25\n\n[machining]\nretract_distance = 3.0\n",
        )
        .unwrap();
        assert_eq!(config.simulation.resolution, 0.25);
        assert_eq!(config.simulation.critical_gap, 0.5);
        assert_eq!(config.machining.retract_distance, 3.0);
        assert_eq!(config.machining.approach_distance, 2.0);
        assert_eq!(config.sampling.points_per_section, 32);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = BladecamConfig::default();
        config.machining.limits = Some(MachineLimits {
            a_min: -10.0,
            a_max: 110.0,
            c_min: -360.0,
            c_max: 360.0,
        });
        config.sampling.lamination = Some(LaminationConfig::default());
        config.logging.json = true;
        let text = config.to_toml_string().unwrap();
        assert_eq!(BladecamConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = BladecamConfig::from_toml_str("[sampling]\npoints_per_section = 1\n").unwrap_err();
        assert!(matches!(err, BladecamError::Config(_)));

        let err = BladecamConfig::from_toml_str("[simulation]\nresolution = 0.0\n").unwrap_err();
        assert!(matches!(err, BladecamError::Config(_)));

        // An empty lamination range surfaces the geometry error.
        let err = BladecamConfig::from_toml_str(
            "[sampling.lamination]\nstart_percent = 60.0\nend_percent = 40.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, BladecamError::Geometry(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = BladecamConfig::from_toml_str("[sampling\n").unwrap_err();
        assert!(matches!(err, BladecamError::Config(_)));
    }

    #[test]
    fn test_apply_to_operation_params() {
        let mut config = MachiningConfig::default();
        config.max_angle_change = 3.0;
        config.feeds.cutting = 1500.0;
        let mut params = OperationParams::default();
        config.apply(&mut params);
        assert_eq!(params.linking.max_angle_change, 3.0);
        assert_eq!(params.axis.max_angle_change, 3.0);
        assert_eq!(params.feeds.cutting, 1500.0);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("bladecam-config-{}.toml", std::process::id()));
        let mut config = BladecamConfig::default();
        config.simulation.stop_on_collision = true;
        config.save_to_file(&path).unwrap();
        let loaded = BladecamConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
