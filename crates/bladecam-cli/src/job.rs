//! Batch job files.
//!
//! A job names a model record, an optional configuration file, the stock
//! block and the operations to add:
//!
//! ```toml
//! model = "blisk.json"
//! config = "bladecam.toml"
//!
//! [stock]
//! min = [-10.0, -10.0, 0.0]
//! max = [10.0, 10.0, 8.0]
//!
//! [[operations]]
//! name = "rough"
//! kind = "Rough"
//! cutter = { tool = { type = "FlatEndMill", diameter = 4.0, flute_length = 10.0, flutes = 2 }, shank = { diameter = 4.0, length = 10.0 }, holder = { diameter = 30.0, length = 40.0, taper_angle = 0.0 } }
//! params = { stepover = 1.5 }
//! ```
//!
//! Relative paths resolve against the job file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bladecam::cam::{Cutter, OperationKind, OperationParams};
use bladecam::math::{Aabb, Point3};
use bladecam::task::TaskContext;
use bladecam::{BladecamConfig, ModelRecord, Session, SessionRecord};
use serde::Deserialize;

/// A parsed job file.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// JSON session or model record.
    pub model: PathBuf,
    /// TOML configuration, defaults when absent.
    #[serde(default)]
    pub config: Option<PathBuf>,
    /// Rebuild the model before planning even if it carries a solid.
    #[serde(default = "default_rebuild")]
    pub rebuild: bool,
    /// Stock block for simulation.
    #[serde(default)]
    pub stock: Option<StockBox>,
    /// Operations appended to the session, in order.
    #[serde(default)]
    pub operations: Vec<JobOperation>,
}

fn default_rebuild() -> bool {
    true
}

/// Axis-aligned stock block.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StockBox {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl StockBox {
    pub fn bounds(&self) -> Aabb {
        let [x0, y0, z0] = self.min;
        let [x1, y1, z1] = self.max;
        Aabb::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1))
    }
}

/// One operation of a job.
///
/// Linking, feeds and the axis-change limit always come from the
/// `[machining]` section of the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobOperation {
    pub name: String,
    pub kind: OperationKind,
    pub cutter: Cutter,
    #[serde(default)]
    pub params: Option<OperationParams>,
}

impl Job {
    /// Parse a job; relative paths resolve against `base`.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut job: Job = toml::from_str(content)?;
        job.model = base.join(&job.model);
        job.config = job.config.map(|c| base.join(c));
        Ok(job)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading job {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base)
            .with_context(|| format!("parsing job {}", path.display()))
    }

    /// The job's configuration, or the defaults.
    pub fn load_config(&self) -> Result<BladecamConfig> {
        match &self.config {
            Some(path) => BladecamConfig::load_from_file(path)
                .with_context(|| format!("loading config {}", path.display())),
            None => Ok(BladecamConfig::default()),
        }
    }

    /// Open the model, rebuild it if needed and register the operations.
    pub fn open_session(&self, config: BladecamConfig, ctx: &TaskContext) -> Result<Session> {
        let session = load_session(&self.model, config)?;

        if self.rebuild || session.model().solid().is_none() {
            let lamination = session.config().sampling.lamination_schedule()?;
            let revision = session.rebuild(lamination.as_ref(), ctx)?;
            tracing::info!(revision, "model rebuilt");
        }

        for entry in &self.operations {
            let mut operation =
                session.new_operation(entry.name.clone(), entry.kind, entry.cutter.clone());
            if let Some(params) = &entry.params {
                operation.params = params.clone();
                session.config().machining.apply(&mut operation.params);
            }
            session
                .add_operation(operation)
                .with_context(|| format!("operation '{}'", entry.name))?;
        }
        Ok(session)
    }
}

/// Session records carry a schema version; bare model records don't.
fn load_session(path: &Path, config: BladecamConfig) -> Result<Session> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading model {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing model {}", path.display()))?;
    if value.get("version").is_some() {
        let record: SessionRecord = serde_json::from_value(value)?;
        Ok(Session::from_record(config, record)?)
    } else {
        let record: ModelRecord = serde_json::from_value(value)?;
        Ok(Session::new(config, record.model))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bladecam::cam::{CutPattern, DepthMode};
    use bladecam::geom::{
        BladeGeometryModel, PartAxis, Pitch, Section, SurfaceDefinition, SurfaceKind, SurfaceRole,
    };
    use bladecam::math::Vec3;

    pub(crate) const ROUGH_JOB: &str = r#"
model = "cascade.json"

[stock]
min = [0.0, 0.0, 0.0]
max = [16.0, 16.0, 8.0]

[[operations]]
name = "rough"
kind = "Rough"

[operations.cutter]
tool = { type = "FlatEndMill", diameter = 4.0, flute_length = 10.0, flutes = 2 }
shank = { diameter = 4.0, length = 10.0 }
holder = { diameter = 30.0, length = 40.0, taper_angle = 0.0 }

[operations.params]
stepover = 1.5
pattern = { type = "ZigZag" }
extension = { type = "Linear", length = 3.0 }
depth = { mode = { type = "ConstantDistance", step = 1.0 }, start = 0.0, end = 3.0, not_finished = "Warn" }
"#;

    fn cascade() -> BladeGeometryModel {
        let side = |y: f64, z: f64, station: f64| {
            Section::new(
                station,
                (0..8).map(|i| Point3::new(i as f64 * 16.0 / 7.0, y, z)).collect(),
            )
        };
        let mut model = BladeGeometryModel::new(
            "cascade",
            PartAxis::default(),
            Pitch::Linear {
                offset: Vec3::new(0.0, 18.0, 0.0),
            },
        );
        for (kind, y) in [(SurfaceKind::BSide, 0.0), (SurfaceKind::ASide, -2.0)] {
            let sections = vec![side(y, 0.0, 0.0), side(y, 8.0, 1.0)];
            model.set_definition(
                SurfaceDefinition::define(SurfaceRole::main(kind), sections, false).unwrap(),
            );
        }
        model
    }

    /// Scratch directory holding `cascade.json`.
    pub(crate) fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bladecam-cli-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let record = ModelRecord { model: cascade() };
        std::fs::write(
            dir.join("cascade.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_parse_job() {
        let job = Job::from_toml_str(ROUGH_JOB, Path::new("/jobs")).unwrap();
        assert_eq!(job.model, PathBuf::from("/jobs/cascade.json"));
        assert!(job.config.is_none());
        assert!(job.rebuild);
        assert_eq!(job.stock.unwrap().max, [16.0, 16.0, 8.0]);

        let op = &job.operations[0];
        assert_eq!(op.kind, OperationKind::Rough);
        assert_eq!(op.cutter.tool.diameter(), 4.0);
        let params = op.params.as_ref().unwrap();
        assert_eq!(params.stepover, 1.5);
        assert_eq!(params.pattern, CutPattern::ZigZag);
        assert_eq!(params.depth.mode, DepthMode::ConstantDistance { step: 1.0 });
        assert_eq!(params.depth.end, Some(3.0));
        // Unlisted fields keep their defaults.
        assert_eq!(params.points_per_row, OperationParams::default().points_per_row);
    }

    #[test]
    fn test_minimal_job() {
        let job = Job::from_toml_str("model = \"m.json\"\nconfig = \"c.toml\"\n", Path::new("dir"))
            .unwrap();
        assert_eq!(job.config, Some(PathBuf::from("dir/c.toml")));
        assert!(job.stock.is_none());
        assert!(job.operations.is_empty());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let content = ROUGH_JOB.replace("kind = \"Rough\"", "kind = \"Polish\"");
        assert!(Job::from_toml_str(&content, Path::new(".")).is_err());
    }

    #[test]
    fn test_open_session_rebuilds_and_adds_operations() {
        let dir = scratch("open");
        let job = Job::from_toml_str(ROUGH_JOB, &dir).unwrap();
        let config = job.load_config().unwrap();
        let session = job.open_session(config, &TaskContext::detached()).unwrap();

        assert!(session.model().solid().is_some());
        let ids = session.operation_ids();
        assert_eq!(ids.len(), 1);
        let operation = session.operation(ids[0]).unwrap();
        assert_eq!(operation.params.linking, session.config().machining.linking());
        assert_eq!(session.plan_operation(ids[0]).unwrap().passes.len(), 3);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_model_reports_path() {
        let job = Job::from_toml_str("model = \"nowhere.json\"\n", Path::new("/nonexistent")).unwrap();
        let err = job
            .open_session(BladecamConfig::default(), &TaskContext::detached())
            .unwrap_err();
        assert!(err.to_string().contains("nowhere.json"));
    }
}
