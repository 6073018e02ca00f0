//! Persisted record schema.
//!
//! Plain serde records of a session: the model, its operations and their
//! toolpaths keyed by operation id. The file format is the caller's
//! choice; JSON helpers are provided.

use std::path::Path;
use std::sync::Arc;

use bladecam_kernel_cam::{GeneratedToolpath, Operation};
use bladecam_kernel_geom::BladeGeometryModel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BladecamConfig;
use crate::error::{BladecamError, Result};
use crate::session::{OperationSlot, Session, StoredToolpath};

/// Current record schema version.
pub const RECORD_VERSION: u32 = 1;

/// The blade model, including its revision and last rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    /// The model.
    pub model: BladeGeometryModel,
}

/// One operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation id.
    pub id: Uuid,
    /// Definition.
    pub operation: Operation,
}

/// A stored toolpath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolpathRecord {
    /// Owning operation.
    pub operation: Uuid,
    /// Model revision the toolpath was generated from.
    pub model_revision: u64,
    /// Whether it was up to date when saved.
    pub valid: bool,
    /// Passes, axes and linked segments.
    pub generated: GeneratedToolpath,
}

/// Everything needed to restore a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Schema version, [`RECORD_VERSION`] when written.
    pub version: u32,
    /// The model.
    pub model: ModelRecord,
    /// Operations in insertion order.
    pub operations: Vec<OperationRecord>,
    /// Toolpaths keyed by operation id.
    pub toolpaths: Vec<ToolpathRecord>,
}

impl SessionRecord {
    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read JSON.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl Session {
    /// Snapshot as a record.
    pub fn to_record(&self) -> SessionRecord {
        let model = BladeGeometryModel::clone(&self.model());
        let operations = self.operations.read();
        SessionRecord {
            version: RECORD_VERSION,
            model: ModelRecord { model },
            operations: operations
                .iter()
                .map(|slot| OperationRecord {
                    id: slot.id,
                    operation: slot.operation.clone(),
                })
                .collect(),
            toolpaths: operations
                .iter()
                .filter_map(|slot| {
                    slot.toolpath.as_ref().map(|stored| ToolpathRecord {
                        operation: slot.id,
                        model_revision: stored.model_revision,
                        valid: stored.valid,
                        generated: GeneratedToolpath::clone(&stored.generated),
                    })
                })
                .collect(),
        }
    }

    /// Restore a session.
    ///
    /// A toolpath stays valid only if it was valid when saved and was
    /// generated from the recorded model revision.
    pub fn from_record(config: BladecamConfig, record: SessionRecord) -> Result<Self> {
        if record.version != RECORD_VERSION {
            return Err(BladecamError::Config(format!(
                "unsupported record version {}, expected {RECORD_VERSION}",
                record.version
            )));
        }
        let revision = record.model.model.revision();
        let mut slots = Vec::with_capacity(record.operations.len());
        for entry in record.operations {
            if slots.iter().any(|s: &OperationSlot| s.id == entry.id) {
                return Err(BladecamError::Config(format!(
                    "duplicate operation id {}",
                    entry.id
                )));
            }
            entry.operation.validate()?;
            slots.push(OperationSlot::new(entry.id, entry.operation));
        }
        for toolpath in record.toolpaths {
            let slot = slots
                .iter_mut()
                .find(|s| s.id == toolpath.operation)
                .ok_or_else(|| BladecamError::operation_not_found(toolpath.operation))?;
            slot.toolpath = Some(StoredToolpath {
                generated: Arc::new(toolpath.generated),
                model_revision: toolpath.model_revision,
                valid: toolpath.valid && toolpath.model_revision == revision,
            });
        }

        let session = Session::new(config, record.model.model);
        *session.operations.write() = slots;
        tracing::info!(
            revision,
            operations = session.operation_ids().len(),
            "session restored"
        );
        Ok(session)
    }
}
