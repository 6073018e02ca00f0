//! Explicit session context.
//!
//! A [`Session`] owns one blade geometry model and the operations
//! machining it. Concurrency rules:
//!
//! - One rebuild at a time. Definition edits take the same guard, so an
//!   edit during a rebuild fails with [`BladecamError::Busy`] instead of
//!   being lost.
//! - Readers always see the last committed model; a rebuild works on a
//!   copy and swaps it in when it succeeds.
//! - Generating an operation cancels any generation of that operation
//!   already in flight. The older call returns
//!   [`BladecamError::Superseded`] and its result is discarded.
//! - Any model change marks stored toolpaths stale. They are kept for
//!   inspection but cannot be simulated until regenerated.

use std::collections::HashMap;
use std::sync::Arc;

use bladecam_kernel_cam::{
    generate_toolpath, plan, Cutter, GeneratedToolpath, Operation, OperationKind, PlanOutcome,
};
use bladecam_kernel_geom::{
    BladeGeometryModel, FilletSpec, GenerationMode, LaminationSchedule, PickMode,
    ReferenceGeometry, SamplingParams, Section, SurfaceDefinition, SurfaceRole,
};
use bladecam_kernel_math::Aabb;
use bladecam_kernel_stocksim::{RunSummary, Simulation, SimulationSettings, SimulationStep, Stock};
use bladecam_kernel_task::{CancelToken, Stage, TaskContext};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;
use uuid::Uuid;

use crate::config::BladecamConfig;
use crate::error::{BladecamError, Result};
use crate::events::{EventBus, SessionEvent};

/// A generated toolpath as stored on its operation.
#[derive(Debug, Clone)]
pub(crate) struct StoredToolpath {
    pub generated: Arc<GeneratedToolpath>,
    pub model_revision: u64,
    pub valid: bool,
}

#[derive(Debug)]
pub(crate) struct OperationSlot {
    pub id: Uuid,
    pub operation: Operation,
    pub toolpath: Option<StoredToolpath>,
    ticket: u64,
    in_flight: Option<CancelToken>,
}

impl OperationSlot {
    pub(crate) fn new(id: Uuid, operation: Operation) -> Self {
        Self {
            id,
            operation,
            toolpath: None,
            ticket: 0,
            in_flight: None,
        }
    }

    /// Cancel any in-flight generation and make its result stale.
    fn supersede(&mut self) {
        self.ticket += 1;
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
            tracing::debug!(operation = %self.id, "in-flight generation superseded");
        }
    }
}

/// Reconstruction, planning and simulation state for one part.
pub struct Session {
    config: BladecamConfig,
    model: RwLock<Arc<BladeGeometryModel>>,
    rebuild_guard: Mutex<()>,
    pub(crate) operations: RwLock<Vec<OperationSlot>>,
    simulations: Mutex<HashMap<Uuid, Arc<Mutex<Simulation>>>>,
    events: EventBus,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let model = self.model();
        f.debug_struct("Session")
            .field("model", &model.name)
            .field("revision", &model.revision())
            .field("operations", &self.operations.read().len())
            .field("events", &self.events)
            .finish()
    }
}

fn find(slots: &[OperationSlot], id: Uuid) -> Result<&OperationSlot> {
    slots
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| BladecamError::operation_not_found(id))
}

fn find_mut(slots: &mut [OperationSlot], id: Uuid) -> Result<&mut OperationSlot> {
    slots
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| BladecamError::operation_not_found(id))
}

impl Session {
    /// Session over `model`.
    pub fn new(config: BladecamConfig, model: BladeGeometryModel) -> Self {
        Self {
            config,
            model: RwLock::new(Arc::new(model)),
            rebuild_guard: Mutex::new(()),
            operations: RwLock::new(Vec::new()),
            simulations: Mutex::new(HashMap::new()),
            events: EventBus::new(),
        }
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &BladecamConfig {
        &self.config
    }

    /// Event bus for subscribing to session changes.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Last committed model.
    pub fn model(&self) -> Arc<BladeGeometryModel> {
        Arc::clone(&*self.model.read())
    }

    /// Revision of the committed model.
    pub fn revision(&self) -> u64 {
        self.model.read().revision()
    }

    fn edit_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.rebuild_guard
            .try_lock()
            .ok_or_else(|| BladecamError::Busy(self.model().name.clone()))
    }

    fn edit_model<R>(&self, f: impl FnOnce(&mut BladeGeometryModel) -> R) -> R {
        let mut model = self.model.write();
        f(Arc::make_mut(&mut *model))
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Create a definition for `role` sampled from picked `reference`.
    ///
    /// Uses the configured sampling layout. Replaces any existing
    /// definition of the role.
    pub fn define_surface(
        &self,
        role: SurfaceRole,
        reference: ReferenceGeometry,
        pick: PickMode,
        generation: GenerationMode,
    ) -> Result<()> {
        let mut definition = SurfaceDefinition::new(role)
            .with_source(reference, pick)
            .with_generation(generation);
        definition.configure_sampling(self.config.sampling.params())?;
        self.set_definition(definition)
    }

    /// Insert or replace a definition.
    pub fn set_definition(&self, definition: SurfaceDefinition) -> Result<()> {
        let role = definition.role();
        {
            let _guard = self.edit_guard()?;
            self.edit_model(|m| m.set_definition(definition));
        }
        self.model_changed(SessionEvent::DefinitionChanged { role: Some(role) });
        Ok(())
    }

    /// Remove the definition of `role`.
    pub fn remove_definition(&self, role: SurfaceRole) -> Result<SurfaceDefinition> {
        let removed = {
            let _guard = self.edit_guard()?;
            self.edit_model(|m| m.remove_definition(role))
        }
        .ok_or_else(|| BladecamError::NotFound {
            kind: "surface definition",
            id: role.to_string(),
        })?;
        self.model_changed(SessionEvent::DefinitionChanged { role: Some(role) });
        Ok(removed)
    }

    /// Change the sampling layout of one definition.
    pub fn configure_sampling(&self, role: SurfaceRole, params: SamplingParams) -> Result<()> {
        {
            let _guard = self.edit_guard()?;
            let mut definition = self.definition(role)?;
            definition.configure_sampling(params)?;
            self.edit_model(|m| m.set_definition(definition));
        }
        self.model_changed(SessionEvent::DefinitionChanged { role: Some(role) });
        Ok(())
    }

    /// Set or clear the fillet.
    pub fn set_fillet(&self, fillet: Option<FilletSpec>) -> Result<()> {
        if let Some(spec) = &fillet {
            spec.validate()?;
        }
        {
            let _guard = self.edit_guard()?;
            self.edit_model(|m| m.set_fillet(fillet));
        }
        self.model_changed(SessionEvent::DefinitionChanged { role: None });
        Ok(())
    }

    fn definition(&self, role: SurfaceRole) -> Result<SurfaceDefinition> {
        self.model()
            .definition(role)
            .cloned()
            .ok_or_else(|| BladecamError::NotFound {
                kind: "surface definition",
                id: role.to_string(),
            })
    }

    /// Sample a new section at `station` and add it to the definition of `role`.
    ///
    /// The definition is untouched if sampling fails or the task is
    /// cancelled.
    pub fn sample(&self, role: SurfaceRole, station: f64, ctx: &TaskContext) -> Result<Section> {
        ctx.ensure_active(Stage::Sampling, 0, 1)?;
        let (section, sections) = {
            let _guard = self.edit_guard()?;
            let model = self.model();
            let mut definition = self.definition(role)?;
            let rebuilt = model.solid().and_then(|s| s.surface(role));
            let section = definition.add_sample(station, &model.axis, rebuilt)?.clone();
            ctx.checkpoint(Stage::Sampling, 1, 1, format!("{role} at {station}"))?;
            let sections = definition.sections().len();
            self.edit_model(|m| m.set_definition(definition));
            (section, sections)
        };
        tracing::debug!(%role, station, sections, "section sampled");
        self.model_changed(SessionEvent::SectionsChanged { role, sections });
        Ok(section)
    }

    /// Rebuild the model and commit it.
    ///
    /// Fails with [`BladecamError::Busy`] while another rebuild runs. On
    /// error or cancellation the committed model is unchanged.
    pub fn rebuild(
        &self,
        lamination: Option<&LaminationSchedule>,
        ctx: &TaskContext,
    ) -> Result<u64> {
        let revision = {
            let _guard = self.edit_guard()?;
            let mut staged = BladeGeometryModel::clone(&self.model());
            staged.rebuild(lamination, ctx)?;
            let revision = staged.revision();
            *self.model.write() = Arc::new(staged);
            revision
        };
        self.model_changed(SessionEvent::SolidRebuilt { revision });
        Ok(revision)
    }

    fn model_changed(&self, event: SessionEvent) {
        self.events.publish(&event);
        for operation in self.invalidate_toolpaths() {
            self.events
                .publish(&SessionEvent::ToolpathInvalidated { operation });
        }
    }

    fn invalidate_toolpaths(&self) -> Vec<Uuid> {
        let invalidated: Vec<Uuid> = {
            let mut operations = self.operations.write();
            operations
                .iter_mut()
                .filter_map(|slot| match slot.toolpath.as_mut() {
                    Some(stored) if stored.valid => {
                        stored.valid = false;
                        Some(slot.id)
                    }
                    _ => None,
                })
                .collect()
        };
        if !invalidated.is_empty() {
            let mut simulations = self.simulations.lock();
            for id in &invalidated {
                simulations.remove(id);
            }
            tracing::debug!(count = invalidated.len(), "toolpaths invalidated");
        }
        invalidated
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Operation with the configured linking and feed defaults.
    pub fn new_operation(
        &self,
        name: impl Into<String>,
        kind: OperationKind,
        cutter: Cutter,
    ) -> Operation {
        let mut operation = Operation::new(name, kind, cutter);
        self.config.machining.apply(&mut operation.params);
        operation
    }

    /// Validate and register an operation.
    pub fn add_operation(&self, operation: Operation) -> Result<Uuid> {
        operation.validate()?;
        let id = Uuid::new_v4();
        tracing::debug!(operation = %id, name = %operation.name, kind = %operation.kind, "operation added");
        self.operations
            .write()
            .push(OperationSlot::new(id, operation));
        Ok(id)
    }

    /// Ids in insertion order.
    pub fn operation_ids(&self) -> Vec<Uuid> {
        self.operations.read().iter().map(|s| s.id).collect()
    }

    /// Copy of an operation.
    pub fn operation(&self, id: Uuid) -> Result<Operation> {
        Ok(find(&self.operations.read(), id)?.operation.clone())
    }

    /// Replace an operation's definition.
    ///
    /// Its toolpath goes stale and any generation in flight is superseded.
    pub fn update_operation(&self, id: Uuid, operation: Operation) -> Result<()> {
        operation.validate()?;
        let invalidated = {
            let mut operations = self.operations.write();
            let slot = find_mut(&mut operations, id)?;
            slot.operation = operation;
            slot.supersede();
            match slot.toolpath.as_mut() {
                Some(stored) if stored.valid => {
                    stored.valid = false;
                    true
                }
                _ => false,
            }
        };
        self.simulations.lock().remove(&id);
        if invalidated {
            self.events
                .publish(&SessionEvent::ToolpathInvalidated { operation: id });
        }
        Ok(())
    }

    /// Remove an operation with its toolpath and simulation.
    pub fn remove_operation(&self, id: Uuid) -> Result<Operation> {
        let mut slot = {
            let mut operations = self.operations.write();
            let idx = operations
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| BladecamError::operation_not_found(id))?;
            operations.remove(idx)
        };
        slot.supersede();
        self.simulations.lock().remove(&id);
        Ok(slot.operation)
    }

    /// Partition an operation into passes without storing anything.
    pub fn plan_operation(&self, id: Uuid) -> Result<PlanOutcome> {
        let operation = self.operation(id)?;
        let outcome = plan(&operation, &self.model())?;
        for warning in &outcome.warnings {
            tracing::warn!(operation = %id, "{warning}");
        }
        Ok(outcome)
    }

    /// Generate and store the toolpath of one operation.
    ///
    /// A later call for the same operation cancels this one, which then
    /// fails with [`BladecamError::Superseded`]. On any error the
    /// previously stored toolpath stays as it was.
    pub fn generate(&self, id: Uuid, ctx: &TaskContext) -> Result<Arc<GeneratedToolpath>> {
        let ctx = ctx.child();
        let (operation, ticket) = {
            let mut operations = self.operations.write();
            let slot = find_mut(&mut operations, id)?;
            slot.supersede();
            slot.in_flight = Some(ctx.cancel_token().clone());
            (slot.operation.clone(), slot.ticket)
        };

        let model = self.model();
        let result = generate_toolpath(&operation, &model, &ctx);

        let generated = {
            let mut operations = self.operations.write();
            let slot = find_mut(&mut operations, id)?;
            if slot.ticket != ticket {
                return Err(BladecamError::Superseded(id));
            }
            slot.in_flight = None;
            let generated = Arc::new(result?);
            slot.toolpath = Some(StoredToolpath {
                generated: Arc::clone(&generated),
                model_revision: model.revision(),
                valid: model.revision() == self.revision(),
            });
            generated
        };
        self.simulations.lock().remove(&id);

        for warning in &generated.warnings {
            tracing::warn!(operation = %id, "{warning}");
        }
        self.events.publish(&SessionEvent::ToolpathGenerated {
            operation: id,
            segments: generated.toolpath.len(),
        });
        Ok(generated)
    }

    /// Generate every operation in parallel.
    ///
    /// Results are in insertion order. Cancelling `ctx` cancels all of
    /// them.
    pub fn generate_all(&self, ctx: &TaskContext) -> Vec<(Uuid, Result<Arc<GeneratedToolpath>>)> {
        self.operation_ids()
            .into_par_iter()
            .map(|id| (id, self.generate(id, ctx)))
            .collect()
    }

    /// Stored toolpath of an operation, valid or not.
    pub fn toolpath(&self, id: Uuid) -> Result<Option<Arc<GeneratedToolpath>>> {
        let operations = self.operations.read();
        Ok(find(&operations, id)?
            .toolpath
            .as_ref()
            .map(|t| Arc::clone(&t.generated)))
    }

    /// Whether the stored toolpath matches the current model and operation.
    pub fn is_toolpath_valid(&self, id: Uuid) -> Result<bool> {
        let operations = self.operations.read();
        Ok(find(&operations, id)?
            .toolpath
            .as_ref()
            .is_some_and(|t| t.valid))
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Block stock at the configured resolution.
    pub fn stock_from_box(&self, bounds: Aabb) -> Result<Stock> {
        Ok(Stock::from_box(bounds, self.config.simulation.resolution)?)
    }

    /// A detached simulation of an operation's valid toolpath.
    ///
    /// Add a part gauge before attaching it with
    /// [`attach_simulation`](Self::attach_simulation).
    pub fn prepare_simulation(&self, id: Uuid, stock: Stock) -> Result<Simulation> {
        self.prepare_simulation_with(id, stock, self.config.simulation.settings())
    }

    /// [`prepare_simulation`](Self::prepare_simulation) with explicit
    /// simulator settings.
    pub fn prepare_simulation_with(
        &self,
        id: Uuid,
        stock: Stock,
        settings: SimulationSettings,
    ) -> Result<Simulation> {
        let (toolpath, cutter) = {
            let operations = self.operations.read();
            let slot = find(&operations, id)?;
            let stored = slot.toolpath.as_ref().ok_or_else(|| BladecamError::NotFound {
                kind: "toolpath",
                id: id.to_string(),
            })?;
            if !stored.valid {
                return Err(BladecamError::StaleToolpath(id));
            }
            (stored.generated.toolpath.clone(), slot.operation.cutter.clone())
        };
        Ok(Simulation::new(toolpath, stock, cutter, settings)?)
    }

    /// Make `simulation` the active simulation of an operation.
    pub fn attach_simulation(&self, id: Uuid, simulation: Simulation) -> Result<()> {
        find(&self.operations.read(), id)?;
        self.simulations
            .lock()
            .insert(id, Arc::new(Mutex::new(simulation)));
        Ok(())
    }

    /// Start simulating an operation. Returns its segment count.
    pub fn start_simulation(&self, id: Uuid, stock: Stock) -> Result<usize> {
        self.start_simulation_with(id, stock, self.config.simulation.settings())
    }

    /// Start simulating an operation with explicit simulator settings.
    pub fn start_simulation_with(
        &self,
        id: Uuid,
        stock: Stock,
        settings: SimulationSettings,
    ) -> Result<usize> {
        let simulation = self.prepare_simulation_with(id, stock, settings)?;
        let len = simulation.len();
        self.attach_simulation(id, simulation)?;
        Ok(len)
    }

    /// The active simulation of an operation. The map lock is released
    /// before the caller locks the simulation itself.
    fn active_simulation(&self, id: Uuid) -> Result<Arc<Mutex<Simulation>>> {
        self.simulations
            .lock()
            .get(&id)
            .map(Arc::clone)
            .ok_or_else(|| BladecamError::NotFound {
                kind: "simulation",
                id: id.to_string(),
            })
    }

    /// Advance the active simulation by up to `count` steps.
    pub fn simulate_step(&self, id: Uuid, count: usize) -> Result<Vec<SimulationStep>> {
        let steps: Vec<SimulationStep> = {
            let simulation = self.active_simulation(id)?;
            let mut simulation = simulation.lock();
            (0..count).map_while(|_| simulation.step_forward()).collect()
        };
        self.publish_steps(id, &steps);
        Ok(steps)
    }

    /// Play the active simulation to the end.
    ///
    /// Stops at the first collision when the configuration asks for it.
    pub fn run_simulation(&self, id: Uuid, ctx: &TaskContext) -> Result<RunSummary> {
        let stop = self.config.simulation.stop_on_collision;
        let (summary, steps) = {
            let simulation = self.active_simulation(id)?;
            let mut simulation = simulation.lock();
            let from = simulation.position();
            let summary = simulation.run_to_end(ctx, stop);
            let to = simulation.position();
            (summary, simulation.steps()[from..to].to_vec())
        };
        self.publish_steps(id, &steps);
        Ok(summary?)
    }

    /// Run `f` on the active simulation of an operation.
    pub fn with_simulation<R>(&self, id: Uuid, f: impl FnOnce(&mut Simulation) -> R) -> Result<R> {
        let simulation = self.active_simulation(id)?;
        let mut simulation = simulation.lock();
        Ok(f(&mut *simulation))
    }

    fn publish_steps(&self, id: Uuid, steps: &[SimulationStep]) {
        for step in steps {
            if step.status.is_collision() {
                tracing::warn!(operation = %id, step = step.index, status = step.status.label(), "collision detected");
            }
            self.events.publish(&SessionEvent::SimulationStep {
                operation: id,
                step: Box::new(step.clone()),
            });
        }
    }
}
