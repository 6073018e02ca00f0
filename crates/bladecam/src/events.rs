//! Outbound session events.
//!
//! The session publishes an event after every committed change. Handlers
//! run synchronously on the publishing thread, after the session has
//! released its own locks, so they may call back into the session. They
//! must not subscribe or unsubscribe from inside a handler.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use bladecam_kernel_geom::SurfaceRole;
use bladecam_kernel_stocksim::SimulationStep;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something that changed in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A section was sampled into a definition.
    SectionsChanged {
        /// Affected definition.
        role: SurfaceRole,
        /// Section count afterwards.
        sections: usize,
    },
    /// A definition or the fillet was replaced or removed.
    DefinitionChanged {
        /// Affected definition, `None` for the fillet.
        role: Option<SurfaceRole>,
    },
    /// A rebuild committed.
    SolidRebuilt {
        /// Model revision after the commit.
        revision: u64,
    },
    /// A toolpath was generated and stored.
    ToolpathGenerated {
        /// Owning operation.
        operation: Uuid,
        /// Motion segments.
        segments: usize,
    },
    /// A stored toolpath went out of date.
    ToolpathInvalidated {
        /// Owning operation.
        operation: Uuid,
    },
    /// A simulation step was computed.
    SimulationStep {
        /// Simulated operation.
        operation: Uuid,
        /// The step.
        step: Box<SimulationStep>,
    },
}

/// Coarse grouping used by [`EventFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Sections, definitions and rebuilds.
    Geometry,
    /// Toolpath generation and invalidation.
    Toolpath,
    /// Simulation steps.
    Simulation,
}

impl SessionEvent {
    /// Category of this event.
    pub fn category(&self) -> EventCategory {
        match self {
            SessionEvent::SectionsChanged { .. }
            | SessionEvent::DefinitionChanged { .. }
            | SessionEvent::SolidRebuilt { .. } => EventCategory::Geometry,
            SessionEvent::ToolpathGenerated { .. } | SessionEvent::ToolpathInvalidated { .. } => {
                EventCategory::Toolpath
            }
            SessionEvent::SimulationStep { .. } => EventCategory::Simulation,
        }
    }
}

/// Subscription handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Everything.
    #[default]
    All,
    /// Events in any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Whether `event` passes.
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type EventHandler = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Synchronous fan-out of session events.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching handler. Returns how many ran.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        let handlers = self.handlers.read();
        let mut delivered = 0;
        for (filter, handler) in handlers.values() {
            if filter.matches(event) {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Register a handler.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Box::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Register a channel that receives a copy of every matching event.
    ///
    /// Dropping the receiver does not unsubscribe; sends to it are ignored.
    pub fn channel(&self, filter: EventFilter) -> (SubscriptionId, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let id = self.subscribe(filter, move |event| {
            let _ = tx.lock().send(event.clone());
        });
        (id, rx)
    }

    /// Remove a handler. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}
