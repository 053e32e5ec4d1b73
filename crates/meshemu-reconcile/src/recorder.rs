//! Event recording backend.
//!
//! [`EventLog`] turns every notification into a serializable [`LinkEvent`].
//! The log is a shared handle: clone it before handing it to the engine and
//! read the events through the clone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use meshemu_links::QualityParams;
use meshemu_topology::{DistanceMatrix, Endpoint};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, InitialStart, LinkContext, NetworkBackendNotifications};
use crate::connection::{Connection, ConnectionId, ConnectionKind};

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkEvent {
    /// A step began reconciling.
    StepStarted { step: u64 },

    /// The set of changed pairs for a step is known.
    DistancesChanged { step: u64, changed: usize },

    /// A connection record was created.
    LinkCreated {
        step: u64,
        connection: ConnectionId,
        kind: ConnectionKind,
        a: Endpoint,
        b: Endpoint,
    },

    /// A link was activated.
    LinkUp {
        step: u64,
        connection: ConnectionId,
        a: Endpoint,
        b: Endpoint,
        params: QualityParams,
    },

    /// A link was deactivated.
    LinkDown {
        step: u64,
        connection: ConnectionId,
        a: Endpoint,
        b: Endpoint,
    },

    /// Shaping of an active link was updated.
    QualityAdjusted {
        step: u64,
        connection: ConnectionId,
        still_connected: bool,
        params: QualityParams,
    },

    /// The step's batch was committed.
    StepCommitted { step: u64 },
}

impl LinkEvent {
    /// Step the event belongs to.
    pub fn step(&self) -> u64 {
        match self {
            LinkEvent::StepStarted { step } => *step,
            LinkEvent::DistancesChanged { step, .. } => *step,
            LinkEvent::LinkCreated { step, .. } => *step,
            LinkEvent::LinkUp { step, .. } => *step,
            LinkEvent::LinkDown { step, .. } => *step,
            LinkEvent::QualityAdjusted { step, .. } => *step,
            LinkEvent::StepCommitted { step } => *step,
        }
    }

    /// Connection the event is about, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            LinkEvent::LinkCreated { connection, .. }
            | LinkEvent::LinkUp { connection, .. }
            | LinkEvent::LinkDown { connection, .. }
            | LinkEvent::QualityAdjusted { connection, .. } => Some(*connection),
            LinkEvent::StepStarted { .. }
            | LinkEvent::DistancesChanged { .. }
            | LinkEvent::StepCommitted { .. } => None,
        }
    }

    /// Whether the event switches a link on or off.
    pub fn is_transition(&self) -> bool {
        matches!(self, LinkEvent::LinkUp { .. } | LinkEvent::LinkDown { .. })
    }
}

/// Shared, append-only record of notifications.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.lock().clone()
    }

    /// Events of one step.
    pub fn events_at(&self, step: u64) -> Vec<LinkEvent> {
        self.lock().iter().filter(|e| e.step() == step).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, event: LinkEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LinkEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NetworkBackendNotifications for EventLog {
    fn before_simulation_step(&mut self, step: u64, _distances: &DistanceMatrix) {
        self.push(LinkEvent::StepStarted { step });
    }

    fn after_simulation_step(
        &mut self,
        step: u64,
        _distances: &DistanceMatrix,
    ) -> Result<(), BackendError> {
        self.push(LinkEvent::StepCommitted { step });
        Ok(())
    }

    fn before_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        _full: &DistanceMatrix,
    ) {
        self.push(LinkEvent::DistancesChanged {
            step,
            changed: changed.len(),
        });
    }

    fn before_link_initial_start(
        &mut self,
        _ctx: &LinkContext<'_>,
        _connection: &Connection,
    ) -> Result<InitialStart, BackendError> {
        Ok(InitialStart::accepted())
    }

    fn after_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<(), BackendError> {
        let (a, b) = connection.endpoints();
        self.push(LinkEvent::LinkCreated {
            step: ctx.step,
            connection: connection.id,
            kind: connection.kind,
            a,
            b,
        });
        Ok(())
    }

    fn link_up(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        let (a, b) = connection.endpoints();
        self.push(LinkEvent::LinkUp {
            step: ctx.step,
            connection: connection.id,
            a,
            b,
            params: *params,
        });
        Ok(())
    }

    fn link_down(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        _params: &QualityParams,
    ) -> Result<(), BackendError> {
        let (a, b) = connection.endpoints();
        self.push(LinkEvent::LinkDown {
            step: ctx.step,
            connection: connection.id,
            a,
            b,
        });
        Ok(())
    }

    fn after_link_quality_adjustment(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        self.push(LinkEvent::QualityAdjusted {
            step: ctx.step,
            connection: connection.id,
            still_connected,
            params: *params,
        });
        Ok(())
    }
}
