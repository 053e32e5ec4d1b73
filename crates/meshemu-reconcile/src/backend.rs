//! The notification boundary toward network backends.
//!
//! The engine never touches bridges, taps or tunnels itself. It announces
//! every structural and quality change through [`NetworkBackendNotifications`]
//! and a backend realizes it. Backends may queue work and execute it in
//! [`after_simulation_step`](NetworkBackendNotifications::after_simulation_step),
//! which marks the end of a step's batch.
//!
//! Backends must tolerate repeated notifications for a link that is already
//! in the announced state. Callbacks are synchronous and may block; async
//! callers run the engine on a blocking thread.

use std::time::Duration;

use meshemu_links::QualityParams;
use meshemu_topology::{DistanceMatrix, Interface, Node};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::connection::{Connection, ConnectionInfo};

/// Errors a backend may report back to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A command the backend ran failed.
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    /// A backend operation did not complete in time.
    #[error("backend operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

/// Everything a backend needs to know about the link being touched.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub x: &'a Node,
    pub y: &'a Node,
    pub interface_x: &'a Interface,
    pub interface_y: &'a Interface,
    pub info: ConnectionInfo,
    pub step: u64,
}

/// Answer of a backend to [`NetworkBackendNotifications::before_link_initial_start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialStart {
    /// `false` if the backend cannot create the link (for example because it
    /// ran out of resources). The engine then does not record the connection.
    pub connected: bool,
    /// Handle of the switch or bridge the backend placed the link on.
    pub switch: Option<String>,
}

impl InitialStart {
    pub fn accepted() -> Self {
        Self {
            connected: true,
            switch: None,
        }
    }

    pub fn refused() -> Self {
        Self {
            connected: false,
            switch: None,
        }
    }
}

/// Callbacks the engine issues while reconciling.
///
/// Every method has a permissive default so a backend only implements the
/// notifications it cares about.
#[allow(unused_variables)]
pub trait NetworkBackendNotifications: Send {
    fn before_simulation_step(&mut self, step: u64, distances: &DistanceMatrix) {}

    /// End of the step's batch. Deferred work should run here.
    fn after_simulation_step(
        &mut self,
        step: u64,
        distances: &DistanceMatrix,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn before_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        full: &DistanceMatrix,
    ) {
    }

    fn after_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        full: &DistanceMatrix,
    ) {
    }

    /// A connection is about to be created. Returning `connected: false` vetoes it.
    fn before_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<InitialStart, BackendError> {
        Ok(InitialStart::accepted())
    }

    fn after_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn link_up(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn link_down(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn before_link_quality_adjustment(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) {
    }

    fn after_link_quality_adjustment(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Backend that only logs what it is told. Accepts every link.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBackend;

impl NetworkBackendNotifications for TracingBackend {
    fn before_simulation_step(&mut self, step: u64, distances: &DistanceMatrix) {
        trace!("step {} starting with {} distance entries", step, distances.len());
    }

    fn after_simulation_step(
        &mut self,
        step: u64,
        _distances: &DistanceMatrix,
    ) -> Result<(), BackendError> {
        debug!("step {} committed", step);
        Ok(())
    }

    fn before_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        _full: &DistanceMatrix,
    ) {
        debug!("step {}: {} pairs changed", step, changed.len());
    }

    fn after_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<(), BackendError> {
        info!(
            "created {} ({:?}, remote: {})",
            connection,
            connection.kind,
            ctx.info.is_remote_conn
        );
        Ok(())
    }

    fn link_up(
        &mut self,
        _ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        info!("link up {} {:?}", connection, params);
        Ok(())
    }

    fn link_down(
        &mut self,
        _ctx: &LinkContext<'_>,
        connection: &Connection,
        _params: &QualityParams,
    ) -> Result<(), BackendError> {
        info!("link down {}", connection);
        Ok(())
    }

    fn after_link_quality_adjustment(
        &mut self,
        _ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        trace!("adjusted {} (connected: {}) {:?}", connection, still_connected, params);
        Ok(())
    }
}

/// Fans every notification out to several backends, in order.
///
/// A link start is confirmed only if every backend confirms it; the first
/// switch handle reported wins. The first error stops the fan-out.
#[derive(Default)]
pub struct Broadcast {
    backends: Vec<Box<dyn NetworkBackendNotifications>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, backend: impl NetworkBackendNotifications + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl NetworkBackendNotifications for Broadcast {
    fn before_simulation_step(&mut self, step: u64, distances: &DistanceMatrix) {
        for b in &mut self.backends {
            b.before_simulation_step(step, distances);
        }
    }

    fn after_simulation_step(
        &mut self,
        step: u64,
        distances: &DistanceMatrix,
    ) -> Result<(), BackendError> {
        self.backends
            .iter_mut()
            .try_for_each(|b| b.after_simulation_step(step, distances))
    }

    fn before_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        full: &DistanceMatrix,
    ) {
        for b in &mut self.backends {
            b.before_distance_matrix_changed(step, changed, full);
        }
    }

    fn after_distance_matrix_changed(
        &mut self,
        step: u64,
        changed: &DistanceMatrix,
        full: &DistanceMatrix,
    ) {
        for b in &mut self.backends {
            b.after_distance_matrix_changed(step, changed, full);
        }
    }

    fn before_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<InitialStart, BackendError> {
        let mut outcome = InitialStart::accepted();
        for b in &mut self.backends {
            let start = b.before_link_initial_start(ctx, connection)?;
            outcome.connected &= start.connected;
            if outcome.switch.is_none() {
                outcome.switch = start.switch;
            }
        }
        Ok(outcome)
    }

    fn after_link_initial_start(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
    ) -> Result<(), BackendError> {
        self.backends
            .iter_mut()
            .try_for_each(|b| b.after_link_initial_start(ctx, connection))
    }

    fn link_up(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        self.backends
            .iter_mut()
            .try_for_each(|b| b.link_up(ctx, connection, params))
    }

    fn link_down(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        self.backends
            .iter_mut()
            .try_for_each(|b| b.link_down(ctx, connection, params))
    }

    fn before_link_quality_adjustment(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) {
        for b in &mut self.backends {
            b.before_link_quality_adjustment(ctx, connection, still_connected, params);
        }
    }

    fn after_link_quality_adjustment(
        &mut self,
        ctx: &LinkContext<'_>,
        connection: &Connection,
        still_connected: bool,
        params: &QualityParams,
    ) -> Result<(), BackendError> {
        self.backends
            .iter_mut()
            .try_for_each(|b| {
                b.after_link_quality_adjustment(ctx, connection, still_connected, params)
            })
    }
}
