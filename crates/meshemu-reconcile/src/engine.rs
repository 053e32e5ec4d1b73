//! Step-driven reconciliation of distances into links.
//!
//! Per node pair the engine walks a small state machine:
//!
//! ```text
//! NO_CONNECTION ──▶ INACTIVE ◀──▶ ACTIVE
//! ```
//!
//! Each step it diffs the new distance matrix against the last accepted one
//! and visits only the changed pairs, in upper-triangular order. For every
//! changed pair it first creates connections that do not exist yet (if the
//! link-quality model says the nodes are in range) and then adjusts, tears
//! down or reactivates the existing ones. The backend hears about every
//! change through [`NetworkBackendNotifications`].
//!
//! A failure on one pair is logged and recorded in the [`StepReport`]; the
//! remaining pairs are still reconciled. The next diff that flags the pair
//! is the retry.

use std::collections::BTreeMap;

use meshemu_links::{LinkDecision, LinkQualityModel, QualityParams};
use meshemu_topology::{
    Distance, DistanceMatrix, EqualInterfaceNumbers, HubInterfaces, Interface, InterfaceFilter,
    Node,
    NodeId, NodeRole, PairKey,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, LinkContext, NetworkBackendNotifications};
use crate::connection::{Connection, ConnectionInfo, ConnectionKind, InterfacePair};
use crate::differ::DistanceMatrixDiffer;
use crate::error::{ReconcileError, Result};
use crate::movement::MovementModel;
use crate::remote::{LocalOnly, RemotePairPolicy};
use crate::store::ConnectionStore;

/// Callback run once after the network of step 0 is set up.
pub type SetupHook = Box<dyn FnOnce(&ConnectionStore) + Send>;

/// A pair that could not be reconciled in a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub pair: PairKey,
    pub distance: Distance,
    pub error: String,
}

/// What one step did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepReport {
    pub step: u64,
    /// Changed pairs, hub overlay included.
    pub changed_pairs: usize,
    /// The step was short-circuited because nothing changed.
    pub unchanged: bool,
    pub created: usize,
    pub links_up: usize,
    pub links_down: usize,
    pub adjusted: usize,
    /// Link starts vetoed by the backend.
    pub refused: usize,
    pub failures: Vec<PairFailure>,
    /// Error reported by the backend when committing the step.
    pub commit_error: Option<String>,
}

impl StepReport {
    /// Number of link activations and deactivations.
    pub fn transitions(&self) -> usize {
        self.links_up + self.links_down
    }
}

/// Turns successive distance matrices into link operations.
pub struct ReconciliationEngine {
    nodes: BTreeMap<NodeId, Node>,
    quality: Box<dyn LinkQualityModel>,
    filter: Box<dyn InterfaceFilter>,
    backend: Box<dyn NetworkBackendNotifications>,
    remote: Box<dyn RemotePairPolicy>,
    movement: Option<Box<dyn MovementModel>>,
    differ: DistanceMatrixDiffer,
    store: ConnectionStore,
    current_step: u64,
    setup_hooks: Vec<SetupHook>,
}

impl ReconciliationEngine {
    /// Create an engine with equal-index interface pairing, no remote pairs
    /// and no movement model.
    pub fn new(
        quality: Box<dyn LinkQualityModel>,
        backend: Box<dyn NetworkBackendNotifications>,
    ) -> Self {
        Self {
            nodes: BTreeMap::new(),
            quality,
            filter: Box::new(EqualInterfaceNumbers),
            backend,
            remote: Box::new(LocalOnly),
            movement: None,
            differ: DistanceMatrixDiffer::new(),
            store: ConnectionStore::new(),
            current_step: 0,
            setup_hooks: Vec::new(),
        }
    }

    /// Set the interface pairing used between emulation nodes.
    #[must_use]
    pub fn with_filter(mut self, filter: Box<dyn InterfaceFilter>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_remote_policy(mut self, policy: Box<dyn RemotePairPolicy>) -> Self {
        self.remote = policy;
        self
    }

    #[must_use]
    pub fn with_movement(mut self, movement: Box<dyn MovementModel>) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn set_movement(&mut self, movement: Box<dyn MovementModel>) {
        self.movement = Some(movement);
    }

    /// Register a node. Ids must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(ReconcileError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Register a hook that runs once, right after step 0 has been committed.
    pub fn on_network_setup(&mut self, hook: impl FnOnce(&ConnectionStore) + Send + 'static) {
        self.setup_hooks.push(Box::new(hook));
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn store(&self) -> &ConnectionStore {
        &self.store
    }

    /// The step the next call to [`step`](Self::step) will run.
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Last accepted distance matrix, without hub overlay.
    pub fn distances(&self) -> &DistanceMatrix {
        self.differ.current()
    }

    pub fn hub_overlay(&self) -> Option<&DistanceMatrix> {
        self.differ.hub_overlay()
    }

    pub fn quality_model(&self) -> &dyn LinkQualityModel {
        self.quality.as_ref()
    }

    /// Whether pairs may span several servers.
    pub fn is_distributed(&self) -> bool {
        self.remote.is_distributed()
    }

    /// Bring up the always-on management links.
    ///
    /// Every emulation node with a management interface is linked to the
    /// management node, if one is registered. Existing links are kept and
    /// links left inactive by an earlier failure are retried. A node whose
    /// link the backend refuses or fails is logged and skipped. Returns the
    /// number of links brought up.
    pub fn connect_management(&mut self) -> Result<usize> {
        let Self {
            nodes,
            quality,
            backend,
            store,
            current_step,
            ..
        } = self;
        let Some(mgmt) = nodes.get(&NodeId::MANAGEMENT) else {
            return Ok(0);
        };
        let Some(mgmt_iface) = mgmt.management_interface() else {
            return Ok(0);
        };
        let params = quality.initial_link_quality().params;
        let info = ConnectionInfo::for_kind(ConnectionKind::Management, false);
        let step = *current_step;

        let mut created = 0;
        for node in nodes.values().filter(|n| n.role == NodeRole::Emulation) {
            let Some(iface) = node.management_interface() else {
                continue;
            };
            let pair = PairKey::new(node.id, mgmt.id)?;
            let interfaces = InterfacePair::oriented(&pair, node.id, *iface, *mgmt_iface);
            if store.is_active(&pair, &interfaces) == Some(true) {
                continue;
            }

            let ctx = LinkContext {
                x: node,
                y: mgmt,
                interface_x: iface,
                interface_y: mgmt_iface,
                info,
                step,
            };
            match start_management_link(backend.as_mut(), store, &ctx, pair, interfaces, params) {
                Ok(true) => created += 1,
                Ok(false) => warn!(
                    "management link to node {} refused by backend, skipping",
                    node.id
                ),
                Err(e) => warn!("{}, skipping", e),
            }
        }

        info!("{} management links up", created);
        Ok(created)
    }

    /// Advance the movement model and reconcile the resulting distances.
    ///
    /// Step 0 uses the initial placement without advancing the model.
    pub fn step(&mut self) -> Result<StepReport> {
        let step = self.current_step;
        let movement = self.movement.as_mut().ok_or(ReconcileError::NoMovementModel)?;
        if step > 0 {
            movement.simulate_one_step();
        }
        let distances = movement.distances_from_nodes();

        let emulation_nodes = self
            .nodes
            .values()
            .filter(|n| n.role == NodeRole::Emulation)
            .count();
        if distances.is_empty() && emulation_nodes > 1 {
            return Err(ReconcileError::EmptyDistanceMatrix { step });
        }

        self.apply_distances(distances)
    }

    /// Reconcile an externally produced distance matrix as the next step.
    pub fn apply_distances(&mut self, distances: DistanceMatrix) -> Result<StepReport> {
        let step = self.current_step;
        let first_step = step == 0;

        self.differ.ensure_hub_overlay(self.nodes.values());
        let mut changed = self.differ.diff(&distances);
        let mut full = distances;
        self.differ.apply_overlay(&mut changed);
        self.differ.apply_overlay(&mut full);

        let mut report = StepReport {
            step,
            changed_pairs: changed.len(),
            ..StepReport::default()
        };

        if changed.is_empty() && !first_step {
            debug!("step {}: distances unchanged", step);
            report.unchanged = true;
            self.current_step += 1;
            return Ok(report);
        }

        self.backend.before_simulation_step(step, &full);
        self.backend.before_distance_matrix_changed(step, &changed, &full);

        for (pair, distance) in changed.iter() {
            if let Err(err) = self.reconcile_pair(pair, distance, &mut report) {
                error!(
                    "step {}: reconciling {} at distance {} failed: {} \
                     (active: {:?}, inactive: {:?})",
                    step,
                    pair,
                    distance,
                    err,
                    self.store.active_interfaces(&pair),
                    self.store.inactive_interfaces(&pair),
                );
                report.failures.push(PairFailure {
                    pair,
                    distance,
                    error: err.to_string(),
                });
            }
        }

        self.backend.after_distance_matrix_changed(step, &changed, &full);
        if let Err(err) = self.backend.after_simulation_step(step, &full) {
            error!("step {}: backend commit failed: {}", step, err);
            report.commit_error = Some(err.to_string());
        }

        if first_step {
            for hook in std::mem::take(&mut self.setup_hooks) {
                hook(&self.store);
            }
        }

        self.current_step += 1;
        info!(
            "step {}: {} changed, {} created, {} up, {} down, {} adjusted, {} failed",
            step,
            report.changed_pairs,
            report.created,
            report.links_up,
            report.links_down,
            report.adjusted,
            report.failures.len()
        );
        Ok(report)
    }

    /// Forget all connections and distances and restart at step 0.
    pub fn reset(&mut self) {
        self.store.clear();
        self.differ.reset();
        self.current_step = 0;
        info!("reconciliation state reset");
    }

    fn reconcile_pair(
        &mut self,
        pair: PairKey,
        distance: Distance,
        report: &mut StepReport,
    ) -> Result<()> {
        let Self {
            nodes,
            quality,
            filter,
            backend,
            remote,
            store,
            current_step,
            ..
        } = self;
        let step = *current_step;
        let x = nodes
            .get(&pair.low())
            .ok_or(ReconcileError::UnknownNode(pair.low()))?;
        let y = nodes
            .get(&pair.high())
            .ok_or(ReconcileError::UnknownNode(pair.high()))?;

        // Management links are never distance-driven.
        if x.is_management() || y.is_management() {
            return Ok(());
        }

        let hub = x.is_central() || y.is_central();
        let initial = quality.initial_link_quality().params;
        let decision = if hub {
            LinkDecision::connected(initial)
        } else {
            quality.distance_to_link_quality(distance)
        };

        if !decision.connected && !store.contains_pair(&pair) {
            return Ok(());
        }

        let is_remote = remote.is_remote(x.id, y.id);
        if is_remote {
            remote.ensure_tunnel(pair)?;
        }
        let kind = if hub {
            ConnectionKind::Central
        } else {
            ConnectionKind::User
        };
        let info = ConnectionInfo::for_kind(kind, is_remote);

        // Connections that do not exist yet.
        if decision.connected {
            let candidates: Vec<(Interface, Interface)> = if hub {
                HubInterfaces.interface_pairs(x, y)
            } else {
                filter.interface_pairs(x, y)
            }
            .map(|(ix, iy)| (*ix, *iy))
            .collect();

            for (ix, iy) in candidates {
                if ix.kind.is_management() || iy.kind.is_management() {
                    continue;
                }
                let interfaces = InterfacePair::new(ix, iy);
                if store.get(&pair, &interfaces).is_some() {
                    continue;
                }

                let ctx = LinkContext {
                    x,
                    y,
                    interface_x: &ix,
                    interface_y: &iy,
                    info,
                    step,
                };
                let params = decision.params.merged_over(&initial);
                let mut connection =
                    Connection::new(store.next_id(), pair, interfaces, kind, distance, step);
                let start = backend.before_link_initial_start(&ctx, &connection)?;
                if !start.connected {
                    warn!("step {}: backend refused {}", step, connection);
                    report.refused += 1;
                    continue;
                }
                connection.switch = start.switch;
                store.put(connection, false);

                let created = store
                    .get(&pair, &interfaces)
                    .ok_or_else(|| missing(pair, interfaces))?;
                backend.after_link_initial_start(&ctx, created)?;
                report.created += 1;
                backend.link_up(&ctx, created, &params)?;
                let activated = store.set_active(&pair, &interfaces, true)?;
                activated.quality = params;
                report.links_up += 1;
                debug!("step {}: {} up at distance {}", step, activated, distance);
            }
        }

        // Active connections: re-shape or tear down.
        for interfaces in store.active_interfaces(&pair) {
            let conn = store
                .get(&pair, &interfaces)
                .ok_or_else(|| missing(pair, interfaces))?;
            let ctx = LinkContext {
                x,
                y,
                interface_x: &interfaces.low,
                interface_y: &interfaces.high,
                info: ConnectionInfo::for_kind(conn.kind, is_remote),
                step,
            };

            let conn_kind = conn.kind;
            match conn_kind {
                ConnectionKind::Management => continue,
                ConnectionKind::Central => {
                    backend.before_link_quality_adjustment(&ctx, conn, true, &initial);
                    backend.after_link_quality_adjustment(&ctx, conn, true, &initial)?;
                    report.adjusted += 1;
                }
                ConnectionKind::User if decision.connected => {
                    // Distance-only parameters would drop the initial shaping on the first step.
                    let params = if step == 0 {
                        decision.params.merged_over(&initial)
                    } else {
                        decision.params
                    };
                    backend.before_link_quality_adjustment(&ctx, conn, true, &params);
                    backend.after_link_quality_adjustment(&ctx, conn, true, &params)?;
                    if let Some(conn) = store.get_mut(&pair, &interfaces) {
                        conn.quality = params.merged_over(&conn.quality);
                        conn.distance = distance;
                    }
                    report.adjusted += 1;
                }
                ConnectionKind::User => {
                    backend.link_down(&ctx, conn, &decision.params)?;
                    let deactivated = store.set_active(&pair, &interfaces, false)?;
                    deactivated.distance = distance;
                    report.links_down += 1;
                    debug!("step {}: {} down at distance {}", step, deactivated, distance);
                }
            }
        }

        // Inactive connections back in range.
        if decision.connected {
            for interfaces in store.inactive_interfaces(&pair) {
                let conn = store
                    .get(&pair, &interfaces)
                    .ok_or_else(|| missing(pair, interfaces))?;
                let ctx = LinkContext {
                    x,
                    y,
                    interface_x: &interfaces.low,
                    interface_y: &interfaces.high,
                    info: ConnectionInfo::for_kind(conn.kind, is_remote),
                    step,
                };
                backend.link_up(&ctx, conn, &decision.params)?;
                let activated = store.set_active(&pair, &interfaces, true)?;
                activated.quality = decision.params.merged_over(&activated.quality);
                activated.distance = distance;
                report.links_up += 1;
                debug!("step {}: {} back up at distance {}", step, activated, distance);
            }
        }

        Ok(())
    }
}

/// Create (unless it exists) and activate one management link.
///
/// Returns `false` if the backend refused to create it.
fn start_management_link(
    backend: &mut dyn NetworkBackendNotifications,
    store: &mut ConnectionStore,
    ctx: &LinkContext<'_>,
    pair: PairKey,
    interfaces: InterfacePair,
    params: QualityParams,
) -> Result<bool> {
    let node = ctx.x.id;
    let link_failed = move |e: BackendError| ReconcileError::ManagementLink {
        node,
        reason: e.to_string(),
    };

    if store.get(&pair, &interfaces).is_none() {
        let mut connection = Connection::new(
            store.next_id(),
            pair,
            interfaces,
            ConnectionKind::Management,
            Distance::ZERO,
            ctx.step,
        );
        let start = backend
            .before_link_initial_start(ctx, &connection)
            .map_err(link_failed)?;
        if !start.connected {
            return Ok(false);
        }
        connection.switch = start.switch;
        connection.quality = params;
        store.put(connection, false);

        let conn = store
            .get(&pair, &interfaces)
            .ok_or_else(|| missing(pair, interfaces))?;
        backend.after_link_initial_start(ctx, conn).map_err(link_failed)?;
    }

    let conn = store
        .get(&pair, &interfaces)
        .ok_or_else(|| missing(pair, interfaces))?;
    backend.link_up(ctx, conn, &params).map_err(link_failed)?;
    store.set_active(&pair, &interfaces, true)?;
    Ok(true)
}

fn missing(pair: PairKey, interfaces: InterfacePair) -> ReconcileError {
    ReconcileError::MissingConnection { pair, interfaces }
}
