//! Error types for meshemu-reconcile.

use meshemu_topology::{NodeId, PairKey, TopologyError};
use thiserror::Error;

use crate::backend::BackendError;
use crate::connection::InterfacePair;
use crate::remote::TunnelError;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can occur while reconciling a step.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// `step()` was called without a movement model.
    #[error("no movement model configured")]
    NoMovementModel,

    /// The movement model produced no distances although nodes exist.
    #[error("empty distance matrix at step {step}")]
    EmptyDistanceMatrix { step: u64 },

    /// A distance matrix or request referenced a node that was never registered.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node id was registered twice.
    #[error("node {0} registered twice")]
    DuplicateNode(NodeId),

    /// A store mutation expected a connection record that does not exist.
    #[error("no connection for {pair} on {interfaces}")]
    MissingConnection {
        pair: PairKey,
        interfaces: InterfacePair,
    },

    /// Setting up a tunnel for a cross-server pair failed.
    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// The network backend failed to carry out a notification.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An always-on management link could not be created.
    #[error("management link to node {node} failed: {reason}")]
    ManagementLink { node: NodeId, reason: String },

    /// Invalid topology input.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),
}
