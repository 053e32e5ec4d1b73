//! Error types for meshemu-sim.

use meshemu_links::ModelError;
use meshemu_reconcile::ReconcileError;
use meshemu_topology::TopologyError;
use thiserror::Error;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors surfaced by the simulation manager and its configuration.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid or inconsistent scenario configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// `start()` was called on a running simulation.
    #[error("simulation already started")]
    AlreadyStarted,

    /// A step or auto-step was requested before `start()`.
    #[error("simulation not started")]
    NotStarted,

    /// The initial network could not be set up.
    #[error("network setup failed: {0}")]
    SetupFailed(String),

    /// Engine work on the blocking pool panicked or was cancelled.
    #[error("simulation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("link model error: {0}")]
    Model(#[from] ModelError),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
