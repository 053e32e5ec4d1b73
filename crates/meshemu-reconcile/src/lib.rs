//! Meshemu Reconcile
//!
//! Keeps the emulated network in step with node mobility. Every simulation
//! step a movement model produces a distance matrix; the engine compares it
//! with the previous one and, for each changed pair, asks the link-quality
//! model whether the nodes are in range. The answer drives connection state
//! and is announced to network backends.
//!
//! # Components
//!
//! - [`DistanceMatrixDiffer`] computes the changed pairs and keeps the
//!   constant hub overlay
//! - [`ConnectionStore`] holds active and inactive connections under
//!   canonical pair keys
//! - [`ReconciliationEngine`] runs the per-pair state machine
//! - [`NetworkBackendNotifications`] is the backend callback boundary;
//!   [`TracingBackend`], [`EventLog`] and [`Broadcast`] are provided
//! - [`RemotePairPolicy`] decides which pairs need a cross-server tunnel
//!
//! # Example
//!
//! ```
//! use meshemu_links::{QualityParams, StepFunction};
//! use meshemu_reconcile::{EventLog, ReconciliationEngine, Stationary};
//! use meshemu_topology::{Distance, DistanceMatrix, InterfaceKind, Node, NodeId};
//!
//! let mut distances = DistanceMatrix::new();
//! distances.insert(NodeId::new(1), NodeId::new(2), Distance::new(5.0).unwrap()).unwrap();
//!
//! let model = StepFunction::new(10.0, QualityParams::bandwidth(1_000)).unwrap();
//! let log = EventLog::new();
//! let mut engine = ReconciliationEngine::new(Box::new(model), Box::new(log.clone()))
//!     .with_movement(Box::new(Stationary::new(distances)));
//! for id in [1, 2] {
//!     engine.add_node(Node::emulation(NodeId::new(id), [InterfaceKind::Mesh]).unwrap()).unwrap();
//! }
//!
//! let report = engine.step().unwrap();
//! assert_eq!(report.links_up, 1);
//! assert!(engine.step().unwrap().unchanged);
//! ```

pub mod backend;
pub mod connection;
pub mod differ;
pub mod engine;
pub mod error;
pub mod movement;
pub mod recorder;
pub mod remote;
pub mod store;

pub use backend::{
    BackendError, Broadcast, InitialStart, LinkContext, NetworkBackendNotifications,
    TracingBackend,
};
pub use connection::{Connection, ConnectionId, ConnectionInfo, ConnectionKind, InterfacePair};
pub use differ::{hub_overlay, DistanceMatrixDiffer};
pub use engine::{PairFailure, ReconciliationEngine, SetupHook, StepReport};
pub use error::{ReconcileError, Result};
pub use movement::{MovementModel, Stationary};
pub use recorder::{EventLog, LinkEvent};
pub use remote::{LocalOnly, RemotePairPolicy, StaticOwnership, TunnelError};
pub use store::{ConnectionFilter, ConnectionQuery, ConnectionStore, Partition};
