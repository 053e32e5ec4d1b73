//! Meshemu Topology
//!
//! The static vocabulary of an emulated mesh: nodes, their interfaces, and the
//! pairwise distances a movement model produces every simulation step.
//!
//! # Identity
//!
//! Every node carries a unique [`NodeId`]. Emulation nodes use the low id
//! range; the central hub nodes and the management node live in a reserved
//! range at the top of the id space:
//! - the management node uses [`NodeId::MANAGEMENT`]
//! - central hub nodes count down from [`NodeId::CENTRAL_BASE`]
//!
//! # Canonical pairs
//!
//! A link is undirected. [`PairKey`] always stores the smaller id first so
//! `(x, y)` and `(y, x)` hash and compare identically, and a node is never
//! paired with itself. [`DistanceMatrix`] is keyed by [`PairKey`] and iterates
//! in ascending key order, which gives the upper-triangular `x < y`
//! processing order for free.
//!
//! # Interface pairing
//!
//! [`InterfaceFilter`] strategies decide which interface pairs of two nodes are
//! candidates for a link. Management interfaces are never yielded.

mod distance;
mod error;
mod filter;
mod node;

pub use distance::{Distance, DistanceMatrix, PairKey};
pub use error::{Result, TopologyError};
pub use filter::{
    AllInterfaces, EqualInterfaceNumbers, FilterKind, HubInterfaces, InterfaceFilter,
    InterfacePairs,
};
pub use node::{Endpoint, Interface, InterfaceKind, Node, NodeId, NodeRole};

/// Number of ids reserved at the top of the id space for central and management nodes.
pub const RESERVED_IDS: u32 = 1024;

// The management sentinel and the central range must fit inside the reserved block.
const _: () = assert!(NodeId::MANAGEMENT.0 - NodeId::CENTRAL_BASE.0 == 1);
const _: () = assert!(RESERVED_IDS > 1);
