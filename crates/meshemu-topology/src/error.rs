//! Error types for meshemu-topology.

use thiserror::Error;

use crate::NodeId;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while building nodes or distance matrices.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// A node was paired with itself.
    #[error("node {0} cannot be paired with itself")]
    SelfPair(NodeId),

    /// Distances must be non-negative numbers.
    #[error("invalid distance {0}")]
    InvalidDistance(f64),

    /// Emulation nodes may not use ids from the reserved block.
    #[error("node id {0} lies in the reserved id range")]
    ReservedId(NodeId),

    /// Central hub index beyond the reserved block.
    #[error("central hub index {0} out of range")]
    CentralIndexOutOfRange(u32),

    /// More interfaces of one kind than can be numbered.
    #[error("node {0} has too many interfaces of one kind")]
    TooManyInterfaces(NodeId),
}
