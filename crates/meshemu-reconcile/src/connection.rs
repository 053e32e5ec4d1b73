//! Connections between node interfaces.

use std::fmt;

use meshemu_links::QualityParams;
use meshemu_topology::{Distance, Endpoint, Interface, NodeId, PairKey};
use serde::{Deserialize, Serialize};

/// Identifier of a connection, unique within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What a connection is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// A distance-reconciled link between emulation nodes.
    User,
    /// An always-on control-plane link toward the management node.
    Management,
    /// A link toward a central hub node.
    Central,
}

/// The two interfaces of a connection, oriented like its [`PairKey`]:
/// `low` belongs to `pair.low()`, `high` to `pair.high()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterfacePair {
    pub low: Interface,
    pub high: Interface,
}

impl InterfacePair {
    /// Interfaces already in canonical orientation.
    pub const fn new(low: Interface, high: Interface) -> Self {
        Self { low, high }
    }

    /// Orient `(ix, iy)`, where `ix` belongs to node `x`, according to `pair`.
    pub fn oriented(pair: &PairKey, x: NodeId, ix: Interface, iy: Interface) -> Self {
        if x == pair.low() {
            Self { low: ix, high: iy }
        } else {
            Self { low: iy, high: ix }
        }
    }
}

impl fmt::Display for InterfacePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

/// Per-attempt routing flags handed to backends. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub is_central: bool,
    pub is_mgmt: bool,
    pub is_remote_conn: bool,
}

impl ConnectionInfo {
    pub fn for_kind(kind: ConnectionKind, is_remote_conn: bool) -> Self {
        Self {
            is_central: kind == ConnectionKind::Central,
            is_mgmt: kind == ConnectionKind::Management,
            is_remote_conn,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        if self.is_mgmt {
            ConnectionKind::Management
        } else if self.is_central {
            ConnectionKind::Central
        } else {
            ConnectionKind::User
        }
    }
}

/// A potential or actual link between two endpoints.
///
/// Existence and activation are separate: a connection that went out of
/// range stays in the store with `connected == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub pair: PairKey,
    pub interfaces: InterfacePair,
    pub kind: ConnectionKind,
    pub connected: bool,
    /// Last shaping applied to the link.
    pub quality: QualityParams,
    /// Simulation step the connection was created at.
    pub step_added: u64,
    /// Distance at the last reconciliation touching this connection.
    pub distance: Distance,
    /// Backend handle of the switch/bridge carrying the link, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
}

impl Connection {
    /// A new, not yet activated connection.
    pub fn new(
        id: ConnectionId,
        pair: PairKey,
        interfaces: InterfacePair,
        kind: ConnectionKind,
        distance: Distance,
        step_added: u64,
    ) -> Self {
        Self {
            id,
            pair,
            interfaces,
            kind,
            connected: false,
            quality: QualityParams::default(),
            step_added,
            distance,
            switch: None,
        }
    }

    /// Both endpoints, low node first.
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (
            Endpoint::new(self.pair.low(), self.interfaces.low),
            Endpoint::new(self.pair.high(), self.interfaces.high),
        )
    }

    pub fn involves(&self, node: NodeId) -> bool {
        self.pair.contains(node)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = self.endpoints();
        write!(f, "{} {}<->{}", self.id, a, b)
    }
}
