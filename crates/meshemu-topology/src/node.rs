//! Nodes, node roles and interfaces.

use std::fmt;

use crate::error::{Result, TopologyError};
use crate::RESERVED_IDS;

/// Unique identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel id of the management node.
    pub const MANAGEMENT: Self = Self(u32::MAX);

    /// First central hub id. Further hubs count down from here.
    pub const CENTRAL_BASE: Self = Self(u32::MAX - 1);

    /// Create an id for an emulation node.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Id of the `index`-th central hub node.
    ///
    /// `index` must stay below `RESERVED_IDS - 1`; [`Node::central`] checks it.
    pub const fn central(index: u32) -> Self {
        Self(Self::CENTRAL_BASE.0 - index)
    }

    /// Whether the id lies in the block reserved for central and management nodes.
    pub const fn is_reserved(&self) -> bool {
        self.0 > u32::MAX - RESERVED_IDS
    }

    /// Raw id value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MANAGEMENT => write!(f, "mgmt"),
            id if id.is_reserved() => write!(f, "hub{}", Self::CENTRAL_BASE.0 - id.0),
            id => write!(f, "{}", id.0),
        }
    }
}

/// What part a node plays in the emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NodeRole {
    /// A real emulated node (one virtual machine).
    Emulation,
    /// A virtual hub every node with a hub interface is attached to.
    Central,
    /// The control-plane node, attached to every node over an always-on link.
    Management,
}

/// Kind of a network interface.
///
/// The first five variants are the "normal" kinds subject to distance-based
/// reconciliation. `Hub` and `Management` are special kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InterfaceKind {
    Mesh,
    Ap,
    AdHoc,
    Bluetooth,
    WifiDirect,
    Hub,
    Management,
}

impl InterfaceKind {
    /// All normal kinds.
    pub const NORMAL: [Self; 5] = [
        Self::Mesh,
        Self::Ap,
        Self::AdHoc,
        Self::Bluetooth,
        Self::WifiDirect,
    ];

    /// Whether this kind takes part in distance-based reconciliation.
    pub const fn is_normal(&self) -> bool {
        match self {
            Self::Mesh | Self::Ap | Self::AdHoc | Self::Bluetooth | Self::WifiDirect => true,
            Self::Hub | Self::Management => false,
        }
    }

    pub const fn is_hub(&self) -> bool {
        matches!(self, Self::Hub)
    }

    pub const fn is_management(&self) -> bool {
        matches!(self, Self::Management)
    }

    /// Short name used in logs and device names.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::Ap => "ap",
            Self::AdHoc => "adhoc",
            Self::Bluetooth => "bluetooth",
            Self::WifiDirect => "wifidirect",
            Self::Hub => "hub",
            Self::Management => "mgmt",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A network interface of a node.
///
/// `nr_host_interface` tells apart several interfaces of the same kind on one
/// node; it counts from zero per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interface {
    pub kind: InterfaceKind,
    pub nr_host_interface: u16,
}

impl Interface {
    pub const fn new(kind: InterfaceKind, nr_host_interface: u16) -> Self {
        Self { kind, nr_host_interface }
    }

    /// Whether both interfaces are of the same kind.
    pub fn same_kind(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.nr_host_interface)
    }
}

/// One side of a link: an interface on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    pub node: NodeId,
    pub interface: Interface,
}

impl Endpoint {
    pub const fn new(node: NodeId, interface: Interface) -> Self {
        Self { node, interface }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.interface)
    }
}

/// A node together with its ordered interface list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub role: NodeRole,
    interfaces: Vec<Interface>,
}

impl Node {
    /// Create an emulation node with interfaces of the given kinds, in order.
    ///
    /// Interfaces are numbered per kind: `[mesh, mesh, ap]` yields
    /// `mesh0, mesh1, ap0`.
    pub fn emulation(id: NodeId, kinds: impl IntoIterator<Item = InterfaceKind>) -> Result<Self> {
        if id.is_reserved() {
            return Err(TopologyError::ReservedId(id));
        }
        let mut interfaces: Vec<Interface> = Vec::new();
        for kind in kinds {
            let nr = interfaces.iter().filter(|i| i.kind == kind).count();
            let nr = u16::try_from(nr).map_err(|_| TopologyError::TooManyInterfaces(id))?;
            interfaces.push(Interface::new(kind, nr));
        }
        Ok(Self {
            id,
            role: NodeRole::Emulation,
            interfaces,
        })
    }

    /// Create the `index`-th central hub node. It owns a single hub interface.
    pub fn central(index: u32) -> Result<Self> {
        if index >= RESERVED_IDS - 1 {
            return Err(TopologyError::CentralIndexOutOfRange(index));
        }
        Ok(Self {
            id: NodeId::central(index),
            role: NodeRole::Central,
            interfaces: vec![Interface::new(InterfaceKind::Hub, 0)],
        })
    }

    /// Create the management node. It owns a single management interface.
    pub fn management() -> Self {
        Self {
            id: NodeId::MANAGEMENT,
            role: NodeRole::Management,
            interfaces: vec![Interface::new(InterfaceKind::Management, 0)],
        }
    }

    /// All interfaces, in declaration order.
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Interfaces subject to distance-based reconciliation.
    pub fn normal_interfaces(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.interfaces.iter().filter(|i| i.kind.is_normal())
    }

    pub fn hub_interfaces(&self) -> impl Iterator<Item = &Interface> + '_ {
        self.interfaces.iter().filter(|i| i.kind.is_hub())
    }

    /// The first management interface, if the node has one.
    pub fn management_interface(&self) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.kind.is_management())
    }

    pub fn has_hub_interface(&self) -> bool {
        self.interfaces.iter().any(|i| i.kind.is_hub())
    }

    pub fn is_central(&self) -> bool {
        self.role == NodeRole::Central
    }

    pub fn is_management(&self) -> bool {
        self.role == NodeRole::Management
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interfaces_numbered_per_kind() {
        let node = Node::emulation(
            NodeId::new(1),
            [InterfaceKind::Mesh, InterfaceKind::Mesh, InterfaceKind::Ap],
        )
        .unwrap();

        assert_eq!(
            node.interfaces(),
            &[
                Interface::new(InterfaceKind::Mesh, 0),
                Interface::new(InterfaceKind::Mesh, 1),
                Interface::new(InterfaceKind::Ap, 0),
            ]
        );
    }

    #[test]
    fn emulation_node_rejects_reserved_id() {
        let result = Node::emulation(NodeId::MANAGEMENT, [InterfaceKind::Mesh]);
        assert!(matches!(result, Err(TopologyError::ReservedId(_))));
    }

    #[test]
    fn central_nodes_count_down() {
        let first = Node::central(0).unwrap();
        let second = Node::central(1).unwrap();

        assert_eq!(first.id, NodeId::CENTRAL_BASE);
        assert_eq!(second.id.value(), NodeId::CENTRAL_BASE.value() - 1);
        assert!(first.has_hub_interface());
        assert!(Node::central(RESERVED_IDS).is_err());
    }

    #[test]
    fn normal_interfaces_skip_special_kinds() {
        let node = Node::emulation(
            NodeId::new(3),
            [
                InterfaceKind::Mesh,
                InterfaceKind::Hub,
                InterfaceKind::Management,
                InterfaceKind::Bluetooth,
            ],
        )
        .unwrap();

        let kinds: Vec<_> = node.normal_interfaces().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![InterfaceKind::Mesh, InterfaceKind::Bluetooth]);
        assert!(node.has_hub_interface());
        assert!(node.management_interface().is_some());
    }

    #[test]
    fn display_names() {
        assert_eq!(NodeId::new(7).to_string(), "7");
        assert_eq!(NodeId::MANAGEMENT.to_string(), "mgmt");
        assert_eq!(NodeId::central(2).to_string(), "hub2");
        assert_eq!(Interface::new(InterfaceKind::Mesh, 1).to_string(), "mesh1");
    }
}
