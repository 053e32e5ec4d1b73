//! Interface pairing strategies.
//!
//! A filter answers "which interfaces of `x` may be linked to which interfaces
//! of `y`". Every call returns a fresh iterator, so callers can enumerate the
//! candidates as often as they need. Management interfaces never appear.

use crate::{Interface, Node};

/// Lazy sequence of candidate interface pairs, `x`'s interface first.
pub type InterfacePairs<'a> = Box<dyn Iterator<Item = (&'a Interface, &'a Interface)> + 'a>;

/// Strategy that enumerates candidate interface pairs between two nodes.
pub trait InterfaceFilter: Send + Sync {
    /// Candidate pairs for `x` and `y`. The first element belongs to `x`.
    fn interface_pairs<'a>(&self, x: &'a Node, y: &'a Node) -> InterfacePairs<'a>;
}

/// Pairs normal interfaces index for index.
///
/// Both nodes are expected to expose the same normal interfaces in the same
/// order. If the counts differ the pairing stops at the shorter list.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualInterfaceNumbers;

impl InterfaceFilter for EqualInterfaceNumbers {
    fn interface_pairs<'a>(&self, x: &'a Node, y: &'a Node) -> InterfacePairs<'a> {
        Box::new(x.normal_interfaces().zip(y.normal_interfaces()))
    }
}

/// Cartesian product of both nodes' normal interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllInterfaces;

impl InterfaceFilter for AllInterfaces {
    fn interface_pairs<'a>(&self, x: &'a Node, y: &'a Node) -> InterfacePairs<'a> {
        Box::new(
            x.normal_interfaces()
                .flat_map(move |ix| y.normal_interfaces().map(move |iy| (ix, iy))),
        )
    }
}

/// Pairs hub interfaces only. Used for links toward a central hub node.
#[derive(Debug, Clone, Copy, Default)]
pub struct HubInterfaces;

impl InterfaceFilter for HubInterfaces {
    fn interface_pairs<'a>(&self, x: &'a Node, y: &'a Node) -> InterfacePairs<'a> {
        Box::new(
            x.hub_interfaces()
                .flat_map(move |ix| y.hub_interfaces().map(move |iy| (ix, iy))),
        )
    }
}

/// Configurable choice of filter for links between emulation nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FilterKind {
    #[default]
    Equal,
    All,
}

impl FilterKind {
    pub fn build(self) -> Box<dyn InterfaceFilter> {
        match self {
            FilterKind::Equal => Box::new(EqualInterfaceNumbers),
            FilterKind::All => Box::new(AllInterfaces),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InterfaceKind, NodeId};

    fn node(id: u32, kinds: &[InterfaceKind]) -> Node {
        Node::emulation(NodeId::new(id), kinds.iter().copied()).unwrap()
    }

    fn names(pairs: InterfacePairs<'_>) -> Vec<(String, String)> {
        pairs.map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn equal_numbers_pairs_by_index() {
        use InterfaceKind::*;
        let x = node(1, &[Mesh, Management, Ap]);
        let y = node(2, &[Mesh, Ap, Management]);

        let pairs = names(EqualInterfaceNumbers.interface_pairs(&x, &y));
        assert_eq!(
            pairs,
            vec![("mesh0".into(), "mesh0".into()), ("ap0".into(), "ap0".into())]
        );
    }

    #[test]
    fn equal_numbers_stops_at_shorter_list() {
        use InterfaceKind::*;
        let x = node(1, &[Mesh, Mesh]);
        let y = node(2, &[Mesh]);
        assert_eq!(EqualInterfaceNumbers.interface_pairs(&x, &y).count(), 1);
    }

    #[test]
    fn all_interfaces_is_cartesian() {
        use InterfaceKind::*;
        let x = node(1, &[Mesh, Ap, Management]);
        let y = node(2, &[Mesh, Bluetooth, Hub]);

        let pairs = names(AllInterfaces.interface_pairs(&x, &y));
        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&("ap0".into(), "bluetooth0".into())));
        assert!(pairs.iter().all(|(a, b)| !a.starts_with("mgmt") && !b.starts_with("hub")));
    }

    #[test]
    fn filters_are_restartable() {
        use InterfaceKind::*;
        let x = node(1, &[Mesh, Ap]);
        let y = node(2, &[Mesh, Ap]);
        let filter = AllInterfaces;
        assert_eq!(filter.interface_pairs(&x, &y).count(), filter.interface_pairs(&x, &y).count());
    }

    #[test]
    fn hub_filter_links_hub_interfaces() {
        use InterfaceKind::*;
        let x = node(1, &[Mesh, Hub]);
        let hub = Node::central(0).unwrap();

        let pairs = names(HubInterfaces.interface_pairs(&x, &hub));
        assert_eq!(pairs, vec![("hub0".into(), "hub0".into())]);
        assert_eq!(HubInterfaces.interface_pairs(&node(2, &[Mesh]), &hub).count(), 0);
    }

    #[test]
    fn management_never_yielded() {
        let mgmt = Node::management();
        let x = node(1, &[InterfaceKind::Management, InterfaceKind::Mesh]);
        for kind in [FilterKind::Equal, FilterKind::All] {
            assert_eq!(kind.build().interface_pairs(&x, &mgmt).count(), 0);
        }
        assert_eq!(HubInterfaces.interface_pairs(&x, &mgmt).count(), 0);
    }
}
