//! Authoritative connection state.
//!
//! Connections live in one of two partitions: active (`connected == true`)
//! or inactive (exists, `connected == false`). A record is never in both.
//! Both partitions are keyed by canonical [`PairKey`] and then by
//! [`InterfacePair`], so a lookup for `(x, y)` hits the same record as one for
//! `(y, x)`.

use std::collections::{BTreeMap, BTreeSet};

use meshemu_topology::{NodeId, PairKey};

use crate::connection::{Connection, ConnectionId, InterfacePair};
use crate::error::{ReconcileError, Result};

/// One partition: pair → interface pair → connection.
pub type Partition = BTreeMap<PairKey, BTreeMap<InterfacePair, Connection>>;

/// Selection criteria for [`ConnectionQuery::connections`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub id: Option<ConnectionId>,
    pub node: Option<NodeId>,
    pub active: Option<bool>,
}

impl ConnectionFilter {
    pub fn active() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn matches(&self, connection: &Connection) -> bool {
        self.id.map_or(true, |id| connection.id == id)
            && self.node.map_or(true, |n| connection.involves(n))
            && self.active.map_or(true, |a| connection.connected == a)
    }
}

/// Read-only lookup contract used by export and API layers.
pub trait ConnectionQuery {
    fn connection_by_id(&self, id: ConnectionId) -> Option<&Connection>;

    fn connections(&self, filter: &ConnectionFilter) -> Vec<&Connection>;
}

/// Map from canonical node pair and interface pair to connection state.
#[derive(Debug, Default)]
pub struct ConnectionStore {
    active: Partition,
    inactive: Partition,
    next_id: u64,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh connection id.
    pub fn next_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Look a connection up in either partition.
    pub fn get(&self, pair: &PairKey, interfaces: &InterfacePair) -> Option<&Connection> {
        lookup(&self.active, pair, interfaces).or_else(|| lookup(&self.inactive, pair, interfaces))
    }

    pub fn get_mut(
        &mut self,
        pair: &PairKey,
        interfaces: &InterfacePair,
    ) -> Option<&mut Connection> {
        if let Some(conn) = self.active.get_mut(pair).and_then(|m| m.get_mut(interfaces)) {
            return Some(conn);
        }
        self.inactive.get_mut(pair).and_then(|m| m.get_mut(interfaces))
    }

    /// `Some(true)` if active, `Some(false)` if inactive, `None` if absent.
    pub fn is_active(&self, pair: &PairKey, interfaces: &InterfacePair) -> Option<bool> {
        if lookup(&self.active, pair, interfaces).is_some() {
            Some(true)
        } else if lookup(&self.inactive, pair, interfaces).is_some() {
            Some(false)
        } else {
            None
        }
    }

    /// Whether any record, active or inactive, exists for the pair.
    pub fn contains_pair(&self, pair: &PairKey) -> bool {
        self.active.contains_key(pair) || self.inactive.contains_key(pair)
    }

    /// Store `connection` in the partition given by `active`.
    ///
    /// Replaces any record under the same key in either partition and returns it.
    pub fn put(&mut self, mut connection: Connection, active: bool) -> Option<Connection> {
        let pair = connection.pair;
        let interfaces = connection.interfaces;
        let previous = self.take(&pair, &interfaces);
        connection.connected = active;
        let target = if active { &mut self.active } else { &mut self.inactive };
        target.entry(pair).or_default().insert(interfaces, connection);
        previous
    }

    /// Move an existing connection to the active or inactive partition.
    pub fn set_active(
        &mut self,
        pair: &PairKey,
        interfaces: &InterfacePair,
        active: bool,
    ) -> Result<&mut Connection> {
        let mut connection = self.take(pair, interfaces).ok_or(ReconcileError::MissingConnection {
            pair: *pair,
            interfaces: *interfaces,
        })?;
        connection.connected = active;
        let target = if active { &mut self.active } else { &mut self.inactive };
        Ok(target
            .entry(*pair)
            .or_default()
            .entry(*interfaces)
            .or_insert(connection))
    }

    /// Interface pairs of the active connections of `pair`.
    pub fn active_interfaces(&self, pair: &PairKey) -> Vec<InterfacePair> {
        keys_of(&self.active, pair)
    }

    /// Interface pairs of the inactive connections of `pair`.
    pub fn inactive_interfaces(&self, pair: &PairKey) -> Vec<InterfacePair> {
        keys_of(&self.inactive, pair)
    }

    /// Snapshot view of all active connections.
    pub fn active(&self) -> &Partition {
        &self.active
    }

    /// Snapshot view of all inactive connections.
    pub fn inactive(&self) -> &Partition {
        &self.inactive
    }

    /// All connections, active partition first.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.active
            .values()
            .chain(self.inactive.values())
            .flat_map(|m| m.values())
    }

    pub fn active_count(&self) -> usize {
        self.active.values().map(BTreeMap::len).sum()
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive.values().map(BTreeMap::len).sum()
    }

    pub fn len(&self) -> usize {
        self.active_count() + self.inactive_count()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty()
    }

    /// Drop every record. Ids restart at zero.
    pub fn clear(&mut self) {
        self.active.clear();
        self.inactive.clear();
        self.next_id = 0;
    }

    /// Bidirectional adjacency of active links: every node maps to the nodes
    /// it has at least one active connection with.
    pub fn adjacency(&self) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for pair in self.active.keys() {
            adjacency.entry(pair.low()).or_default().insert(pair.high());
            adjacency.entry(pair.high()).or_default().insert(pair.low());
        }
        adjacency
    }

    fn take(&mut self, pair: &PairKey, interfaces: &InterfacePair) -> Option<Connection> {
        remove_from(&mut self.active, pair, interfaces)
            .or_else(|| remove_from(&mut self.inactive, pair, interfaces))
    }
}

impl ConnectionQuery for ConnectionStore {
    fn connection_by_id(&self, id: ConnectionId) -> Option<&Connection> {
        self.iter().find(|c| c.id == id)
    }

    fn connections(&self, filter: &ConnectionFilter) -> Vec<&Connection> {
        self.iter().filter(|c| filter.matches(c)).collect()
    }
}

fn lookup<'a>(
    partition: &'a Partition,
    pair: &PairKey,
    interfaces: &InterfacePair,
) -> Option<&'a Connection> {
    partition.get(pair).and_then(|m| m.get(interfaces))
}

fn keys_of(partition: &Partition, pair: &PairKey) -> Vec<InterfacePair> {
    partition
        .get(pair)
        .map(|m| m.keys().copied().collect())
        .unwrap_or_default()
}

fn remove_from(
    partition: &mut Partition,
    pair: &PairKey,
    interfaces: &InterfacePair,
) -> Option<Connection> {
    let by_iface = partition.get_mut(pair)?;
    let removed = by_iface.remove(interfaces);
    if by_iface.is_empty() {
        partition.remove(pair);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionKind;
    use meshemu_topology::{Distance, Interface, InterfaceKind};
    use proptest::prelude::*;

    const MESH: Interface = Interface::new(InterfaceKind::Mesh, 0);
    const AP: Interface = Interface::new(InterfaceKind::Ap, 0);

    fn pair(a: u32, b: u32) -> PairKey {
        PairKey::new(NodeId::new(a), NodeId::new(b)).unwrap()
    }

    fn conn(store: &mut ConnectionStore, key: PairKey, ifaces: InterfacePair) -> Connection {
        Connection::new(store.next_id(), key, ifaces, ConnectionKind::User, Distance::ZERO, 0)
    }

    #[test]
    fn put_and_get_either_order() {
        let mut store = ConnectionStore::new();
        let ifaces = InterfacePair::new(MESH, MESH);
        let c = conn(&mut store, pair(2, 1), ifaces);
        let id = c.id;
        store.put(c, true);

        let forward = store.get(&pair(1, 2), &ifaces).unwrap();
        let backward = store.get(&pair(2, 1), &ifaces).unwrap();
        assert_eq!(forward.id, id);
        assert!(std::ptr::eq(forward, backward));
        assert_eq!(store.is_active(&pair(1, 2), &ifaces), Some(true));
    }

    #[test]
    fn partitions_are_exclusive() {
        let mut store = ConnectionStore::new();
        let ifaces = InterfacePair::new(MESH, MESH);
        let key = pair(1, 2);
        let c = conn(&mut store, key, ifaces);
        store.put(c, false);
        assert_eq!(store.inactive_count(), 1);
        assert_eq!(store.active_count(), 0);

        let moved = store.set_active(&key, &ifaces, true).unwrap();
        assert!(moved.connected);
        assert_eq!(store.active_count(), 1);
        assert_eq!(store.inactive_count(), 0);
        assert!(store.inactive().is_empty());

        store.set_active(&key, &ifaces, false).unwrap();
        assert_eq!(store.active_interfaces(&key), Vec::new());
        assert_eq!(store.inactive_interfaces(&key), vec![ifaces]);
    }

    #[test]
    fn move_of_missing_connection_is_an_error() {
        let mut store = ConnectionStore::new();
        let result = store.set_active(&pair(1, 2), &InterfacePair::new(MESH, MESH), true);
        assert!(matches!(result, Err(ReconcileError::MissingConnection { .. })));
    }

    #[test]
    fn put_replaces_existing_record() {
        let mut store = ConnectionStore::new();
        let ifaces = InterfacePair::new(MESH, MESH);
        let first = conn(&mut store, pair(1, 2), ifaces);
        let second = conn(&mut store, pair(1, 2), ifaces);
        store.put(first, true);
        let replaced = store.put(second, false).unwrap();

        assert_eq!(replaced.id, ConnectionId(0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.is_active(&pair(1, 2), &ifaces), Some(false));
    }

    #[test]
    fn several_interface_pairs_per_node_pair() {
        let mut store = ConnectionStore::new();
        let key = pair(1, 2);
        for ifaces in [InterfacePair::new(MESH, MESH), InterfacePair::new(AP, AP)] {
            let c = conn(&mut store, key, ifaces);
            store.put(c, true);
        }
        assert_eq!(store.active_interfaces(&key).len(), 2);
        assert!(store.contains_pair(&key));
        assert!(!store.contains_pair(&pair(1, 3)));
    }

    #[test]
    fn query_filters() {
        let mut store = ConnectionStore::new();
        let ifaces = InterfacePair::new(MESH, MESH);
        for (key, active) in [(pair(1, 2), true), (pair(2, 3), false), (pair(1, 3), true)] {
            let c = conn(&mut store, key, ifaces);
            store.put(c, active);
        }

        assert_eq!(store.connections(&ConnectionFilter::active()).len(), 2);
        assert_eq!(store.connections(&ConnectionFilter::inactive()).len(), 1);
        assert_eq!(
            store
                .connections(&ConnectionFilter::active().with_node(NodeId::new(3)))
                .len(),
            1
        );
        assert_eq!(store.connection_by_id(ConnectionId(1)).unwrap().pair, pair(2, 3));
        assert!(store.connection_by_id(ConnectionId(9)).is_none());
    }

    #[test]
    fn adjacency_is_bidirectional() {
        let mut store = ConnectionStore::new();
        let ifaces = InterfacePair::new(MESH, MESH);
        for key in [pair(1, 2), pair(2, 3)] {
            let c = conn(&mut store, key, ifaces);
            store.put(c, true);
        }
        let adjacency = store.adjacency();
        assert_eq!(adjacency[&NodeId::new(2)].len(), 2);
        assert!(adjacency[&NodeId::new(3)].contains(&NodeId::new(2)));
        assert!(adjacency[&NodeId::new(1)].contains(&NodeId::new(2)));
    }

    #[test]
    fn clear_restarts_ids() {
        let mut store = ConnectionStore::new();
        let c = conn(&mut store, pair(1, 2), InterfacePair::new(MESH, MESH));
        store.put(c, true);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.next_id(), ConnectionId(0));
    }

    proptest! {
        #[test]
        fn canonical_key_symmetry(a in 0u32..50, b in 0u32..50, active: bool) {
            prop_assume!(a != b);
            let mut store = ConnectionStore::new();
            let x = NodeId::new(a);
            let forward = PairKey::new(x, NodeId::new(b)).unwrap();
            let ifaces = InterfacePair::oriented(&forward, x, MESH, AP);
            let c = conn(&mut store, forward, ifaces);
            store.put(c, active);

            let backward = PairKey::new(NodeId::new(b), x).unwrap();
            let swapped = InterfacePair::oriented(&backward, NodeId::new(b), AP, MESH);
            let found = store.get(&backward, &swapped);
            prop_assert!(found.is_some());
            prop_assert_eq!(found.map(|c| c.id), Some(ConnectionId(0)));
            prop_assert_eq!(store.is_active(&backward, &swapped), Some(active));
        }
    }
}
