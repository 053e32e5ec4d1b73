//! Read-only topology snapshots.
//!
//! The manager publishes a fresh [`TopologySnapshot`] after every step.
//! Readers get it without taking the simulation lock, so a snapshot may be
//! one step behind a step that is currently running.

use std::collections::{BTreeMap, BTreeSet};

use meshemu_reconcile::{
    Connection, ConnectionFilter, ConnectionId, ConnectionQuery, ReconciliationEngine,
};
use meshemu_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::movement::{entries_from_matrix, DistanceEntry};

/// Connections and distances after a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Number of steps completed.
    pub step: u64,
    pub distances: Vec<DistanceEntry>,
    pub active: Vec<Connection>,
    pub inactive: Vec<Connection>,
}

impl TopologySnapshot {
    pub fn capture(engine: &ReconciliationEngine) -> Self {
        let flatten = |partition: &meshemu_reconcile::Partition| -> Vec<Connection> {
            partition.values().flat_map(|m| m.values().cloned()).collect()
        };
        let store = engine.store();
        Self {
            step: engine.current_step(),
            distances: entries_from_matrix(engine.distances()),
            active: flatten(store.active()),
            inactive: flatten(store.inactive()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Neighbors over active links, in both directions.
    pub fn adjacency(&self) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for conn in &self.active {
            adjacency.entry(conn.pair.low()).or_default().insert(conn.pair.high());
            adjacency.entry(conn.pair.high()).or_default().insert(conn.pair.low());
        }
        adjacency
    }
}

impl ConnectionQuery for TopologySnapshot {
    fn connection_by_id(&self, id: ConnectionId) -> Option<&Connection> {
        self.active.iter().chain(&self.inactive).find(|c| c.id == id)
    }

    fn connections(&self, filter: &ConnectionFilter) -> Vec<&Connection> {
        self.active
            .iter()
            .chain(&self.inactive)
            .filter(|c| filter.matches(c))
            .collect()
    }
}
