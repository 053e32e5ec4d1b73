//! Change detection between successive distance matrices.

use meshemu_topology::{Distance, DistanceMatrix, Node, NodeRole};

/// Keeps the last accepted distance matrix and the constant hub overlay.
#[derive(Debug, Default)]
pub struct DistanceMatrixDiffer {
    current: DistanceMatrix,
    hub_overlay: Option<DistanceMatrix>,
}

impl DistanceMatrixDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs that changed relative to the last accepted matrix.
    ///
    /// `new` becomes the last accepted matrix, so a second call with the same
    /// input returns an empty diff.
    pub fn diff(&mut self, new: &DistanceMatrix) -> DistanceMatrix {
        let changed = new.symmetric_difference(&self.current);
        self.current = new.clone();
        changed
    }

    /// The last accepted matrix, without hub overlay.
    pub fn current(&self) -> &DistanceMatrix {
        &self.current
    }

    pub fn hub_overlay(&self) -> Option<&DistanceMatrix> {
        self.hub_overlay.as_ref()
    }

    /// Compute the hub overlay from `nodes` unless it already exists.
    pub fn ensure_hub_overlay<'a>(
        &mut self,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> &DistanceMatrix {
        self.hub_overlay.get_or_insert_with(|| hub_overlay(nodes))
    }

    /// Merge the hub overlay, if any, into `matrix`.
    pub fn apply_overlay(&self, matrix: &mut DistanceMatrix) {
        if let Some(overlay) = &self.hub_overlay {
            matrix.merge(overlay);
        }
    }

    /// Forget the accepted matrix and the overlay.
    pub fn reset(&mut self) {
        self.current = DistanceMatrix::new();
        self.hub_overlay = None;
    }
}

/// Zero distance between every central hub and every emulation node with a hub interface.
pub fn hub_overlay<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> DistanceMatrix {
    let nodes: Vec<&Node> = nodes.into_iter().collect();
    let hubs = nodes.iter().filter(|n| n.role == NodeRole::Central);
    let mut overlay = DistanceMatrix::new();
    for hub in hubs {
        for node in nodes
            .iter()
            .filter(|n| n.role == NodeRole::Emulation && n.has_hub_interface())
        {
            // Ids are distinct by construction: hub ids are reserved.
            if let Ok(previous) = overlay.insert(hub.id, node.id, Distance::ZERO) {
                debug_assert!(previous.is_none());
            }
        }
    }
    overlay
}
