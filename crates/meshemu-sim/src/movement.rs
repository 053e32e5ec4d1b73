//! Concrete movement models.

use std::collections::BTreeMap;

use meshemu_reconcile::MovementModel;
use meshemu_topology::{Distance, DistanceMatrix, NodeId, PairKey, TopologyError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One distance as written in scenario files and snapshots.
///
/// A `null` distance means the nodes are out of any range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceEntry {
    pub a: NodeId,
    pub b: NodeId,
    pub distance: Distance,
}

impl DistanceEntry {
    pub fn new(a: u32, b: u32, distance: Distance) -> Self {
        Self {
            a: NodeId::new(a),
            b: NodeId::new(b),
            distance,
        }
    }
}

/// Build a matrix from entries. Self pairs are rejected.
pub fn matrix_from_entries(entries: &[DistanceEntry]) -> Result<DistanceMatrix, TopologyError> {
    let mut matrix = DistanceMatrix::new();
    for entry in entries {
        matrix.insert(entry.a, entry.b, entry.distance)?;
    }
    Ok(matrix)
}

/// Flatten a matrix into entries, in pair order.
pub fn entries_from_matrix(matrix: &DistanceMatrix) -> Vec<DistanceEntry> {
    matrix
        .iter()
        .map(|(pair, distance)| DistanceEntry {
            a: pair.low(),
            b: pair.high(),
            distance,
        })
        .collect()
}

/// Nodes wandering inside a rectangle.
///
/// Each step every node moves by an independent offset of at most
/// `max_step` per axis and is clamped to the area. Distances are euclidean.
/// The walk is fully determined by its seed.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    positions: BTreeMap<NodeId, (f64, f64)>,
    width: f64,
    height: f64,
    max_step: f64,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(
        nodes: impl IntoIterator<Item = NodeId>,
        width: f64,
        height: f64,
        max_step: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions = nodes
            .into_iter()
            .map(|id| (id, (rng.gen_range(0.0..=width), rng.gen_range(0.0..=height))))
            .collect();
        Self {
            positions,
            width,
            height,
            max_step,
            rng,
        }
    }

    pub fn position(&self, node: NodeId) -> Option<(f64, f64)> {
        self.positions.get(&node).copied()
    }
}

impl MovementModel for RandomWalk {
    fn simulate_one_step(&mut self) {
        for (x, y) in self.positions.values_mut() {
            let dx = self.rng.gen_range(-self.max_step..=self.max_step);
            let dy = self.rng.gen_range(-self.max_step..=self.max_step);
            *x = (*x + dx).clamp(0.0, self.width);
            *y = (*y + dy).clamp(0.0, self.height);
        }
    }

    fn distances_from_nodes(&self) -> DistanceMatrix {
        let nodes: Vec<_> = self.positions.iter().collect();
        let mut matrix = DistanceMatrix::new();
        for (i, (a, (ax, ay))) in nodes.iter().enumerate() {
            for (b, (bx, by)) in &nodes[i + 1..] {
                let d = (ax - bx).hypot(ay - by);
                if let (Ok(pair), Ok(distance)) = (PairKey::new(**a, **b), Distance::new(d)) {
                    matrix.insert_pair(pair, distance);
                }
            }
        }
        matrix
    }
}

/// Plays back scripted distance matrices. The last one repeats forever.
#[derive(Debug, Clone)]
pub struct Replay {
    steps: Vec<DistanceMatrix>,
    index: usize,
}

impl Replay {
    pub fn new(steps: Vec<DistanceMatrix>) -> Self {
        Self { steps, index: 0 }
    }

    pub fn from_entries(steps: &[Vec<DistanceEntry>]) -> Result<Self, TopologyError> {
        let steps = steps
            .iter()
            .map(|entries| matrix_from_entries(entries))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(steps))
    }

    /// Index of the matrix currently played.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl MovementModel for Replay {
    fn simulate_one_step(&mut self) {
        if self.index + 1 < self.steps.len() {
            self.index += 1;
        }
    }

    fn distances_from_nodes(&self) -> DistanceMatrix {
        self.steps.get(self.index).cloned().unwrap_or_default()
    }
}
