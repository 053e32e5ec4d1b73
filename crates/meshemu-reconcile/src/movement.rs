//! Source of distances.

use meshemu_topology::DistanceMatrix;

/// A node-mobility model.
///
/// The engine advances the model once per step (except for step 0, which
/// uses the initial placement) and then pulls the pairwise distances.
pub trait MovementModel: Send {
    /// Advance the model by one step.
    fn simulate_one_step(&mut self);

    /// Current pairwise distances between emulation nodes.
    fn distances_from_nodes(&self) -> DistanceMatrix;
}

/// A fixed distance matrix that never changes.
#[derive(Debug, Clone, Default)]
pub struct Stationary {
    distances: DistanceMatrix,
}

impl Stationary {
    pub fn new(distances: DistanceMatrix) -> Self {
        Self { distances }
    }
}

impl MovementModel for Stationary {
    fn simulate_one_step(&mut self) {}

    fn distances_from_nodes(&self) -> DistanceMatrix {
        self.distances.clone()
    }
}
