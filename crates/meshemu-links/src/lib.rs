//! Link Quality Models
//!
//! A link-quality model turns the distance between two nodes into a binary
//! connectivity decision plus the shaping parameters a network backend needs
//! to impair the link (bandwidth, loss, delay).
//!
//! # Contract
//!
//! Every model must be:
//! - **deterministic**: the same distance always yields the same decision,
//!   so steps without movement never produce work
//! - **monotonic**: a larger distance never improves quality; once a model
//!   says "disconnected" at `d`, it says so for every distance beyond `d`
//!
//! # Initial quality
//!
//! [`LinkQualityModel::initial_link_quality`] is applied the first time a link
//! comes up. Models whose distance parameters only cover part of the shaping
//! (for example [`LinearLoss`], which only yields loss) rely on it to carry
//! the static bandwidth defaults.

mod config;
mod error;
mod models;
mod params;

pub use config::ModelConfig;
pub use error::{ModelError, Result};
pub use models::{LinearLoss, StepFunction, Tier, Tiered, Unshaped};
pub use params::{LinkDecision, QualityParams};

use meshemu_topology::Distance;

/// Strategy mapping a distance to a link decision.
pub trait LinkQualityModel: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Connectivity and shaping for two nodes `distance` apart.
    fn distance_to_link_quality(&self, distance: Distance) -> LinkDecision;

    /// Quality applied the first time a link becomes active.
    fn initial_link_quality(&self) -> LinkDecision;
}
