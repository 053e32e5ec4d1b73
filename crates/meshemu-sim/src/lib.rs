//! Meshemu Simulation
//!
//! Runs a mesh emulation scenario: a [`SimulationConfig`] describes the nodes,
//! their interfaces, the link-quality model and how nodes move; a
//! [`SimulationManager`] turns it into a reconciliation engine and steps it,
//! either on request or on a timer.
//!
//! ```no_run
//! use meshemu_reconcile::TracingBackend;
//! use meshemu_sim::{SimulationConfig, SimulationManager};
//!
//! # async fn run() -> meshemu_sim::Result<()> {
//! let manager = SimulationManager::new(SimulationConfig::from_env()?)?;
//! manager.start(Box::new(TracingBackend)).await?;
//! manager.wait_until_network_ready().await?;
//! manager.step(10).await?;
//! println!("{}", manager.snapshot().to_json()?);
//! manager.abort().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod movement;
pub mod snapshot;

pub use config::{DistributedConfig, MovementConfig, SimulationConfig};
pub use error::{Result, SimError};
pub use manager::{Readiness, SimulationManager};
pub use movement::{entries_from_matrix, matrix_from_entries, DistanceEntry, RandomWalk, Replay};
pub use snapshot::TopologySnapshot;
