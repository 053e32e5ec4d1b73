//! Scenario configuration.
//!
//! A [`SimulationConfig`] is loaded from a JSON scenario file or from
//! `MESHEMU_*` environment variables and turned into a ready-to-run
//! [`ReconciliationEngine`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use meshemu_links::{ModelConfig, QualityParams};
use meshemu_reconcile::{
    MovementModel, NetworkBackendNotifications, ReconciliationEngine, StaticOwnership,
};
use meshemu_topology::{FilterKind, InterfaceKind, Node, NodeId, RESERVED_IDS};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SimError};
use crate::movement::{DistanceEntry, RandomWalk, Replay};

/// Where node distances come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MovementConfig {
    /// See [`RandomWalk`].
    RandomWalk {
        width: f64,
        height: f64,
        max_step: f64,
        #[serde(default)]
        seed: u64,
    },
    /// See [`Replay`].
    Replay { steps: Vec<Vec<DistanceEntry>> },
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self::RandomWalk {
            width: 100.0,
            height: 100.0,
            max_step: 5.0,
            seed: 42,
        }
    }
}

/// Node ownership when several servers share one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Name of the server this process runs on.
    pub local: String,
    /// Owning server per emulation node id.
    pub owners: BTreeMap<u32, String>,
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Emulation nodes, numbered from 1.
    pub node_count: u32,
    /// Normal interfaces every node gets, in order.
    pub interfaces: Vec<InterfaceKind>,
    pub interface_filter: FilterKind,
    pub link_quality: ModelConfig,
    /// Static bandwidth default applied when a link first comes up.
    pub bandwidth_kbit: Option<u64>,
    /// Static loss default applied when a link first comes up.
    pub loss_percent: Option<f64>,
    /// Add a central hub every node is attached to.
    pub central_hub: bool,
    /// Add a management node with always-on links.
    pub management: bool,
    pub movement: MovementConfig,
    /// Step automatically at this interval after start.
    pub auto_step_interval_ms: Option<u64>,
    pub distributed: Option<DistributedConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_count: 10,
            interfaces: vec![InterfaceKind::Mesh],
            interface_filter: FilterKind::Equal,
            link_quality: ModelConfig::default(),
            bandwidth_kbit: Some(54_000),
            loss_percent: None,
            central_hub: false,
            management: false,
            movement: MovementConfig::default(),
            auto_step_interval_ms: None,
            distributed: None,
        }
    }
}

impl SimulationConfig {
    /// Load from `MESHEMU_*` environment variables.
    ///
    /// `MESHEMU_CONFIG` points at a JSON scenario file; the other variables
    /// override single fields of it (or of the defaults).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match var("MESHEMU_CONFIG") {
            Some(path) => Self::read_json_file(path)?,
            None => Self::default(),
        };

        if let Some(v) = var("MESHEMU_NODE_COUNT") {
            config.node_count = parse_var("MESHEMU_NODE_COUNT", &v)?;
        }
        if let Some(v) = var("MESHEMU_INTERFACES") {
            config.interfaces = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_json_var("MESHEMU_INTERFACES", &format!("\"{}\"", s)))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = var("MESHEMU_INTERFACE_FILTER") {
            config.interface_filter =
                parse_json_var("MESHEMU_INTERFACE_FILTER", &format!("\"{}\"", v.trim()))?;
        }
        if let Some(v) = var("MESHEMU_LINK_QUALITY") {
            config.link_quality = parse_json_var("MESHEMU_LINK_QUALITY", &v)?;
        }
        if let Some(v) = var("MESHEMU_BANDWIDTH_KBIT") {
            config.bandwidth_kbit = Some(parse_var("MESHEMU_BANDWIDTH_KBIT", &v)?);
        }
        if let Some(v) = var("MESHEMU_LOSS_PERCENT") {
            config.loss_percent = Some(parse_var("MESHEMU_LOSS_PERCENT", &v)?);
        }
        if let Some(v) = var("MESHEMU_CENTRAL_HUB") {
            config.central_hub = parse_var("MESHEMU_CENTRAL_HUB", &v)?;
        }
        if let Some(v) = var("MESHEMU_MANAGEMENT") {
            config.management = parse_var("MESHEMU_MANAGEMENT", &v)?;
        }
        if let Some(v) = var("MESHEMU_SEED") {
            let new_seed: u64 = parse_var("MESHEMU_SEED", &v)?;
            if let MovementConfig::RandomWalk { seed, .. } = &mut config.movement {
                *seed = new_seed;
            }
        }
        if let Some(v) = var("MESHEMU_AUTO_STEP_MS") {
            config.auto_step_interval_ms = Some(parse_var("MESHEMU_AUTO_STEP_MS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON scenario file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        info!("loaded scenario from {}", path.display());
        Ok(config)
    }

    /// Reject configurations that cannot produce a valid simulation.
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(SimError::Config("node_count must be at least 1".into()));
        }
        if self.node_count >= u32::MAX - RESERVED_IDS {
            return Err(SimError::Config(format!(
                "node_count {} reaches into the reserved id range",
                self.node_count
            )));
        }
        if self.interfaces.is_empty() {
            return Err(SimError::Config("at least one interface per node is required".into()));
        }
        if let Some(kind) = self.interfaces.iter().find(|k| !k.is_normal()) {
            return Err(SimError::Config(format!(
                "interface kind {} is not configurable per node",
                kind
            )));
        }
        if self.auto_step_interval_ms == Some(0) {
            return Err(SimError::Config("auto_step_interval_ms must be positive".into()));
        }
        if let Some(loss) = self.loss_percent {
            if !(0.0..=100.0).contains(&loss) {
                return Err(SimError::Config(format!("loss_percent {} out of range", loss)));
            }
        }

        match &self.movement {
            MovementConfig::RandomWalk {
                width,
                height,
                max_step,
                ..
            } => {
                if !(*width > 0.0 && *height > 0.0) {
                    return Err(SimError::Config("random walk area must be positive".into()));
                }
                if !(*max_step >= 0.0 && max_step.is_finite()) {
                    return Err(SimError::Config(
                        "random walk max_step must be non-negative".into(),
                    ));
                }
            }
            MovementConfig::Replay { steps } => {
                if steps.is_empty() {
                    return Err(SimError::Config("replay needs at least one step".into()));
                }
            }
        }

        if let Some(distributed) = &self.distributed {
            let unowned = self
                .node_ids()
                .find(|id| !distributed.owners.contains_key(&id.value()));
            if let Some(missing) = unowned {
                return Err(SimError::Config(format!("node {} has no owning server", missing)));
            }
        }

        self.link_quality.build(self.initial_quality())?;
        Ok(())
    }

    /// Quality applied when a link first comes up.
    pub fn initial_quality(&self) -> QualityParams {
        QualityParams {
            bandwidth_kbit: self.bandwidth_kbit,
            loss_percent: self.loss_percent,
            delay_ms: None,
        }
    }

    pub fn auto_step_interval(&self) -> Option<Duration> {
        self.auto_step_interval_ms.map(Duration::from_millis)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.node_count).map(NodeId::new)
    }

    /// Emulation nodes plus the optional hub and management node.
    pub fn build_nodes(&self) -> Result<Vec<Node>> {
        let mut kinds = self.interfaces.clone();
        if self.central_hub {
            kinds.push(InterfaceKind::Hub);
        }
        if self.management {
            kinds.push(InterfaceKind::Management);
        }

        let mut nodes = self
            .node_ids()
            .map(|id| Node::emulation(id, kinds.iter().copied()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if self.central_hub {
            nodes.push(Node::central(0)?);
        }
        if self.management {
            nodes.push(Node::management());
        }
        Ok(nodes)
    }

    pub fn build_movement(&self) -> Result<Box<dyn MovementModel>> {
        Ok(match &self.movement {
            MovementConfig::RandomWalk {
                width,
                height,
                max_step,
                seed,
            } => Box::new(RandomWalk::new(self.node_ids(), *width, *height, *max_step, *seed)),
            MovementConfig::Replay { steps } => Box::new(Replay::from_entries(steps)?),
        })
    }

    /// Assemble an engine for this scenario around `backend`.
    pub fn build_engine(
        &self,
        backend: Box<dyn NetworkBackendNotifications>,
    ) -> Result<ReconciliationEngine> {
        self.validate()?;
        let model = self.link_quality.build(self.initial_quality())?;
        let mut engine = ReconciliationEngine::new(model, backend)
            .with_filter(self.interface_filter.build())
            .with_movement(self.build_movement()?);

        if let Some(distributed) = &self.distributed {
            let owners = distributed
                .owners
                .iter()
                .map(|(id, server)| (NodeId::new(*id), server.clone()))
                .collect();
            let policy = StaticOwnership::new(distributed.local.clone(), owners);
            engine = engine.with_remote_policy(Box::new(policy));
        }

        for node in self.build_nodes()? {
            engine.add_node(node)?;
        }
        Ok(engine)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SimError::Config(format!("invalid {}: {:?}", key, value)))
}

fn parse_json_var<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| SimError::Config(format!("invalid {}: {}", key, e)))
}
