//! Cross-server pairs in distributed mode.
//!
//! When nodes are spread across several emulation servers, a link between
//! nodes on different servers first needs a tunnel. The engine asks the
//! injected [`RemotePairPolicy`] whether a pair is remote and, if so, to
//! establish or reuse the tunnel before touching connection state.

use std::collections::{BTreeSet, HashMap};

use meshemu_topology::{NodeId, PairKey};
use thiserror::Error;
use tracing::debug;

/// Tunnel setup failures. The affected pair is skipped for the step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    /// The node is not assigned to any server.
    #[error("node {0} has no owning server")]
    UnknownOwner(NodeId),

    /// The tunnel could not be brought up.
    #[error("tunnel for {pair} failed: {reason}")]
    Failed { pair: PairKey, reason: String },
}

/// Decides which pairs cross server boundaries and provides their tunnels.
pub trait RemotePairPolicy: Send {
    /// Whether `x` and `y` are owned by different servers.
    fn is_remote(&self, x: NodeId, y: NodeId) -> bool;

    /// Make sure a tunnel for `pair` exists, reusing an existing one.
    fn ensure_tunnel(&mut self, pair: PairKey) -> Result<(), TunnelError>;

    /// Whether the policy spans more than one server.
    fn is_distributed(&self) -> bool {
        false
    }
}

/// Single-server operation: nothing is remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

impl RemotePairPolicy for LocalOnly {
    fn is_remote(&self, _x: NodeId, _y: NodeId) -> bool {
        false
    }

    fn ensure_tunnel(&mut self, _pair: PairKey) -> Result<(), TunnelError> {
        Ok(())
    }
}

/// Fixed node-to-server assignment.
///
/// Reserved nodes (hubs, management) exist on every server and count as
/// local. Nodes without an owner are treated as remote so that their
/// tunnel request fails loudly instead of being skipped.
#[derive(Debug, Clone)]
pub struct StaticOwnership {
    local: String,
    owners: HashMap<NodeId, String>,
    tunnels: BTreeSet<PairKey>,
}

impl StaticOwnership {
    pub fn new(local: impl Into<String>, owners: HashMap<NodeId, String>) -> Self {
        Self {
            local: local.into(),
            owners,
            tunnels: BTreeSet::new(),
        }
    }

    /// Server owning `node`, if known.
    pub fn owner(&self, node: NodeId) -> Option<&str> {
        if node.is_reserved() {
            return Some(&self.local);
        }
        self.owners.get(&node).map(String::as_str)
    }

    /// Pairs a tunnel has been set up for.
    pub fn tunnels(&self) -> &BTreeSet<PairKey> {
        &self.tunnels
    }
}

impl RemotePairPolicy for StaticOwnership {
    fn is_remote(&self, x: NodeId, y: NodeId) -> bool {
        match (self.owner(x), self.owner(y)) {
            (Some(a), Some(b)) => a != b,
            _ => true,
        }
    }

    fn ensure_tunnel(&mut self, pair: PairKey) -> Result<(), TunnelError> {
        for node in [pair.low(), pair.high()] {
            if self.owner(node).is_none() {
                return Err(TunnelError::UnknownOwner(node));
            }
        }
        if self.tunnels.insert(pair) {
            debug!("tunnel established for {}", pair);
        }
        Ok(())
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ownership() -> StaticOwnership {
        let owners = HashMap::from([
            (NodeId::new(1), "a".to_string()),
            (NodeId::new(2), "a".to_string()),
            (NodeId::new(3), "b".to_string()),
        ]);
        StaticOwnership::new("a", owners)
    }

    #[test]
    fn local_only_never_remote() {
        let mut policy = LocalOnly;
        assert!(!policy.is_remote(NodeId::new(1), NodeId::new(2)));
        assert!(!policy.is_distributed());
        assert!(policy
            .ensure_tunnel(PairKey::new(NodeId::new(1), NodeId::new(2)).unwrap())
            .is_ok());
    }

    #[test]
    fn remote_iff_owners_differ() {
        let policy = ownership();
        assert!(!policy.is_remote(NodeId::new(1), NodeId::new(2)));
        assert!(policy.is_remote(NodeId::new(1), NodeId::new(3)));
        assert!(!policy.is_remote(NodeId::new(1), NodeId::central(0)));
        assert!(policy.is_remote(NodeId::new(1), NodeId::new(9)));
    }

    #[test]
    fn tunnels_are_reused() {
        let mut policy = ownership();
        let pair = PairKey::new(NodeId::new(3), NodeId::new(1)).unwrap();
        policy.ensure_tunnel(pair).unwrap();
        policy.ensure_tunnel(pair).unwrap();
        assert_eq!(policy.tunnels().len(), 1);
    }

    #[test]
    fn unowned_node_fails() {
        let mut policy = ownership();
        let pair = PairKey::new(NodeId::new(1), NodeId::new(9)).unwrap();
        assert_eq!(
            policy.ensure_tunnel(pair),
            Err(TunnelError::UnknownOwner(NodeId::new(9)))
        );
        assert!(policy.tunnels().is_empty());
    }
}
