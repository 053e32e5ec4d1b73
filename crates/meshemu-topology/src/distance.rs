//! Distances, canonical node pairs and the per-step distance matrix.

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Result, TopologyError};
use crate::NodeId;

/// Non-negative separation between two nodes.
///
/// [`Distance::UNLIMITED`] stands for "effectively infinite"; it compares
/// greater than every finite distance and equal to itself, so an unlimited
/// entry that stays unlimited never shows up in a diff.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Option<f64>", into = "Option<f64>"))]
pub struct Distance(f64);

impl Distance {
    /// No separation at all. Used for hub links.
    pub const ZERO: Self = Self(0.0);

    /// Effectively infinite separation.
    pub const UNLIMITED: Self = Self(f64::INFINITY);

    /// Create a distance, rejecting negative values and NaN.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value < 0.0 {
            return Err(TopologyError::InvalidDistance(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_unlimited(&self) -> bool {
        self.0.is_infinite()
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            f.write_str("unlimited")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<Distance> for Option<f64> {
    fn from(distance: Distance) -> Self {
        (!distance.is_unlimited()).then_some(distance.0)
    }
}

impl TryFrom<Option<f64>> for Distance {
    type Error = TopologyError;

    fn try_from(value: Option<f64>) -> Result<Self> {
        match value {
            Some(v) => Self::new(v),
            None => Ok(Self::UNLIMITED),
        }
    }
}

/// Unordered pair of distinct nodes, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairKey {
    low: NodeId,
    high: NodeId,
}

impl PairKey {
    /// Build the canonical key for `a` and `b`, in either order.
    pub fn new(a: NodeId, b: NodeId) -> Result<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(TopologyError::SelfPair(a)),
        }
    }

    /// The smaller node id (`x` in upper-triangular order).
    pub const fn low(&self) -> NodeId {
        self.low
    }

    /// The larger node id (`y` in upper-triangular order).
    pub const fn high(&self) -> NodeId {
        self.high
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.low == node || self.high == node
    }

    /// The other member of the pair, if `node` is a member.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.low {
            Some(self.high)
        } else if node == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.low, self.high)
    }
}

/// Symmetric mapping of node pairs to distances for one simulation step.
///
/// Self pairs cannot be represented. Iteration runs in ascending
/// [`PairKey`] order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceMatrix {
    entries: BTreeMap<PairKey, Distance>,
}

impl DistanceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the distance between `a` and `b`. Returns the previous value.
    pub fn insert(&mut self, a: NodeId, b: NodeId, distance: Distance) -> Result<Option<Distance>> {
        let key = PairKey::new(a, b)?;
        Ok(self.entries.insert(key, distance))
    }

    /// Insert under an already canonical key.
    pub fn insert_pair(&mut self, key: PairKey, distance: Distance) -> Option<Distance> {
        self.entries.insert(key, distance)
    }

    /// Distance between `a` and `b` in either order.
    pub fn get(&self, a: NodeId, b: NodeId) -> Option<Distance> {
        PairKey::new(a, b).ok().and_then(|key| self.get_pair(&key))
    }

    pub fn get_pair(&self, key: &PairKey) -> Option<Distance> {
        self.entries.get(key).copied()
    }

    pub fn remove(&mut self, a: NodeId, b: NodeId) -> Option<Distance> {
        PairKey::new(a, b).ok().and_then(|key| self.entries.remove(&key))
    }

    pub fn contains_pair(&self, key: &PairKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in upper-triangular order.
    pub fn iter(&self) -> impl Iterator<Item = (PairKey, Distance)> + '_ {
        self.entries.iter().map(|(k, d)| (*k, *d))
    }

    /// All node ids that appear in at least one pair.
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.entries
            .keys()
            .flat_map(|k| [k.low(), k.high()])
            .collect()
    }

    /// Overlay `other` onto this matrix. Entries of `other` win.
    pub fn merge(&mut self, other: &DistanceMatrix) {
        for (key, distance) in other.iter() {
            self.entries.insert(key, distance);
        }
    }

    /// Pairs whose entry differs between `self` (the newer matrix) and `previous`.
    ///
    /// A pair is reported when it is new, changed, or gone. New and changed
    /// pairs carry the value from `self`; pairs only present in `previous`
    /// carry [`Distance::UNLIMITED`].
    pub fn symmetric_difference(&self, previous: &DistanceMatrix) -> DistanceMatrix {
        let mut diff = DistanceMatrix::new();
        for (key, distance) in self.iter() {
            if previous.get_pair(&key) != Some(distance) {
                diff.entries.insert(key, distance);
            }
        }
        for (key, _) in previous.iter() {
            if !self.contains_pair(&key) {
                diff.entries.insert(key, Distance::UNLIMITED);
            }
        }
        diff
    }
}

impl FromIterator<(PairKey, Distance)> for DistanceMatrix {
    fn from_iter<I: IntoIterator<Item = (PairKey, Distance)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DistanceMatrix {
    type Item = (&'a PairKey, &'a Distance);
    type IntoIter = btree_map::Iter<'a, PairKey, Distance>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
