//! Validator set
//!
//! The order of the set defines each validator's index, and therefore its
//! turn as leader. Indexes are recomputed from the set, never stored apart
//! from it.

use serde::{Deserialize, Serialize};
use shared_types::NodeId;
use std::collections::HashMap;

/// Ordered, deduplicated validator identities
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<NodeId>,
    /// Quick lookup by node identity
    #[serde(skip)]
    lookup: HashMap<NodeId, u64>,
}

impl ValidatorSet {
    /// Create a validator set, dropping repeated identities but keeping the
    /// first occurrence's position.
    pub fn new(validators: impl IntoIterator<Item = NodeId>) -> Self {
        let mut ordered = Vec::new();
        let mut lookup = HashMap::new();
        for node in validators {
            if !lookup.contains_key(&node) {
                lookup.insert(node, ordered.len() as u64);
                ordered.push(node);
            }
        }
        Self {
            validators: ordered,
            lookup,
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.lookup.contains_key(node)
    }

    pub fn index_of(&self, node: &NodeId) -> Option<u64> {
        self.lookup.get(node).copied()
    }

    pub fn get(&self, idx: u64) -> Option<&NodeId> {
        usize::try_from(idx).ok().and_then(|i| self.validators.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.validators.iter()
    }

    /// Maximum number of faulty validators tolerated: `(n - 1) / 3`
    pub fn max_faulty(&self) -> usize {
        self.validators.len().saturating_sub(1) / 3
    }

    /// Quorum size: `n - f`
    pub fn min_valid_nodes(&self) -> usize {
        self.validators.len() - self.max_faulty()
    }

    /// Leader index for a round. `None` for an empty set.
    pub fn leader(&self, height: u64, view: u64) -> Option<u64> {
        if self.validators.is_empty() {
            return None;
        }
        Some(view.wrapping_add(height) % self.validators.len() as u64)
    }

    /// Rebuild the lookup table (after deserialization)
    pub fn rebuild_lookup(&mut self) {
        self.lookup = self
            .validators
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, i as u64))
            .collect();
    }
}

impl PartialEq for ValidatorSet {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for ValidatorSet {}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u8) -> NodeId {
        let mut bytes = [0u8; 33];
        bytes[0] = 2;
        bytes[1] = id;
        NodeId(bytes)
    }

    #[test]
    fn test_validator_set_dedup_keeps_order() {
        let set = ValidatorSet::new(vec![node(3), node(1), node(3), node(2)]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.index_of(&node(3)), Some(0));
        assert_eq!(set.index_of(&node(1)), Some(1));
        assert_eq!(set.index_of(&node(2)), Some(2));
        assert_eq!(set.get(1), Some(&node(1)));
        assert_eq!(set.get(7), None);
    }

    #[test]
    fn test_quorum_sizes() {
        let sizes: Vec<(usize, usize)> = [1usize, 3, 4, 7, 10]
            .iter()
            .map(|&n| {
                let set = ValidatorSet::new((0..n as u8).map(node));
                (set.max_faulty(), set.min_valid_nodes())
            })
            .collect();
        assert_eq!(sizes, vec![(0, 1), (0, 3), (1, 3), (2, 5), (3, 7)]);
    }

    #[test]
    fn test_leader_is_pure_function_of_round() {
        let a = ValidatorSet::new((0..4).map(node));
        let b = ValidatorSet::new((0..4).map(node));
        for height in 0..10 {
            for view in 0..10 {
                assert_eq!(a.leader(height, view), b.leader(height, view));
                assert_eq!(a.leader(height, view), Some((height + view) % 4));
            }
        }
        assert_eq!(ValidatorSet::default().leader(1, 0), None);
    }

    #[test]
    fn test_rebuild_lookup_after_deserialize() {
        let set = ValidatorSet::new((0..4).map(node));
        let bytes = bincode::serialize(&set).unwrap();
        let mut restored: ValidatorSet = bincode::deserialize(&bytes).unwrap();
        assert!(!restored.contains(&node(2)));
        restored.rebuild_lookup();
        assert_eq!(restored.index_of(&node(2)), Some(2));
        assert_eq!(restored, set);
    }
}
