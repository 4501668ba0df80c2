use crate::domain::{ChainHead, ValidatorSet};
use std::collections::HashMap;

/// Protocol counters of one engine.
///
/// Owned by the engine core and only touched under its lock.
#[derive(Debug)]
pub struct RoundState {
    /// Own position in the validator set, `None` when not a member
    pub node_idx: Option<u64>,
    pub validators: ValidatorSet,
    pub view: u64,
    pub to_view: u64,
    /// Height currently being agreed upon
    pub consensus_height: u64,
    pub highest: ChainHead,
    pub leader_failed: bool,
    pub notify_next_leader_seal: bool,
    /// The next timeout check fires immediately
    pub fast_view_change: bool,
    /// Last view seen from each validator index
    pub view_map: HashMap<u64, u64>,
    /// `to_view` we last sent a catch-up view change for, per validator
    pub catchup_sent: HashMap<u64, u64>,
}

impl RoundState {
    pub fn new(highest: ChainHead) -> Self {
        Self {
            node_idx: None,
            validators: ValidatorSet::default(),
            view: 0,
            to_view: 0,
            consensus_height: highest.number + 1,
            highest,
            leader_failed: false,
            notify_next_leader_seal: false,
            fast_view_change: false,
            view_map: HashMap::new(),
            catchup_sent: HashMap::new(),
        }
    }

    /// Observer mode: this node is not in the validator set.
    pub fn cfg_err(&self) -> bool {
        self.node_idx.is_none()
    }

    pub fn max_faulty(&self) -> usize {
        self.validators.max_faulty()
    }

    pub fn min_valid_nodes(&self) -> usize {
        self.validators.min_valid_nodes()
    }

    /// Leader of the current round, unless the node is misconfigured or
    /// the leader is presumed dead.
    pub fn leader(&self) -> Option<u64> {
        if self.cfg_err() || self.leader_failed {
            return None;
        }
        self.validators.leader(self.highest.number, self.view)
    }

    /// Leader of the height after the current one, at view 0.
    pub fn next_leader(&self) -> Option<u64> {
        self.validators.leader(self.highest.number + 1, 0)
    }

    pub fn is_leader(&self) -> bool {
        match (self.leader(), self.node_idx) {
            (Some(leader), Some(idx)) => leader == idx,
            _ => false,
        }
    }

    /// Remember the highest view seen from `idx`.
    pub fn update_view_map(&mut self, idx: u64, view: u64) {
        let entry = self.view_map.entry(idx).or_insert(view);
        if *entry < view {
            *entry = view;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::NodeId;

    fn validators(n: u8) -> ValidatorSet {
        ValidatorSet::new((0..n).map(|i| NodeId([i + 1; 33])))
    }

    #[test]
    fn test_leader_follows_head_and_view() {
        let mut state = RoundState::new(ChainHead::new(5, [0u8; 32]));
        assert_eq!(state.consensus_height, 6);
        assert_eq!(state.leader(), None);

        state.validators = validators(4);
        state.node_idx = Some(1);
        assert_eq!(state.leader(), Some(1));
        assert!(state.is_leader());
        assert_eq!(state.next_leader(), Some(2));

        state.view = 2;
        assert_eq!(state.leader(), Some(3));
        assert!(!state.is_leader());

        state.leader_failed = true;
        assert_eq!(state.leader(), None);
    }

    #[test]
    fn test_view_map_keeps_highest() {
        let mut state = RoundState::new(ChainHead::new(0, [0u8; 32]));
        state.update_view_map(2, 3);
        state.update_view_map(2, 1);
        state.update_view_map(2, 4);
        assert_eq!(state.view_map.get(&2), Some(&4));
    }
}
