//! Stateless round checks shared by the request handlers.

use crate::domain::PbftMsg;
use crate::state::RoundState;

/// Pure predicates over a message's `(height, view)` relative to the round.
pub struct RoundValidator;

impl RoundValidator {
    /// The message belongs to a round this node already finished.
    pub fn has_consensused(msg: &PbftMsg, state: &RoundState) -> bool {
        msg.height < state.consensus_height
            || (msg.height == state.consensus_height && msg.view < state.view)
    }

    /// A prepare for a later height, or a later view of the current one.
    pub fn is_future_prepare(msg: &PbftMsg, state: &RoundState) -> bool {
        msg.height > state.consensus_height
            || (msg.height == state.consensus_height && msg.view > state.view)
    }

    /// A vote that may belong to a prepare this node has not seen yet.
    pub fn is_future_block(msg: &PbftMsg, state: &RoundState) -> bool {
        msg.height >= state.consensus_height || msg.view > state.view
    }

    /// Prepare was signed by the leader of the current round.
    pub fn is_valid_leader(msg: &PbftMsg, state: &RoundState) -> bool {
        state.leader() == Some(msg.idx)
    }

    /// Both signatures verify against the validator at `msg.idx`.
    pub fn check_sign(msg: &PbftMsg, state: &RoundState) -> bool {
        state
            .validators
            .get(msg.idx)
            .map_or(false, |signer| msg.verify(signer))
    }

    /// Worth relaying: ahead of the chain head or at most `window` behind.
    pub fn within_forward_window(msg: &PbftMsg, state: &RoundState, window: u64) -> bool {
        msg.height > state.highest.number || state.highest.number - msg.height < window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainHead, ValidatorSet};
    use shared_crypto::Secp256k1KeyPair;

    fn msg(height: u64, view: u64) -> PbftMsg {
        PbftMsg {
            height,
            view,
            idx: 0,
            timestamp: 0,
            block_hash: [0u8; 32],
            sig: [0u8; 64],
            sig2: [0u8; 64],
        }
    }

    fn state(consensus_height: u64, view: u64) -> RoundState {
        let mut state = RoundState::new(ChainHead::new(consensus_height - 1, [0u8; 32]));
        state.view = view;
        state
    }

    #[test]
    fn test_round_position() {
        let state = state(10, 2);
        assert!(RoundValidator::has_consensused(&msg(9, 5), &state));
        assert!(RoundValidator::has_consensused(&msg(10, 1), &state));
        assert!(!RoundValidator::has_consensused(&msg(10, 2), &state));

        assert!(RoundValidator::is_future_prepare(&msg(11, 0), &state));
        assert!(RoundValidator::is_future_prepare(&msg(10, 3), &state));
        assert!(!RoundValidator::is_future_prepare(&msg(10, 2), &state));

        assert!(RoundValidator::is_future_block(&msg(10, 2), &state));
        assert!(RoundValidator::is_future_block(&msg(9, 3), &state));
        assert!(!RoundValidator::is_future_block(&msg(9, 2), &state));
    }

    #[test]
    fn test_check_sign_uses_validator_at_idx() {
        let keys: Vec<_> = (1..=3u8)
            .map(|i| Secp256k1KeyPair::from_bytes([i; 32]).unwrap())
            .collect();
        let mut state = state(1, 0);
        state.validators = ValidatorSet::new(keys.iter().map(|k| k.node_id()));
        state.node_idx = Some(0);

        let good = PbftMsg::new_signed(&keys[1], 1, 0, 1, 5, [1u8; 32]);
        assert!(RoundValidator::check_sign(&good, &state));

        let mut wrong_idx = good.clone();
        wrong_idx.idx = 2;
        assert!(!RoundValidator::check_sign(&wrong_idx, &state));

        let mut unknown = good;
        unknown.idx = 9;
        assert!(!RoundValidator::check_sign(&unknown, &state));
    }

    #[test]
    fn test_forward_window() {
        let state = state(101, 0);
        assert!(RoundValidator::within_forward_window(&msg(200, 0), &state, 10));
        assert!(RoundValidator::within_forward_window(&msg(91, 0), &state, 10));
        assert!(!RoundValidator::within_forward_window(&msg(90, 0), &state, 10));
    }
}
