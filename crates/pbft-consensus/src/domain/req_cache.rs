//! Request cache
//!
//! The single source of truth for which requests this node has seen and
//! whether a quorum exists. Owned exclusively by the engine.
//!
//! ## Slots and tallies
//!
//! | Store | Key | Insert rule |
//! |---|---|---|
//! | raw prepare | single slot | replace, clears the working slot |
//! | working prepare | single slot | replace, purges stale-view votes |
//! | committed prepare | single slot | copy of the raw prepare at commit quorum |
//! | sign / commit votes | `block_hash -> idx` | one per signer, a newer view replaces |
//! | early sign / commit votes | same maps | at most one per signer outside the working prepare |
//! | view-change votes | `view -> idx` | latest wins |
//! | future prepares | `height` | insert if absent, bounded |

use super::{Block, ChainHead, CommitReq, PbftMsg, PrepareReq, SignReq, ViewChangeReq};
use shared_types::{Hash, Signature};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub struct ReqCache {
    raw_prepare: Option<PrepareReq>,
    prepare: Option<PrepareReq>,
    committed_prepare: Option<PrepareReq>,
    sign_cache: HashMap<Hash, HashMap<u64, SignReq>>,
    commit_cache: HashMap<Hash, HashMap<u64, CommitReq>>,
    view_change_cache: BTreeMap<u64, HashMap<u64, ViewChangeReq>>,
    future_prepare_cache: BTreeMap<u64, PrepareReq>,
    future_capacity: usize,
}

/// Whether a cached entry at `height` with `hash` is behind `head`, or sits
/// on a fork of it.
fn is_stale(height: u64, hash: &Hash, head: &ChainHead) -> bool {
    height < head.number || (height == head.number && *hash != head.hash)
}

/// Record `req` under its block hash and signer. A signer holds one vote per
/// hash; a vote from a different view replaces it.
fn insert_vote<T: AsRef<PbftMsg>>(votes: &mut HashMap<Hash, HashMap<u64, T>>, req: T) {
    let msg = req.as_ref();
    let (hash, idx, view) = (msg.block_hash, msg.idx, msg.view);
    let by_signer = votes.entry(hash).or_default();
    let same_view = by_signer
        .get(&idx)
        .map_or(false, |cached| cached.as_ref().view == view);
    if !same_view {
        by_signer.insert(idx, req);
    }
}

fn has_vote<T: AsRef<PbftMsg>>(votes: &HashMap<Hash, HashMap<u64, T>>, msg: &PbftMsg) -> bool {
    votes
        .get(&msg.block_hash)
        .and_then(|by_signer| by_signer.get(&msg.idx))
        .map_or(false, |cached| cached.as_ref().view == msg.view)
}

/// Drop every vote by `idx` except those for `keep`.
fn evict_signer<T>(votes: &mut HashMap<Hash, HashMap<u64, T>>, idx: u64, keep: Option<&Hash>) {
    for (hash, by_signer) in votes.iter_mut() {
        if Some(hash) != keep {
            by_signer.remove(&idx);
        }
    }
    votes.retain(|_, by_signer| !by_signer.is_empty());
}

impl ReqCache {
    pub fn new(future_capacity: usize) -> Self {
        Self {
            raw_prepare: None,
            prepare: None,
            committed_prepare: None,
            sign_cache: HashMap::new(),
            commit_cache: HashMap::new(),
            view_change_cache: BTreeMap::new(),
            future_prepare_cache: BTreeMap::new(),
            future_capacity,
        }
    }

    // === PREPARE SLOTS ===

    pub fn add_raw_prepare(&mut self, req: PrepareReq) {
        self.raw_prepare = Some(req);
        self.prepare = None;
    }

    /// Set the working prepare. Votes already cached for its hash under a
    /// different view are dropped.
    pub fn add_prepare_req(&mut self, req: PrepareReq) {
        let hash = req.msg.block_hash;
        let view = req.msg.view;
        if let Some(votes) = self.sign_cache.get_mut(&hash) {
            votes.retain(|_, vote| vote.msg.view == view);
        }
        if let Some(votes) = self.commit_cache.get_mut(&hash) {
            votes.retain(|_, vote| vote.msg.view == view);
        }
        self.prepare = Some(req);
    }

    pub fn raw_prepare(&self) -> Option<&PrepareReq> {
        self.raw_prepare.as_ref()
    }

    pub fn prepare(&self) -> Option<&PrepareReq> {
        self.prepare.as_ref()
    }

    pub fn committed_prepare(&self) -> Option<&PrepareReq> {
        self.committed_prepare.as_ref()
    }

    /// Height of the raw prepare, if any.
    pub fn raw_prepare_height(&self) -> Option<u64> {
        self.raw_prepare.as_ref().map(|req| req.msg.height)
    }

    pub fn committed_prepare_height(&self) -> Option<u64> {
        self.committed_prepare.as_ref().map(|req| req.msg.height)
    }

    /// Promote the raw prepare to the committed slot.
    pub fn update_committed_prepare(&mut self) {
        if let Some(raw) = &self.raw_prepare {
            self.committed_prepare = Some(raw.clone());
        }
    }

    /// Restore the committed slot from the backup store.
    pub fn set_committed_prepare(&mut self, req: PrepareReq) {
        self.committed_prepare = Some(req);
    }

    pub fn is_exist_prepare(&self, req: &PrepareReq) -> bool {
        self.raw_prepare
            .as_ref()
            .map_or(false, |raw| raw.msg.block_hash == req.msg.block_hash)
    }

    // === VOTES ===

    pub fn add_sign_req(&mut self, req: SignReq) {
        insert_vote(&mut self.sign_cache, req);
    }

    pub fn add_commit_req(&mut self, req: CommitReq) {
        insert_vote(&mut self.commit_cache, req);
    }

    /// Cache a sign vote for a block this node has not executed yet. The
    /// signer's earlier votes outside the working prepare are dropped.
    pub fn add_future_sign_req(&mut self, req: SignReq) {
        let keep = self.prepare.as_ref().map(|p| p.msg.block_hash);
        evict_signer(&mut self.sign_cache, req.msg.idx, keep.as_ref());
        self.add_sign_req(req);
    }

    /// Commit counterpart of [`add_future_sign_req`](Self::add_future_sign_req).
    pub fn add_future_commit_req(&mut self, req: CommitReq) {
        let keep = self.prepare.as_ref().map(|p| p.msg.block_hash);
        evict_signer(&mut self.commit_cache, req.msg.idx, keep.as_ref());
        self.add_commit_req(req);
    }

    /// Whether the signer of `req` already voted for its hash in its view.
    pub fn is_exist_sign(&self, req: &SignReq) -> bool {
        has_vote(&self.sign_cache, &req.msg)
    }

    pub fn is_exist_commit(&self, req: &CommitReq) -> bool {
        has_vote(&self.commit_cache, &req.msg)
    }

    pub fn sign_cache_size(&self, hash: &Hash) -> usize {
        self.sign_cache.get(hash).map_or(0, HashMap::len)
    }

    pub fn commit_cache_size(&self, hash: &Hash) -> usize {
        self.commit_cache.get(hash).map_or(0, HashMap::len)
    }

    /// Attach the commit signatures for the working prepare to `block`.
    ///
    /// Fails if there is no working prepare or fewer than `min_valid`
    /// distinct signers committed to it.
    pub fn generate_and_set_sig_list(&self, block: &mut Block, min_valid: usize) -> bool {
        let Some(prepare) = &self.prepare else {
            return false;
        };
        let Some(votes) = self.commit_cache.get(&prepare.msg.block_hash) else {
            return false;
        };
        let mut sig_list: Vec<(u64, Signature)> = votes
            .iter()
            .map(|(&idx, vote)| (idx, vote.msg.sig))
            .collect();
        sig_list.sort_by_key(|(idx, _)| *idx);
        if sig_list.len() < min_valid {
            return false;
        }
        block.sig_list = sig_list;
        true
    }

    // === VIEW CHANGE ===

    pub fn add_view_change_req(&mut self, req: ViewChangeReq) {
        self.view_change_cache
            .entry(req.msg.view)
            .or_default()
            .insert(req.msg.idx, req);
    }

    pub fn is_exist_view_change(&self, req: &ViewChangeReq) -> bool {
        self.view_change_cache
            .get(&req.msg.view)
            .and_then(|votes| votes.get(&req.msg.idx))
            .map_or(false, |cached| cached.msg.sig == req.msg.sig)
    }

    pub fn view_change_size(&self, view: u64) -> usize {
        self.view_change_cache.get(&view).map_or(0, HashMap::len)
    }

    /// Whether enough validators already voted beyond `to_view` to justify
    /// jumping ahead. Returns the lowest such view.
    ///
    /// Each validator counts once, with its lowest qualifying view. Votes
    /// below the chain head are ignored. The jump is refused when the lowest
    /// voted height is both the consensus height and the height of the
    /// committed prepare.
    pub fn can_trigger_view_change(
        &self,
        max_invalid: usize,
        to_view: u64,
        head: &ChainHead,
        consensus_height: u64,
    ) -> Option<u64> {
        let mut lowest_view: HashMap<u64, u64> = HashMap::new();
        let mut min_height = u64::MAX;
        let mut min_view = u64::MAX;
        for (&view, votes) in self.view_change_cache.range(to_view.saturating_add(1)..) {
            for (&idx, vote) in votes {
                if vote.msg.height < head.number {
                    continue;
                }
                if lowest_view.contains_key(&idx) {
                    continue;
                }
                lowest_view.insert(idx, view);
                min_height = min_height.min(vote.msg.height);
                min_view = min_view.min(view);
            }
        }
        if lowest_view.len() <= max_invalid {
            return None;
        }
        if min_height == consensus_height && Some(min_height) == self.committed_prepare_height() {
            return None;
        }
        Some(min_view)
    }

    /// Drop votes for `view` that are stale relative to `head`.
    pub fn remove_invalid_view_change(&mut self, view: u64, head: &ChainHead) {
        if let Some(votes) = self.view_change_cache.get_mut(&view) {
            votes.retain(|_, vote| !is_stale(vote.msg.height, &vote.msg.block_hash, head));
            if votes.is_empty() {
                self.view_change_cache.remove(&view);
            }
        }
    }

    /// Drop stale votes for every view.
    pub fn del_invalid_view_change(&mut self, head: &ChainHead) {
        for votes in self.view_change_cache.values_mut() {
            votes.retain(|_, vote| !is_stale(vote.msg.height, &vote.msg.block_hash, head));
        }
        self.view_change_cache.retain(|_, votes| !votes.is_empty());
    }

    /// Full round reset on adopting `view`.
    pub fn trigger_view_change(&mut self, view: u64) {
        self.raw_prepare = None;
        self.prepare = None;
        self.sign_cache.clear();
        self.commit_cache.clear();
        self.future_prepare_cache.clear();
        self.view_change_cache = self.view_change_cache.split_off(&view.saturating_add(1));
    }

    // === FUTURE PREPARES ===

    /// Buffer a prepare for a round not reached yet. Returns false when the
    /// height is already buffered or the cache is full.
    pub fn add_future_prepare_cache(&mut self, req: PrepareReq) -> bool {
        let height = req.msg.height;
        if self.future_prepare_cache.contains_key(&height)
            || self.future_prepare_cache.len() >= self.future_capacity
        {
            return false;
        }
        self.future_prepare_cache.insert(height, req);
        true
    }

    pub fn future_prepare(&self, height: u64) -> Option<&PrepareReq> {
        self.future_prepare_cache.get(&height)
    }

    pub fn erase_handled_future_req(&mut self, height: u64) {
        self.future_prepare_cache.remove(&height);
    }

    pub fn future_prepare_len(&self) -> usize {
        self.future_prepare_cache.len()
    }

    pub fn remove_invalid_future_cache(&mut self, highest: u64) {
        self.future_prepare_cache = self
            .future_prepare_cache
            .split_off(&highest.saturating_add(1));
    }

    // === HOUSEKEEPING ===

    /// Drop votes behind `head` or on a fork of it.
    pub fn collect_garbage(&mut self, head: &ChainHead) {
        for votes in self.sign_cache.values_mut() {
            votes.retain(|_, vote| !is_stale(vote.msg.height, &vote.msg.block_hash, head));
        }
        self.sign_cache.retain(|_, votes| !votes.is_empty());
        for votes in self.commit_cache.values_mut() {
            votes.retain(|_, vote| !is_stale(vote.msg.height, &vote.msg.block_hash, head));
        }
        self.commit_cache.retain(|_, votes| !votes.is_empty());
    }

    /// Forget everything about the block `head` just appended.
    pub fn del_cache(&mut self, head: &ChainHead) {
        self.sign_cache.remove(&head.hash);
        self.commit_cache.remove(&head.hash);
        if self
            .prepare
            .as_ref()
            .map_or(false, |req| req.msg.block_hash == head.hash)
        {
            self.prepare = None;
        }
        if self.raw_prepare_height().map_or(false, |h| h <= head.number) {
            self.raw_prepare = None;
        }
        self.remove_invalid_future_cache(head.number);
    }

    /// Reset on validator set change. Commit votes and the committed
    /// prepare survive.
    pub fn clear_all_except_commit_cache(&mut self) {
        self.raw_prepare = None;
        self.prepare = None;
        self.sign_cache.clear();
        self.view_change_cache.clear();
        self.future_prepare_cache.clear();
    }

    pub fn sign_cache_len(&self) -> usize {
        self.sign_cache.values().map(HashMap::len).sum()
    }

    pub fn commit_cache_len(&self) -> usize {
        self.commit_cache.values().map(HashMap::len).sum()
    }

    pub fn view_change_cache_len(&self) -> usize {
        self.view_change_cache.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{genesis_block, Transaction};
    use shared_crypto::Secp256k1KeyPair;

    fn key(seed: u8) -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_bytes([seed.max(1); 32]).unwrap()
    }

    fn block(number: u64) -> Block {
        Block::new(
            number,
            genesis_block().hash(),
            0,
            number * 10,
            vec![Transaction::new(number, vec![1, 2])],
        )
    }

    fn prepare(number: u64, view: u64) -> PrepareReq {
        PrepareReq::new(&key(1), &block(number), view, 0, 100).unwrap()
    }

    fn sign(prepare: &PrepareReq, seed: u8) -> SignReq {
        SignReq::new(prepare, &key(seed), seed as u64, 200)
    }

    fn commit(prepare: &PrepareReq, seed: u8) -> CommitReq {
        CommitReq::new(prepare, &key(seed), seed as u64, 300)
    }

    fn view_change(seed: u8, height: u64, view: u64, hash: Hash) -> ViewChangeReq {
        ViewChangeReq::new(&key(seed), height, view, seed as u64, 400, hash)
    }

    #[test]
    fn test_add_raw_prepare_clears_working_slot() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        cache.add_prepare_req(req.clone());
        cache.add_raw_prepare(req.clone());
        assert!(cache.is_exist_prepare(&req));
        assert!(cache.prepare().is_none());
        assert_eq!(cache.raw_prepare_height(), Some(1));
    }

    #[test]
    fn test_vote_insert_is_idempotent() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        let vote = sign(&req, 2);
        cache.add_sign_req(vote.clone());
        cache.add_sign_req(vote.clone());
        assert_eq!(cache.sign_cache_size(&req.msg.block_hash), 1);

        let vote = commit(&req, 2);
        cache.add_commit_req(vote.clone());
        cache.add_commit_req(vote.clone());
        assert_eq!(cache.commit_cache_size(&req.msg.block_hash), 1);
        assert!(cache.is_exist_commit(&vote));
    }

    #[test]
    fn test_votes_tally_by_signer() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        let vote = sign(&req, 2);
        let mut twin = vote.clone();
        twin.msg.sig[0] ^= 1;
        cache.add_sign_req(vote);
        assert!(cache.is_exist_sign(&twin));
        cache.add_sign_req(twin);
        assert_eq!(cache.sign_cache_size(&req.msg.block_hash), 1);

        // A vote from a newer view replaces the signer's old one
        let mut next_view = sign(&req, 2);
        next_view.msg.view = 1;
        assert!(!cache.is_exist_sign(&next_view));
        cache.add_sign_req(next_view.clone());
        assert!(cache.is_exist_sign(&next_view));
        assert_eq!(cache.sign_cache_size(&req.msg.block_hash), 1);
    }

    #[test]
    fn test_future_votes_keep_one_per_signer() {
        let mut cache = ReqCache::new(20);
        let working = prepare(1, 0);
        cache.add_prepare_req(working.clone());
        cache.add_sign_req(sign(&working, 2));
        cache.add_commit_req(commit(&working, 2));

        let later: Vec<PrepareReq> = (2..6).map(|height| prepare(height, 0)).collect();
        for req in &later {
            cache.add_future_sign_req(sign(req, 2));
            cache.add_future_commit_req(commit(req, 2));
        }
        cache.add_future_sign_req(sign(&later[0], 3));

        assert_eq!(cache.sign_cache_size(&working.msg.block_hash), 1);
        assert_eq!(cache.commit_cache_size(&working.msg.block_hash), 1);
        assert_eq!(cache.sign_cache_size(&later[3].msg.block_hash), 1);
        assert_eq!(cache.sign_cache_size(&later[0].msg.block_hash), 1);
        assert_eq!(cache.sign_cache_len(), 3);
        assert_eq!(cache.commit_cache_len(), 2);
    }

    #[test]
    fn test_add_prepare_purges_other_view_votes() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);

        let mut stale_sign = sign(&req, 2);
        stale_sign.msg.view = 1;
        let mut stale_commit = commit(&req, 2);
        stale_commit.msg.view = 1;
        let fresh_sign = sign(&req, 3);
        cache.add_sign_req(stale_sign.clone());
        cache.add_sign_req(fresh_sign.clone());
        cache.add_commit_req(stale_commit.clone());

        cache.add_prepare_req(req.clone());
        assert!(!cache.is_exist_sign(&stale_sign));
        assert!(!cache.is_exist_commit(&stale_commit));
        assert!(cache.is_exist_sign(&fresh_sign));
        assert_eq!(cache.sign_cache_size(&req.msg.block_hash), 1);
        assert_eq!(cache.commit_cache_size(&req.msg.block_hash), 0);
    }

    #[test]
    fn test_future_cache_is_bounded_and_pruned() {
        let mut cache = ReqCache::new(10);
        for height in 0..12 {
            cache.add_future_prepare_cache(prepare(height, 0));
        }
        assert_eq!(cache.future_prepare_len(), 10);
        assert!(!cache.add_future_prepare_cache(prepare(3, 1)));
        assert_eq!(cache.future_prepare(3).unwrap().msg.view, 0);

        cache.remove_invalid_future_cache(8);
        assert_eq!(cache.future_prepare_len(), 1);
        assert!(cache.future_prepare(9).is_some());

        cache.erase_handled_future_req(9);
        assert_eq!(cache.future_prepare_len(), 0);
    }

    #[test]
    fn test_sig_list_requires_working_prepare_and_quorum() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        for seed in 2..5 {
            cache.add_commit_req(commit(&req, seed));
        }
        let mut target = block(1);
        assert!(!cache.generate_and_set_sig_list(&mut target, 3));

        cache.add_prepare_req(req.clone());
        assert!(!cache.generate_and_set_sig_list(&mut target, 4));
        assert!(cache.generate_and_set_sig_list(&mut target, 3));
        assert_eq!(
            target.sig_list.iter().map(|(idx, _)| *idx).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
        for (idx, sig) in &target.sig_list {
            let signer = key(*idx as u8).node_id();
            assert!(shared_crypto::verify_signature(&signer, &req.msg.block_hash, sig));
        }
    }

    #[test]
    fn test_collect_garbage_and_del_cache() {
        let mut cache = ReqCache::new(20);
        let head_prepare = prepare(100, 0);
        let head = ChainHead::new(100, head_prepare.msg.block_hash);
        let old = prepare(99, 0);
        let fork = prepare(100, 1);
        let mut fork_sign = sign(&fork, 2);
        fork_sign.msg.block_hash = [9u8; 32];

        for seed in 2..5 {
            cache.add_sign_req(sign(&head_prepare, seed));
            cache.add_commit_req(commit(&head_prepare, seed));
            cache.add_sign_req(sign(&old, seed));
            cache.add_commit_req(commit(&old, seed));
        }
        cache.add_sign_req(fork_sign);

        cache.collect_garbage(&head);
        assert_eq!(cache.sign_cache_size(&head.hash), 3);
        assert_eq!(cache.commit_cache_size(&head.hash), 3);
        assert_eq!(cache.sign_cache_size(&old.msg.block_hash), 0);
        assert_eq!(cache.sign_cache_size(&[9u8; 32]), 0);

        cache.del_cache(&head);
        assert_eq!(cache.sign_cache_size(&head.hash), 0);
        assert_eq!(cache.commit_cache_size(&head.hash), 0);
    }

    #[test]
    fn test_collect_garbage_keeps_committed_prepare() {
        let mut cache = ReqCache::new(20);
        let req = prepare(5, 0);
        cache.add_raw_prepare(req.clone());
        cache.update_committed_prepare();

        cache.collect_garbage(&ChainHead::new(4, [1u8; 32]));
        assert_eq!(cache.committed_prepare(), Some(&req));
        cache.collect_garbage(&ChainHead::new(5, [2u8; 32]));
        assert_eq!(cache.committed_prepare(), Some(&req));
    }

    #[test]
    fn test_can_trigger_view_change() {
        let mut cache = ReqCache::new(20);
        let req = prepare(10, 2);
        cache.add_raw_prepare(req.clone());
        cache.update_committed_prepare();

        let head = ChainHead::new(10, req.msg.block_hash);
        let hash = req.msg.block_hash;
        cache.add_view_change_req(view_change(1, 11, 2, hash));
        cache.add_view_change_req(view_change(2, 11, 3, hash));
        cache.add_view_change_req(view_change(3, 11, 4, hash));
        // lower view from the same validator wins
        cache.add_view_change_req(view_change(3, 11, 5, hash));

        assert_eq!(cache.can_trigger_view_change(1, 2, &head, 10), Some(3));
        assert_eq!(cache.can_trigger_view_change(3, 2, &head, 10), None);
        // votes below the chain head do not count
        let ahead = ChainHead::new(12, hash);
        assert_eq!(cache.can_trigger_view_change(1, 2, &ahead, 13), None);
    }

    #[test]
    fn test_can_trigger_view_change_refuses_committed_height() {
        let mut cache = ReqCache::new(20);
        let req = prepare(11, 0);
        cache.add_raw_prepare(req.clone());
        cache.update_committed_prepare();
        let head = ChainHead::new(10, [1u8; 32]);
        cache.add_view_change_req(view_change(2, 11, 3, [1u8; 32]));
        cache.add_view_change_req(view_change(3, 11, 3, [1u8; 32]));

        assert_eq!(cache.can_trigger_view_change(1, 1, &head, 11), None);
        assert_eq!(cache.can_trigger_view_change(1, 1, &head, 12), Some(3));
    }

    #[test]
    fn test_view_change_latest_wins_and_pruning() {
        let mut cache = ReqCache::new(20);
        let head = ChainHead::new(101, [7u8; 32]);

        let first = view_change(1, 100, 1, [3u8; 32]);
        cache.add_view_change_req(first.clone());
        let replaced = view_change(1, 101, 1, [7u8; 32]);
        cache.add_view_change_req(replaced.clone());
        assert!(!cache.is_exist_view_change(&first));
        assert!(cache.is_exist_view_change(&replaced));

        cache.add_view_change_req(view_change(2, 101, 1, [8u8; 32]));
        cache.add_view_change_req(view_change(3, 102, 1, [0u8; 32]));
        assert_eq!(cache.view_change_size(1), 3);

        cache.remove_invalid_view_change(1, &head);
        assert_eq!(cache.view_change_size(1), 2);

        cache.add_view_change_req(view_change(4, 99, 2, [7u8; 32]));
        cache.del_invalid_view_change(&head);
        assert_eq!(cache.view_change_size(2), 0);
        assert_eq!(cache.view_change_size(1), 2);
    }

    #[test]
    fn test_trigger_view_change_resets_round() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        cache.add_raw_prepare(req.clone());
        cache.update_committed_prepare();
        cache.add_prepare_req(req.clone());
        cache.add_sign_req(sign(&req, 2));
        cache.add_commit_req(commit(&req, 2));
        cache.add_future_prepare_cache(prepare(3, 0));
        cache.add_view_change_req(view_change(2, 0, 1, [0u8; 32]));
        cache.add_view_change_req(view_change(3, 0, 2, [0u8; 32]));

        cache.trigger_view_change(1);
        assert!(cache.raw_prepare().is_none());
        assert!(cache.prepare().is_none());
        assert_eq!(cache.sign_cache_len(), 0);
        assert_eq!(cache.commit_cache_len(), 0);
        assert_eq!(cache.future_prepare_len(), 0);
        assert_eq!(cache.view_change_size(1), 0);
        assert_eq!(cache.view_change_size(2), 1);
        assert_eq!(cache.committed_prepare(), Some(&req));
    }

    #[test]
    fn test_clear_all_except_commit_cache() {
        let mut cache = ReqCache::new(20);
        let req = prepare(1, 0);
        cache.add_raw_prepare(req.clone());
        cache.add_sign_req(sign(&req, 2));
        cache.add_commit_req(commit(&req, 2));
        cache.add_view_change_req(view_change(2, 0, 1, [0u8; 32]));

        cache.clear_all_except_commit_cache();
        assert!(cache.raw_prepare().is_none());
        assert_eq!(cache.sign_cache_len(), 0);
        assert_eq!(cache.view_change_cache_len(), 0);
        assert_eq!(cache.commit_cache_len(), 1);
    }
}
