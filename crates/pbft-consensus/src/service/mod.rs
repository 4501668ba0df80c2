//! Consensus Service - PBFT engine facade
//!
//! # Architecture
//! - One lock around the whole round state; every entry point takes it once
//! - Events queued under the lock, dispatched to hooks after release
//! - Collaborators injected as trait objects through [`PbftDependencies`]
//!
//! # Round flow
//! 1. Leader seals a block and broadcasts a prepare
//! 2. Every validator executes it and broadcasts a sign vote
//! 3. `min_valid_nodes` signs: persist the committed prepare, vote commit
//! 4. `min_valid_nodes` commits: append the block, advance the height
//!
//! A round that does not finish in time triggers a view change, which
//! rotates the leader.

mod engine;

use self::engine::EngineCore;
use crate::domain::{
    Block, ChainHead, CheckResult, ConsensusResult, PbftConfig, PbftMsgPacket, PrepareReq,
};
use crate::events::Hooks;
use crate::ports::{
    BackupStore, Executor, Ledger, SystemTimeSource, TimeSource, Transport, TxPool,
    ValidatorSetProvider,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{Hash, NodeId};
use std::collections::HashSet;
use std::sync::Arc;

/// Dependencies for PbftEngine
pub struct PbftDependencies {
    pub executor: Arc<dyn Executor>,
    pub ledger: Arc<dyn Ledger>,
    pub tx_pool: Arc<dyn TxPool>,
    pub transport: Arc<dyn Transport>,
    pub backup: Arc<dyn BackupStore>,
    pub validator_provider: Arc<dyn ValidatorSetProvider>,
    pub config: PbftConfig,
}

/// Short description of a cached prepare
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedSummary {
    pub height: u64,
    pub view: u64,
    pub idx: u64,
    #[serde_as(as = "Hex")]
    pub block_hash: Hash,
}

impl From<&PrepareReq> for PreparedSummary {
    fn from(req: &PrepareReq) -> Self {
        Self {
            height: req.msg.height,
            view: req.msg.view,
            idx: req.msg.idx,
            block_hash: req.msg.block_hash,
        }
    }
}

/// Last view seen from one validator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMapEntry {
    pub idx: u64,
    pub node_id: NodeId,
    pub view: u64,
}

/// Engine snapshot for operators
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub node_idx: Option<u64>,
    pub node_id: NodeId,
    /// Not a member of the validator set
    pub cfg_err: bool,
    pub consensus_height: u64,
    pub highest_height: u64,
    #[serde_as(as = "Hex")]
    pub highest_hash: Hash,
    pub view: u64,
    pub to_view: u64,
    pub leader: Option<u64>,
    pub leader_failed: bool,
    pub change_cycle: u64,
    pub max_faulty: usize,
    pub min_valid_nodes: usize,
    pub validators: Vec<NodeId>,
    pub connected_validators: usize,
    pub view_map: Vec<ViewMapEntry>,
    pub raw_prepare: Option<PreparedSummary>,
    pub prepare: Option<PreparedSummary>,
    pub committed_prepare: Option<PreparedSummary>,
    pub sign_cache_len: usize,
    pub commit_cache_len: usize,
    pub view_change_cache_len: usize,
    pub future_prepare_len: usize,
}

/// PBFT engine
///
/// Thread-safe; meant to be driven by a single
/// [`PbftWorker`](crate::worker::PbftWorker) plus the sealer.
pub struct PbftEngine {
    core: Mutex<EngineCore>,
    hooks: RwLock<Hooks>,
}

impl PbftEngine {
    /// Create an engine. Call [`start`](Self::start) before feeding it.
    pub fn new(deps: PbftDependencies, key: Secp256k1KeyPair) -> Self {
        Self {
            core: Mutex::new(EngineCore::new(deps, key, Arc::new(SystemTimeSource))),
            hooks: RwLock::new(Hooks::new()),
        }
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(self, time_source: Arc<dyn TimeSource>) -> Self {
        self.core.lock().set_time_source(time_source);
        self
    }

    /// Run `f` under the lock, then dispatch whatever events it queued.
    fn with_core<R>(&self, f: impl FnOnce(&mut EngineCore) -> R) -> R {
        let (result, events) = {
            let mut core = self.core.lock();
            let result = f(&mut core);
            (result, std::mem::take(&mut core.events))
        };
        if !events.is_empty() {
            let hooks = self.hooks.read().clone();
            for event in &events {
                hooks.dispatch(event);
            }
        }
        result
    }

    // === LIFECYCLE ===

    /// Load the validator set and chain head, then resume any prepare that
    /// reached commit quorum before the last shutdown.
    pub fn start(&self) -> ConsensusResult<()> {
        self.with_core(|core| core.start())
    }

    // === SEALER API ===

    pub fn should_seal(&self) -> ConsensusResult<bool> {
        self.with_core(|core| core.should_seal())
    }

    /// Propose a locally sealed block. Returns false if this node does not
    /// lead the round or the block is for another height.
    pub fn generate_prepare(&self, block: Block) -> ConsensusResult<bool> {
        self.with_core(|core| core.generate_prepare(block))
    }

    pub fn max_packable_tx_count(&self) -> u64 {
        self.with_core(|core| core.max_packable_tx_count())
    }

    // === WORKER API ===

    /// Handle one packet received from `peer`.
    ///
    /// Peer misbehavior is absorbed into the returned [`CheckResult`]; an
    /// `Err` means local trouble, fatal if [`is_fatal`](crate::domain::ConsensusError::is_fatal).
    pub fn handle_packet(
        &self,
        peer: &NodeId,
        packet: PbftMsgPacket,
    ) -> ConsensusResult<CheckResult> {
        self.with_core(|core| core.handle_packet(peer, packet))
    }

    pub fn check_timeout(&self) -> ConsensusResult<()> {
        self.with_core(|core| core.check_timeout())
    }

    pub fn handle_future_block(&self) -> ConsensusResult<()> {
        self.with_core(|core| core.handle_future_block())
    }

    pub fn collect_garbage(&self) {
        self.with_core(|core| core.collect_garbage())
    }

    // === HOOKS ===

    pub fn on_view_change(&self, f: impl Fn() + Send + Sync + 'static) {
        self.hooks.write().on_view_change(f);
    }

    /// `f(height, tx_count, change_cycle)`
    pub fn on_commit(&self, f: impl Fn(u64, usize, u64) + Send + Sync + 'static) {
        self.hooks.write().on_commit(f);
    }

    /// `f(pending_tx_count)`
    pub fn on_timeout(&self, f: impl Fn(usize) + Send + Sync + 'static) {
        self.hooks.write().on_timeout(f);
    }

    pub fn on_notify_next_leader_reset(
        &self,
        f: impl Fn(&HashSet<Hash>) + Send + Sync + 'static,
    ) {
        self.hooks.write().on_notify_next_leader_reset(f);
    }

    // === ACCESSORS ===

    pub fn consensus_status(&self) -> ConsensusStatus {
        self.core.lock().status()
    }

    pub fn node_id(&self) -> NodeId {
        self.core.lock().node_id()
    }

    pub fn node_idx(&self) -> Option<u64> {
        self.core.lock().state.node_idx
    }

    pub fn view(&self) -> u64 {
        self.core.lock().state.view
    }

    pub fn to_view(&self) -> u64 {
        self.core.lock().state.to_view
    }

    pub fn consensus_height(&self) -> u64 {
        self.core.lock().state.consensus_height
    }

    pub fn highest(&self) -> ChainHead {
        self.core.lock().state.highest
    }

    pub fn leader_failed(&self) -> bool {
        self.core.lock().state.leader_failed
    }

    pub fn config(&self) -> PbftConfig {
        self.core.lock().config.clone()
    }
}

impl std::fmt::Debug for PbftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("PbftEngine")
            .field("node_idx", &core.state.node_idx)
            .field("view", &core.state.view)
            .field("consensus_height", &core.state.consensus_height)
            .finish()
    }
}
