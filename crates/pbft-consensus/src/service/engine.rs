//! Round state machine
//!
//! Everything here runs under the engine lock. Collaborators are called
//! synchronously; events are queued in `events` and dispatched by the
//! caller after the lock is released.

use super::{ConsensusStatus, PbftDependencies, PreparedSummary, ViewMapEntry};
use crate::domain::{
    BackupRecord, Block, BroadcastCache, ChainHead, CheckResult, CommitReq, ConsensusError,
    ConsensusResult, PacketKind, PbftConfig, PbftMsg, PbftMsgPacket, PbftRequest, PrepareReq,
    ReqCache, SignReq, TimeManager, ViewChangeReq, COMMITTED_PREPARE_KEY, RELAY_SENDER_IDX,
};
use crate::events::ConsensusEvent;
use crate::ports::{CommitResult, TimeSource};
use crate::state::RoundState;
use crate::validation::RoundValidator;
use shared_crypto::Secp256k1KeyPair;
use shared_types::{Hash, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Where a prepare entered the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PrepareOrigin {
    /// Received from a peer
    Network,
    /// Proposed by this node as leader
    Local,
    /// Re-proposed from the committed-prepare backup after a restart
    Recovery,
}

fn short(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

pub(crate) struct EngineCore {
    deps: PbftDependencies,
    time: Arc<dyn TimeSource>,
    key: Secp256k1KeyPair,
    node_id: NodeId,
    pub(crate) config: PbftConfig,
    pub(crate) state: RoundState,
    pub(crate) req_cache: ReqCache,
    pub(crate) broadcast_cache: BroadcastCache,
    pub(crate) time_manager: TimeManager,
    pub(crate) events: Vec<ConsensusEvent>,
    /// `(height, view, hash)` of the working prepare we last voted commit on
    commit_voted: Option<(u64, u64, Hash)>,
    last_gc_time: u64,
}

impl EngineCore {
    pub(crate) fn new(
        deps: PbftDependencies,
        key: Secp256k1KeyPair,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let config = deps.config.clone();
        let head = deps.ledger.head();
        Self {
            node_id: key.node_id(),
            key,
            time,
            state: RoundState::new(head),
            req_cache: ReqCache::new(config.future_cache_capacity),
            broadcast_cache: BroadcastCache::new(config.broadcast_cache_capacity),
            time_manager: TimeManager::new(config.view_timeout_ms, config.max_change_cycle),
            events: Vec::new(),
            commit_voted: None,
            last_gc_time: 0,
            config,
            deps,
        }
    }

    pub(crate) fn set_time_source(&mut self, time: Arc<dyn TimeSource>) {
        self.time = time;
    }

    fn now(&self) -> u64 {
        self.time.now_ms()
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.node_id
    }

    // === LIFECYCLE ===

    pub(crate) fn start(&mut self) -> ConsensusResult<()> {
        let head = self.deps.ledger.head();
        self.state.consensus_height = head.number + 1;
        self.state.highest = head;
        self.reset_config();
        let now = self.now();
        self.time_manager.init(now);
        self.last_gc_time = now;
        self.reload_committed_prepare();

        info!(
            height = self.state.highest.number,
            hash = %short(&self.state.highest.hash),
            idx = ?self.state.node_idx,
            validators = self.state.validators.len(),
            "PBFT engine started"
        );

        match self.req_cache.committed_prepare().cloned() {
            Some(committed) if committed.msg.height > self.state.highest.number => {
                self.rehandle_committed_prepare(committed, PrepareOrigin::Recovery)
            }
            _ => Ok(()),
        }
    }

    /// Reload the validator set. A changed set invalidates every cached
    /// vote except the commit tallies.
    fn reset_config(&mut self) {
        let validators = match self.deps.validator_provider.validator_set() {
            Ok(validators) => validators,
            Err(reason) => {
                warn!(%reason, "Validator set unavailable, keeping the current one");
                return;
            }
        };
        if validators == self.state.validators {
            return;
        }
        self.state.node_idx = validators.index_of(&self.node_id);
        self.state.validators = validators;
        self.req_cache.clear_all_except_commit_cache();
        self.broadcast_cache.clear_all();
        match self.state.node_idx {
            Some(idx) => info!(
                idx,
                validators = self.state.validators.len(),
                "Validator set loaded"
            ),
            None => warn!(
                validators = self.state.validators.len(),
                "Node is not in the validator set, running as observer"
            ),
        }
    }

    fn reload_committed_prepare(&mut self) {
        let bytes = match self.deps.backup.get(COMMITTED_PREPARE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read committed prepare backup");
                return;
            }
        };
        let record = match BackupRecord::decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt committed prepare backup");
                return;
            }
        };
        if !record.is_supported() {
            warn!(
                schema_version = record.schema_version,
                "Ignoring committed prepare backup with unsupported schema"
            );
            return;
        }
        match record.prepare() {
            Ok(prepare) => {
                info!(
                    height = prepare.msg.height,
                    view = prepare.msg.view,
                    hash = %short(&prepare.msg.block_hash),
                    "Loaded committed prepare from backup"
                );
                self.req_cache.set_committed_prepare(prepare);
            }
            Err(e) => warn!(error = %e, "Ignoring undecodable committed prepare"),
        }
    }

    /// Re-propose a prepare that reached commit quorum but was never
    /// appended, signed for the current view.
    fn rehandle_committed_prepare(
        &mut self,
        committed: PrepareReq,
        origin: PrepareOrigin,
    ) -> ConsensusResult<()> {
        let Some(idx) = self.state.node_idx else {
            return Ok(());
        };
        let req = committed.resigned(&self.key, self.state.view, idx, self.now());
        info!(
            height = req.msg.height,
            view = req.msg.view,
            hash = %short(&req.msg.block_hash),
            "Re-proposing committed prepare"
        );
        self.broadcast_cache.clear_all();
        self.broadcast_request(&PbftRequest::Prepare(req.clone()), &HashSet::new())?;
        self.handle_prepare(req, origin).map(|_| ())
    }

    // === SEALING ===

    pub(crate) fn should_seal(&mut self) -> ConsensusResult<bool> {
        if self.state.cfg_err() {
            return Ok(false);
        }
        let Some(leader) = self.state.leader() else {
            return Ok(false);
        };
        if Some(leader) != self.state.node_idx {
            return Ok(self.state.notify_next_leader_seal
                && self.state.next_leader() == self.state.node_idx);
        }
        let consensus_height = self.state.consensus_height;
        if self.req_cache.committed_prepare_height() == Some(consensus_height) {
            if self.req_cache.raw_prepare_height() != Some(consensus_height) {
                if let Some(committed) = self.req_cache.committed_prepare().cloned() {
                    self.rehandle_committed_prepare(committed, PrepareOrigin::Local)?;
                }
            }
            return Ok(false);
        }
        Ok(true)
    }

    pub(crate) fn generate_prepare(&mut self, block: Block) -> ConsensusResult<bool> {
        let Some(idx) = self.state.node_idx else {
            return Ok(false);
        };
        if !self.state.is_leader() {
            return Ok(false);
        }
        if block.number() != self.state.consensus_height {
            debug!(
                height = block.number(),
                consensus_height = self.state.consensus_height,
                "Discarding sealed block for another height"
            );
            return Ok(false);
        }
        self.state.notify_next_leader_seal = false;

        let req = PrepareReq::new(&self.key, &block, self.state.view, idx, self.now())?;
        info!(
            height = req.msg.height,
            view = req.msg.view,
            idx,
            hash = %short(&req.msg.block_hash),
            tx_count = block.transactions.len(),
            "Proposing block"
        );
        self.broadcast_request(&PbftRequest::Prepare(req.clone()), &HashSet::new())?;

        if block.is_empty() && self.config.omit_empty_block {
            self.state.leader_failed = true;
            self.change_view_for_fast_view_change();
            self.time_manager.change_cycle = 0;
            return Ok(true);
        }
        self.handle_prepare(req, PrepareOrigin::Local)?;
        Ok(true)
    }

    pub(crate) fn max_packable_tx_count(&self) -> u64 {
        self.time_manager.max_packable_tx_count(
            self.config.default_max_tx_per_block,
            self.state.view,
            self.config.block_interval_ms,
            self.now(),
        )
    }

    // === INBOUND PACKETS ===

    /// Validate, apply and possibly relay one packet from `peer`.
    pub(crate) fn handle_packet(
        &mut self,
        peer: &NodeId,
        packet: PbftMsgPacket,
    ) -> ConsensusResult<CheckResult> {
        // Observers may relay; the request itself is still checked against
        // the validator at `msg.idx`
        let peer_idx = self.state.validators.index_of(peer);
        if peer_idx.is_none() && packet.sender_idx != RELAY_SENDER_IDX {
            trace!(peer = %peer, "Dropping packet from non-validator");
            return Ok(CheckResult::Invalid);
        }
        let request = match packet.request() {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Dropping malformed packet");
                crate::metrics::record_message_rejected(packet.kind.as_str());
                return Ok(CheckResult::Invalid);
            }
        };
        let msg = request.msg().clone();
        self.broadcast_cache
            .insert(peer, packet.kind, &msg.unique_key());

        let result = match request {
            PbftRequest::Prepare(req) => self.handle_prepare(req, PrepareOrigin::Network)?,
            PbftRequest::Sign(req) => self.handle_sign(req)?,
            PbftRequest::Commit(req) => self.handle_commit(req)?,
            PbftRequest::ViewChange(req) => self.handle_view_change(req, peer_idx)?,
        };

        if result == CheckResult::Invalid {
            crate::metrics::record_message_rejected(packet.kind.as_str());
        } else if packet.ttl > 1
            && RoundValidator::within_forward_window(
                &msg,
                &self.state,
                self.config.forward_height_window,
            )
        {
            let mut filter = HashSet::from([*peer]);
            if let Some(origin) = self.state.validators.get(msg.idx) {
                filter.insert(*origin);
            }
            trace!(
                kind = %packet.kind,
                height = msg.height,
                from_idx = ?peer_idx,
                ttl = packet.ttl,
                "Forwarding"
            );
            self.broadcast_payload(
                packet.kind,
                &msg.unique_key(),
                packet.payload,
                &filter,
                packet.ttl - 1,
            )?;
        }
        Ok(result)
    }

    // === PREPARE ===

    pub(crate) fn handle_prepare(
        &mut self,
        req: PrepareReq,
        origin: PrepareOrigin,
    ) -> ConsensusResult<CheckResult> {
        let block = match req.decode_block() {
            Ok(block) if block.number() == req.msg.height => block,
            Ok(_) => {
                debug!(height = req.msg.height, "Prepare block number mismatch");
                return Ok(CheckResult::Invalid);
            }
            Err(e) => {
                debug!(height = req.msg.height, error = %e, "Prepare carries undecodable block");
                return Ok(CheckResult::Invalid);
            }
        };

        let result = self.is_valid_prepare(&req, block.is_empty(), origin);
        if result == CheckResult::Invalid {
            return Ok(result);
        }
        self.state.update_view_map(req.msg.idx, req.msg.view);

        if result == CheckResult::Future {
            let (height, view, idx) = (req.msg.height, req.msg.view, req.msg.idx);
            if self.req_cache.add_future_prepare_cache(req) {
                info!(
                    height,
                    view,
                    idx,
                    consensus_height = self.state.consensus_height,
                    "Buffered future prepare"
                );
            }
            return Ok(result);
        }

        self.req_cache.add_raw_prepare(req.clone());
        self.exec_prepare(req, block)?;
        Ok(CheckResult::Valid)
    }

    fn is_valid_prepare(
        &self,
        req: &PrepareReq,
        is_empty: bool,
        origin: PrepareOrigin,
    ) -> CheckResult {
        let msg = &req.msg;
        if self.req_cache.is_exist_prepare(req) {
            trace!(height = msg.height, idx = msg.idx, "Duplicated prepare");
            return CheckResult::Invalid;
        }
        if origin == PrepareOrigin::Network && Some(msg.idx) == self.state.node_idx {
            trace!(height = msg.height, "Own prepare echoed back");
            return CheckResult::Invalid;
        }
        if RoundValidator::has_consensused(msg, &self.state) {
            trace!(
                height = msg.height,
                view = msg.view,
                consensus_height = self.state.consensus_height,
                "Prepare for a finished round"
            );
            return CheckResult::Invalid;
        }
        if !is_empty {
            if let Some(committed) = self.req_cache.committed_prepare() {
                if committed.msg.height == msg.height && committed.msg.block_hash != msg.block_hash
                {
                    debug!(
                        height = msg.height,
                        hash = %short(&msg.block_hash),
                        committed = %short(&committed.msg.block_hash),
                        "Prepare conflicts with committed prepare"
                    );
                    return CheckResult::Invalid;
                }
            }
        }
        if RoundValidator::is_future_prepare(msg, &self.state) {
            return CheckResult::Future;
        }
        if origin != PrepareOrigin::Recovery && !RoundValidator::is_valid_leader(msg, &self.state)
        {
            debug!(
                height = msg.height,
                view = msg.view,
                idx = msg.idx,
                leader = ?self.state.leader(),
                "Prepare not from the round leader"
            );
            return CheckResult::Invalid;
        }
        if !RoundValidator::check_sign(msg, &self.state) {
            warn!(height = msg.height, idx = msg.idx, "Prepare signature invalid");
            return CheckResult::Invalid;
        }
        CheckResult::Valid
    }

    fn exec_prepare(&mut self, raw: PrepareReq, block: Block) -> ConsensusResult<()> {
        if block.is_empty() && self.config.omit_empty_block {
            info!(
                height = raw.msg.height,
                view = raw.msg.view,
                "Empty proposal, fast view change"
            );
            self.change_view_for_fast_view_change();
            self.time_manager.change_cycle = 0;
            return Ok(());
        }
        if Some(raw.msg.idx) != self.state.node_idx {
            self.notify_sealing(&block);
        }

        let started = Instant::now();
        let exec = match self.deps.executor.execute(&block) {
            Ok(exec) => exec,
            Err(reason) => {
                let err = ConsensusError::Execution {
                    height: block.number(),
                    reason,
                };
                warn!(error = %err, "Abandoning prepare");
                return Ok(());
            }
        };
        let elapsed = started.elapsed();
        let now = self.now();
        self.time_manager.record_execution(
            block.transactions.len(),
            elapsed.as_micros() as u64,
            now,
        );
        crate::metrics::record_execution_latency(elapsed.as_secs_f64());

        let mut executed = block;
        executed.header.state_root = exec.state_root;
        let working = PrepareReq::from_executed(&raw, &self.key, &executed, Arc::new(exec), now)?;
        debug!(
            height = working.msg.height,
            view = working.msg.view,
            hash = %short(&working.msg.block_hash),
            elapsed_us = elapsed.as_micros() as u64,
            "Executed prepare"
        );
        self.req_cache.add_prepare_req(working.clone());

        if let Some(idx) = self.state.node_idx {
            let sign = SignReq::new(&working, &self.key, idx, now);
            self.req_cache.add_sign_req(sign.clone());
            self.broadcast_request(&PbftRequest::Sign(sign), &HashSet::new())?;
        }
        self.check_and_commit()
    }

    /// Ask the sealer to pre-build the next block when this node leads the
    /// next height.
    fn notify_sealing(&mut self, block: &Block) {
        let (Some(leader), Some(idx)) = (self.state.leader(), self.state.node_idx) else {
            return;
        };
        if leader == idx || self.state.next_leader() != Some(idx) {
            return;
        }
        self.state.notify_next_leader_seal = true;
        self.events.push(ConsensusEvent::NotifyNextLeaderReset {
            tx_filter: block.tx_hashes().into_iter().collect(),
        });
    }

    // === SIGN / COMMIT ===

    fn handle_sign(&mut self, req: SignReq) -> ConsensusResult<CheckResult> {
        let result = if self.req_cache.is_exist_sign(&req)
            || RoundValidator::has_consensused(&req.msg, &self.state)
        {
            CheckResult::Invalid
        } else {
            self.check_vote(&req.msg, "sign")
        };
        match result {
            CheckResult::Invalid => {}
            CheckResult::Future => self.req_cache.add_future_sign_req(req),
            CheckResult::Valid => {
                self.state.update_view_map(req.msg.idx, req.msg.view);
                self.req_cache.add_sign_req(req);
                self.check_and_commit()?;
            }
        }
        Ok(result)
    }

    fn handle_commit(&mut self, req: CommitReq) -> ConsensusResult<CheckResult> {
        let result = if self.req_cache.is_exist_commit(&req)
            || RoundValidator::has_consensused(&req.msg, &self.state)
        {
            CheckResult::Invalid
        } else {
            self.check_vote(&req.msg, "commit")
        };
        match result {
            CheckResult::Invalid => {}
            CheckResult::Future => self.req_cache.add_future_commit_req(req),
            CheckResult::Valid => {
                self.state.update_view_map(req.msg.idx, req.msg.view);
                self.req_cache.add_commit_req(req);
                self.check_and_save()?;
            }
        }
        Ok(result)
    }

    /// Checks shared by sign and commit votes.
    fn check_vote(&self, msg: &PbftMsg, what: &'static str) -> CheckResult {
        let prepare = match self.req_cache.prepare() {
            Some(prepare) if prepare.msg.block_hash == msg.block_hash => prepare,
            _ => {
                if RoundValidator::is_future_block(msg, &self.state)
                    && RoundValidator::check_sign(msg, &self.state)
                {
                    return CheckResult::Future;
                }
                trace!(what, height = msg.height, idx = msg.idx, "Vote for unknown block");
                return CheckResult::Invalid;
            }
        };
        if Some(msg.idx) == self.state.node_idx {
            return CheckResult::Invalid;
        }
        if prepare.msg.view != msg.view {
            trace!(
                what,
                view = msg.view,
                prepare_view = prepare.msg.view,
                idx = msg.idx,
                "Vote view mismatch"
            );
            return CheckResult::Invalid;
        }
        if !RoundValidator::check_sign(msg, &self.state) {
            warn!(what, height = msg.height, idx = msg.idx, "Vote signature invalid");
            return CheckResult::Invalid;
        }
        CheckResult::Valid
    }

    /// On the sign quorum: persist the committed prepare, then vote commit.
    /// Fires once per working prepare.
    fn check_and_commit(&mut self) -> ConsensusResult<()> {
        let Some(prepare) = self.req_cache.prepare().cloned() else {
            return Ok(());
        };
        let round = (prepare.msg.height, prepare.msg.view, prepare.msg.block_hash);
        let signs = self.req_cache.sign_cache_size(&prepare.msg.block_hash);
        if signs < self.state.min_valid_nodes()
            || prepare.msg.view != self.state.view
            || self.commit_voted == Some(round)
        {
            return Ok(());
        }
        self.commit_voted = Some(round);
        self.req_cache.update_committed_prepare();
        self.backup_committed_prepare()?;
        info!(
            height = prepare.msg.height,
            view = prepare.msg.view,
            hash = %short(&prepare.msg.block_hash),
            signs,
            "Sign quorum reached, committed prepare saved"
        );

        let now = self.now();
        if let Some(idx) = self.state.node_idx {
            let commit = CommitReq::new(&prepare, &self.key, idx, now);
            self.req_cache.add_commit_req(commit.clone());
            self.broadcast_request(&PbftRequest::Commit(commit), &HashSet::new())?;
        }
        self.time_manager.last_sign_time = now;
        self.check_and_save()
    }

    fn backup_committed_prepare(&mut self) -> ConsensusResult<()> {
        let Some(committed) = self.req_cache.committed_prepare() else {
            return Ok(());
        };
        let bytes = BackupRecord::new(committed)?.encode()?;
        self.deps
            .backup
            .put(COMMITTED_PREPARE_KEY, &bytes)
            .map_err(|e| {
                error!(error = %e, "Failed to persist committed prepare");
                ConsensusError::from(e)
            })
    }

    /// On the commit quorum: append the working block to the ledger.
    fn check_and_save(&mut self) -> ConsensusResult<()> {
        let Some(prepare) = self.req_cache.prepare().cloned() else {
            return Ok(());
        };
        let hash = prepare.msg.block_hash;
        let min_valid = self.state.min_valid_nodes();
        let signs = self.req_cache.sign_cache_size(&hash);
        let commits = self.req_cache.commit_cache_size(&hash);
        if signs < min_valid
            || commits < min_valid
            || prepare.msg.view != self.state.view
            || prepare.msg.height <= self.state.highest.number
        {
            return Ok(());
        }

        let mut block = prepare.decode_block()?;
        if !self.req_cache.generate_and_set_sig_list(&mut block, min_valid) {
            warn!(height = prepare.msg.height, "Not enough commit signatures for sig list");
            return Ok(());
        }
        let Some(exec) = prepare.exec.clone() else {
            warn!(error = %ConsensusError::MissingExecution(hash), "Cannot append block");
            return Ok(());
        };

        info!(
            height = prepare.msg.height,
            view = prepare.msg.view,
            hash = %short(&hash),
            signs,
            commits,
            "Commit quorum reached, appending block"
        );
        match self.deps.ledger.commit_block(block.clone(), exec) {
            CommitResult::Ok => {
                self.deps.tx_pool.drop_handled(&block);
                crate::metrics::record_block_committed();
                self.report_block(&block);
            }
            CommitResult::Failed(reason) => {
                warn!(
                    error = %ConsensusError::Ledger(reason),
                    height = prepare.msg.height,
                    "Ledger append failed"
                );
            }
        }
        Ok(())
    }

    /// Advance the round after a successful append.
    fn report_block(&mut self, block: &Block) {
        let head = ChainHead::new(block.number(), block.hash());
        if head.number <= self.state.highest.number {
            return;
        }
        self.state.highest = head;
        if head.number >= self.state.consensus_height {
            self.state.view = 0;
            self.state.to_view = 0;
            self.state.leader_failed = false;
            self.state.consensus_height = head.number + 1;
            self.state.catchup_sent.clear();
            self.time_manager.last_consensus_time = self.now();
            self.time_manager.change_cycle = 0;
            self.req_cache.del_invalid_view_change(&head);
        }
        self.reset_config();
        self.events.push(ConsensusEvent::Committed {
            height: head.number,
            tx_count: block.transactions.len(),
            change_cycle: self.time_manager.change_cycle,
        });
        self.req_cache.del_cache(&head);
        info!(
            height = head.number,
            hash = %short(&head.hash),
            tx_count = block.transactions.len(),
            idx = ?self.state.node_idx,
            "Block committed"
        );
    }

    // === VIEW CHANGE ===

    fn handle_view_change(
        &mut self,
        req: ViewChangeReq,
        source_idx: Option<u64>,
    ) -> ConsensusResult<CheckResult> {
        if !self.is_valid_view_change(&req, source_idx)? {
            return Ok(CheckResult::Invalid);
        }
        let (view, idx, height) = (req.msg.view, req.msg.idx, req.msg.height);
        self.state.update_view_map(idx, view);
        self.req_cache.add_view_change_req(req);
        debug!(
            height,
            view,
            from_idx = idx,
            votes = self.req_cache.view_change_size(view),
            "View change vote"
        );

        if view == self.state.to_view {
            if self.check_and_change_view(view) {
                self.events.push(ConsensusEvent::ViewChanged { view });
            }
        } else if view > self.state.to_view {
            if let Some(min_view) = self.req_cache.can_trigger_view_change(
                self.state.max_faulty(),
                self.state.to_view,
                &self.state.highest,
                self.state.consensus_height,
            ) {
                self.state.to_view = min_view.saturating_sub(1);
                self.time_manager.change_cycle =
                    self.state.to_view.min(self.config.max_change_cycle);
                info!(
                    view = self.state.view,
                    to_view = self.state.to_view,
                    change_cycle = self.time_manager.change_cycle,
                    "Peers moved ahead, fast view change"
                );
                self.change_view_for_fast_view_change();
            }
        }
        Ok(CheckResult::Valid)
    }

    fn is_valid_view_change(
        &mut self,
        req: &ViewChangeReq,
        source_idx: Option<u64>,
    ) -> ConsensusResult<bool> {
        let msg = &req.msg;
        if self.req_cache.is_exist_view_change(req) {
            return Ok(false);
        }
        if Some(msg.idx) == self.state.node_idx {
            return Ok(false);
        }
        if msg.height < self.state.highest.number {
            trace!(height = msg.height, idx = msg.idx, "View change from a lagging node");
            return Ok(false);
        }
        if msg.view.saturating_add(1) < self.state.to_view && Some(msg.idx) == source_idx {
            self.catchup_view(msg.idx)?;
        }
        if msg.view <= self.state.view {
            return Ok(false);
        }
        let forked = msg.height == self.state.highest.number
            && msg.block_hash != self.state.highest.hash;
        if forked || self.deps.ledger.block_hash_at(msg.height).is_none() {
            debug!(
                height = msg.height,
                idx = msg.idx,
                hash = %short(&msg.block_hash),
                "View change names an unknown head"
            );
            return Ok(false);
        }
        if !RoundValidator::check_sign(msg, &self.state) {
            warn!(height = msg.height, idx = msg.idx, "View change signature invalid");
            return Ok(false);
        }
        Ok(true)
    }

    /// Send our own vote for `to_view` straight to a validator stuck in an
    /// older view, once per `to_view`.
    fn catchup_view(&mut self, idx: u64) -> ConsensusResult<()> {
        let to_view = self.state.to_view;
        if self.state.catchup_sent.get(&idx) == Some(&to_view) {
            return Ok(());
        }
        let (Some(own_idx), Some(peer)) =
            (self.state.node_idx, self.state.validators.get(idx).copied())
        else {
            return Ok(());
        };
        let req = ViewChangeReq::new(
            &self.key,
            self.state.highest.number,
            to_view,
            own_idx,
            self.now(),
            self.state.highest.hash,
        );
        info!(to_idx = idx, to_view, "Sending catch-up view change");
        let request = PbftRequest::ViewChange(req);
        let packet = PbftMsgPacket::new(&request, own_idx, self.node_id, 1)?.encode()?;
        let key = request.msg().unique_key();
        if self
            .broadcast_cache
            .insert(&peer, PacketKind::ViewChange, &key)
        {
            self.deps.transport.send_to(&peer, packet);
        }
        self.state.catchup_sent.insert(idx, to_view);
        Ok(())
    }

    /// Adopt `view` once enough other validators voted for it. Only called
    /// for the view this node itself voted for; its own vote is never
    /// cached, so the bar is one below the quorum.
    fn check_and_change_view(&mut self, view: u64) -> bool {
        if view <= self.state.view {
            return false;
        }
        let votes = self.req_cache.view_change_size(view);
        if votes < self.state.min_valid_nodes().saturating_sub(1) {
            return false;
        }
        if self.time_manager.last_sign_time == 0 {
            self.state.fast_view_change = false;
        }
        let old_view = self.state.view;
        if view > old_view + 1 {
            self.time_manager.change_cycle = 1;
        }
        self.state.leader_failed = false;
        self.state.view = view;
        self.state.to_view = view;
        self.state.notify_next_leader_seal = false;
        self.time_manager.last_consensus_time = self.now();
        self.req_cache.trigger_view_change(view);
        self.broadcast_cache.clear_all();
        crate::metrics::record_view_change();
        info!(
            height = self.state.highest.number,
            view,
            old_view,
            votes,
            change_cycle = self.time_manager.change_cycle,
            leader = ?self.state.leader(),
            "View changed"
        );
        true
    }

    fn change_view_for_fast_view_change(&mut self) {
        self.time_manager.change_view();
        self.state.fast_view_change = true;
    }

    // === TIMERS ===

    pub(crate) fn check_timeout(&mut self) -> ConsensusResult<()> {
        let Some(idx) = self.state.node_idx else {
            return Ok(());
        };
        let now = self.now();
        if !self.time_manager.is_timeout(now) {
            return Ok(());
        }
        if self.time_manager.last_consensus_time != 0 {
            self.state.fast_view_change = false;
            let pending_round = self
                .req_cache
                .prepare()
                .map_or(false, |p| p.msg.height > self.state.highest.number);
            if pending_round {
                self.events.push(ConsensusEvent::TimedOut {
                    pending_tx_count: self.deps.tx_pool.pending_count(),
                });
            }
            crate::metrics::record_timeout();
        }
        self.time_manager.update_change_cycle();
        self.state.to_view += 1;
        self.state.leader_failed = true;
        self.time_manager.last_consensus_time = now;
        self.req_cache
            .remove_invalid_view_change(self.state.to_view, &self.state.highest);

        let to_view = self.state.to_view;
        let req = ViewChangeReq::new(
            &self.key,
            self.state.highest.number,
            to_view,
            idx,
            now,
            self.state.highest.hash,
        );
        if self.state.fast_view_change {
            debug!(view = self.state.view, to_view, "Fast view change");
        } else {
            warn!(
                height = self.state.highest.number,
                view = self.state.view,
                to_view,
                change_cycle = self.time_manager.change_cycle,
                "Round timed out, requesting view change"
            );
        }
        self.broadcast_request(&PbftRequest::ViewChange(req), &HashSet::new())?;
        self.check_and_change_view(to_view);
        self.events.push(ConsensusEvent::ViewChanged { view: to_view });
        Ok(())
    }

    /// Run the buffered prepare for the current round, if its view matches.
    pub(crate) fn handle_future_block(&mut self) -> ConsensusResult<()> {
        let consensus_height = self.state.consensus_height;
        let Some(req) = self.req_cache.future_prepare(consensus_height).cloned() else {
            return Ok(());
        };
        if req.msg.view != self.state.view {
            return Ok(());
        }
        info!(
            height = consensus_height,
            view = req.msg.view,
            idx = req.msg.idx,
            "Handling buffered prepare"
        );
        self.req_cache.erase_handled_future_req(consensus_height);
        self.handle_prepare(req, PrepareOrigin::Network).map(|_| ())
    }

    pub(crate) fn collect_garbage(&mut self) {
        let now = self.now();
        if now.saturating_sub(self.last_gc_time) < self.config.collect_interval_ms {
            return;
        }
        self.last_gc_time = now;
        let head = self.state.highest;
        self.req_cache.collect_garbage(&head);
        self.req_cache.remove_invalid_future_cache(head.number);
        debug!(
            height = head.number,
            signs = self.req_cache.sign_cache_len(),
            commits = self.req_cache.commit_cache_len(),
            view_changes = self.req_cache.view_change_cache_len(),
            future = self.req_cache.future_prepare_len(),
            "Collected garbage"
        );
    }

    // === BROADCAST ===

    fn broadcast_request(
        &mut self,
        request: &PbftRequest,
        filter: &HashSet<NodeId>,
    ) -> ConsensusResult<()> {
        let payload = request.encode()?;
        let key = request.msg().unique_key();
        self.broadcast_payload(request.kind(), &key, payload, filter, self.config.max_ttl)
    }

    /// Send to every connected validator that has not seen `key`. Peers in
    /// `filter` are skipped but marked as having seen it.
    ///
    /// Observers only reach this through forwarding: every request this
    /// node authors requires a validator index.
    fn broadcast_payload(
        &mut self,
        kind: PacketKind,
        key: &str,
        payload: Vec<u8>,
        filter: &HashSet<NodeId>,
        ttl: u8,
    ) -> ConsensusResult<()> {
        let packet = PbftMsgPacket {
            sender_idx: self.state.node_idx.unwrap_or(RELAY_SENDER_IDX),
            sender_id: self.node_id,
            kind,
            ttl,
            payload,
        }
        .encode()?;
        for peer in self.deps.transport.connected_peers() {
            if peer == self.node_id || !self.state.validators.contains(&peer) {
                continue;
            }
            if filter.contains(&peer) {
                self.broadcast_cache.insert(&peer, kind, key);
                continue;
            }
            if self.broadcast_cache.insert(&peer, kind, key) {
                self.deps.transport.send_to(&peer, packet.clone());
            }
        }
        Ok(())
    }

    // === STATUS ===

    pub(crate) fn status(&self) -> ConsensusStatus {
        let state = &self.state;
        let connected = self.deps.transport.connected_peers();
        let mut view_map: Vec<ViewMapEntry> = state
            .view_map
            .iter()
            .filter_map(|(&idx, &view)| {
                state.validators.get(idx).map(|node_id| ViewMapEntry {
                    idx,
                    node_id: *node_id,
                    view,
                })
            })
            .collect();
        view_map.sort_by_key(|entry| entry.idx);

        ConsensusStatus {
            node_idx: state.node_idx,
            node_id: self.node_id,
            cfg_err: state.cfg_err(),
            consensus_height: state.consensus_height,
            highest_height: state.highest.number,
            highest_hash: state.highest.hash,
            view: state.view,
            to_view: state.to_view,
            leader: state.leader(),
            leader_failed: state.leader_failed,
            change_cycle: self.time_manager.change_cycle,
            max_faulty: state.max_faulty(),
            min_valid_nodes: state.min_valid_nodes(),
            validators: state.validators.iter().copied().collect(),
            connected_validators: connected
                .iter()
                .filter(|peer| state.validators.contains(peer))
                .count(),
            view_map,
            raw_prepare: self.req_cache.raw_prepare().map(PreparedSummary::from),
            prepare: self.req_cache.prepare().map(PreparedSummary::from),
            committed_prepare: self.req_cache.committed_prepare().map(PreparedSummary::from),
            sign_cache_len: self.req_cache.sign_cache_len(),
            commit_cache_len: self.req_cache.commit_cache_len(),
            view_change_cache_len: self.req_cache.view_change_cache_len(),
            future_prepare_len: self.req_cache.future_prepare_len(),
        }
    }
}
