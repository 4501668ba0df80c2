//! # Sealer
//!
//! Builds blocks from the transaction pool whenever the engine says this
//! validator should seal. Engine hooks wake it on commit, view change and
//! next-leader notification; otherwise it polls every `interval_ms`.

use crate::adapters::{InMemoryLedger, InMemoryTxPool};
use crate::container::SealerConfig;
use crate::supervisor::FatalReporter;
use node_telemetry::log_event;
use parking_lot::Mutex;
use pbft_consensus::ports::SystemTimeSource;
use pbft_consensus::{
    Block, ConsensusApi, ConsensusError, ConsensusResult, Ledger, PbftEngine, TimeSource,
};
use shared_types::Hash;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

#[derive(Default)]
struct Pending {
    /// Transactions packed in the block being agreed upon
    filter: HashSet<Hash>,
    /// Height this sealer already proposed in the current view
    proposed: Option<u64>,
}

/// State shared between the engine hooks and the sealer loop
#[derive(Default)]
pub struct SealerState {
    pending: Mutex<Pending>,
    wake: Notify,
}

impl SealerState {
    /// Register the sealer hooks on `engine`. Call before the engine starts.
    pub fn attach(engine: &PbftEngine) -> Arc<Self> {
        let state = Arc::new(Self::default());
        {
            let state = state.clone();
            engine.on_commit(move |height, tx_count, _| {
                debug!(height, tx_count, "Sealer reset after commit");
                let mut pending = state.pending.lock();
                pending.filter.clear();
                pending.proposed = None;
                drop(pending);
                state.wake.notify_one();
            });
        }
        {
            let state = state.clone();
            engine.on_view_change(move || {
                state.pending.lock().proposed = None;
                state.wake.notify_one();
            });
        }
        {
            let state = state.clone();
            engine.on_notify_next_leader_reset(move |filter| {
                state.pending.lock().filter = filter.clone();
                state.wake.notify_one();
            });
        }
        engine.on_timeout(|pending_tx_count| {
            log_event!(
                warn,
                "sealer",
                "Round timed out with a pending proposal",
                pending_tx_count
            );
        });
        state
    }

    fn filter(&self) -> HashSet<Hash> {
        self.pending.lock().filter.clone()
    }

    fn already_proposed(&self, height: u64) -> bool {
        self.pending.lock().proposed == Some(height)
    }

    fn mark_proposed(&self, height: u64) {
        self.pending.lock().proposed = Some(height);
    }
}

/// Block producer of one validator
pub struct Sealer<C: ConsensusApi> {
    idx: usize,
    client: C,
    ledger: Arc<InMemoryLedger>,
    pool: Arc<InMemoryTxPool>,
    state: Arc<SealerState>,
    config: SealerConfig,
}

impl<C: ConsensusApi> Sealer<C> {
    pub fn new(
        idx: usize,
        client: C,
        ledger: Arc<InMemoryLedger>,
        pool: Arc<InMemoryTxPool>,
        state: Arc<SealerState>,
        config: SealerConfig,
    ) -> Self {
        Self {
            idx,
            client,
            ledger,
            pool,
            state,
            config,
        }
    }

    /// Seal until shutdown or a fatal error, which goes to `fatal`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, fatal: FatalReporter) {
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.state.wake.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
            match self.try_seal().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    fatal.report(self.idx, e);
                    break;
                }
                Err(ConsensusError::WorkerStopped) => break,
                Err(e) => warn!(idx = self.idx, error = %e, "Sealing failed"),
            }
        }
        debug!(idx = self.idx, "Sealer stopped");
    }

    /// One sealing attempt. Returns whether a block was proposed.
    pub async fn try_seal(&self) -> ConsensusResult<bool> {
        if !self.client.should_seal().await? {
            return Ok(false);
        }
        // The next leader is only woken early; its parent block is not
        // committed yet, so it waits for the commit hook
        let status = self.client.consensus_status().await?;
        if status.node_idx.is_none() || status.leader != status.node_idx {
            return Ok(false);
        }
        let head = self.ledger.head();
        let height = head.number + 1;
        if self.state.already_proposed(height) {
            return Ok(false);
        }

        let max = self.client.max_packable_tx_count().await? as usize;
        let txs = self.pool.pending(max, &self.state.filter());
        if txs.is_empty() && !self.config.seal_empty_blocks {
            return Ok(false);
        }

        let tx_count = txs.len();
        let block = Block::new(
            height,
            head.hash,
            self.idx as u64,
            SystemTimeSource.now_ms(),
            txs,
        );
        if !self.client.generate_prepare(block).await? {
            return Ok(false);
        }
        self.state.mark_proposed(height);
        log_event!(debug, "sealer", "Sealed block", idx = self.idx, height, tx_count);
        Ok(true)
    }
}
