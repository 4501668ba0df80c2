//! # Local Network
//!
//! Starts `network.validators` validators in one process. Each one gets its
//! own engine, worker, ledger, executor, pool, backup and sealer; they talk
//! through a shared [`LoopbackHub`].
//!
//! ## Startup order (per validator)
//!
//! 1. Derive the key from `network.key_seed`
//! 2. Open the backup store
//! 3. Build the engine and attach the sealer hooks
//! 4. Start the worker, which reloads the committed-prepare backup
//! 5. Register the worker queue with the hub
//! 6. Spawn the sealer under the supervisor

use crate::adapters::{
    open_backup, DeterministicExecutor, InMemoryLedger, InMemoryTxPool, LoopbackHub,
    LoopbackTransport, StaticValidatorProvider,
};
use crate::container::{ConfigError, NodeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::handlers::{Sealer, SealerState};
use crate::supervisor::Supervisor;
use pbft_consensus::{
    ConsensusStatus, PbftClient, PbftDependencies, PbftEngine, PbftWorker, Transaction,
    ValidatorSet,
};
use shared_crypto::{keccak256, CryptoError, Secp256k1KeyPair};
use shared_types::NodeId;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key of validator `idx`, derived from a shared seed so every process
/// started with the same seed agrees on the validator set.
pub fn validator_key(seed: &str, idx: usize) -> Result<Secp256k1KeyPair, CryptoError> {
    Secp256k1KeyPair::from_bytes(keccak256(format!("{seed}-{idx}").as_bytes()))
}

/// Handles to one running validator
pub struct ValidatorNode {
    pub idx: usize,
    pub node_id: NodeId,
    pub client: PbftClient,
    pub ledger: Arc<InMemoryLedger>,
    pub executor: Arc<DeterministicExecutor>,
    pub pool: Arc<InMemoryTxPool>,
}

impl ValidatorNode {
    pub fn engine(&self) -> &Arc<PbftEngine> {
        self.client.engine()
    }

    pub fn height(&self) -> u64 {
        self.ledger.height()
    }
}

/// Submits the same transaction to every validator's pool
#[derive(Clone)]
pub struct TxInjector {
    pools: Vec<Arc<InMemoryTxPool>>,
    nonce: Arc<AtomicU64>,
}

impl TxInjector {
    pub fn submit(&self, payload: Vec<u8>) -> Transaction {
        let tx = Transaction::new(self.nonce.fetch_add(1, Ordering::Relaxed), payload);
        for pool in &self.pools {
            pool.submit(tx.clone());
        }
        tx
    }
}

pub struct LocalNetwork {
    config: NodeConfig,
    hub: Arc<LoopbackHub>,
    nodes: Vec<ValidatorNode>,
    injector: TxInjector,
    supervisor: Supervisor,
}

impl LocalNetwork {
    /// Start every validator. Must be called inside a tokio runtime.
    pub async fn start(config: NodeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let count = config.network.validators;
        let keys = (0..count)
            .map(|idx| validator_key(&config.network.key_seed, idx))
            .collect::<Result<Vec<_>, _>>()?;
        let validator_set = ValidatorSet::new(keys.iter().map(Secp256k1KeyPair::node_id));
        info!(
            validators = count,
            max_faulty = validator_set.max_faulty(),
            quorum = validator_set.min_valid_nodes(),
            "Starting local PBFT network"
        );

        let hub = Arc::new(LoopbackHub::new());
        let mut supervisor = Supervisor::new();
        let mut nodes = Vec::with_capacity(count);

        for (idx, key) in keys.into_iter().enumerate() {
            let node_id = key.node_id();
            let ledger = Arc::new(InMemoryLedger::new());
            let executor = Arc::new(DeterministicExecutor::new());
            let pool = Arc::new(InMemoryTxPool::new());
            let deps = PbftDependencies {
                executor: executor.clone(),
                ledger: ledger.clone(),
                tx_pool: pool.clone(),
                transport: Arc::new(LoopbackTransport::new(node_id, hub.clone())),
                backup: open_backup(&config.storage, idx)?,
                validator_provider: Arc::new(StaticValidatorProvider::new(validator_set.clone())),
                config: config.consensus.clone(),
            };

            let engine = Arc::new(PbftEngine::new(deps, key));
            let sealer_state = SealerState::attach(&engine);
            let handle = PbftWorker::start(engine)
                .await
                .map_err(|e| RuntimeError::consensus(idx, e))?;
            hub.register(node_id, handle.queue());
            let client = handle.client();
            supervisor.watch(idx, handle);

            let sealer = Sealer::new(
                idx,
                client.clone(),
                ledger.clone(),
                pool.clone(),
                sealer_state,
                config.sealer.clone(),
            );
            let shutdown = supervisor.shutdown_signal();
            let fatal = supervisor.fatal_reporter();
            supervisor.spawn(sealer.run(shutdown, fatal));

            info!(idx, node_id = %node_id, "Validator started");
            nodes.push(ValidatorNode {
                idx,
                node_id,
                client,
                ledger,
                executor,
                pool,
            });
        }

        let injector = TxInjector {
            pools: nodes.iter().map(|node| node.pool.clone()).collect(),
            nonce: Arc::new(AtomicU64::new(0)),
        };
        Ok(Self {
            config,
            hub,
            nodes,
            injector,
            supervisor,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[ValidatorNode] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> Option<&ValidatorNode> {
        self.nodes.get(idx)
    }

    pub fn submit_transaction(&self, payload: Vec<u8>) -> Transaction {
        self.injector.submit(payload)
    }

    pub fn tx_injector(&self) -> TxInjector {
        self.injector.clone()
    }

    pub fn status(&self, idx: usize) -> RuntimeResult<ConsensusStatus> {
        self.node(idx)
            .map(|node| node.engine().consensus_status())
            .ok_or(RuntimeError::Config(ConfigError::LocalIndexOutOfRange {
                index: idx,
                validators: self.nodes.len(),
            }))
    }

    pub fn status_json(&self, idx: usize) -> RuntimeResult<String> {
        Ok(serde_json::to_string_pretty(&self.status(idx)?)?)
    }

    /// Cut validator `idx` off the hub.
    pub fn disconnect(&self, idx: usize) {
        if let Some(node) = self.node(idx) {
            info!(idx, "Disconnecting validator");
            self.hub.disconnect(node.node_id);
        }
    }

    pub fn reconnect(&self, idx: usize) {
        if let Some(node) = self.node(idx) {
            info!(idx, "Reconnecting validator");
            self.hub.reconnect(node.node_id);
        }
    }

    /// Wait until every connected validator reached `height`.
    pub async fn wait_for_height(&self, height: u64, timeout: Duration) -> bool {
        let reached = async {
            loop {
                let done = self
                    .nodes
                    .iter()
                    .filter(|node| self.hub.is_online(&node.node_id))
                    .all(|node| node.height() >= height);
                if done {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }

    /// Run until `stop` resolves or a validator fails.
    pub async fn run_until(self, stop: impl Future<Output = ()>) -> RuntimeResult<()> {
        self.supervisor.run(stop).await
    }

    pub async fn shutdown(self) -> RuntimeResult<()> {
        info!("Stopping local PBFT network");
        self.supervisor.shutdown().await
    }
}
