//! Consensus worker
//!
//! Single task that owns the inbound queue. Each iteration handles at most
//! one packet, then runs the timers: timeout check, buffered future
//! prepares and garbage collection. Engine calls run on the blocking pool
//! since they may execute blocks and write the backup.

use crate::domain::{Block, ConsensusError, ConsensusResult, PbftMsgPacket};
use crate::ports::ConsensusApi;
use crate::service::{ConsensusStatus, PbftEngine};
use async_trait::async_trait;
use shared_types::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type QueuedPacket = (NodeId, PbftMsgPacket);

/// Sending side of the worker's inbound queue
#[derive(Clone, Debug)]
pub struct MsgQueue {
    sender: mpsc::UnboundedSender<QueuedPacket>,
}

impl MsgQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueuedPacket>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn push(&self, peer: NodeId, packet: PbftMsgPacket) -> ConsensusResult<()> {
        self.sender
            .send((peer, packet))
            .map_err(|_| ConsensusError::WorkerStopped)
    }

    /// Decode a raw transport frame and queue it.
    pub fn push_encoded(&self, peer: NodeId, bytes: &[u8]) -> ConsensusResult<()> {
        self.push(peer, PbftMsgPacket::decode(bytes)?)
    }
}

pub struct PbftWorker;

impl PbftWorker {
    /// Start the engine and spawn its worker on the current runtime.
    pub async fn start(engine: Arc<PbftEngine>) -> ConsensusResult<PbftWorkerHandle> {
        let starting = engine.clone();
        blocking(move || starting.start()).await?;

        let poll = Duration::from_millis(engine.config().queue_poll_ms.max(1));
        let (queue, receiver) = MsgQueue::channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(engine.clone(), receiver, shutdown_rx, poll));
        info!(idx = ?engine.node_idx(), "PBFT worker started");

        Ok(PbftWorkerHandle {
            engine,
            queue,
            shutdown,
            task: Some(task),
        })
    }
}

/// Handle to a running worker
pub struct PbftWorkerHandle {
    engine: Arc<PbftEngine>,
    queue: MsgQueue,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<ConsensusResult<()>>>,
}

impl PbftWorkerHandle {
    pub fn engine(&self) -> &Arc<PbftEngine> {
        &self.engine
    }

    pub fn queue(&self) -> MsgQueue {
        self.queue.clone()
    }

    /// Cloneable [`ConsensusApi`] for the sealer and the transport.
    pub fn client(&self) -> PbftClient {
        PbftClient {
            engine: self.engine.clone(),
            queue: self.queue.clone(),
        }
    }

    /// Resolves when the worker exits. `Err` carries the fatal error that
    /// stopped it. Safe to cancel and call again.
    pub async fn stopped(&mut self) -> ConsensusResult<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        joined.map_err(|_| ConsensusError::WorkerStopped)?
    }

    /// Ask the worker to exit after the current step and wait for it.
    pub async fn stop(mut self) -> ConsensusResult<()> {
        let _ = self.shutdown.send(true);
        self.stopped().await
    }
}

async fn run(
    engine: Arc<PbftEngine>,
    mut receiver: mpsc::UnboundedReceiver<QueuedPacket>,
    mut shutdown: watch::Receiver<bool>,
    poll: Duration,
) -> ConsensusResult<()> {
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = tokio::time::timeout(poll, receiver.recv()) => next,
        };
        let packet = match next {
            Ok(Some(packet)) => Some(packet),
            Ok(None) => break,
            Err(_) => None,
        };
        let engine = engine.clone();
        if let Err(e) = blocking(move || step(&engine, packet)).await {
            error!(error = %e, "PBFT worker stopping on fatal error");
            return Err(e);
        }
    }
    debug!("PBFT worker stopped");
    Ok(())
}

fn step(engine: &PbftEngine, packet: Option<QueuedPacket>) -> ConsensusResult<()> {
    if let Some((peer, packet)) = packet {
        absorb(engine.handle_packet(&peer, packet).map(|_| ()))?;
    }
    absorb(engine.check_timeout())?;
    absorb(engine.handle_future_block())?;
    engine.collect_garbage();
    Ok(())
}

/// Log non-fatal errors and keep going.
fn absorb(result: ConsensusResult<()>) -> ConsensusResult<()> {
    match result {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, "PBFT step failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

async fn blocking<R, F>(f: F) -> ConsensusResult<R>
where
    F: FnOnce() -> ConsensusResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|_| ConsensusError::WorkerStopped)?
}

/// Cloneable front end of a running worker
#[derive(Clone, Debug)]
pub struct PbftClient {
    engine: Arc<PbftEngine>,
    queue: MsgQueue,
}

impl PbftClient {
    pub fn engine(&self) -> &Arc<PbftEngine> {
        &self.engine
    }
}

#[async_trait]
impl ConsensusApi for PbftClient {
    async fn should_seal(&self) -> Result<bool, ConsensusError> {
        let engine = self.engine.clone();
        blocking(move || engine.should_seal()).await
    }

    async fn generate_prepare(&self, block: Block) -> Result<bool, ConsensusError> {
        let engine = self.engine.clone();
        blocking(move || engine.generate_prepare(block)).await
    }

    async fn max_packable_tx_count(&self) -> Result<u64, ConsensusError> {
        Ok(self.engine.max_packable_tx_count())
    }

    fn submit_packet(&self, peer: NodeId, packet: PbftMsgPacket) -> Result<(), ConsensusError> {
        self.queue.push(peer, packet)
    }

    async fn consensus_status(&self) -> Result<ConsensusStatus, ConsensusError> {
        Ok(self.engine.consensus_status())
    }
}
