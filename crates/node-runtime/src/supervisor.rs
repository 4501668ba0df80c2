//! # Supervisor
//!
//! Owns every validator worker and the tasks around them. The first fatal
//! consensus error, or a worker that exits on its own, stops the whole
//! network; a partially stopped validator set is never left running.

use crate::error::{RuntimeError, RuntimeResult};
use pbft_consensus::{ConsensusError, ConsensusResult, PbftWorkerHandle};
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

type FatalReport = (usize, ConsensusError);

/// Lets tasks outside the worker report a fatal error
#[derive(Clone, Debug)]
pub struct FatalReporter {
    tx: mpsc::UnboundedSender<FatalReport>,
}

impl FatalReporter {
    pub fn report(&self, idx: usize, err: ConsensusError) {
        error!(idx, error = %err, "Fatal consensus error reported");
        let _ = self.tx.send((idx, err));
    }
}

pub struct Supervisor {
    workers: JoinSet<(usize, ConsensusResult<()>)>,
    tasks: JoinSet<()>,
    shutdown: watch::Sender<bool>,
    fatal_tx: mpsc::UnboundedSender<FatalReport>,
    fatal_rx: mpsc::UnboundedReceiver<FatalReport>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            workers: JoinSet::new(),
            tasks: JoinSet::new(),
            shutdown,
            fatal_tx,
            fatal_rx,
        }
    }

    /// Flips to `true` once the supervisor stops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn fatal_reporter(&self) -> FatalReporter {
        FatalReporter {
            tx: self.fatal_tx.clone(),
        }
    }

    /// Track the worker of validator `idx`.
    pub fn watch(&mut self, idx: usize, mut handle: PbftWorkerHandle) {
        let mut shutdown = self.shutdown.subscribe();
        self.workers.spawn(async move {
            let exited = tokio::select! {
                result = handle.stopped() => Some(result),
                _ = shutdown.changed() => None,
            };
            let result = match exited {
                Some(result) => result,
                None => handle.stop().await,
            };
            (idx, result)
        });
    }

    /// Run a helper task; it is expected to exit on the shutdown signal.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Wait for `stop`, a fatal report or a worker exit, then stop everything.
    pub async fn run(mut self, stop: impl Future<Output = ()>) -> RuntimeResult<()> {
        tokio::pin!(stop);
        let outcome = tokio::select! {
            _ = &mut stop => {
                info!("Shutdown requested");
                Ok(())
            }
            Some((idx, err)) = self.fatal_rx.recv() => Err(RuntimeError::consensus(idx, err)),
            Some(joined) = self.workers.join_next() => match joined {
                Ok((idx, Err(err))) => Err(RuntimeError::consensus(idx, err)),
                Ok((idx, Ok(()))) => Err(RuntimeError::WorkerExited(idx)),
                Err(err) => Err(RuntimeError::from(err)),
            },
        };
        if let Err(e) = &outcome {
            error!(error = %e, "Stopping all validators");
        }
        self.drain().await;
        outcome
    }

    /// Stop everything. Reports the first fatal error seen on the way down.
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        let pending = self.fatal_rx.try_recv().ok();
        let mut outcome = match pending {
            Some((idx, err)) => Err(RuntimeError::consensus(idx, err)),
            None => Ok(()),
        };
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.workers.join_next().await {
            if let Ok((idx, Err(err))) = joined {
                if outcome.is_ok() {
                    outcome = Err(RuntimeError::consensus(idx, err));
                } else {
                    warn!(idx, error = %err, "Worker stopped with error");
                }
            }
        }
        self.drain_tasks().await;
        outcome
    }

    async fn drain(&mut self) {
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok((idx, Err(err))) => warn!(idx, error = %err, "Worker stopped with error"),
                Ok((idx, Ok(()))) => info!(idx, "Worker stopped"),
                Err(err) => warn!(error = %err, "Worker task failed"),
            }
        }
        self.drain_tasks().await;
    }

    async fn drain_tasks(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Runtime task failed");
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_future_shuts_down_tasks() {
        let mut supervisor = Supervisor::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let mut signal = supervisor.shutdown_signal();
        {
            let stopped = stopped.clone();
            supervisor.spawn(async move {
                let _ = signal.changed().await;
                stopped.store(true, Ordering::SeqCst);
            });
        }

        supervisor.run(async {}).await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fatal_report_ends_run() {
        let supervisor = Supervisor::new();
        let reporter = supervisor.fatal_reporter();
        reporter.report(
            2,
            ConsensusError::InsufficientDiskSpace {
                path: "/data".into(),
                available: 1,
                required: 2,
            },
        );

        let err = supervisor
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Consensus { idx: 2, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_surfaces_pending_report() {
        let supervisor = Supervisor::new();
        supervisor
            .fatal_reporter()
            .report(0, ConsensusError::WorkerStopped);
        assert!(supervisor.shutdown().await.is_err());
    }
}
