//! # PBFT Node
//!
//! Starts a local validator network and keeps it running until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration (defaults plus `PBFT_*` environment overrides)
//! 3. Start every validator and its sealer
//! 4. Feed random transactions and report the local validator's status
//! 5. Stop all validators on Ctrl+C or on the first fatal error

use std::time::Duration;

use anyhow::{Context, Result};
use node_runtime::{load_config, LocalNetwork, TxInjector};
use node_telemetry::{init_telemetry, log_event, log_round_event, TelemetryConfig};
use pbft_consensus::{ConsensusApi, PbftClient};
use rand::Rng;
use tracing::{debug, info, warn};

const LOAD_INTERVAL: Duration = Duration::from_millis(200);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = load_config().context("Failed to load configuration")?;
    let local = config.network.local_index;
    info!(
        validators = config.network.validators,
        view_timeout_ms = config.consensus.view_timeout_ms,
        data_dir = %config.storage.data_dir.display(),
        "Configuration loaded"
    );

    let network = LocalNetwork::start(config)
        .await
        .context("Failed to start validators")?;

    tokio::spawn(generate_load(network.tx_injector()));
    if let Some(node) = network.node(local) {
        tokio::spawn(report_status(local, node.client.clone()));
    }

    log_event!(info, "node", "Node is running. Press Ctrl+C to stop.");
    network
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl+C, running until a validator fails");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Validator network stopped")?;

    log_event!(info, "node", "Node stopped");
    Ok(())
}

async fn generate_load(injector: TxInjector) {
    let mut ticker = tokio::time::interval(LOAD_INTERVAL);
    loop {
        ticker.tick().await;
        let payload: Vec<u8> = {
            let mut rng = rand::thread_rng();
            let len = rng.gen_range(16..64);
            (0..len).map(|_| rng.gen()).collect()
        };
        let tx = injector.submit(payload);
        debug!(nonce = tx.nonce, "Submitted transaction");
    }
}

async fn report_status(idx: usize, client: PbftClient) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    loop {
        ticker.tick().await;
        let status = match client.consensus_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Status unavailable");
                return;
            }
        };
        log_round_event!(
            info,
            "Consensus status",
            status.consensus_height,
            status.view,
            idx,
            leader = ?status.leader,
            highest = status.highest_height,
            connected = status.connected_validators
        );
        match serde_json::to_string(&status) {
            Ok(json) => debug!(status = %json, "Consensus status snapshot"),
            Err(e) => warn!(error = %e, "Failed to encode status"),
        }
    }
}
