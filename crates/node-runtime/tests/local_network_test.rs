//! # Local Network Tests
//!
//! Full validator networks over the loopback hub with in-memory backups.

use std::time::Duration;

use node_runtime::{LocalNetwork, NodeConfig};
use pbft_consensus::Ledger;

const WAIT: Duration = Duration::from_secs(30);

fn fast_config(validators: usize) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network.validators = validators;
    config.network.key_seed = "local-network-test".to_string();
    config.consensus.view_timeout_ms = 500;
    config.sealer.interval_ms = 20;
    config.storage.persistent_backup = false;
    config
}

fn assert_same_chain(network: &LocalNetwork, skip: Option<usize>, height: u64) {
    let reference = network
        .nodes()
        .iter()
        .find(|node| Some(node.idx) != skip)
        .expect("at least one connected validator");
    for node in network.nodes().iter().filter(|node| Some(node.idx) != skip) {
        for number in 1..=height {
            assert_eq!(
                node.ledger.block_hash_at(number),
                reference.ledger.block_hash_at(number),
                "validator {} diverged at block {}",
                node.idx,
                number
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_validators_agree_on_blocks() {
    let network = LocalNetwork::start(fast_config(4)).await.unwrap();
    for i in 0..3u8 {
        network.submit_transaction(vec![i; 8]);
    }

    assert!(network.wait_for_height(1, WAIT).await, "no block committed");
    for i in 3..6u8 {
        network.submit_transaction(vec![i; 8]);
    }
    assert!(network.wait_for_height(2, WAIT).await, "second block missing");

    assert_same_chain(&network, None, 2);
    let committed: usize = (1..=network.nodes()[0].height())
        .filter_map(|n| network.nodes()[0].ledger.block(n))
        .map(|block| block.transactions.len())
        .sum();
    assert!(committed >= 3);

    for node in network.nodes() {
        let block = node.ledger.block(1).unwrap();
        assert!(block.sig_list.len() >= 3, "block 1 lacks a commit quorum");
    }
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_with_silent_leader() {
    let network = LocalNetwork::start(fast_config(4)).await.unwrap();
    // Validator 0 leads height 1 in view 0
    network.disconnect(0);
    network.submit_transaction(b"after-leader-loss".to_vec());

    assert!(
        network.wait_for_height(1, WAIT).await,
        "view change did not restore progress"
    );
    assert_same_chain(&network, Some(0), 1);
    assert_eq!(network.nodes()[0].height(), 0);

    let block = network.nodes()[1].ledger.block(1).unwrap();
    assert_ne!(block.header.sealer, 0, "silent validator sealed block 1");
    network.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_validator_commits_alone() {
    let network = LocalNetwork::start(fast_config(1)).await.unwrap();
    network.submit_transaction(b"solo".to_vec());
    assert!(network.wait_for_height(1, WAIT).await);

    let status = network.status(0).unwrap();
    assert_eq!(status.max_faulty, 0);
    assert_eq!(status.min_valid_nodes, 1);
    assert_eq!(status.highest_height, 1);
    network.shutdown().await.unwrap();
}
