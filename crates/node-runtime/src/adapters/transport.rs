//! Loopback transport
//!
//! Every validator of the process registers its worker queue with one hub.
//! Sending encodes nothing new: the frame produced by the engine is decoded
//! straight into the receiver's queue.

use parking_lot::RwLock;
use pbft_consensus::{MsgQueue, Transport};
use shared_types::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Shared switchboard between in-process validators
#[derive(Default)]
pub struct LoopbackHub {
    queues: RwLock<HashMap<NodeId, MsgQueue>>,
    offline: RwLock<HashSet<NodeId>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: NodeId, queue: MsgQueue) {
        self.queues.write().insert(node, queue);
    }

    /// Cut `node` off: nothing to or from it is delivered.
    pub fn disconnect(&self, node: NodeId) {
        self.offline.write().insert(node);
    }

    pub fn reconnect(&self, node: NodeId) {
        self.offline.write().remove(&node);
    }

    pub fn is_online(&self, node: &NodeId) -> bool {
        !self.offline.read().contains(node)
    }

    fn deliver(&self, from: NodeId, to: &NodeId, frame: &[u8]) {
        if !self.is_online(&from) || !self.is_online(to) {
            return;
        }
        let Some(queue) = self.queues.read().get(to).cloned() else {
            trace!(to = %to, "No queue registered for peer");
            return;
        };
        if let Err(e) = queue.push_encoded(from, frame) {
            trace!(to = %to, error = %e, "Dropping frame");
        }
    }

    fn peers_of(&self, node: &NodeId) -> Vec<NodeId> {
        if !self.is_online(node) {
            return Vec::new();
        }
        let offline = self.offline.read();
        self.queues
            .read()
            .keys()
            .filter(|peer| *peer != node && !offline.contains(peer))
            .copied()
            .collect()
    }
}

/// One validator's end of the hub
pub struct LoopbackTransport {
    local: NodeId,
    hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
    pub fn new(local: NodeId, hub: Arc<LoopbackHub>) -> Self {
        Self { local, hub }
    }
}

impl Transport for LoopbackTransport {
    fn send_to(&self, peer: &NodeId, packet: Vec<u8>) {
        self.hub.deliver(self.local, peer, &packet);
    }

    fn connected_peers(&self) -> Vec<NodeId> {
        self.hub.peers_of(&self.local)
    }
}
