//! Per-peer broadcast dedup cache
//!
//! Remembers which message keys were already sent to, or received from,
//! each peer so they are not sent again. Never consulted for safety.

use super::PacketKind;
use shared_types::NodeId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Bounded FIFO-evicting set of keys
#[derive(Debug, Default)]
struct KeySet {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl KeySet {
    fn insert(&mut self, key: String, capacity: usize) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        while self.order.len() >= capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.keys.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.keys.insert(key);
        true
    }
}

#[derive(Debug)]
pub struct BroadcastCache {
    capacity: usize,
    peers: HashMap<NodeId, HashMap<PacketKind, KeySet>>,
}

impl BroadcastCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            peers: HashMap::new(),
        }
    }

    /// Mark `key` as known to `peer`. Returns false if it already was.
    pub fn insert(&mut self, peer: &NodeId, kind: PacketKind, key: &str) -> bool {
        let capacity = self.capacity;
        self.peers
            .entry(*peer)
            .or_default()
            .entry(kind)
            .or_default()
            .insert(key.to_string(), capacity)
    }

    pub fn exists(&self, peer: &NodeId, kind: PacketKind, key: &str) -> bool {
        self.peers
            .get(peer)
            .and_then(|kinds| kinds.get(&kind))
            .map_or(false, |set| set.keys.contains(key))
    }

    pub fn clear_all(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self, peer: &NodeId, kind: PacketKind) -> usize {
        self.peers
            .get(peer)
            .and_then(|kinds| kinds.get(&kind))
            .map_or(0, |set| set.order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: u8) -> NodeId {
        NodeId([id; 33])
    }

    #[test]
    fn test_insert_and_exists_are_scoped_by_peer_and_kind() {
        let mut cache = BroadcastCache::new(8);
        assert!(cache.insert(&peer(1), PacketKind::Sign, "k"));
        assert!(!cache.insert(&peer(1), PacketKind::Sign, "k"));

        assert!(cache.exists(&peer(1), PacketKind::Sign, "k"));
        assert!(!cache.exists(&peer(1), PacketKind::Commit, "k"));
        assert!(!cache.exists(&peer(2), PacketKind::Sign, "k"));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = BroadcastCache::new(2);
        cache.insert(&peer(1), PacketKind::Prepare, "a");
        cache.insert(&peer(1), PacketKind::Prepare, "b");
        cache.insert(&peer(1), PacketKind::Prepare, "c");

        assert!(!cache.exists(&peer(1), PacketKind::Prepare, "a"));
        assert!(cache.exists(&peer(1), PacketKind::Prepare, "b"));
        assert!(cache.exists(&peer(1), PacketKind::Prepare, "c"));
        assert_eq!(cache.len(&peer(1), PacketKind::Prepare), 2);
    }

    #[test]
    fn test_clear_all() {
        let mut cache = BroadcastCache::new(4);
        for kind in PacketKind::ALL {
            cache.insert(&peer(3), kind, "x");
        }
        cache.clear_all();
        for kind in PacketKind::ALL {
            assert!(!cache.exists(&peer(3), kind, "x"));
        }
    }
}
