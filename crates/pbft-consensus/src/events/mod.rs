//! Events layer
//!
//! Protocol events the sealer reacts to. The engine queues them while it
//! holds the round lock and dispatches them once the lock is released, so a
//! callback may call back into the engine.

use shared_types::Hash;
use std::collections::HashSet;
use std::sync::Arc;

/// Something the engine wants its embedder to know about
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// The node adopted `view`, or started voting towards it on timeout
    ViewChanged { view: u64 },
    /// A block was appended to the ledger
    Committed {
        height: u64,
        tx_count: usize,
        change_cycle: u64,
    },
    /// A round with a pending proposal timed out
    TimedOut { pending_tx_count: usize },
    /// This node leads the next height. The filter holds transactions
    /// already packed in the block being agreed upon.
    NotifyNextLeaderReset { tx_filter: HashSet<Hash> },
}

type ViewChangeHook = Arc<dyn Fn() + Send + Sync>;
type CommitHook = Arc<dyn Fn(u64, usize, u64) + Send + Sync>;
type TimeoutHook = Arc<dyn Fn(usize) + Send + Sync>;
type NextLeaderHook = Arc<dyn Fn(&HashSet<Hash>) + Send + Sync>;

/// Registered callbacks
#[derive(Clone, Default)]
pub struct Hooks {
    view_change: Vec<ViewChangeHook>,
    commit: Vec<CommitHook>,
    timeout: Vec<TimeoutHook>,
    next_leader: Vec<NextLeaderHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_view_change(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.view_change.push(Arc::new(f));
    }

    /// `f(height, tx_count, change_cycle)`
    pub fn on_commit(&mut self, f: impl Fn(u64, usize, u64) + Send + Sync + 'static) {
        self.commit.push(Arc::new(f));
    }

    /// `f(pending_tx_count)`
    pub fn on_timeout(&mut self, f: impl Fn(usize) + Send + Sync + 'static) {
        self.timeout.push(Arc::new(f));
    }

    pub fn on_notify_next_leader_reset(
        &mut self,
        f: impl Fn(&HashSet<Hash>) + Send + Sync + 'static,
    ) {
        self.next_leader.push(Arc::new(f));
    }

    pub fn dispatch(&self, event: &ConsensusEvent) {
        match event {
            ConsensusEvent::ViewChanged { .. } => self.view_change.iter().for_each(|f| f()),
            ConsensusEvent::Committed {
                height,
                tx_count,
                change_cycle,
            } => self
                .commit
                .iter()
                .for_each(|f| f(*height, *tx_count, *change_cycle)),
            ConsensusEvent::TimedOut { pending_tx_count } => {
                self.timeout.iter().for_each(|f| f(*pending_tx_count))
            }
            ConsensusEvent::NotifyNextLeaderReset { tx_filter } => {
                self.next_leader.iter().for_each(|f| f(tx_filter))
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("view_change", &self.view_change.len())
            .field("commit", &self.commit.len())
            .field("timeout", &self.timeout.len())
            .field("next_leader", &self.next_leader.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_dispatch_routes_by_event() {
        let commits = Arc::new(AtomicU64::new(0));
        let views = Arc::new(AtomicU64::new(0));
        let mut hooks = Hooks::new();
        {
            let commits = commits.clone();
            hooks.on_commit(move |height, _, _| {
                commits.fetch_add(height, Ordering::SeqCst);
            });
        }
        {
            let views = views.clone();
            hooks.on_view_change(move || {
                views.fetch_add(1, Ordering::SeqCst);
            });
        }

        hooks.dispatch(&ConsensusEvent::Committed {
            height: 5,
            tx_count: 1,
            change_cycle: 0,
        });
        hooks.dispatch(&ConsensusEvent::ViewChanged { view: 1 });
        hooks.dispatch(&ConsensusEvent::TimedOut {
            pending_tx_count: 3,
        });

        assert_eq!(commits.load(Ordering::SeqCst), 5);
        assert_eq!(views.load(Ordering::SeqCst), 1);
    }
}
