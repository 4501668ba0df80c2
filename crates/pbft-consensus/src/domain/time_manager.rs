//! Timeout and backoff bookkeeping
//!
//! Pure calculator: every method takes `now` (unix millis) from the caller,
//! so the engine's [`TimeSource`](crate::ports::TimeSource) stays the only
//! clock.

/// Weight of the newest sample in the per-transaction execution average
const EXEC_AVG_WEIGHT: u64 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeManager {
    pub last_consensus_time: u64,
    pub last_sign_time: u64,
    pub last_exec_finish_time: u64,
    /// Backoff exponent applied to `view_timeout`
    pub change_cycle: u64,
    pub view_timeout: u64,
    pub max_change_cycle: u64,
    /// Rolling average execution cost per transaction (microseconds)
    avg_tx_exec_us: u64,
}

impl TimeManager {
    pub fn new(view_timeout: u64, max_change_cycle: u64) -> Self {
        Self {
            last_consensus_time: 0,
            last_sign_time: 0,
            last_exec_finish_time: 0,
            change_cycle: 0,
            view_timeout,
            max_change_cycle,
            avg_tx_exec_us: 0,
        }
    }

    /// Start the timeout window at `now`.
    pub fn init(&mut self, now: u64) {
        self.last_consensus_time = now;
        self.last_sign_time = 0;
        self.change_cycle = 0;
    }

    /// Current timeout window: `view_timeout * 1.5^change_cycle`.
    pub fn timeout_window(&self) -> u64 {
        let factor = 1.5f64.powi(self.change_cycle.min(i32::MAX as u64) as i32);
        (self.view_timeout as f64 * factor) as u64
    }

    pub fn is_timeout(&self, now: u64) -> bool {
        let last = self.last_consensus_time.max(self.last_sign_time);
        now.saturating_sub(last) >= self.timeout_window()
    }

    /// Zero the window start so the next [`is_timeout`](Self::is_timeout)
    /// fires straight away.
    pub fn change_view(&mut self) {
        self.last_consensus_time = 0;
        self.last_sign_time = 0;
    }

    pub fn update_change_cycle(&mut self) {
        if self.change_cycle < self.max_change_cycle {
            self.change_cycle += 1;
        }
    }

    /// Record a finished block execution.
    pub fn record_execution(&mut self, tx_count: usize, elapsed_us: u64, now: u64) {
        self.last_exec_finish_time = now;
        if tx_count == 0 {
            return;
        }
        let per_tx = (elapsed_us / tx_count as u64).max(1);
        self.avg_tx_exec_us = if self.avg_tx_exec_us == 0 {
            per_tx
        } else {
            (self.avg_tx_exec_us * (EXEC_AVG_WEIGHT - 1) + per_tx) / EXEC_AVG_WEIGHT
        };
    }

    pub fn avg_tx_exec_us(&self) -> u64 {
        self.avg_tx_exec_us
    }

    /// Advisory cap on transactions for the next proposal.
    ///
    /// The remaining part of the current window (block interval at view 0,
    /// view timeout otherwise) divided by the average cost per transaction,
    /// clamped to `1..=default_cap`.
    pub fn max_packable_tx_count(
        &self,
        default_cap: u64,
        view: u64,
        block_interval: u64,
        now: u64,
    ) -> u64 {
        if self.avg_tx_exec_us == 0 {
            return default_cap;
        }
        let window = if view == 0 {
            block_interval
        } else {
            self.view_timeout
        };
        let start = self.last_consensus_time.max(self.last_exec_finish_time);
        let remaining_ms = window.saturating_sub(now.saturating_sub(start));
        let count = remaining_ms.saturating_mul(1_000) / self.avg_tx_exec_us;
        count.clamp(1, default_cap.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_window_backoff() {
        let mut tm = TimeManager::new(1_000, 20);
        assert_eq!(tm.timeout_window(), 1_000);
        tm.update_change_cycle();
        assert_eq!(tm.timeout_window(), 1_500);
        tm.update_change_cycle();
        assert_eq!(tm.timeout_window(), 2_250);
    }

    #[test]
    fn test_is_timeout_uses_latest_activity() {
        let mut tm = TimeManager::new(1_000, 20);
        tm.init(10_000);
        assert!(!tm.is_timeout(10_999));
        assert!(tm.is_timeout(11_000));

        tm.last_sign_time = 10_800;
        assert!(!tm.is_timeout(11_000));
        assert!(tm.is_timeout(11_800));
    }

    #[test]
    fn test_change_view_forces_timeout() {
        let mut tm = TimeManager::new(1_000, 20);
        tm.init(50_000);
        tm.change_view();
        assert!(tm.is_timeout(50_001));
    }

    #[test]
    fn test_change_cycle_is_capped() {
        let mut tm = TimeManager::new(1_000, 3);
        for _ in 0..10 {
            tm.update_change_cycle();
        }
        assert_eq!(tm.change_cycle, 3);
    }

    #[test]
    fn test_max_packable_tx_count() {
        let mut tm = TimeManager::new(3_000, 20);
        assert_eq!(tm.max_packable_tx_count(1_000, 0, 1_000, 0), 1_000);

        // 100 txs in 100ms: 1ms per transaction
        tm.init(0);
        tm.record_execution(100, 100_000, 0);
        assert_eq!(tm.avg_tx_exec_us(), 1_000);
        assert_eq!(tm.max_packable_tx_count(1_000, 0, 1_000, 400), 600);
        assert_eq!(tm.max_packable_tx_count(1_000, 0, 1_000, 5_000), 1);
        assert_eq!(tm.max_packable_tx_count(1_000, 1, 1_000, 0), 1_000);
        assert_eq!(tm.max_packable_tx_count(100, 1, 1_000, 0), 100);
    }
}
