//! Raft timing configuration

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Timing parameters for a Raft node.
///
/// Election timeouts are randomized per node to break split votes, but the
/// jitter is drawn from a generator seeded with the node id so a node's
/// timeout is stable across restarts and reproducible in tests.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Interval between leader heartbeats (default: 150ms)
    pub heartbeat_interval: Duration,
    /// Base election timeout; also the leader's liveness window (default: 600ms)
    pub election_timeout: Duration,
    /// Maximum node-dependent jitter added to the base timeout (default: 300ms)
    pub election_jitter: Duration,
    /// Driver-loop timer granularity (default: 40ms)
    pub tick_interval: Duration,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(150),
            election_timeout: Duration::from_millis(600),
            election_jitter: Duration::from_millis(300),
            tick_interval: Duration::from_millis(40),
        }
    }
}

impl RaftConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_election_timeout(mut self, base: Duration, jitter: Duration) -> Self {
        self.election_timeout = base;
        self.election_jitter = jitter;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// The randomized election timeout for a given node: base plus jitter
    /// derived deterministically from the node id.
    pub fn election_timeout_for(&self, node_id: u64) -> Duration {
        let jitter_ms = self.election_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.election_timeout;
        }
        let mut rng = StdRng::seed_from_u64(node_id);
        self.election_timeout + Duration::from_millis(rng.random_range(0..jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_deterministic_per_node() {
        let config = RaftConfig::default();
        assert_eq!(config.election_timeout_for(3), config.election_timeout_for(3));
    }

    #[test]
    fn test_timeout_within_jitter_bounds() {
        let config = RaftConfig::default();
        for id in 0..32 {
            let t = config.election_timeout_for(id);
            assert!(t >= config.election_timeout);
            assert!(t < config.election_timeout + config.election_jitter);
        }
    }

    #[test]
    fn test_zero_jitter() {
        let config = RaftConfig::default().with_election_timeout(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(config.election_timeout_for(7), Duration::from_millis(100));
    }
}
