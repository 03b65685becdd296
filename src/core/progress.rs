//! Leader-side replication cursor, one per peer

use tokio::time::{Duration, Instant};

/// Where a single peer stands, as seen by the leader. Reset wholesale each
/// time this node wins an election.
#[derive(Debug, Clone)]
pub struct PeerProgress {
    /// Next log index to send to this peer
    pub next: u64,
    /// Highest index confirmed replicated on this peer (a lower bound)
    pub matched: u64,
    /// Whether the peer acknowledged anything in the current liveness round
    pub active: bool,
    /// Last time an entry batch was pushed to this peer
    last_append: Instant,
}

impl PeerProgress {
    pub fn new(next: u64) -> Self {
        PeerProgress {
            next,
            matched: 0,
            active: false,
            last_append: Instant::now(),
        }
    }

    /// Throttle for heartbeat-driven catch-up: returns true (and stamps the
    /// send time) when at least `interval` has passed since the last push.
    pub fn pass_append_timeout(&mut self, interval: Duration) -> bool {
        if self.last_append.elapsed() >= interval {
            self.note_append();
            true
        } else {
            false
        }
    }

    /// Record that an append or snapshot was just dispatched.
    pub fn note_append(&mut self) {
        self.last_append = Instant::now();
    }
}
