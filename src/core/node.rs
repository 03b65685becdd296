//! The Raft state machine
//!
//! Term and role bookkeeping, the election protocol (with a pre-vote round),
//! log replication with conflict resolution, quorum commit, snapshot
//! installation, and the persistence triggers that make it crash-safe.
//!
//! Every method here runs with the node's lock held; the driver loop in
//! `server` and the transport glue are the only callers. Handlers return
//! structured replies for every protocol disagreement; persistence failure is
//! the one fatal condition.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::RaftConfig;
use super::log::{LogEntry, RaftLog};
use super::messages::{
    AppendKind, AppendReply, AppendRequest, ApplyMsg, ReplyKind, SnapshotRequest, VoteReply,
    VoteRequest,
};
use crate::storage::{HardState, PersistedState, Storage};

/// Role of a node within its current term. Only the `become_*` transition
/// functions produce these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Passive: answers RPCs, waits out its election timer
    Follower,
    /// Probing electability in a non-binding pre-vote round
    PreCandidate,
    /// Campaigning for real in an incremented term
    Candidate,
    /// Replicating its log to the cluster
    Leader,
}

/// A message queued for one peer's sender task.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    Vote(VoteRequest),
    Append(AppendRequest),
    Snapshot(SnapshotRequest),
}

/// A single Raft peer's consensus state machine.
pub struct RaftNode {
    id: u64,
    /// The other members of the cluster
    peers: Vec<u64>,
    role: Role,
    term: u64,
    voted_for: Option<u64>,
    leader: Option<u64>,
    log: RaftLog,
    /// Replication cursors; meaningful only while leader
    progress: HashMap<u64, super::progress::PeerProgress>,
    /// Votes received in the current campaign, by peer
    votes: HashMap<u64, bool>,
    storage: Box<dyn Storage>,
    /// Last durably written hard state, for dirty tracking
    persisted: HardState,
    apply_tx: mpsc::UnboundedSender<ApplyMsg>,
    /// Per-peer outbound queues, owned by the sender tasks on the other end
    outbound: HashMap<u64, mpsc::UnboundedSender<Outbound>>,

    last_heartbeat: Instant,
    last_election: Instant,
    /// Randomized timeout for campaigning
    election_timeout: Duration,
    /// Non-randomized window for leader liveness accounting and stickiness
    base_election_timeout: Duration,
    heartbeat_interval: Duration,
    /// Throttle for heartbeat-driven catch-up appends
    append_retry_interval: Duration,
}

impl RaftNode {
    /// Recover a node from storage and start it as a Follower with no known
    /// leader. A recovered snapshot is installed before any RPC can be
    /// served, and delivered to the application as its first message.
    pub fn new(
        id: u64,
        peers: Vec<u64>,
        storage: Box<dyn Storage>,
        apply_tx: mpsc::UnboundedSender<ApplyMsg>,
        config: &RaftConfig,
    ) -> Self {
        let recovered = storage.load_state().expect("failed to load raft state");
        let snapshot = storage.load_snapshot().expect("failed to load snapshot");

        let mut log = RaftLog::new();
        let (mut term, mut voted_for) = (0, None);
        if let Some(state) = recovered {
            term = state.hard.term;
            voted_for = state.hard.voted_for;
            log.restore(state.entries, state.hard.commit);
            info!(node = id, term, commit = log.commit(), "recovered persisted state");
        }
        let persisted = HardState { term, voted_for, commit: log.commit() };

        let mut node = RaftNode {
            id,
            peers,
            role: Role::Follower,
            term,
            voted_for,
            leader: None,
            log,
            progress: HashMap::new(),
            votes: HashMap::new(),
            storage,
            persisted,
            apply_tx,
            outbound: HashMap::new(),
            last_heartbeat: Instant::now(),
            last_election: Instant::now(),
            election_timeout: config.election_timeout_for(id),
            base_election_timeout: config.election_timeout,
            heartbeat_interval: config.heartbeat_interval,
            append_retry_interval: config.heartbeat_interval,
        };

        if let Some(snap) = snapshot {
            if node.log.install_snapshot(snap.clone()) {
                info!(node = id, index = snap.index, "recovered snapshot");
                let _ = node.apply_tx.send(ApplyMsg::Snapshot(snap));
            }
        }

        node
    }

    // === Accessors ===

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn voted_for(&self) -> Option<u64> {
        self.voted_for
    }

    pub fn leader(&self) -> Option<u64> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn log(&self) -> &RaftLog {
        &self.log
    }

    pub fn commit_index(&self) -> u64 {
        self.log.commit()
    }

    pub fn applied_index(&self) -> u64 {
        self.log.applied()
    }

    #[cfg(test)]
    pub(crate) fn peer_progress(&self, peer: u64) -> Option<&super::progress::PeerProgress> {
        self.progress.get(&peer)
    }

    // === Wiring ===

    /// Attach the outbound queue for one peer's sender task.
    pub(crate) fn connect_peer(&mut self, peer: u64, tx: mpsc::UnboundedSender<Outbound>) {
        self.outbound.insert(peer, tx);
    }

    /// Drop all outbound queues; sender tasks exit when their queue closes.
    pub(crate) fn disconnect_peers(&mut self) {
        self.outbound.clear();
    }

    /// Fire-and-forget enqueue to one peer. A missing or closed queue means
    /// the message is dropped; timers retransmit.
    fn send(&self, to: u64, msg: Outbound) {
        if let Some(tx) = self.outbound.get(&to) {
            let _ = tx.send(msg);
        }
    }

    // === Role transitions ===

    fn reset_timers(&mut self) {
        self.last_election = Instant::now();
        self.last_heartbeat = Instant::now();
    }

    fn become_follower(&mut self, term: u64, leader: Option<u64>) {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
        }
        self.role = Role::Follower;
        self.leader = leader;
        self.votes.clear();
        self.reset_timers();
        debug!(node = self.id, term = self.term, leader = ?leader, "became follower");
    }

    fn become_precandidate(&mut self) {
        self.role = Role::PreCandidate;
        self.leader = None;
        debug!(node = self.id, term = self.term, "became pre-candidate");
    }

    fn become_candidate(&mut self) {
        self.term += 1;
        self.voted_for = Some(self.id);
        self.role = Role::Candidate;
        self.leader = None;
        self.reset_timers();
        info!(node = self.id, term = self.term, "became candidate");
    }

    fn become_leader(&mut self) {
        let last = self.log.last_index();
        for &peer in &self.peers {
            self.progress.insert(peer, super::progress::PeerProgress::new(last + 1));
        }
        self.role = Role::Leader;
        self.leader = Some(self.id);
        self.reset_timers();
        info!(node = self.id, term = self.term, "became leader");

        // No-op entry so the commit index can move into this term: a leader
        // never commits a prior-term entry by counting replicas alone.
        let noop = LogEntry {
            term: self.term,
            index: last + 1,
            data_index: self.log.last_data_index(),
            command: None,
        };
        self.log.append(noop);
        self.broadcast_append();
    }

    /// Adopt the sender of a valid append-stream message as leader.
    fn follow_leader(&mut self, from: u64) {
        self.role = Role::Follower;
        self.leader = Some(from);
        self.last_election = Instant::now();
    }

    fn quorum(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    // === Election ===

    /// Start a campaign: a pre-vote round first, then, if that wins, the real
    /// vote in an incremented term.
    fn campaign(&mut self, prevote: bool) {
        let term = if prevote {
            self.become_precandidate();
            self.term + 1
        } else {
            self.become_candidate();
            self.term
        };
        self.votes.clear();
        self.votes.insert(self.id, true);

        let req = VoteRequest {
            from: self.id,
            term,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
            prevote,
        };
        debug!(node = self.id, term, prevote, "starting campaign");
        for &peer in &self.peers {
            self.send(peer, Outbound::Vote(req.clone()));
        }
        self.check_votes();
    }

    /// Handle RequestVote / RequestPrevote. Persists any vote or term change
    /// before the reply is returned.
    pub fn handle_vote_request(&mut self, req: &VoteRequest) -> VoteReply {
        let reply = self.process_vote(req);
        self.maybe_persist();
        reply
    }

    fn process_vote(&mut self, req: &VoteRequest) -> VoteReply {
        let id = self.id;
        let prevote = req.prevote;
        let deny = move |term| VoteReply { from: id, term, granted: false, prevote };

        if req.term < self.term {
            debug!(node = self.id, term = self.term, from = req.from, "rejecting vote from stale term");
            return deny(self.term);
        }
        if req.term > self.term {
            // Leader stickiness: while we believe a leader is alive, refuse
            // to endorse a challenger. Suppresses disruptive elections from
            // nodes rejoining after a partition.
            if self.leader.is_some() && self.last_election.elapsed() < self.base_election_timeout {
                debug!(node = self.id, from = req.from, "suppressing vote, leader is alive");
                return deny(self.term);
            }
            // A pre-vote is speculative and never moves our term.
            if !req.prevote {
                self.become_follower(req.term, None);
            }
        }

        let up_to_date = self.log.is_up_to_date(req.last_log_index, req.last_log_term);
        let free_to_vote = (self.leader.is_none() && self.voted_for.is_none())
            || self.voted_for == Some(req.from)
            || (req.prevote && req.term > self.term);

        if up_to_date && free_to_vote {
            if !req.prevote {
                self.voted_for = Some(req.from);
                // Do not immediately challenge the candidate we just endorsed.
                self.last_election = Instant::now();
            }
            debug!(node = self.id, term = req.term, to = req.from, prevote = req.prevote, "granting vote");
            VoteReply { from: self.id, term: req.term, granted: true, prevote: req.prevote }
        } else {
            debug!(node = self.id, to = req.from, up_to_date, "denying vote");
            deny(self.term)
        }
    }

    /// Handle an asynchronous vote reply delivered by a peer's sender task.
    pub fn handle_vote_reply(&mut self, reply: &VoteReply) {
        // A granted pre-vote carries the proposed (future) term; any other
        // reply with a greater term deposes us.
        if reply.term > self.term && !(reply.prevote && reply.granted) {
            self.become_follower(reply.term, None);
            self.maybe_persist();
            return;
        }

        let campaigning = matches!(
            (self.role, reply.prevote),
            (Role::PreCandidate, true) | (Role::Candidate, false)
        );
        if !campaigning {
            debug!(node = self.id, from = reply.from, "ignoring vote reply, not campaigning");
            return;
        }
        if reply.term < self.term {
            return; // stale reply from an earlier campaign
        }

        self.votes.insert(reply.from, reply.granted);
        self.check_votes();
        self.maybe_persist();
    }

    /// Tally the current campaign; a quorum of grants wins, a quorum of
    /// denials reverts to follower.
    fn check_votes(&mut self) {
        let grants = self.votes.values().filter(|g| **g).count();
        let denies = self.votes.len() - grants;
        let quorum = self.quorum();

        if grants >= quorum {
            if self.role == Role::PreCandidate {
                info!(node = self.id, term = self.term, "pre-vote won, starting real campaign");
                self.campaign(false);
            } else if self.role == Role::Candidate {
                self.become_leader();
            }
        } else if denies >= quorum {
            info!(node = self.id, term = self.term, "campaign rejected by quorum");
            self.become_follower(self.term, None);
        }
    }

    // === Replication: follower side ===

    fn check_append_term(&mut self, term: u64) -> bool {
        if term > self.term {
            self.become_follower(term, None);
            return true;
        }
        term == self.term
    }

    fn reject_append(&self, kind: ReplyKind, matched: u64) -> AppendReply {
        AppendReply { from: self.id, term: self.term, kind, success: false, matched }
    }

    /// Handle AppendEntries / Heartbeat. Persists before the reply is
    /// returned and delivers any newly committed entries afterward.
    pub fn handle_append_request(&mut self, req: &AppendRequest) -> AppendReply {
        let kind = match req.kind {
            AppendKind::Entries => ReplyKind::Entries,
            AppendKind::Heartbeat => ReplyKind::Heartbeat,
        };
        if !self.check_append_term(req.term) {
            debug!(node = self.id, term = self.term, from = req.from, "rejecting append from stale term");
            return self.reject_append(kind, 0);
        }

        self.follow_leader(req.from);
        let reply = match req.kind {
            AppendKind::Heartbeat => self.handle_heartbeat(req),
            AppendKind::Entries => self.handle_entries(req),
        };
        self.deliver_committed();
        self.maybe_persist();
        reply
    }

    fn handle_heartbeat(&mut self, req: &AppendRequest) -> AppendReply {
        if self.log.maybe_commit(req.leader_commit) {
            debug!(node = self.id, commit = self.log.commit(), "commit advanced by heartbeat");
        }
        AppendReply {
            from: self.id,
            term: self.term,
            kind: ReplyKind::Heartbeat,
            success: true,
            matched: self.log.last_index(),
        }
    }

    fn handle_entries(&mut self, req: &AppendRequest) -> AppendReply {
        let last_index = self.log.last_index();
        if req.prev_log_index > last_index {
            debug!(
                node = self.id,
                prev = req.prev_log_index,
                last = last_index,
                "probe beyond log, asking leader to back off to commit"
            );
            return self.reject_append(ReplyKind::Entries, self.log.commit());
        }

        if !self.log.match_index_and_term(req.prev_log_index, req.prev_log_term) {
            // Backoff hint: one before the probe point, unless we are far
            // enough behind that reporting our commit index converges faster.
            let hint = if last_index > self.log.commit() + 2 {
                self.log.commit()
            } else {
                req.prev_log_index.saturating_sub(1)
            };
            debug!(node = self.id, prev = req.prev_log_index, hint, "log mismatch, rejecting append");
            return self.reject_append(ReplyKind::Entries, hint);
        }

        let last_new = req.prev_log_index + req.entries.len() as u64;
        let conflict = self.log.find_conflict(&req.entries);
        if conflict != 0 {
            if conflict <= self.log.commit() {
                warn!(
                    node = self.id,
                    conflict,
                    commit = self.log.commit(),
                    "append would truncate committed entries, rejecting"
                );
                return self.reject_append(ReplyKind::Entries, self.log.commit());
            }
            let skip = (conflict - req.prev_log_index - 1) as usize;
            for e in &req.entries[skip..] {
                self.log.append(e.clone());
            }
        }

        self.log.maybe_commit(req.leader_commit.min(last_new));
        AppendReply {
            from: self.id,
            term: self.term,
            kind: ReplyKind::Entries,
            success: true,
            matched: last_new,
        }
    }

    /// Handle InstallSnapshot. The new snapshot and hard state are persisted
    /// as one unit before the reply or the apply message become visible.
    pub fn handle_snapshot_request(&mut self, req: &SnapshotRequest) -> AppendReply {
        if !self.check_append_term(req.term) {
            debug!(node = self.id, term = self.term, from = req.from, "rejecting snapshot from stale term");
            return self.reject_append(ReplyKind::Snapshot, 0);
        }

        self.follow_leader(req.from);
        let snap = req.snapshot.clone();
        if self.log.install_snapshot(snap.clone()) {
            self.persist_with_snapshot();
            info!(node = self.id, index = snap.index, "installed snapshot from leader");
            let _ = self.apply_tx.send(ApplyMsg::Snapshot(snap));
            AppendReply {
                from: self.id,
                term: self.term,
                kind: ReplyKind::Snapshot,
                success: true,
                matched: self.log.snapshot_index(),
            }
        } else {
            debug!(node = self.id, index = req.snapshot.index, "rejecting stale snapshot");
            self.maybe_persist();
            self.reject_append(ReplyKind::Snapshot, self.log.commit())
        }
    }

    // === Replication: leader side ===

    /// Handle an append/heartbeat/snapshot reply delivered by a sender task.
    pub fn handle_append_reply(&mut self, reply: &AppendReply) {
        if reply.term > self.term {
            self.become_follower(reply.term, None);
            self.maybe_persist();
            return;
        }
        if reply.term < self.term || self.role != Role::Leader {
            return;
        }

        let last_index = self.log.last_index();
        let retry = self.append_retry_interval;
        let Some(pr) = self.progress.get_mut(&reply.from) else {
            return;
        };
        pr.active = true;

        let mut resend = false;
        let mut advance = false;
        match reply.kind {
            ReplyKind::Heartbeat => {
                // Catch the peer up if it trails us, throttled per peer.
                if pr.matched < last_index && pr.pass_append_timeout(retry) {
                    resend = true;
                }
            }
            ReplyKind::Snapshot => {
                // On ack the peer holds the boundary; on a stale-snapshot
                // rejection it reports its commit, which is at least as far.
                // Resume appends there either way. `matched` moves only on
                // real append acks.
                if pr.next <= reply.matched {
                    pr.next = reply.matched + 1;
                }
            }
            ReplyKind::Entries => {
                if reply.success {
                    if pr.matched < reply.matched {
                        pr.matched = reply.matched;
                        pr.next = reply.matched + 1;
                    }
                    advance = true;
                } else if reply.matched + 1 < pr.next {
                    debug!(node = self.id, peer = reply.from, hint = reply.matched, "append rejected, backing off");
                    pr.next = reply.matched + 1;
                    resend = true;
                }
            }
        }

        if resend {
            self.send_append(reply.from);
        }
        if advance {
            self.maybe_advance_commit();
        }
        self.maybe_persist();
    }

    /// Advance the commit index to the quorum-confirmed point: matchIndex of
    /// every member (the leader counts its own last index), sorted ascending,
    /// taken at rank ⌊N/2⌋.
    fn maybe_advance_commit(&mut self) {
        let mut matches: Vec<u64> = self
            .peers
            .iter()
            .map(|p| self.progress.get(p).map(|pr| pr.matched).unwrap_or(0))
            .collect();
        matches.push(self.log.last_index());
        matches.sort_unstable();

        let quorum_rank = (self.peers.len() + 1) / 2;
        if self.log.maybe_commit(matches[quorum_rank]) {
            info!(node = self.id, commit = self.log.commit(), "commit index advanced by quorum");
            self.deliver_committed();
        }
    }

    /// Send the peer whatever it needs next: a snapshot when its cursor falls
    /// inside our compacted prefix, an entry batch otherwise.
    fn send_append(&mut self, peer: u64) {
        let Some(pr) = self.progress.get_mut(&peer) else {
            return;
        };
        pr.note_append();
        let next = pr.next;

        if let Some(snap) = self.log.snapshot() {
            if next <= snap.index {
                debug!(node = self.id, peer, index = snap.index, "peer is behind snapshot, sending snapshot");
                let msg = SnapshotRequest { from: self.id, term: self.term, snapshot: snap.clone() };
                self.send(peer, Outbound::Snapshot(msg));
                return;
            }
        }

        let (entries, prev) = if next > self.log.last_index() {
            (Vec::new(), self.log.last_index())
        } else {
            (self.log.entries_from(next).to_vec(), next - 1)
        };
        let req = AppendRequest {
            from: self.id,
            term: self.term,
            kind: AppendKind::Entries,
            prev_log_index: prev,
            prev_log_term: self.log.term(prev).unwrap_or(0),
            entries,
            leader_commit: self.log.commit(),
        };
        self.send(peer, Outbound::Append(req));
    }

    fn broadcast_append(&mut self) {
        for peer in self.peers.clone() {
            self.send_append(peer);
        }
        self.last_heartbeat = Instant::now();
    }

    /// Empty probes carrying a per-peer clamped commit index, so a follower
    /// never learns a commit point beyond what it has acknowledged.
    fn broadcast_heartbeat(&mut self) {
        let commit = self.log.commit();
        let targets: Vec<(u64, u64)> = self
            .peers
            .iter()
            .map(|p| (*p, self.progress.get(p).map(|pr| pr.matched.min(commit)).unwrap_or(0)))
            .collect();
        for (peer, clamped) in targets {
            let req = AppendRequest {
                from: self.id,
                term: self.term,
                kind: AppendKind::Heartbeat,
                prev_log_index: 0,
                prev_log_term: 0,
                entries: Vec::new(),
                leader_commit: clamped,
            };
            self.send(peer, Outbound::Append(req));
        }
    }

    // === Commit & apply ===

    /// Deliver committed-but-unapplied entries to the application, in order.
    /// No-op entries are skipped but still advance the applied boundary,
    /// which tracks the commit boundary exactly after each pass.
    fn deliver_committed(&mut self) {
        if self.log.applied() >= self.log.commit() {
            return;
        }
        let msgs: Vec<ApplyMsg> = self
            .log
            .unapplied()
            .filter_map(|e| {
                e.command.as_ref().map(|c| ApplyMsg::Command {
                    command: c.clone(),
                    command_index: e.data_index,
                    log_index: e.index,
                })
            })
            .collect();
        for msg in msgs {
            let _ = self.apply_tx.send(msg);
        }
        self.log.advance_applied_to_commit();
    }

    // === Client operations ===

    /// Start agreement on a command. Non-blocking: the entry is appended and
    /// broadcast, with no guarantee it ever commits. Returns the assigned
    /// command sequence number, the current term, and whether this node is
    /// leader (when false, nothing was appended).
    pub fn propose(&mut self, command: Vec<u8>) -> (u64, u64, bool) {
        if self.role != Role::Leader {
            return (self.log.last_data_index(), self.term, false);
        }
        let data_index = self.log.last_data_index() + 1;
        let entry = LogEntry {
            term: self.term,
            index: self.log.last_index() + 1,
            data_index,
            command: Some(command),
        };
        debug!(node = self.id, index = entry.index, data_index, "proposing command");
        self.log.append(entry);
        self.broadcast_append();
        self.maybe_persist();
        (data_index, self.term, true)
    }

    /// Compact the log on behalf of the application, which asserts it has
    /// durably incorporated everything up to `through_index`.
    pub fn request_snapshot(&mut self, payload: Vec<u8>, through_index: u64) -> bool {
        if through_index <= self.log.snapshot_index() || through_index > self.log.applied() {
            return false;
        }
        let Some(term) = self.log.term(through_index) else {
            return false;
        };
        let snap = super::snapshot::Snapshot { index: through_index, term, data: payload };
        if !self.log.install_snapshot(snap) {
            return false;
        }
        self.persist_with_snapshot();
        info!(node = self.id, index = through_index, "log compacted at application request");
        true
    }

    // === Timers ===

    /// Periodic driver step: leaders account liveness and heartbeat,
    /// everyone else watches the election timer.
    pub fn tick(&mut self) {
        match self.role {
            Role::Leader => self.tick_leader(),
            _ => self.tick_follower(),
        }
        self.maybe_persist();
    }

    fn tick_leader(&mut self) {
        if self.last_election.elapsed() >= self.base_election_timeout {
            self.last_election = Instant::now();
            self.check_quorum();
        } else if self.last_heartbeat.elapsed() >= self.heartbeat_interval {
            self.last_heartbeat = Instant::now();
            self.broadcast_heartbeat();
        }
    }

    fn tick_follower(&mut self) {
        if self.last_election.elapsed() >= self.election_timeout {
            self.last_election = Instant::now();
            self.campaign(true);
        }
    }

    /// A leader that could not reach a majority within its election timeout
    /// steps down; a partitioned leader must not believe itself authoritative
    /// forever.
    fn check_quorum(&mut self) {
        let mut live = 1; // self
        for pr in self.progress.values_mut() {
            if pr.active {
                live += 1;
            }
            pr.active = false;
        }
        if live < self.quorum() {
            warn!(node = self.id, term = self.term, live, "lost contact with quorum, stepping down");
            self.become_follower(self.term, None);
        }
    }

    // === Persistence ===

    /// Durably write the persisted record if {term, votedFor, commitIndex}
    /// changed since the last write. The log tail rides along in the same
    /// record. A failed write is fatal.
    fn maybe_persist(&mut self) {
        let hard = HardState { term: self.term, voted_for: self.voted_for, commit: self.log.commit() };
        if hard == self.persisted {
            return;
        }
        let record = PersistedState {
            hard,
            log_length: self.log.last_index(),
            entries: self.log.tail().to_vec(),
        };
        self.storage.save_state(&record).expect("failed to persist raft state");
        self.persisted = hard;
    }

    /// Write the record and the freshly installed snapshot as one unit.
    fn persist_with_snapshot(&mut self) {
        let hard = HardState { term: self.term, voted_for: self.voted_for, commit: self.log.commit() };
        let record = PersistedState {
            hard,
            log_length: self.log.last_index(),
            entries: self.log.tail().to_vec(),
        };
        let snapshot = self.log.snapshot().expect("snapshot just installed").clone();
        self.storage
            .save_state_and_snapshot(&record, &snapshot)
            .expect("failed to persist snapshot");
        self.persisted = hard;
    }
}
