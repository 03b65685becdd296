//! RPC message types and the apply-channel message
//!
//! Only logical fields are defined here; framing is the transport's problem.
//! Replies are tagged with the kind of request they answer so the leader can
//! tell a heartbeat acknowledgement from a replication acknowledgement.

use serde::{Deserialize, Serialize};

use super::log::LogEntry;
use super::snapshot::Snapshot;

/// RequestVote / RequestPrevote arguments.
///
/// A pre-vote carries the term the candidate *would* campaign with but must
/// never cause the voter to mutate its persistent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Candidate asking for the vote
    pub from: u64,
    /// Candidate's term (proposed term for a pre-vote)
    pub term: u64,
    /// Index of the candidate's last log entry
    pub last_log_index: u64,
    /// Term of the candidate's last log entry
    pub last_log_term: u64,
    /// True for the non-binding pre-vote round
    pub prevote: bool,
}

/// RequestVote / RequestPrevote reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReply {
    /// Voter that produced this reply
    pub from: u64,
    /// The granted term, or the voter's current term on denial
    pub term: u64,
    /// Whether the vote was granted
    pub granted: bool,
    /// Echoes the round this reply belongs to
    pub prevote: bool,
}

/// What an append-stream message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendKind {
    /// A contiguous entry batch with its consistency check
    Entries,
    /// An empty probe carrying only the leader's commit index
    Heartbeat,
}

/// AppendEntries / Heartbeat arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    /// The sending leader
    pub from: u64,
    /// Leader's term
    pub term: u64,
    pub kind: AppendKind,
    /// Index of the entry immediately preceding `entries`
    pub prev_log_index: u64,
    /// Term of the entry at `prev_log_index`
    pub prev_log_term: u64,
    /// Entries to replicate; empty for a heartbeat
    pub entries: Vec<LogEntry>,
    /// Leader's commit index (per-peer clamped for heartbeats)
    pub leader_commit: u64,
}

/// Which request an [`AppendReply`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyKind {
    Entries,
    Heartbeat,
    Snapshot,
}

/// Reply to AppendEntries, Heartbeat, or InstallSnapshot.
///
/// On success `matched` is the highest index the receiver now confirms; on
/// rejection it is the backoff hint the leader should move `next` toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendReply {
    /// Responding follower
    pub from: u64,
    /// Responder's term
    pub term: u64,
    pub kind: ReplyKind,
    pub success: bool,
    /// Confirmed index on success, backoff hint on rejection
    pub matched: u64,
}

/// InstallSnapshot arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// The sending leader
    pub from: u64,
    /// Leader's term
    pub term: u64,
    pub snapshot: Snapshot,
}

/// One message on the delivery channel to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyMsg {
    /// A committed command, delivered exactly once and in order
    Command {
        command: Vec<u8>,
        /// Application-visible command sequence number
        command_index: u64,
        /// Raft log index the command was committed at
        log_index: u64,
    },
    /// A snapshot was just installed; the application should reset from it
    Snapshot(Snapshot),
}
