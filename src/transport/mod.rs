//! Transport abstraction for Raft RPCs
//!
//! The transport is a collaborator, not part of the consensus core: it must
//! deliver a request to the addressed node's handler and hand the reply (or a
//! failure) back to the caller. Loss, duplication, and reordering are all
//! allowed; the protocol's timers are the only retry mechanism.

pub mod inmemory;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::messages::{AppendReply, AppendRequest, SnapshotRequest, VoteReply, VoteRequest};

pub use inmemory::{InMemoryTransport, Network};

/// Errors a transport can report to the sending side. All of them are
/// silently dropped by the sender; the protocol retries on its own schedule.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection to peer failed")]
    ConnectionFailed,
    #[error("request timed out")]
    Timeout,
    #[error("no such node")]
    NodeNotFound,
}

/// Delivers Raft RPCs between nodes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a RequestVote / RequestPrevote RPC to a peer.
    async fn request_vote(&self, target: u64, req: VoteRequest) -> Result<VoteReply, TransportError>;

    /// Send an AppendEntries / Heartbeat RPC to a peer.
    async fn append_entries(
        &self,
        target: u64,
        req: AppendRequest,
    ) -> Result<AppendReply, TransportError>;

    /// Send an InstallSnapshot RPC to a peer.
    async fn install_snapshot(
        &self,
        target: u64,
        req: SnapshotRequest,
    ) -> Result<AppendReply, TransportError>;
}
