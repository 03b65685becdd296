//! Durable storage for Raft persistent state
//!
//! Raft must write {term, votedFor, commitIndex} and the log tail to stable
//! storage before any effect of a change becomes visible to a peer or the
//! application. The whole record is written in one call so an implementation
//! can make it atomic.

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::log::LogEntry;
use crate::core::snapshot::Snapshot;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// The durable {term, votedFor, commitIndex} triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub voted_for: Option<u64>,
    pub commit: u64,
}

/// The full record written on every hard-state change: the triple plus the
/// log tail since the last snapshot, so uncommitted entries survive a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub hard: HardState,
    /// Total log length (including the snapshot prefix) at write time
    pub log_length: u64,
    /// Entries after the snapshot boundary
    pub entries: Vec<LogEntry>,
}

/// Errors surfaced by storage implementations.
///
/// A failed write is fatal to the node: crash-safety can no longer be
/// guaranteed, so the node must stop serving rather than carry on.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    Corruption(String),
}

/// Storage contract for Raft persistent state.
///
/// Writes must be durable before returning. All operations are synchronous;
/// the node lock already serializes callers. `Send` is required because the
/// node lives inside an async task.
pub trait Storage: Send {
    /// Load the persisted record, or `None` on first boot.
    fn load_state(&self) -> Result<Option<PersistedState>, StorageError>;

    /// Durably replace the persisted record.
    fn save_state(&mut self, state: &PersistedState) -> Result<(), StorageError>;

    /// Load the most recent snapshot, or `None` if none was ever saved.
    fn load_snapshot(&self) -> Result<Option<Snapshot>, StorageError>;

    /// Durably write the record and a snapshot as one unit: after a crash,
    /// recovery must never observe a half-installed pair.
    fn save_state_and_snapshot(
        &mut self,
        state: &PersistedState,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError>;
}
