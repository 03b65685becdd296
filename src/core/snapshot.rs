//! Snapshot type for compacted log prefixes
//!
//! A snapshot summarizes every log entry up to and including `index`.
//! Once installed it is owned by the log; superseded snapshots are dropped.

use serde::{Deserialize, Serialize};

/// A compacted representation of the log prefix `1..=index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last log index covered by this snapshot
    pub index: u64,
    /// Term of the entry at `index`
    pub term: u64,
    /// Opaque application payload
    pub data: Vec<u8>,
}
