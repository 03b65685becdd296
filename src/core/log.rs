//! In-memory Raft log
//!
//! Pure data-structure logic: an ordered run of entries starting right after
//! the last snapshot, plus the commit/applied boundaries. No I/O happens here;
//! the node decides when the log's state must be persisted.

use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// A single replicated log entry.
///
/// `index` is 1-based and contiguous. `data_index` is the application-visible
/// command sequence number: it only advances for entries that carry a command,
/// so no-op entries keep the previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term in which the entry was created by a leader
    pub term: u64,
    /// Position in the log (1-based)
    pub index: u64,
    /// Application-visible command sequence number
    pub data_index: u64,
    /// Opaque command; `None` marks a no-op placeholder
    pub command: Option<Vec<u8>>,
}

impl LogEntry {
    /// Whether this entry carries a command for the application.
    pub fn is_valid(&self) -> bool {
        self.command.is_some()
    }
}

/// The log proper: entries since the last snapshot plus commit/applied state.
#[derive(Debug, Default)]
pub struct RaftLog {
    /// Entries after the snapshot boundary, contiguous by index
    entries: Vec<LogEntry>,
    /// Most recent installed snapshot, if any
    snapshot: Option<Snapshot>,
    /// Highest index known committed
    commit: u64,
    /// Highest index delivered to the application
    applied: u64,
    /// Highest command sequence number ever appended; never reset
    last_data_index: u64,
}

impl RaftLog {
    pub fn new() -> Self {
        RaftLog::default()
    }

    /// Rebuild the log from a recovered tail and persisted commit index.
    /// The applied boundary restarts at zero; installing the recovered
    /// snapshot (if any) moves it forward again.
    pub fn restore(&mut self, entries: Vec<LogEntry>, commit: u64) {
        self.last_data_index = entries.iter().map(|e| e.data_index).max().unwrap_or(0);
        self.entries = entries;
        self.commit = commit;
        self.applied = 0;
    }

    /// Index of the first entry held in memory.
    pub fn first_index(&self) -> u64 {
        match &self.snapshot {
            Some(s) => s.index + 1,
            None => 1,
        }
    }

    /// Index of the last entry (the snapshot boundary if the tail is empty).
    pub fn last_index(&self) -> u64 {
        match self.entries.last() {
            Some(e) => e.index,
            None => self.snapshot.as_ref().map(|s| s.index).unwrap_or(0),
        }
    }

    /// Term of the last entry (the snapshot term if the tail is empty).
    pub fn last_term(&self) -> u64 {
        match self.entries.last() {
            Some(e) => e.term,
            None => self.snapshot.as_ref().map(|s| s.term).unwrap_or(0),
        }
    }

    pub fn commit(&self) -> u64 {
        self.commit
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn snapshot_index(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.index).unwrap_or(0)
    }

    pub fn snapshot_term(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.term).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Highest command sequence number ever assigned.
    pub fn last_data_index(&self) -> u64 {
        self.last_data_index
    }

    /// Entries held in memory (the tail since the snapshot), for persistence.
    pub fn tail(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Look up the entry at `index`, if it is in the in-memory tail.
    pub fn entry(&self, index: u64) -> Option<&LogEntry> {
        if index < self.first_index() {
            return None;
        }
        let pos = (index - self.first_index()) as usize;
        self.entries.get(pos)
    }

    /// Term of the entry at `index`; knows about the snapshot boundary and
    /// treats index 0 as the empty-log origin.
    pub fn term(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        if let Some(s) = &self.snapshot {
            if index == s.index {
                return Some(s.term);
            }
            if index < s.index {
                return None;
            }
        }
        self.entry(index).map(|e| e.term)
    }

    /// True iff an entry exists at `index` with exactly `term`.
    /// Index 0 is the universal match point.
    pub fn match_index_and_term(&self, index: u64, term: u64) -> bool {
        index == 0 || self.term(index) == Some(term)
    }

    /// Scan a candidate suffix against the local log. Returns 0 when every
    /// supplied entry already matches by (index, term); otherwise the lowest
    /// index whose term differs or which is absent — the truncation point.
    pub fn find_conflict(&self, entries: &[LogEntry]) -> u64 {
        for e in entries {
            if !self.match_index_and_term(e.index, e.term) {
                return e.index;
            }
        }
        0
    }

    /// Overwrite or extend the log at `entry.index`. Everything at and above
    /// that index is discarded first. The caller is responsible for never
    /// truncating at or below the commit index.
    pub fn append(&mut self, entry: LogEntry) {
        let first = self.first_index();
        if entry.index < first {
            return; // already covered by the snapshot
        }
        let pos = (entry.index - first) as usize;
        debug_assert!(pos <= self.entries.len(), "append would leave a gap");
        self.entries.truncate(pos);
        self.last_data_index = self.last_data_index.max(entry.data_index);
        self.entries.push(entry);
    }

    /// The slice of entries with index >= `from`, for replication.
    pub fn entries_from(&self, from: u64) -> &[LogEntry] {
        let first = self.first_index();
        if from < first {
            return &self.entries;
        }
        let pos = (from - first) as usize;
        if pos >= self.entries.len() {
            return &[];
        }
        &self.entries[pos..]
    }

    /// Vote-eligibility comparator: a candidate's log is at least as up to
    /// date as ours iff its last term is strictly newer, or the terms are
    /// equal and its last index is no shorter.
    pub fn is_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        last_log_term > self.last_term()
            || (last_log_term == self.last_term() && last_log_index >= self.last_index())
    }

    /// Advance the commit index to `min(index, last_index)` if that is an
    /// advance. The commit index never regresses.
    pub fn maybe_commit(&mut self, index: u64) -> bool {
        let target = index.min(self.last_index());
        if target > self.commit {
            self.commit = target;
            true
        } else {
            false
        }
    }

    /// Entries in `(applied, commit]`, in index order.
    pub fn unapplied(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        let lo = self.applied.max(self.snapshot_index());
        (lo + 1..=self.commit).filter_map(move |i| self.entry(i))
    }

    /// Snap the applied boundary up to the commit boundary after a delivery
    /// pass. The boundary never regresses.
    pub fn advance_applied_to_commit(&mut self) {
        if self.commit > self.applied {
            self.applied = self.commit;
        }
    }

    /// Install a snapshot, discarding every entry at or below its index and
    /// raising commit/applied to at least the boundary. A snapshot that is
    /// not newer than the current one is rejected.
    pub fn install_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.index <= self.snapshot_index() {
            return false;
        }
        self.entries.retain(|e| e.index > snapshot.index);
        if self.commit < snapshot.index {
            self.commit = snapshot.index;
        }
        if self.applied < snapshot.index {
            self.applied = snapshot.index;
        }
        self.snapshot = Some(snapshot);
        true
    }
}
