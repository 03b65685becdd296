//! File-backed storage
//!
//! Two files in a directory:
//! - `state` - the persisted record (JSON) with a trailing checksum
//! - `snapshot` - the most recent snapshot (JSON) with a trailing checksum
//!
//! Every write goes to a temp file, is fsynced, and is renamed into place, so
//! a reader sees either the old record or the complete new one. The checksum
//! catches torn writes that slip past the rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{PersistedState, Snapshot, Storage, StorageError};

/// CRC32 (IEEE polynomial) over a byte slice.
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for byte in data {
        crc ^= *byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Storage backed by checksummed files with atomic-rename writes.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (or create) a storage directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileStorage { dir })
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("state")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("snapshot")
    }

    /// Write `{json}\n{crc32_hex}\n` to a temp file, fsync, rename into place.
    fn write_record(&self, path: &Path, json: &str) -> Result<(), StorageError> {
        let checksum = crc32(json.as_bytes());
        let content = format!("{}\n{:08x}\n", json, checksum);

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Read a record back, verifying the checksum. `None` if the file does
    /// not exist yet.
    fn read_record(&self, path: &Path) -> Result<Option<String>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();
        let (Some(json), Some(checksum_line)) = (lines.next(), lines.next()) else {
            return Err(StorageError::Corruption(format!(
                "{}: missing checksum line",
                path.display()
            )));
        };
        let stored = u32::from_str_radix(checksum_line.trim(), 16).map_err(|_| {
            StorageError::Corruption(format!("{}: malformed checksum", path.display()))
        })?;
        let computed = crc32(json.as_bytes());
        if stored != computed {
            return Err(StorageError::Corruption(format!(
                "{}: checksum mismatch (stored {:08x}, computed {:08x})",
                path.display(),
                stored,
                computed
            )));
        }
        Ok(Some(json.to_string()))
    }
}

impl Storage for FileStorage {
    fn load_state(&self) -> Result<Option<PersistedState>, StorageError> {
        match self.read_record(&self.state_path())? {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Corruption(format!("state record: {}", e))),
        }
    }

    fn save_state(&mut self, state: &PersistedState) -> Result<(), StorageError> {
        let json = serde_json::to_string(state)
            .map_err(|e| StorageError::Corruption(format!("state encode: {}", e)))?;
        self.write_record(&self.state_path(), &json)
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StorageError> {
        match self.read_record(&self.snapshot_path())? {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Corruption(format!("snapshot record: {}", e))),
        }
    }

    fn save_state_and_snapshot(
        &mut self,
        state: &PersistedState,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        // Snapshot lands first. If the process dies before the state record
        // follows, recovery sees the new snapshot with the old hard state and
        // snapshot install raises commit/applied to the boundary, which is
        // indistinguishable from the fully new pair.
        let snap_json = serde_json::to_string(snapshot)
            .map_err(|e| StorageError::Corruption(format!("snapshot encode: {}", e)))?;
        self.write_record(&self.snapshot_path(), &snap_json)?;
        self.save_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log::LogEntry;
    use crate::storage::HardState;

    fn record(term: u64, commit: u64, entries: Vec<LogEntry>) -> PersistedState {
        PersistedState {
            hard: HardState { term, voted_for: Some(1), commit },
            log_length: entries.last().map(|e| e.index).unwrap_or(0),
            entries,
        }
    }

    fn entry(term: u64, index: u64) -> LogEntry {
        LogEntry { term, index, data_index: index, command: Some(vec![index as u8]) }
    }

    #[test]
    fn test_fresh_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.load_state().unwrap().is_none());
        assert!(storage.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        let state = record(4, 2, vec![entry(1, 1), entry(4, 2), entry(4, 3)]);
        storage.save_state(&state).unwrap();

        // A new handle over the same directory sees the identical record.
        let reopened = FileStorage::new(dir.path()).unwrap();
        assert_eq!(reopened.load_state().unwrap().unwrap(), state);
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_state(&record(1, 0, vec![])).unwrap();
        storage.save_state(&record(2, 1, vec![entry(2, 1)])).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.hard.term, 2);
        assert_eq!(loaded.entries.len(), 1);
    }

    #[test]
    fn test_state_and_snapshot_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        let snapshot = Snapshot { index: 3, term: 2, data: b"payload".to_vec() };
        storage
            .save_state_and_snapshot(&record(2, 3, vec![entry(2, 4)]), &snapshot)
            .unwrap();

        let reopened = FileStorage::new(dir.path()).unwrap();
        assert_eq!(reopened.load_snapshot().unwrap().unwrap(), snapshot);
        let state = reopened.load_state().unwrap().unwrap();
        assert_eq!(state.hard.commit, 3);
        assert_eq!(state.entries[0].index, 4);
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.save_state(&record(1, 0, vec![])).unwrap();

        // Flip bytes in the stored JSON without fixing the checksum.
        let path = dir.path().join("state");
        let mangled = fs::read_to_string(&path).unwrap().replace("\"term\":1", "\"term\":9");
        fs::write(&path, mangled).unwrap();

        assert!(matches!(storage.load_state(), Err(StorageError::Corruption(_))));
    }
}
