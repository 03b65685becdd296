//! In-memory storage for tests
//!
//! No disk I/O and nothing survives a drop, which is exactly what unit tests
//! want.

use super::{PersistedState, Snapshot, Storage, StorageError};

/// Storage that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Option<PersistedState>,
    snapshot: Option<Snapshot>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn load_state(&self) -> Result<Option<PersistedState>, StorageError> {
        Ok(self.state.clone())
    }

    fn save_state(&mut self, state: &PersistedState) -> Result<(), StorageError> {
        self.state = Some(state.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.snapshot.clone())
    }

    fn save_state_and_snapshot(
        &mut self,
        state: &PersistedState,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        self.state = Some(state.clone());
        self.snapshot = Some(snapshot.clone());
        Ok(())
    }
}
