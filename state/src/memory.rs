//! In-memory state store for testing and ephemeral ledgers

use agoranet_core::{AgoranetResult, StateChange, StateMutator, StateProvider, StateVersion};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::store::{StateDiff, StateEntry, StateStore};

/// In-memory state store
pub struct MemoryStateStore {
    data: DashMap<Vec<u8>, Vec<u8>>,
    version: RwLock<StateVersion>,
    history: RwLock<Vec<StateDiff>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            version: RwLock::new(StateVersion::new(0)),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn with_data(data: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let store = Self::new();
        for (key, value) in data {
            store.data.insert(key, value);
        }
        store
    }

    /// Current entries, for synchronous snapshot export
    pub fn entries(&self) -> Vec<StateEntry> {
        self.data
            .iter()
            .map(|entry| StateEntry {
                key: entry.key().clone(),
                value: entry.value().clone(),
            })
            .collect()
    }

    /// Current version without going through the async trait
    pub fn current_version(&self) -> StateVersion {
        *self.version.read()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStateStore {
    fn clone(&self) -> Self {
        let new_store = Self::new();
        for entry in self.data.iter() {
            new_store
                .data
                .insert(entry.key().clone(), entry.value().clone());
        }
        *new_store.version.write() = *self.version.read();
        new_store
    }
}

#[async_trait]
impl StateProvider for MemoryStateStore {
    async fn version(&self) -> StateVersion {
        *self.version.read()
    }

    async fn get(&self, key: &[u8]) -> AgoranetResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn exists(&self, key: &[u8]) -> AgoranetResult<bool> {
        Ok(self.data.contains_key(key))
    }
}

#[async_trait]
impl StateMutator for MemoryStateStore {
    async fn set(&self, key: &[u8], value: &[u8]) -> AgoranetResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> AgoranetResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn apply_batch(&self, changes: Vec<StateChange>) -> AgoranetResult<StateVersion> {
        let old_version = *self.version.read();
        let mut diff = StateDiff::new(old_version, old_version.next());

        for change in changes {
            match change {
                StateChange::Set { key, value } => {
                    diff.add(key.clone(), value.clone());
                    self.data.insert(key, value);
                }
                StateChange::Delete { key } => {
                    diff.remove(key.clone());
                    self.data.remove(&key);
                }
            }
        }

        let new_version = old_version.next();
        *self.version.write() = new_version;
        self.history.write().push(diff);

        Ok(new_version)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn all_entries(&self) -> AgoranetResult<Vec<StateEntry>> {
        Ok(self.entries())
    }

    async fn diff(&self, from_version: StateVersion) -> AgoranetResult<StateDiff> {
        let history = self.history.read();
        let current_version = *self.version.read();

        let mut combined = StateDiff::new(from_version, current_version);

        for diff in history.iter() {
            if diff.from_version.0 >= from_version.0 {
                for (key, value) in &diff.added {
                    combined.add(key.clone(), value.clone());
                }
                for key in &diff.removed {
                    combined.remove(key.clone());
                }
            }
        }

        Ok(combined)
    }
}

/// Thread-safe memory store wrapper
pub type SharedMemoryStateStore = Arc<MemoryStateStore>;

/// Create a shared memory state store
pub fn create_memory_store() -> SharedMemoryStateStore {
    Arc::new(MemoryStateStore::new())
}
