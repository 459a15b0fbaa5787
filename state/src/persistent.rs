//! Persistent state store using sled database
//!
//! The persistence engine is a black box to the ledger: everything above
//! this file sees only the key-value `StateStore` contract.

use agoranet_core::{
    AgoranetError, AgoranetResult, StateChange, StateMutator, StateProvider, StateVersion,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::path::Path;
use tracing::info;

use crate::store::{StateDiff, StateEntry, StateStore};

const STATE_TREE: &str = "state";
const META_TREE: &str = "meta";
const HISTORY_TREE: &str = "history";
const VERSION_KEY: &[u8] = b"version";

/// Persistent state store backed by sled
pub struct PersistentStateStore {
    db: Db,
    state: Tree,
    meta: Tree,
    history: Tree,
    version: RwLock<StateVersion>,
}

impl PersistentStateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> AgoranetResult<Self> {
        let db = sled::open(&path).map_err(|e| AgoranetError::StorageError(e.to_string()))?;

        let state = db
            .open_tree(STATE_TREE)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        let meta = db
            .open_tree(META_TREE)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        let history = db
            .open_tree(HISTORY_TREE)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;

        // Load version from disk or start at 0
        let version = match meta
            .get(VERSION_KEY)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?
        {
            Some(bytes) => {
                let v = u64::from_le_bytes(bytes.as_ref().try_into().unwrap_or([0; 8]));
                StateVersion::new(v)
            }
            None => StateVersion::new(0),
        };

        info!(
            "Opened persistent state store at {:?}, version {}",
            path.as_ref(),
            version
        );

        Ok(Self {
            db,
            state,
            meta,
            history,
            version: RwLock::new(version),
        })
    }

    fn persist_version(&self, version: StateVersion) -> AgoranetResult<()> {
        self.meta
            .insert(VERSION_KEY, &version.0.to_le_bytes())
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn persist_diff(&self, diff: &StateDiff) -> AgoranetResult<()> {
        let bytes = bincode::serialize(diff)?;
        self.history
            .insert(diff.to_version.0.to_be_bytes(), bytes)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(())
    }

    /// Flush to disk
    pub fn flush(&self) -> AgoranetResult<()> {
        self.db
            .flush()
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl StateProvider for PersistentStateStore {
    async fn version(&self) -> StateVersion {
        *self.version.read()
    }

    async fn get(&self, key: &[u8]) -> AgoranetResult<Option<Vec<u8>>> {
        let value = self
            .state
            .get(key)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn exists(&self, key: &[u8]) -> AgoranetResult<bool> {
        let exists = self
            .state
            .contains_key(key)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(exists)
    }
}

#[async_trait]
impl StateMutator for PersistentStateStore {
    async fn set(&self, key: &[u8], value: &[u8]) -> AgoranetResult<()> {
        self.state
            .insert(key, value)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> AgoranetResult<()> {
        self.state
            .remove(key)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn apply_batch(&self, changes: Vec<StateChange>) -> AgoranetResult<StateVersion> {
        let old_version = *self.version.read();
        let new_version = old_version.next();
        let mut diff = StateDiff::new(old_version, new_version);

        // One sled batch per ledger mutation keeps the primary record and
        // its flags atomic with respect to crashes.
        let mut batch = sled::Batch::default();
        for change in changes {
            match change {
                StateChange::Set { key, value } => {
                    diff.add(key.clone(), value.clone());
                    batch.insert(key, value);
                }
                StateChange::Delete { key } => {
                    diff.remove(key.clone());
                    batch.remove(key);
                }
            }
        }

        self.state
            .apply_batch(batch)
            .map_err(|e| AgoranetError::StorageError(e.to_string()))?;

        self.persist_diff(&diff)?;
        self.persist_version(new_version)?;
        *self.version.write() = new_version;

        Ok(new_version)
    }
}

#[async_trait]
impl StateStore for PersistentStateStore {
    async fn all_entries(&self) -> AgoranetResult<Vec<StateEntry>> {
        let mut entries = Vec::new();
        for item in self.state.iter() {
            let (key, value) = item.map_err(|e| AgoranetError::StorageError(e.to_string()))?;
            entries.push(StateEntry {
                key: key.to_vec(),
                value: value.to_vec(),
            });
        }
        Ok(entries)
    }

    async fn diff(&self, from_version: StateVersion) -> AgoranetResult<StateDiff> {
        let current_version = *self.version.read();
        let mut combined = StateDiff::new(from_version, current_version);

        for item in self.history.iter() {
            let (_, bytes) = item.map_err(|e| AgoranetError::StorageError(e.to_string()))?;
            let diff: StateDiff = bincode::deserialize(&bytes)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persistent_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStateStore::open(dir.path()).unwrap();

        store.set(b"key1", b"value1").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), Some(b"value1".to_vec()));

        store.delete(b"key1").await.unwrap();
        assert_eq!(store.get(b"key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = PersistentStateStore::open(dir.path()).unwrap();
            store
                .apply_batch(vec![StateChange::Set {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                }])
                .await
                .unwrap();
            store.flush().unwrap();
        }

        let reopened = PersistentStateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.version().await.0, 1);
        assert_eq!(reopened.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_batch_is_atomic_in_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStateStore::open(dir.path()).unwrap();

        store
            .apply_batch(vec![
                StateChange::Set {
                    key: b"k1".to_vec(),
                    value: b"v1".to_vec(),
                },
                StateChange::Set {
                    key: b"k2".to_vec(),
                    value: b"v2".to_vec(),
                },
            ])
            .await
            .unwrap();

        let entries = store.all_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
