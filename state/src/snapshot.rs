//! State snapshot functionality
//!
//! Snapshots carry the complete entry set, which is sufficient to rebuild
//! every derived index: the ledger reconstructs its maps from the primary
//! records on load.

use agoranet_core::{AgoranetResult, StateRoot, StateVersion};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryStateStore;
use crate::store::{compute_state_root, StateEntry, StateStore};

/// A complete state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Version at time of snapshot
    pub version: StateVersion,
    /// State root hash
    pub root: StateRoot,
    /// All state entries
    pub entries: Vec<StateEntry>,
    /// Timestamp of snapshot creation (seconds since epoch)
    pub timestamp: u64,
}

impl StateSnapshot {
    /// Create a new snapshot from entries
    pub fn new(version: StateVersion, entries: Vec<StateEntry>) -> Self {
        let root = compute_state_root(&entries);
        Self {
            version,
            root,
            entries,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Create a snapshot from any state store
    pub async fn from_store<S: StateStore>(store: &S) -> AgoranetResult<Self> {
        let version = store.version().await;
        let entries = store.all_entries().await?;
        Ok(Self::new(version, entries))
    }

    /// Verify snapshot integrity
    pub fn verify(&self) -> bool {
        compute_state_root(&self.entries) == self.root
    }

    /// Restore snapshot to a memory store
    pub fn restore(&self) -> MemoryStateStore {
        let data: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect();
        MemoryStateStore::with_data(data)
    }

    /// Serialize snapshot for export
    pub fn to_json(&self) -> AgoranetResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize an exported snapshot
    pub fn from_json(json: &str) -> AgoranetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agoranet_core::StateMutator;

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let store = MemoryStateStore::new();
        store.set(b"k1", b"v1").await.unwrap();
        store.set(b"k2", b"v2").await.unwrap();

        let snapshot = StateSnapshot::from_store(&store).await.unwrap();
        assert!(snapshot.verify());

        let restored = snapshot.restore();
        assert_eq!(
            agoranet_core::StateProvider::get(&restored, b"k1")
                .await
                .unwrap(),
            Some(b"v1".to_vec())
        );
    }

    #[tokio::test]
    async fn test_snapshot_json_export() {
        let store = MemoryStateStore::new();
        store.set(b"k", b"v").await.unwrap();

        let snapshot = StateSnapshot::from_store(&store).await.unwrap();
        let json = snapshot.to_json().unwrap();
        let parsed = StateSnapshot::from_json(&json).unwrap();

        assert!(parsed.verify());
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.root, snapshot.root);
    }

    #[test]
    fn test_tampered_snapshot_fails_verify() {
        let mut snapshot = StateSnapshot::new(
            StateVersion::new(1),
            vec![StateEntry {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            }],
        );
        snapshot.entries[0].value = b"tampered".to_vec();
        assert!(!snapshot.verify());
    }
}
