//! Core state store traits, record codecs, and key layout

use agoranet_core::{
    Address, AgoranetError, AgoranetResult, Hash, StateMutator, StateProvider, StateRoot,
    StateVersion,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted user record
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserRecord {
    pub id: u64,
    pub address: Address,
    pub name: String,
    pub bio: String,
    pub profile_image_hash: String,
}

impl UserRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> AgoranetResult<Self> {
        bincode::deserialize(bytes).map_err(|e| AgoranetError::DeserializationError(e.to_string()))
    }
}

/// Persisted post record
///
/// Soft-deleted posts keep their slot: content and img_hash are cleared and
/// author is the zero sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: u64,
    pub author: Address,
    pub content: String,
    pub img_hash: String,
    pub timestamp: u64,
    pub upvotes: u64,
    pub downvotes: u64,
}

impl PostRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> AgoranetResult<Self> {
        bincode::deserialize(bytes).map_err(|e| AgoranetError::DeserializationError(e.to_string()))
    }
}

/// Persisted comment record, keyed by (post_id, comment_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub post_id: u64,
    pub comment_id: u64,
    pub author: Address,
    pub content: String,
    pub timestamp: u64,
    pub likes_count: u64,
    /// Liker list kept alongside the counter for enumeration
    pub likers: Vec<Address>,
}

impl CommentRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> AgoranetResult<Self> {
        bincode::deserialize(bytes).map_err(|e| AgoranetError::DeserializationError(e.to_string()))
    }
}

/// State entry for root computation and snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StateEntry {
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.key);
        hasher.update(&self.value);
        Hash(*hasher.finalize().as_bytes())
    }
}

/// Compute a merkle root over leaf hashes
fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut hasher = blake3::Hasher::new();
            hasher.update(pair[0].as_bytes());
            // Odd leaf is paired with itself
            hasher.update(pair.get(1).unwrap_or(&pair[0]).as_bytes());
            next.push(Hash(*hasher.finalize().as_bytes()));
        }
        level = next;
    }
    level[0]
}

/// Compute state root from entries
pub fn compute_state_root(entries: &[StateEntry]) -> StateRoot {
    if entries.is_empty() {
        return Hash::ZERO;
    }

    // Sort entries by key for deterministic ordering
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let leaves: Vec<Hash> = sorted.iter().map(|e| e.hash()).collect();
    merkle_root(&leaves)
}

/// State diff between two versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    pub from_version: StateVersion,
    pub to_version: StateVersion,
    pub added: BTreeMap<Vec<u8>, Vec<u8>>,
    pub removed: Vec<Vec<u8>>,
}

impl StateDiff {
    pub fn new(from_version: StateVersion, to_version: StateVersion) -> Self {
        Self {
            from_version,
            to_version,
            added: BTreeMap::new(),
            removed: Vec::new(),
        }
    }

    pub fn add(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.added.insert(key, value);
    }

    pub fn remove(&mut self, key: Vec<u8>) {
        self.removed.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Flag value for vote/like/eligibility markers
pub const FLAG_SET: &[u8] = &[1u8];

/// Abstract state store interface
#[async_trait]
pub trait StateStore: StateProvider + StateMutator {
    /// Get a user record by id
    async fn get_user(&self, id: u64) -> AgoranetResult<Option<UserRecord>> {
        match self.get(&user_key(id)).await? {
            Some(bytes) => Ok(Some(UserRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a post record by id
    async fn get_post(&self, id: u64) -> AgoranetResult<Option<PostRecord>> {
        match self.get(&post_key(id)).await? {
            Some(bytes) => Ok(Some(PostRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a comment record by (post_id, comment_id)
    async fn get_comment(
        &self,
        post_id: u64,
        comment_id: u64,
    ) -> AgoranetResult<Option<CommentRecord>> {
        match self.get(&comment_key(post_id, comment_id)).await? {
            Some(bytes) => Ok(Some(CommentRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check a vote flag
    async fn has_vote_flag(&self, voter: &Address, post_id: u64) -> AgoranetResult<bool> {
        self.exists(&vote_key(voter, post_id)).await
    }

    /// Get all entries for root computation and index rebuilds
    async fn all_entries(&self) -> AgoranetResult<Vec<StateEntry>>;

    /// Compute current state root
    async fn compute_root(&self) -> AgoranetResult<StateRoot> {
        let entries = self.all_entries().await?;
        Ok(compute_state_root(&entries))
    }

    /// Get diff between versions
    async fn diff(&self, from_version: StateVersion) -> AgoranetResult<StateDiff>;
}

// ============ Key layout ============
//
// Sequential ids are encoded big-endian so lexicographic key order matches
// id order, which keeps the primary records append-only under iteration.

const USER_PREFIX: &[u8] = b"user:";
const POST_PREFIX: &[u8] = b"post:";
const COMMENT_PREFIX: &[u8] = b"comment:";
const VOTE_PREFIX: &[u8] = b"vote:";
const LIKE_PREFIX: &[u8] = b"like:";
const ELIGIBLE_PREFIX: &[u8] = b"eligible:";
const TREASURY_KEY: &[u8] = b"meta:treasury";
const ADMIN_KEY: &[u8] = b"meta:admin";

/// Build user key
pub fn user_key(id: u64) -> Vec<u8> {
    let mut key = USER_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Parse user key
pub fn parse_user_key(key: &[u8]) -> Option<u64> {
    parse_id_key(key, USER_PREFIX)
}

/// Build post key
pub fn post_key(id: u64) -> Vec<u8> {
    let mut key = POST_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Parse post key
pub fn parse_post_key(key: &[u8]) -> Option<u64> {
    parse_id_key(key, POST_PREFIX)
}

/// Build comment key
pub fn comment_key(post_id: u64, comment_id: u64) -> Vec<u8> {
    let mut key = COMMENT_PREFIX.to_vec();
    key.extend_from_slice(&post_id.to_be_bytes());
    key.extend_from_slice(&comment_id.to_be_bytes());
    key
}

/// Parse comment key into (post_id, comment_id)
pub fn parse_comment_key(key: &[u8]) -> Option<(u64, u64)> {
    let rest = key.strip_prefix(COMMENT_PREFIX)?;
    if rest.len() != 16 {
        return None;
    }
    let post_id = u64::from_be_bytes(rest[..8].try_into().ok()?);
    let comment_id = u64::from_be_bytes(rest[8..].try_into().ok()?);
    Some((post_id, comment_id))
}

/// Build vote flag key
pub fn vote_key(voter: &Address, post_id: u64) -> Vec<u8> {
    let mut key = VOTE_PREFIX.to_vec();
    key.extend_from_slice(voter.as_bytes());
    key.extend_from_slice(&post_id.to_be_bytes());
    key
}

/// Parse vote flag key into (voter, post_id)
pub fn parse_vote_key(key: &[u8]) -> Option<(Address, u64)> {
    let rest = key.strip_prefix(VOTE_PREFIX)?;
    if rest.len() != 40 {
        return None;
    }
    let addr = Address::from_bytes(rest[..32].try_into().ok()?);
    let post_id = u64::from_be_bytes(rest[32..].try_into().ok()?);
    Some((addr, post_id))
}

/// Build like flag key
pub fn like_key(post_id: u64, comment_id: u64, liker: &Address) -> Vec<u8> {
    let mut key = LIKE_PREFIX.to_vec();
    key.extend_from_slice(&post_id.to_be_bytes());
    key.extend_from_slice(&comment_id.to_be_bytes());
    key.extend_from_slice(liker.as_bytes());
    key
}

/// Parse like flag key into (post_id, comment_id, liker)
pub fn parse_like_key(key: &[u8]) -> Option<(u64, u64, Address)> {
    let rest = key.strip_prefix(LIKE_PREFIX)?;
    if rest.len() != 48 {
        return None;
    }
    let post_id = u64::from_be_bytes(rest[..8].try_into().ok()?);
    let comment_id = u64::from_be_bytes(rest[8..16].try_into().ok()?);
    let addr = Address::from_bytes(rest[16..].try_into().ok()?);
    Some((post_id, comment_id, addr))
}

/// Build eligibility flag key
pub fn eligible_key(address: &Address) -> Vec<u8> {
    let mut key = ELIGIBLE_PREFIX.to_vec();
    key.extend_from_slice(address.as_bytes());
    key
}

/// Parse eligibility flag key
pub fn parse_eligible_key(key: &[u8]) -> Option<Address> {
    let rest = key.strip_prefix(ELIGIBLE_PREFIX)?;
    Some(Address::from_bytes(rest.try_into().ok()?))
}

/// Treasury balance key
pub fn treasury_key() -> Vec<u8> {
    TREASURY_KEY.to_vec()
}

/// Admin address key
pub fn admin_key() -> Vec<u8> {
    ADMIN_KEY.to_vec()
}

fn parse_id_key(key: &[u8], prefix: &[u8]) -> Option<u64> {
    let rest = key.strip_prefix(prefix)?;
    if rest.len() != 8 {
        return None;
    }
    Some(u64::from_be_bytes(rest.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_record_serialization() {
        let record = UserRecord {
            id: 3,
            address: Address([9u8; 32]),
            name: "alice".to_string(),
            bio: "hello".to_string(),
            profile_image_hash: "Qm123".to_string(),
        };
        let bytes = record.to_bytes();
        let restored = UserRecord::from_bytes(&bytes).unwrap();

        assert_eq!(record.id, restored.id);
        assert_eq!(record.name, restored.name);
        assert_eq!(record.address, restored.address);
    }

    #[test]
    fn test_key_roundtrips() {
        assert_eq!(parse_user_key(&user_key(7)), Some(7));
        assert_eq!(parse_post_key(&post_key(42)), Some(42));
        assert_eq!(parse_comment_key(&comment_key(1, 2)), Some((1, 2)));

        let addr = Address([5u8; 32]);
        assert_eq!(parse_vote_key(&vote_key(&addr, 9)), Some((addr, 9)));
        assert_eq!(
            parse_like_key(&like_key(3, 0, &addr)),
            Some((3, 0, addr))
        );
        assert_eq!(parse_eligible_key(&eligible_key(&addr)), Some(addr));
    }

    #[test]
    fn test_key_order_matches_id_order() {
        assert!(post_key(1) < post_key(2));
        assert!(post_key(9) < post_key(10));
        assert!(comment_key(0, 9) < comment_key(0, 10));
    }

    #[test]
    fn test_foreign_prefix_rejected() {
        assert_eq!(parse_user_key(&post_key(1)), None);
        assert_eq!(parse_post_key(b"garbage"), None);
    }

    #[test]
    fn test_state_root_deterministic() {
        let entries = vec![
            StateEntry {
                key: b"key1".to_vec(),
                value: b"value1".to_vec(),
            },
            StateEntry {
                key: b"key2".to_vec(),
                value: b"value2".to_vec(),
            },
        ];

        let root1 = compute_state_root(&entries);
        let root2 = compute_state_root(&entries);
        assert_eq!(root1, root2);

        // Order-insensitive: sorting happens inside
        let reversed = vec![entries[1].clone(), entries[0].clone()];
        assert_eq!(compute_state_root(&reversed), root1);
    }
}
