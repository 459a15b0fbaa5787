//! Identity registry - user records and username uniqueness
//!
//! Users are stored as append-only records keyed by sequential id. The
//! address and name indices are derived views, rebuilt from the primary
//! records on load and updated only together with a primary write.

use agoranet_core::{Address, AgoranetError, AgoranetResult, StateChange, UserId};
use agoranet_state::{parse_user_key, user_key, StateStore, UserRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// User information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub address: Address,
    pub name: String,
    pub bio: String,
    pub profile_image_hash: String,
}

impl User {
    pub fn from_record(record: UserRecord) -> Self {
        Self {
            id: UserId::new(record.id),
            address: record.address,
            name: record.name,
            bio: record.bio,
            profile_image_hash: record.profile_image_hash,
        }
    }

    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            id: self.id.0,
            address: self.address,
            name: self.name.clone(),
            bio: self.bio.clone(),
            profile_image_hash: self.profile_image_hash.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Primary user array, indexed by sequential id
    users: Vec<User>,
    /// Derived: address → user id
    by_address: HashMap<Address, UserId>,
    /// Derived: username → user id
    by_name: HashMap<String, UserId>,
}

/// Identity registry for AGORANET users
pub struct IdentityRegistry<S: StateStore> {
    state: Arc<S>,
    inner: RwLock<Inner>,
}

impl<S: StateStore + 'static> IdentityRegistry<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Rebuild the primary array and both indices from stored records
    pub async fn load(&self) -> AgoranetResult<()> {
        let entries = self.state.all_entries().await?;
        let mut records: Vec<UserRecord> = Vec::new();

        for entry in entries {
            if parse_user_key(&entry.key).is_some() {
                records.push(UserRecord::from_bytes(&entry.value)?);
            }
        }
        records.sort_by_key(|r| r.id);

        let mut inner = self.inner.write();
        inner.users.clear();
        inner.by_address.clear();
        inner.by_name.clear();

        for record in records {
            let user = User::from_record(record);
            if user.id.0 != inner.users.len() as u64 {
                return Err(AgoranetError::StateCorruption(format!(
                    "user id gap: expected {}, found {}",
                    inner.users.len(),
                    user.id.0
                )));
            }
            inner.by_address.insert(user.address, user.id);
            inner.by_name.insert(user.name.clone(), user.id);
            inner.users.push(user);
        }

        info!("Identity registry loaded {} users", inner.users.len());
        Ok(())
    }

    /// Register a new user
    ///
    /// Fails with `UsernameTaken` if the name is already indexed and with
    /// `UserAlreadyRegistered` if the address already has an identity. Ids
    /// are sequential from 0 and never reused.
    pub async fn register(
        &self,
        address: Address,
        name: &str,
        bio: &str,
        image_hash: &str,
    ) -> AgoranetResult<UserId> {
        let user = {
            let inner = self.inner.read();
            if inner.by_name.contains_key(name) {
                return Err(AgoranetError::UsernameTaken(name.to_string()));
            }
            if inner.by_address.contains_key(&address) {
                return Err(AgoranetError::UserAlreadyRegistered(address.to_hex()));
            }
            User {
                id: UserId::new(inner.users.len() as u64),
                address,
                name: name.to_string(),
                bio: bio.to_string(),
                profile_image_hash: image_hash.to_string(),
            }
        };

        self.state
            .apply_batch(vec![StateChange::Set {
                key: user_key(user.id.0),
                value: user.to_record().to_bytes(),
            }])
            .await?;

        let id = user.id;
        let mut inner = self.inner.write();
        inner.by_address.insert(user.address, id);
        inner.by_name.insert(user.name.clone(), id);
        inner.users.push(user);

        debug!("Registered {} as '{}'", address, name);
        Ok(id)
    }

    /// Change a registered user's name
    ///
    /// The uniqueness check is literal: a new name that is indexed at all is
    /// rejected, including the caller's own current name.
    pub async fn change_username(&self, address: Address, new_name: &str) -> AgoranetResult<()> {
        let (user, old_name) = {
            let inner = self.inner.read();
            let id = *inner
                .by_address
                .get(&address)
                .ok_or_else(|| AgoranetError::UserNotFound(address.to_hex()))?;
            if inner.by_name.contains_key(new_name) {
                return Err(AgoranetError::UsernameTaken(new_name.to_string()));
            }
            let mut user = inner.users[id.0 as usize].clone();
            let old_name = std::mem::replace(&mut user.name, new_name.to_string());
            (user, old_name)
        };

        self.state
            .apply_batch(vec![StateChange::Set {
                key: user_key(user.id.0),
                value: user.to_record().to_bytes(),
            }])
            .await?;

        // Old binding removed and new one inserted under one lock
        let mut inner = self.inner.write();
        inner.by_name.remove(&old_name);
        inner.by_name.insert(new_name.to_string(), user.id);
        let idx = user.id.0 as usize;
        inner.users[idx] = user;

        debug!("Renamed {} '{}' -> '{}'", address, old_name, new_name);
        Ok(())
    }

    /// Look up a user by address
    pub fn resolve(&self, address: &Address) -> Option<User> {
        let inner = self.inner.read();
        inner
            .by_address
            .get(address)
            .map(|id| inner.users[id.0 as usize].clone())
    }

    /// Look up a user by name
    pub fn resolve_by_name(&self, name: &str) -> Option<User> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(name)
            .map(|id| inner.users[id.0 as usize].clone())
    }

    /// Whether an address has a registered identity
    pub fn is_registered(&self, address: &Address) -> bool {
        self.inner.read().by_address.contains_key(address)
    }

    /// Number of registered users
    pub fn user_count(&self) -> u64 {
        self.inner.read().users.len() as u64
    }

    /// Snapshot of all users, in id order
    pub fn all_users(&self) -> Vec<User> {
        self.inner.read().users.clone()
    }
}
