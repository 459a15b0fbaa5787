//! Ledger service - top-level orchestration
//!
//! Binds the registry, content store, access policy, payment gate, treasury
//! and oracle into the public operation set. Every mutating operation runs
//! under the single writer gate, validates its preconditions in a fixed
//! order (existence, ownership, voting-state, payment) and only then
//! mutates, emitting one audit event on success. A failed precondition
//! leaves no partial writes and emits nothing.

use agoranet_core::{
    Address, AgoranetError, AgoranetResult, Amount, AuditEvent, CommentId, LedgerConfig, PostId,
    RateOracle, StateChange, TransferAgent, UserId,
};
use agoranet_state::{admin_key, eligible_key, parse_eligible_key, StateStore, FLAG_SET};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::access::{
    ensure_can_vote, ensure_comment_owner, ensure_post_owner, ensure_registered, AdminHandle,
};
use crate::content::{Comment, ContentStore, Post};
use crate::identity::{IdentityRegistry, User};
use crate::payment::{PaymentGate, Treasury};

/// Capacity of the audit event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// AGORANET ledger service
pub struct LedgerService<S: StateStore> {
    state: Arc<S>,
    registry: IdentityRegistry<S>,
    content: ContentStore<S>,
    admin: AdminHandle,
    gate: PaymentGate,
    treasury: Treasury<S>,
    oracle: Arc<dyn RateOracle>,
    transfer: Arc<dyn TransferAgent>,
    config: LedgerConfig,
    /// Users flagged by the eligibility scan
    eligible: RwLock<HashSet<Address>>,
    events: broadcast::Sender<AuditEvent>,
    journal: RwLock<Vec<AuditEvent>>,
    /// Serializes all state-changing operations
    write_gate: tokio::sync::Mutex<()>,
}

impl<S: StateStore + 'static> LedgerService<S> {
    pub fn new(
        state: Arc<S>,
        oracle: Arc<dyn RateOracle>,
        transfer: Arc<dyn TransferAgent>,
        config: LedgerConfig,
    ) -> AgoranetResult<Self> {
        let admin = config
            .admin_address()
            .map_err(|e| AgoranetError::ConfigError(format!("bad admin address: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            registry: IdentityRegistry::new(state.clone()),
            content: ContentStore::new(state.clone()),
            admin: AdminHandle::new(admin),
            gate: PaymentGate::new(config.payment.clone()),
            treasury: Treasury::new(state.clone()),
            state,
            oracle,
            transfer,
            config,
            eligible: RwLock::new(HashSet::new()),
            events,
            journal: RwLock::new(Vec::new()),
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Restore all components from the state store
    pub async fn load(&self) -> AgoranetResult<()> {
        self.registry.load().await?;
        self.content.load().await?;
        self.treasury.load().await?;

        // Admin may have been transferred after initialization
        if let Some(bytes) = self.state.get(&admin_key()).await? {
            let stored: [u8; 32] = bytes
                .try_into()
                .map_err(|_| AgoranetError::StateCorruption("bad admin record".to_string()))?;
            self.admin.transfer(Address::from_bytes(stored));
        }

        let mut eligible = HashSet::new();
        for entry in self.state.all_entries().await? {
            if let Some(address) = parse_eligible_key(&entry.key) {
                eligible.insert(address);
            }
        }
        *self.eligible.write() = eligible;

        info!("Ledger service loaded, admin {}", self.admin.current());
        Ok(())
    }

    // ============ Identity ============

    /// Register a new user; open to anyone
    pub async fn register(
        &self,
        actor: Address,
        name: &str,
        bio: &str,
        image_hash: &str,
    ) -> AgoranetResult<UserId> {
        let _guard = self.write_gate.lock().await;

        let user_id = self.registry.register(actor, name, bio, image_hash).await?;

        self.emit(AuditEvent::UserRegistered {
            user_id,
            address: actor,
            name: name.to_string(),
        });
        Ok(user_id)
    }

    /// Change the caller's username
    pub async fn change_username(&self, actor: Address, new_name: &str) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;
        self.registry.change_username(actor, new_name).await
    }

    // ============ Posts ============

    /// Create a post
    pub async fn create_post(
        &self,
        actor: Address,
        content: &str,
        img_hash: &str,
    ) -> AgoranetResult<PostId> {
        let _guard = self.write_gate.lock().await;

        ensure_registered(actor, self.registry.is_registered(&actor))?;
        let author_name = self.display_name(&actor);

        let post = self.content.create_post(actor, content, img_hash).await?;

        self.emit(AuditEvent::PostCreated {
            post_id: post.post_id,
            author: actor,
            author_name,
            timestamp: post.timestamp,
        });
        Ok(post.post_id)
    }

    /// Edit a post; owner only, payment gated
    pub async fn edit_post(
        &self,
        actor: Address,
        post_id: PostId,
        content: &str,
        img_hash: &str,
        payment: Amount,
    ) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        // existence -> ownership -> payment
        let post = self.content.post(post_id)?;
        ensure_post_owner(actor, post.author)?;
        self.charge(payment).await?;

        self.content.edit_post(post_id, content, img_hash).await?;
        self.treasury.credit(payment).await?;

        self.emit(AuditEvent::PostEdited {
            post_id,
            author: actor,
            author_name: self.display_name(&actor),
        });
        Ok(())
    }

    /// Soft-delete a post; owner only, payment gated
    pub async fn delete_post(
        &self,
        actor: Address,
        post_id: PostId,
        payment: Amount,
    ) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        let post = self.content.post(post_id)?;
        ensure_post_owner(actor, post.author)?;
        self.charge(payment).await?;

        self.content.delete_post(post_id).await?;
        self.treasury.credit(payment).await?;
        Ok(())
    }

    /// Upvote a post
    pub async fn upvote(&self, actor: Address, post_id: PostId) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        let post = self.content.post(post_id)?;
        ensure_registered(actor, self.registry.is_registered(&actor))?;
        ensure_can_vote(
            actor,
            post.author,
            self.content.has_voted(&actor, post_id),
            post_id,
        )?;

        let upvotes = self.content.record_upvote(actor, post_id).await?;

        self.emit(AuditEvent::Upvoted {
            post_id,
            voter: actor,
            voter_name: self.display_name(&actor),
            upvotes,
        });
        Ok(())
    }

    /// Downvote a post
    pub async fn downvote(&self, actor: Address, post_id: PostId) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        let post = self.content.post(post_id)?;
        ensure_registered(actor, self.registry.is_registered(&actor))?;
        ensure_can_vote(
            actor,
            post.author,
            self.content.has_voted(&actor, post_id),
            post_id,
        )?;

        let downvotes = self.content.record_downvote(actor, post_id).await?;

        self.emit(AuditEvent::Downvoted {
            post_id,
            voter: actor,
            voter_name: self.display_name(&actor),
            downvotes,
        });
        Ok(())
    }

    // ============ Comments ============

    /// Comment on a post
    pub async fn create_comment(
        &self,
        actor: Address,
        post_id: PostId,
        content: &str,
    ) -> AgoranetResult<CommentId> {
        let _guard = self.write_gate.lock().await;

        self.content.post(post_id)?;
        ensure_registered(actor, self.registry.is_registered(&actor))?;
        let author_name = self.display_name(&actor);

        let comment = self.content.create_comment(post_id, actor, content).await?;

        self.emit(AuditEvent::CommentCreated {
            post_id,
            comment_id: comment.comment_id,
            author: actor,
            author_name,
            timestamp: comment.timestamp,
        });
        Ok(comment.comment_id)
    }

    /// Edit a comment; owner only, payment gated
    pub async fn edit_comment(
        &self,
        actor: Address,
        post_id: PostId,
        comment_id: CommentId,
        content: &str,
        payment: Amount,
    ) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        let comment = self.content.comment(post_id, comment_id)?;
        ensure_comment_owner(actor, comment.author)?;
        self.charge(payment).await?;

        self.content.edit_comment(post_id, comment_id, content).await?;
        self.treasury.credit(payment).await?;
        Ok(())
    }

    /// Soft-delete a comment; owner only, payment gated
    pub async fn delete_comment(
        &self,
        actor: Address,
        post_id: PostId,
        comment_id: CommentId,
        payment: Amount,
    ) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        let comment = self.content.comment(post_id, comment_id)?;
        ensure_comment_owner(actor, comment.author)?;
        self.charge(payment).await?;

        self.content.delete_comment(post_id, comment_id).await?;
        self.treasury.credit(payment).await?;
        Ok(())
    }

    /// Like a comment; open to anyone, intentionally unrestricted
    pub async fn like_comment(
        &self,
        actor: Address,
        post_id: PostId,
        comment_id: CommentId,
    ) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        self.content.like_comment(post_id, comment_id, actor).await?;

        self.emit(AuditEvent::CommentLiked {
            post_id,
            comment_id,
            liker: actor,
        });
        Ok(())
    }

    // ============ Administration ============

    /// Accumulated payment balance; admin only
    pub fn balance(&self, actor: Address) -> AgoranetResult<Amount> {
        self.admin.ensure(actor)?;
        Ok(self.treasury.balance())
    }

    /// Transfer the whole accumulated balance to `to`; admin only
    ///
    /// All-or-nothing: a failed external transfer leaves the balance
    /// bookkeeping unchanged.
    pub async fn withdraw_all(&self, actor: Address, to: Address) -> AgoranetResult<Amount> {
        let _guard = self.write_gate.lock().await;

        self.admin.ensure(actor)?;
        self.treasury.withdraw_all(to, self.transfer.as_ref()).await
    }

    /// Hand the admin role to a new address; admin only
    pub async fn change_admin(&self, actor: Address, new_admin: Address) -> AgoranetResult<()> {
        let _guard = self.write_gate.lock().await;

        self.admin.ensure(actor)?;
        self.state
            .set(&admin_key(), new_admin.as_bytes())
            .await?;
        self.admin.transfer(new_admin);
        Ok(())
    }

    /// Recompute the eligibility set; admin only
    ///
    /// Full scan over all users, flagging those whose post count exceeds
    /// the configured minimum. Idempotent: there is no incremental update
    /// path, the set is recomputed from scratch every time.
    pub async fn identify_eligible_users(&self, actor: Address) -> AgoranetResult<u64> {
        let _guard = self.write_gate.lock().await;

        self.admin.ensure(actor)?;

        let mut flagged = HashSet::new();
        let mut changes = Vec::new();
        for user in self.registry.all_users() {
            if self.content.post_count_by(&user.address) > self.config.eligibility.min_posts {
                flagged.insert(user.address);
                changes.push(StateChange::Set {
                    key: eligible_key(&user.address),
                    value: FLAG_SET.to_vec(),
                });
            }
        }

        // Flags from an earlier scan are cleared, so the persisted set is
        // the recomputed one and nothing stale survives a reload
        for address in self.eligible.read().iter() {
            if !flagged.contains(address) {
                changes.push(StateChange::Delete {
                    key: eligible_key(address),
                });
            }
        }

        if !changes.is_empty() {
            self.state.apply_batch(changes).await?;
        }

        let count = flagged.len() as u64;
        *self.eligible.write() = flagged;

        debug!("Eligibility scan flagged {} users", count);
        Ok(count)
    }

    /// Whether an address is in the eligibility set
    pub fn is_eligible(&self, address: &Address) -> bool {
        self.eligible.read().contains(address)
    }

    // ============ Read surface ============

    pub fn user(&self, address: &Address) -> Option<User> {
        self.registry.resolve(address)
    }

    pub fn user_by_name(&self, name: &str) -> Option<User> {
        self.registry.resolve_by_name(name)
    }

    pub fn user_count(&self) -> u64 {
        self.registry.user_count()
    }

    pub fn post(&self, post_id: PostId) -> AgoranetResult<Post> {
        self.content.post(post_id)
    }

    pub fn post_count(&self) -> u64 {
        self.content.post_count()
    }

    pub fn comments_of(&self, post_id: PostId) -> Vec<Comment> {
        self.content.comments_of(post_id)
    }

    pub fn posts_by(&self, author: &Address) -> Vec<PostId> {
        self.content.posts_by(author)
    }

    pub fn latest_post_of(&self, author: &Address) -> Option<PostId> {
        self.content.latest_post_of(author)
    }

    pub fn has_voted(&self, voter: &Address, post_id: PostId) -> bool {
        self.content.has_voted(voter, post_id)
    }

    pub fn likers_of(&self, post_id: PostId, comment_id: CommentId) -> Vec<Address> {
        self.content.likers_of(post_id, comment_id)
    }

    pub fn admin(&self) -> Address {
        self.admin.current()
    }

    // ============ Events ============

    /// Subscribe to audit events
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.events.subscribe()
    }

    /// All events emitted so far, in order
    pub fn journal(&self) -> Vec<AuditEvent> {
        self.journal.read().clone()
    }

    // ============ Internals ============

    /// Resolve the rate and authorize the payment
    ///
    /// The oracle lookup completes before the gate runs; a failed check
    /// aborts the operation before any mutation.
    async fn charge(&self, payment: Amount) -> AgoranetResult<()> {
        let rate = self.oracle.latest_rate().await?;
        self.gate.authorize(payment, rate)
    }

    fn display_name(&self, address: &Address) -> String {
        self.registry
            .resolve(address)
            .map(|u| u.name)
            .unwrap_or_default()
    }

    fn emit(&self, event: AuditEvent) {
        debug!("Audit event: {}", event.kind());
        self.journal.write().push(event.clone());
        // No subscribers is fine; the journal keeps the full trail
        let _ = self.events.send(event);
    }
}
