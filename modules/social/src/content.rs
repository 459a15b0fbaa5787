//! Content store - posts, comments, votes and likes
//!
//! Post ids are global and sequential; comment ids are sequential **per
//! post** (the comment's index in its post's array). Soft-delete clears the
//! mutable fields and hands the record to the zero sentinel; the id slot is
//! never reclaimed. Every mutation writes its primary record and flags in
//! one batch, so derived indices can never drift from the primaries.

use agoranet_core::{
    Address, AgoranetError, AgoranetResult, CommentId, PostId, StateChange, Timestamp,
};
use agoranet_state::{
    comment_key, like_key, parse_comment_key, parse_post_key, parse_vote_key, post_key, vote_key,
    CommentRecord, PostRecord, StateStore, FLAG_SET,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Post information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub post_id: PostId,
    pub author: Address,
    pub content: String,
    pub img_hash: String,
    pub timestamp: Timestamp,
    pub upvotes: u64,
    pub downvotes: u64,
}

impl Post {
    pub fn from_record(record: PostRecord) -> Self {
        Self {
            post_id: PostId::new(record.post_id),
            author: record.author,
            content: record.content,
            img_hash: record.img_hash,
            timestamp: Timestamp::from_millis(record.timestamp),
            upvotes: record.upvotes,
            downvotes: record.downvotes,
        }
    }

    pub fn to_record(&self) -> PostRecord {
        PostRecord {
            post_id: self.post_id.0,
            author: self.author,
            content: self.content.clone(),
            img_hash: self.img_hash.clone(),
            timestamp: self.timestamp.as_millis(),
            upvotes: self.upvotes,
            downvotes: self.downvotes,
        }
    }

    /// Whether this post has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.author.is_zero()
    }
}

/// Comment information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub author: Address,
    pub content: String,
    pub timestamp: Timestamp,
    pub likes_count: u64,
    pub likers: Vec<Address>,
}

impl Comment {
    pub fn from_record(record: CommentRecord) -> Self {
        Self {
            post_id: PostId::new(record.post_id),
            comment_id: CommentId::new(record.comment_id),
            author: record.author,
            content: record.content,
            timestamp: Timestamp::from_millis(record.timestamp),
            likes_count: record.likes_count,
            likers: record.likers,
        }
    }

    pub fn to_record(&self) -> CommentRecord {
        CommentRecord {
            post_id: self.post_id.0,
            comment_id: self.comment_id.0,
            author: self.author,
            content: self.content.clone(),
            timestamp: self.timestamp.as_millis(),
            likes_count: self.likes_count,
            likers: self.likers.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Primary post array, indexed by global sequential id
    posts: Vec<Post>,
    /// Primary comment arrays, one per post, indexed by per-post id
    comments: HashMap<u64, Vec<Comment>>,
    /// Derived: voter → posts voted on (never cleared)
    votes: HashMap<Address, HashSet<u64>>,
    /// Derived: author → full post history
    author_posts: HashMap<Address, Vec<PostId>>,
    /// Derived: author → most recent post only (single slot, overwritten
    /// on every create; the full history lives in `author_posts`)
    latest_post: HashMap<Address, PostId>,
}

/// Content store for AGORANET posts and comments
///
/// Authorization is the caller's concern: mutation methods assume the
/// ownership/voting checks already passed and only enforce existence.
pub struct ContentStore<S: StateStore> {
    state: Arc<S>,
    inner: RwLock<Inner>,
}

impl<S: StateStore + 'static> ContentStore<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Rebuild primaries and derived indices from stored records
    ///
    /// Soft-deleted posts carry the zero sentinel as author, so rebuilt
    /// author histories contain only still-owned posts.
    pub async fn load(&self) -> AgoranetResult<()> {
        let entries = self.state.all_entries().await?;

        let mut post_records: Vec<PostRecord> = Vec::new();
        let mut comment_records: Vec<CommentRecord> = Vec::new();
        let mut vote_flags: Vec<(Address, u64)> = Vec::new();

        for entry in &entries {
            if parse_post_key(&entry.key).is_some() {
                post_records.push(PostRecord::from_bytes(&entry.value)?);
            } else if parse_comment_key(&entry.key).is_some() {
                comment_records.push(CommentRecord::from_bytes(&entry.value)?);
            } else if let Some((voter, post_id)) = parse_vote_key(&entry.key) {
                vote_flags.push((voter, post_id));
            }
        }
        post_records.sort_by_key(|r| r.post_id);
        comment_records.sort_by_key(|r| (r.post_id, r.comment_id));

        let mut inner = self.inner.write();
        *inner = Inner::default();

        for record in post_records {
            let post = Post::from_record(record);
            if post.post_id.0 != inner.posts.len() as u64 {
                return Err(AgoranetError::StateCorruption(format!(
                    "post id gap: expected {}, found {}",
                    inner.posts.len(),
                    post.post_id.0
                )));
            }
            if !post.author.is_zero() {
                inner
                    .author_posts
                    .entry(post.author)
                    .or_default()
                    .push(post.post_id);
                inner.latest_post.insert(post.author, post.post_id);
            }
            inner.posts.push(post);
        }

        for record in comment_records {
            let comment = Comment::from_record(record);
            inner
                .comments
                .entry(comment.post_id.0)
                .or_default()
                .push(comment);
        }

        for (voter, post_id) in vote_flags {
            inner.votes.entry(voter).or_default().insert(post_id);
        }

        info!(
            "Content store loaded {} posts, {} votes",
            inner.posts.len(),
            inner.votes.values().map(|s| s.len()).sum::<usize>()
        );
        Ok(())
    }

    // ============ Posts ============

    /// Create a post for a registered author
    pub async fn create_post(
        &self,
        author: Address,
        content: &str,
        img_hash: &str,
    ) -> AgoranetResult<Post> {
        let post = {
            let inner = self.inner.read();
            Post {
                post_id: PostId::new(inner.posts.len() as u64),
                author,
                content: content.to_string(),
                img_hash: img_hash.to_string(),
                timestamp: Timestamp::now(),
                upvotes: 0,
                downvotes: 0,
            }
        };

        self.state
            .apply_batch(vec![StateChange::Set {
                key: post_key(post.post_id.0),
                value: post.to_record().to_bytes(),
            }])
            .await?;

        let mut inner = self.inner.write();
        inner
            .author_posts
            .entry(author)
            .or_default()
            .push(post.post_id);
        inner.latest_post.insert(author, post.post_id);
        inner.posts.push(post.clone());

        debug!("Created {} by {}", post.post_id, author);
        Ok(post)
    }

    /// Get a post by id
    pub fn post(&self, post_id: PostId) -> AgoranetResult<Post> {
        self.inner
            .read()
            .posts
            .get(post_id.0 as usize)
            .cloned()
            .ok_or(AgoranetError::PostNotFound(post_id.0))
    }

    /// Overwrite a post's mutable fields
    ///
    /// Counters and timestamp are untouched.
    pub async fn edit_post(
        &self,
        post_id: PostId,
        content: &str,
        img_hash: &str,
    ) -> AgoranetResult<()> {
        let mut post = self.post(post_id)?;
        post.content = content.to_string();
        post.img_hash = img_hash.to_string();

        self.state
            .apply_batch(vec![StateChange::Set {
                key: post_key(post_id.0),
                value: post.to_record().to_bytes(),
            }])
            .await?;

        self.inner.write().posts[post_id.0 as usize] = post;
        debug!("Edited {}", post_id);
        Ok(())
    }

    /// Soft-delete a post
    ///
    /// Clears content and img_hash and sets the author to the zero
    /// sentinel. The record and its id persist; no owner can satisfy the
    /// ownership check afterwards.
    pub async fn delete_post(&self, post_id: PostId) -> AgoranetResult<()> {
        let mut post = self.post(post_id)?;
        let author = post.author;
        post.content.clear();
        post.img_hash.clear();
        post.author = Address::ZERO;

        self.state
            .apply_batch(vec![StateChange::Set {
                key: post_key(post_id.0),
                value: post.to_record().to_bytes(),
            }])
            .await?;

        let mut inner = self.inner.write();
        inner.posts[post_id.0 as usize] = post;

        // The deleted id leaves the author's history and the latest slot
        // falls back to the newest remaining post, same as a rebuild.
        let remaining = match inner.author_posts.get_mut(&author) {
            Some(history) => {
                history.retain(|id| *id != post_id);
                history.last().copied()
            }
            None => None,
        };
        match remaining {
            Some(newest) => {
                inner.latest_post.insert(author, newest);
            }
            None => {
                inner.author_posts.remove(&author);
                inner.latest_post.remove(&author);
            }
        }

        debug!("Soft-deleted {}", post_id);
        Ok(())
    }

    /// Record an upvote; returns the new upvote count
    ///
    /// The (voter, post) flag is written in the same batch as the counter
    /// and never cleared, so a re-vote is impossible by construction.
    pub async fn record_upvote(&self, voter: Address, post_id: PostId) -> AgoranetResult<u64> {
        self.record_vote(voter, post_id, true).await
    }

    /// Record a downvote; returns the new downvote count
    pub async fn record_downvote(&self, voter: Address, post_id: PostId) -> AgoranetResult<u64> {
        self.record_vote(voter, post_id, false).await
    }

    async fn record_vote(
        &self,
        voter: Address,
        post_id: PostId,
        up: bool,
    ) -> AgoranetResult<u64> {
        let mut post = self.post(post_id)?;
        if up {
            post.upvotes += 1;
        } else {
            post.downvotes += 1;
        }
        let count = if up { post.upvotes } else { post.downvotes };

        self.state
            .apply_batch(vec![
                StateChange::Set {
                    key: post_key(post_id.0),
                    value: post.to_record().to_bytes(),
                },
                StateChange::Set {
                    key: vote_key(&voter, post_id.0),
                    value: FLAG_SET.to_vec(),
                },
            ])
            .await?;

        let mut inner = self.inner.write();
        inner.posts[post_id.0 as usize] = post;
        inner.votes.entry(voter).or_default().insert(post_id.0);

        Ok(count)
    }

    /// Whether the voter has already voted on the post
    pub fn has_voted(&self, voter: &Address, post_id: PostId) -> bool {
        self.inner
            .read()
            .votes
            .get(voter)
            .is_some_and(|set| set.contains(&post_id.0))
    }

    // ============ Comments ============

    /// Create a comment under a post
    ///
    /// The comment id is the current length of the post's comment array:
    /// zero-based and sequential per post, not globally unique.
    pub async fn create_comment(
        &self,
        post_id: PostId,
        author: Address,
        content: &str,
    ) -> AgoranetResult<Comment> {
        // Existence check on the parent post
        self.post(post_id)?;

        let comment = {
            let inner = self.inner.read();
            let next_id = inner
                .comments
                .get(&post_id.0)
                .map(|c| c.len() as u64)
                .unwrap_or(0);
            Comment {
                post_id,
                comment_id: CommentId::new(next_id),
                author,
                content: content.to_string(),
                timestamp: Timestamp::now(),
                likes_count: 0,
                likers: Vec::new(),
            }
        };

        self.state
            .apply_batch(vec![StateChange::Set {
                key: comment_key(post_id.0, comment.comment_id.0),
                value: comment.to_record().to_bytes(),
            }])
            .await?;

        let mut inner = self.inner.write();
        inner
            .comments
            .entry(post_id.0)
            .or_default()
            .push(comment.clone());

        debug!("Created {} on {} by {}", comment.comment_id, post_id, author);
        Ok(comment)
    }

    /// Get a comment by (post, comment) id
    pub fn comment(&self, post_id: PostId, comment_id: CommentId) -> AgoranetResult<Comment> {
        self.inner
            .read()
            .comments
            .get(&post_id.0)
            .and_then(|c| c.get(comment_id.0 as usize))
            .cloned()
            .ok_or(AgoranetError::CommentNotFound {
                post_id: post_id.0,
                comment_id: comment_id.0,
            })
    }

    /// Overwrite a comment's content
    pub async fn edit_comment(
        &self,
        post_id: PostId,
        comment_id: CommentId,
        content: &str,
    ) -> AgoranetResult<()> {
        let mut comment = self.comment(post_id, comment_id)?;
        comment.content = content.to_string();
        self.write_comment(comment).await
    }

    /// Soft-delete a comment; the id and slot persist
    pub async fn delete_comment(
        &self,
        post_id: PostId,
        comment_id: CommentId,
    ) -> AgoranetResult<()> {
        let mut comment = self.comment(post_id, comment_id)?;
        comment.content.clear();
        comment.author = Address::ZERO;
        self.write_comment(comment).await
    }

    /// Record a like on a comment; returns the new like count
    ///
    /// Unconditionally allowed: no registration check, no duplicate-like
    /// prevention, no self-like restriction.
    pub async fn like_comment(
        &self,
        post_id: PostId,
        comment_id: CommentId,
        liker: Address,
    ) -> AgoranetResult<u64> {
        let mut comment = self.comment(post_id, comment_id)?;
        comment.likes_count += 1;
        comment.likers.push(liker);
        let count = comment.likes_count;

        self.state
            .apply_batch(vec![
                StateChange::Set {
                    key: comment_key(post_id.0, comment_id.0),
                    value: comment.to_record().to_bytes(),
                },
                StateChange::Set {
                    key: like_key(post_id.0, comment_id.0, &liker),
                    value: FLAG_SET.to_vec(),
                },
            ])
            .await?;

        self.commit_comment(comment);
        Ok(count)
    }

    async fn write_comment(&self, comment: Comment) -> AgoranetResult<()> {
        self.state
            .apply_batch(vec![StateChange::Set {
                key: comment_key(comment.post_id.0, comment.comment_id.0),
                value: comment.to_record().to_bytes(),
            }])
            .await?;

        self.commit_comment(comment);
        Ok(())
    }

    fn commit_comment(&self, comment: Comment) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner
            .comments
            .get_mut(&comment.post_id.0)
            .and_then(|c| c.get_mut(comment.comment_id.0 as usize))
        {
            *slot = comment;
        }
    }

    // ============ Read surface ============

    /// Number of posts ever created (soft-deleted slots included)
    pub fn post_count(&self) -> u64 {
        self.inner.read().posts.len() as u64
    }

    /// All comments of a post, in id order
    pub fn comments_of(&self, post_id: PostId) -> Vec<Comment> {
        self.inner
            .read()
            .comments
            .get(&post_id.0)
            .cloned()
            .unwrap_or_default()
    }

    /// Full post history of an author
    pub fn posts_by(&self, author: &Address) -> Vec<PostId> {
        self.inner
            .read()
            .author_posts
            .get(author)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of posts an author has created
    pub fn post_count_by(&self, author: &Address) -> u64 {
        self.inner
            .read()
            .author_posts
            .get(author)
            .map(|p| p.len() as u64)
            .unwrap_or(0)
    }

    /// The author's most recent post (single-slot index)
    pub fn latest_post_of(&self, author: &Address) -> Option<PostId> {
        self.inner.read().latest_post.get(author).copied()
    }

    /// Everyone who liked a comment, in like order (duplicates possible)
    pub fn likers_of(&self, post_id: PostId, comment_id: CommentId) -> Vec<Address> {
        self.comment(post_id, comment_id)
            .map(|c| c.likers)
            .unwrap_or_default()
    }

    /// Whether the address has liked the comment at least once
    pub fn has_liked(&self, post_id: PostId, comment_id: CommentId, liker: &Address) -> bool {
        self.comment(post_id, comment_id)
            .map(|c| c.likers.contains(liker))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agoranet_state::MemoryStateStore;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    fn setup() -> ContentStore<MemoryStateStore> {
        ContentStore::new(Arc::new(MemoryStateStore::new()))
    }

    #[tokio::test]
    async fn test_post_ids_are_global_and_sequential() {
        let store = setup();

        let p0 = store.create_post(addr(1), "first", "").await.unwrap();
        let p1 = store.create_post(addr(2), "second", "").await.unwrap();

        assert_eq!(p0.post_id, PostId::new(0));
        assert_eq!(p1.post_id, PostId::new(1));
        assert_eq!(store.post_count(), 2);
    }

    #[tokio::test]
    async fn test_edit_post_leaves_counters_and_timestamp() {
        let store = setup();
        let post = store.create_post(addr(1), "original", "img1").await.unwrap();
        store.record_upvote(addr(2), post.post_id).await.unwrap();

        store
            .edit_post(post.post_id, "edited", "img2")
            .await
            .unwrap();

        let edited = store.post(post.post_id).unwrap();
        assert_eq!(edited.content, "edited");
        assert_eq!(edited.img_hash, "img2");
        assert_eq!(edited.upvotes, 1);
        assert_eq!(edited.timestamp, post.timestamp);
    }

    #[tokio::test]
    async fn test_soft_delete_clears_content_and_owner() {
        let store = setup();
        let post = store.create_post(addr(1), "doomed", "img").await.unwrap();

        store.delete_post(post.post_id).await.unwrap();

        let deleted = store.post(post.post_id).unwrap();
        assert!(deleted.is_deleted());
        assert!(deleted.content.is_empty());
        assert!(deleted.img_hash.is_empty());
        assert_eq!(deleted.author, Address::ZERO);
        // Slot persists, id space is never reclaimed
        assert_eq!(store.post_count(), 1);
        let next = store.create_post(addr(2), "after", "").await.unwrap();
        assert_eq!(next.post_id, PostId::new(1));
    }

    #[tokio::test]
    async fn test_vote_recording_and_flags() {
        let store = setup();
        let post = store.create_post(addr(1), "p", "").await.unwrap();

        let ups = store.record_upvote(addr(2), post.post_id).await.unwrap();
        assert_eq!(ups, 1);
        assert!(store.has_voted(&addr(2), post.post_id));
        assert!(!store.has_voted(&addr(3), post.post_id));

        let downs = store.record_downvote(addr(3), post.post_id).await.unwrap();
        assert_eq!(downs, 1);

        let current = store.post(post.post_id).unwrap();
        assert_eq!((current.upvotes, current.downvotes), (1, 1));
    }

    #[tokio::test]
    async fn test_comment_ids_scoped_per_post() {
        let store = setup();
        let p0 = store.create_post(addr(1), "a", "").await.unwrap();
        let p1 = store.create_post(addr(1), "b", "").await.unwrap();

        let c0 = store.create_comment(p0.post_id, addr(2), "one").await.unwrap();
        let c1 = store.create_comment(p0.post_id, addr(2), "two").await.unwrap();
        let c2 = store.create_comment(p1.post_id, addr(2), "other").await.unwrap();

        assert_eq!(c0.comment_id, CommentId::new(0));
        assert_eq!(c1.comment_id, CommentId::new(1));
        // Restarts at 0 for the other post
        assert_eq!(c2.comment_id, CommentId::new(0));
    }

    #[tokio::test]
    async fn test_comment_on_missing_post() {
        let store = setup();
        let result = store.create_comment(PostId::new(9), addr(1), "x").await;
        assert!(matches!(result, Err(AgoranetError::PostNotFound(9))));
    }

    #[tokio::test]
    async fn test_comment_soft_delete() {
        let store = setup();
        let post = store.create_post(addr(1), "p", "").await.unwrap();
        let comment = store
            .create_comment(post.post_id, addr(2), "hello")
            .await
            .unwrap();

        store
            .delete_comment(post.post_id, comment.comment_id)
            .await
            .unwrap();

        let deleted = store.comment(post.post_id, comment.comment_id).unwrap();
        assert!(deleted.content.is_empty());
        assert_eq!(deleted.author, Address::ZERO);
        // Slot persists: the next comment gets the next id
        let next = store
            .create_comment(post.post_id, addr(3), "next")
            .await
            .unwrap();
        assert_eq!(next.comment_id, CommentId::new(1));
    }

    #[tokio::test]
    async fn test_like_comment_is_unrestricted() {
        // Literal source behavior: duplicates and self-likes both pass
        let store = setup();
        let post = store.create_post(addr(1), "p", "").await.unwrap();
        let comment = store
            .create_comment(post.post_id, addr(2), "c")
            .await
            .unwrap();

        store
            .like_comment(post.post_id, comment.comment_id, addr(2))
            .await
            .unwrap();
        let count = store
            .like_comment(post.post_id, comment.comment_id, addr(2))
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            store.likers_of(post.post_id, comment.comment_id),
            vec![addr(2), addr(2)]
        );
        assert!(store.has_liked(post.post_id, comment.comment_id, &addr(2)));
    }

    #[tokio::test]
    async fn test_latest_post_single_slot_overwritten() {
        let store = setup();

        let p0 = store.create_post(addr(1), "a", "").await.unwrap();
        assert_eq!(store.latest_post_of(&addr(1)), Some(p0.post_id));

        let p1 = store.create_post(addr(1), "b", "").await.unwrap();
        // Only the most recent id is retrievable through this index
        assert_eq!(store.latest_post_of(&addr(1)), Some(p1.post_id));
        // Full history stays in the author list
        assert_eq!(store.posts_by(&addr(1)), vec![p0.post_id, p1.post_id]);
    }

    #[tokio::test]
    async fn test_delete_post_updates_author_indices() {
        let state = Arc::new(MemoryStateStore::new());
        let store = ContentStore::new(state.clone());

        let p0 = store.create_post(addr(1), "a", "").await.unwrap().post_id;
        let p1 = store.create_post(addr(1), "b", "").await.unwrap().post_id;

        // Deleting the newest post drops it from the history; the latest
        // slot falls back to the older one
        store.delete_post(p1).await.unwrap();
        assert_eq!(store.posts_by(&addr(1)), vec![p0]);
        assert_eq!(store.post_count_by(&addr(1)), 1);
        assert_eq!(store.latest_post_of(&addr(1)), Some(p0));

        // Deleting the last remaining post clears both views
        store.delete_post(p0).await.unwrap();
        assert!(store.posts_by(&addr(1)).is_empty());
        assert_eq!(store.latest_post_of(&addr(1)), None);

        // A rebuild from the same records sees the same views
        let reloaded = ContentStore::new(state);
        reloaded.load().await.unwrap();
        assert!(reloaded.posts_by(&addr(1)).is_empty());
        assert_eq!(reloaded.latest_post_of(&addr(1)), None);
        assert_eq!(reloaded.post_count(), 2);
    }

    #[tokio::test]
    async fn test_load_rebuilds_from_primaries() {
        let state = Arc::new(MemoryStateStore::new());
        let (p0, p1);

        {
            let store = ContentStore::new(state.clone());
            p0 = store.create_post(addr(1), "a", "").await.unwrap().post_id;
            p1 = store.create_post(addr(1), "b", "").await.unwrap().post_id;
            store.create_comment(p0, addr(2), "c").await.unwrap();
            store.record_upvote(addr(2), p0).await.unwrap();
            store.delete_post(p0).await.unwrap();
        }

        let reloaded = ContentStore::new(state);
        reloaded.load().await.unwrap();

        assert_eq!(reloaded.post_count(), 2);
        assert!(reloaded.post(p0).unwrap().is_deleted());
        assert!(reloaded.has_voted(&addr(2), p0));
        assert_eq!(reloaded.comments_of(p0).len(), 1);
        // A soft-deleted post is unowned, so the rebuilt history holds
        // only the still-owned post
        assert_eq!(reloaded.posts_by(&addr(1)), vec![p1]);
        assert_eq!(reloaded.latest_post_of(&addr(1)), Some(p1));
    }
}
