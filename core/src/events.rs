//! Audit events emitted by the ledger
//!
//! One event per successful mutation, carrying denormalized display data
//! (resolved usernames) so external consumers need no follow-up lookups.
//! Failed operations emit nothing.

use crate::types::{Address, CommentId, PostId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Audit event for a successful ledger mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    UserRegistered {
        user_id: UserId,
        address: Address,
        name: String,
    },
    PostCreated {
        post_id: PostId,
        author: Address,
        author_name: String,
        timestamp: Timestamp,
    },
    PostEdited {
        post_id: PostId,
        author: Address,
        author_name: String,
    },
    CommentCreated {
        post_id: PostId,
        comment_id: CommentId,
        author: Address,
        author_name: String,
        timestamp: Timestamp,
    },
    CommentLiked {
        post_id: PostId,
        comment_id: CommentId,
        liker: Address,
    },
    Upvoted {
        post_id: PostId,
        voter: Address,
        voter_name: String,
        upvotes: u64,
    },
    Downvoted {
        post_id: PostId,
        voter: Address,
        voter_name: String,
        downvotes: u64,
    },
}

impl AuditEvent {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::UserRegistered { .. } => "user_registered",
            AuditEvent::PostCreated { .. } => "post_created",
            AuditEvent::PostEdited { .. } => "post_edited",
            AuditEvent::CommentCreated { .. } => "comment_created",
            AuditEvent::CommentLiked { .. } => "comment_liked",
            AuditEvent::Upvoted { .. } => "upvoted",
            AuditEvent::Downvoted { .. } => "downvoted",
        }
    }
}
