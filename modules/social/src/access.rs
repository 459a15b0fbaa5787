//! Access control - authorization predicates
//!
//! Each check is a pure predicate against a snapshot of state, returning a
//! tagged denial. The service evaluates them in a fixed order (existence,
//! ownership, voting-state, payment) before any mutation, so every check is
//! testable in isolation and no modifier chain is needed.

use agoranet_core::{Address, AgoranetError, AgoranetResult, PostId};
use parking_lot::RwLock;
use tracing::info;

/// Deny unless the actor is the recorded post author
///
/// A soft-deleted post has the zero sentinel as author, which no actor can
/// match, so deleted posts are unmodifiable by construction.
pub fn ensure_post_owner(actor: Address, owner: Address) -> AgoranetResult<()> {
    if actor == owner {
        Ok(())
    } else {
        Err(AgoranetError::NotPostOwner)
    }
}

/// Deny unless the actor is the recorded comment author
pub fn ensure_comment_owner(actor: Address, owner: Address) -> AgoranetResult<()> {
    if actor == owner {
        Ok(())
    } else {
        Err(AgoranetError::NotCommentOwner)
    }
}

/// Deny unless the address has a registered identity
pub fn ensure_registered(actor: Address, registered: bool) -> AgoranetResult<()> {
    if registered {
        Ok(())
    } else {
        Err(AgoranetError::UserNotFound(actor.to_hex()))
    }
}

/// Deny self-votes and re-votes, in that order
pub fn ensure_can_vote(
    voter: Address,
    author: Address,
    already_voted: bool,
    post_id: PostId,
) -> AgoranetResult<()> {
    if voter == author {
        return Err(AgoranetError::SelfVoteForbidden);
    }
    if already_voted {
        return Err(AgoranetError::AlreadyVoted(post_id.0));
    }
    Ok(())
}

/// Process-wide admin identity
///
/// Held as an explicit handle injected into the service rather than ambient
/// global state; mutated only through [`transfer`](AdminHandle::transfer).
pub struct AdminHandle {
    admin: RwLock<Address>,
}

impl AdminHandle {
    pub fn new(admin: Address) -> Self {
        Self {
            admin: RwLock::new(admin),
        }
    }

    /// Current admin address
    pub fn current(&self) -> Address {
        *self.admin.read()
    }

    /// Deny unless the actor is the current admin
    pub fn ensure(&self, actor: Address) -> AgoranetResult<()> {
        if actor == *self.admin.read() {
            Ok(())
        } else {
            Err(AgoranetError::NotAdmin)
        }
    }

    /// Hand the admin role to a new address
    pub fn transfer(&self, new_admin: Address) {
        let mut admin = self.admin.write();
        info!("Admin changed: {} -> {}", *admin, new_admin);
        *admin = new_admin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn test_owner_checks() {
        assert!(ensure_post_owner(addr(1), addr(1)).is_ok());
        assert!(matches!(
            ensure_post_owner(addr(1), addr(2)),
            Err(AgoranetError::NotPostOwner)
        ));
        assert!(matches!(
            ensure_comment_owner(addr(1), addr(2)),
            Err(AgoranetError::NotCommentOwner)
        ));
    }

    #[test]
    fn test_deleted_post_has_no_owner() {
        // After soft-delete the author is the zero sentinel
        assert!(matches!(
            ensure_post_owner(addr(1), Address::ZERO),
            Err(AgoranetError::NotPostOwner)
        ));
    }

    #[test]
    fn test_registered_check() {
        assert!(ensure_registered(addr(1), true).is_ok());
        assert!(matches!(
            ensure_registered(addr(1), false),
            Err(AgoranetError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_vote_checks_in_order() {
        let post = PostId::new(0);

        assert!(ensure_can_vote(addr(2), addr(1), false, post).is_ok());
        assert!(matches!(
            ensure_can_vote(addr(1), addr(1), false, post),
            Err(AgoranetError::SelfVoteForbidden)
        ));
        assert!(matches!(
            ensure_can_vote(addr(2), addr(1), true, post),
            Err(AgoranetError::AlreadyVoted(0))
        ));
        // Self-vote wins over already-voted when both apply
        assert!(matches!(
            ensure_can_vote(addr(1), addr(1), true, post),
            Err(AgoranetError::SelfVoteForbidden)
        ));
    }

    #[test]
    fn test_admin_handle_transfer() {
        let handle = AdminHandle::new(addr(1));

        assert!(handle.ensure(addr(1)).is_ok());
        assert!(matches!(handle.ensure(addr(2)), Err(AgoranetError::NotAdmin)));

        handle.transfer(addr(2));
        assert!(handle.ensure(addr(2)).is_ok());
        assert!(matches!(handle.ensure(addr(1)), Err(AgoranetError::NotAdmin)));
    }
}
