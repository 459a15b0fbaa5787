//! Error types for AGORANET

use thiserror::Error;

/// Main error type for AGORANET
///
/// Precondition violations are detected before any mutation; an operation
/// that returns one of these has had no effect on stored state.
#[derive(Error, Debug)]
pub enum AgoranetError {
    // ============ Identity Errors ============
    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Address already registered: {0}")]
    UserAlreadyRegistered(String),

    // ============ Authorization Errors ============
    #[error("Caller is not the admin")]
    NotAdmin,

    #[error("Caller is not the post owner")]
    NotPostOwner,

    #[error("Caller is not the comment owner")]
    NotCommentOwner,

    // ============ Voting Errors ============
    #[error("Authors cannot vote on their own posts")]
    SelfVoteForbidden,

    #[error("Already voted on post {0}")]
    AlreadyVoted(u64),

    // ============ Payment Errors ============
    #[error("Payment insufficient: required {required} reference units, provided {provided}")]
    PaymentInsufficient { required: u128, provided: u128 },

    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    // ============ Content Errors ============
    #[error("Post not found: {0}")]
    PostNotFound(u64),

    #[error("Comment not found: post {post_id}, comment {comment_id}")]
    CommentNotFound { post_id: u64, comment_id: u64 },

    // ============ State Errors ============
    #[error("State not found for key")]
    StateNotFound,

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    // ============ Serialization Errors ============
    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for AgoranetError {
    fn from(err: std::io::Error) -> Self {
        AgoranetError::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for AgoranetError {
    fn from(err: bincode::Error) -> Self {
        AgoranetError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for AgoranetError {
    fn from(err: serde_json::Error) -> Self {
        AgoranetError::SerializationError(err.to_string())
    }
}
