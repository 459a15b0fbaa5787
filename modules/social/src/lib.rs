//! AGORANET Social-Graph Ledger Module
//!
//! Implements the single-writer ledger over users, posts, comments, votes
//! and likes:
//! - Identity registration with username uniqueness
//! - Ownership-gated, payment-gated content mutation
//! - Vote-once-per-user semantics
//! - Audit events for every successful mutation

pub mod identity;
pub mod access;
pub mod payment;
pub mod content;
pub mod service;

pub use identity::*;
pub use access::*;
pub use payment::*;
pub use content::*;
pub use service::*;
