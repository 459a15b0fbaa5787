//! AGORANET State Management
//!
//! Provides the key-value state layer the ledger persists into. The primary
//! records (users, posts, comments) live under prefixed keys in append-only
//! id order; vote/like/eligibility flags have their own prefixes. All index
//! maps held by the ledger are derived views reconstructible from the
//! primary records alone.

pub mod store;
pub mod memory;
pub mod persistent;
pub mod snapshot;

pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use snapshot::*;
