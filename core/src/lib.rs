//! AGORANET Core Library
//!
//! Core types, traits, and abstractions for the AGORANET social-graph ledger.
//! This crate provides the foundation for all other AGORANET components.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;
pub mod events;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
pub use events::*;
