//! AGORANET Rate Oracle
//!
//! Implementations of the [`RateOracle`](agoranet_core::RateOracle) trait.
//! Price aggregation is an external concern; the ledger only consumes the
//! latest rate between the payment denomination and the reference currency.

pub mod fixed;

pub use fixed::*;
